//! Gantry Publish - Release publishing for built artifacts
//!
//! This crate decides whether a build publishes, and coordinates uploads of
//! the artifacts it produces:
//! - Dist and publish decision from flags and CI environment
//! - Lazy, single publisher construction per build
//! - GitHub Releases uploads
//! - Cancellation of pending uploads when the build fails

pub mod coordinator;
pub mod error;
pub mod github;
pub mod pipeline;
pub mod policy;
pub mod publisher;
pub mod repository;

#[cfg(test)]
mod testing;

pub use coordinator::{ArtifactCreated, ArtifactSender, CoordinatorState, PublishCoordinator, PublishSummary};
pub use error::{BuildError, PipelineError, PublishError, Result, UploadFailure};
pub use gantry_core::PublishPolicy;
pub use github::{GitHubPublisher, GitHubPublisherFactory, GitHubSettings};
pub use pipeline::{build_and_publish, Packager};
pub use policy::{resolve, PolicyInputs, PublishDecision, Resolution};
pub use publisher::{PublishTask, Publisher, PublisherFactory, PublisherOptions, UploadReceipt, UploadStatus};
pub use repository::{MemoizedResolver, RepositoryInfoResolver};
