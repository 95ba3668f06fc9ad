//! Gantry Core - shared foundations for the signing and release pipeline
//!
//! This crate provides the types, error handling, configuration and the
//! environment snapshot that the signing and publishing crates build on.

pub mod config;
pub mod environment;
pub mod error;
pub mod types;

pub use environment::BuildEnvironment;
pub use error::{ConfigError, GitError, Result};
pub use types::{PublishPolicy, RepositorySlug};
