//! Error types for publishing and build orchestration

use thiserror::Error;

use crate::publisher::UploadReceipt;

/// Result type alias for publish operations
pub type Result<T> = std::result::Result<T, PublishError>;

/// Publishing errors
#[derive(Debug, Error)]
pub enum PublishError {
    /// Publishing was requested explicitly but has no usable target
    #[error("Publish configuration error: {0}")]
    Configuration(String),

    /// One or more uploads failed after a successful build
    #[error("{} of {} uploads failed: {}", .failed.len(), .failed.len() + .completed.len(), describe(.failed))]
    Upload {
        failed: Vec<UploadFailure>,
        completed: Vec<UploadReceipt>,
    },

    /// API error from the release host
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Upload was cancelled before it finished
    #[error("Upload of {0} was cancelled")]
    Cancelled(String),

    /// Upload task panicked
    #[error("Upload task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Invalid endpoint URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single failed upload
#[derive(Debug)]
pub struct UploadFailure {
    /// Artifact display name
    pub artifact_name: String,
    /// Why the upload failed
    pub error: PublishError,
}

impl std::fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.artifact_name, self.error)
    }
}

fn describe(failed: &[UploadFailure]) -> String {
    failed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from the packaging side of a build
#[derive(Debug, Error)]
pub enum BuildError {
    /// Build command exited unsuccessfully
    #[error("Build command '{command}' failed with exit code {status}")]
    CommandFailed { command: String, status: i32 },

    /// Build command could not be started
    #[error("Cannot run build command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Artifact pattern is not a valid glob
    #[error("Invalid artifact pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// A packaging step failed
    #[error("{step} failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Wrap the error of a named packaging step
    pub fn step(
        step: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Step {
            step: step.into(),
            source: source.into(),
        }
    }
}

/// Outcome of a whole build-and-publish run.
///
/// Packaging failures and distribution failures stay distinguishable.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Packaging failed; pending uploads were cancelled
    #[error("Build failed: {0}")]
    Build(#[from] BuildError),

    /// Packaging succeeded but publishing failed
    #[error("Publishing failed: {0}")]
    Publish(#[from] PublishError),
}
