//! Publisher contract and upload tasks

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use gantry_core::RepositorySlug;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::{PublishError, Result};

/// What happened to an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Uploaded to the release
    Uploaded,
    /// Deliberately not uploaded
    Skipped,
}

/// Result of a finished upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    /// Artifact display name
    pub artifact_name: String,
    /// Local artifact path
    pub path: PathBuf,
    /// Upload status
    pub status: UploadStatus,
    /// Download URL of the uploaded asset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Why the upload was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl UploadReceipt {
    /// Receipt for an uploaded asset
    pub fn uploaded(artifact_name: impl Into<String>, path: impl Into<PathBuf>, url: Option<String>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            path: path.into(),
            status: UploadStatus::Uploaded,
            url,
            reason: None,
        }
    }

    /// Receipt for a skipped asset
    pub fn skipped(
        artifact_name: impl Into<String>,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            path: path.into(),
            status: UploadStatus::Skipped,
            url: None,
            reason: Some(reason.into()),
        }
    }
}

/// An in-flight upload that can be cancelled or awaited
#[derive(Debug)]
pub struct PublishTask {
    artifact_name: String,
    path: PathBuf,
    handle: JoinHandle<Result<UploadReceipt>>,
}

impl PublishTask {
    /// Run `upload` on the current runtime
    pub fn spawn<F>(path: &Path, artifact_name: &str, upload: F) -> Self
    where
        F: Future<Output = Result<UploadReceipt>> + Send + 'static,
    {
        Self {
            artifact_name: artifact_name.to_string(),
            path: path.to_path_buf(),
            handle: tokio::spawn(upload),
        }
    }

    /// Artifact display name
    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    /// Local artifact path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the upload has settled
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request cancellation; the upload stops at its next suspension point
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Wait for the upload to settle
    pub async fn wait(self) -> Result<UploadReceipt> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(PublishError::Cancelled(self.artifact_name)),
            Err(e) => Err(PublishError::Task(e)),
        }
    }
}

/// Uploads artifacts to a release host.
///
/// `upload` may be called concurrently; every call is independent.
pub trait Publisher: Send + Sync {
    /// Start uploading `path` under `artifact_name`
    fn upload(&self, path: &Path, artifact_name: &str) -> PublishTask;
}

/// Everything a publisher is constructed from
#[derive(Clone, PartialEq, Eq)]
pub struct PublisherOptions {
    /// Target repository
    pub slug: RepositorySlug,
    /// Version being released
    pub version: String,
    /// Release host token
    pub token: Option<String>,
    /// Upload only into a release that already exists
    pub require_existing_release: bool,
}

impl std::fmt::Debug for PublisherOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherOptions")
            .field("slug", &self.slug)
            .field("version", &self.version)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("require_existing_release", &self.require_existing_release)
            .finish()
    }
}

/// Builds publishers for a resolved repository
#[async_trait]
pub trait PublisherFactory: Send + Sync {
    /// Create a publisher
    async fn create(&self, options: PublisherOptions) -> Result<Arc<dyn Publisher>>;
}
