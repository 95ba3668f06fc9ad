//! Repository info resolution for publisher construction

use std::sync::Arc;

use async_trait::async_trait;
use gantry_core::RepositorySlug;
use gantry_git::GitInfoResolver;
use tokio::sync::OnceCell;
use tracing::debug;

/// Finds the repository artifacts are published to.
///
/// Not finding one is not an error; it yields `None`.
#[async_trait]
pub trait RepositoryInfoResolver: Send + Sync {
    /// Resolve the repository slug
    async fn repository(&self) -> Option<RepositorySlug>;
}

#[async_trait]
impl RepositoryInfoResolver for GitInfoResolver {
    async fn repository(&self) -> Option<RepositorySlug> {
        let resolver = self.clone();
        match tokio::task::spawn_blocking(move || resolver.resolve()).await {
            Ok(slug) => slug,
            Err(e) => {
                debug!(error = %e, "repository lookup task failed");
                None
            }
        }
    }
}

/// Resolves once and replays the result to every later caller
pub struct MemoizedResolver {
    inner: Arc<dyn RepositoryInfoResolver>,
    resolved: OnceCell<Option<RepositorySlug>>,
}

impl MemoizedResolver {
    /// Wrap a resolver
    pub fn new(inner: Arc<dyn RepositoryInfoResolver>) -> Self {
        Self {
            inner,
            resolved: OnceCell::new(),
        }
    }
}

#[async_trait]
impl RepositoryInfoResolver for MemoizedResolver {
    async fn repository(&self) -> Option<RepositorySlug> {
        self.resolved
            .get_or_init(|| self.inner.repository())
            .await
            .clone()
    }
}
