//! In-memory fakes for the resolver, factory and publisher seams

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gantry_core::RepositorySlug;
use tokio::sync::Semaphore;

use crate::error::{PublishError, Result};
use crate::publisher::{PublishTask, Publisher, PublisherFactory, PublisherOptions, UploadReceipt};
use crate::repository::RepositoryInfoResolver;

/// Resolves to a fixed slug, optionally held until [`FakeResolver::open`]
pub(crate) struct FakeResolver {
    slug: Option<RepositorySlug>,
    gate: Option<Semaphore>,
    pub(crate) calls: AtomicUsize,
}

impl FakeResolver {
    pub(crate) fn found() -> Self {
        Self {
            slug: Some(RepositorySlug::new("acme", "app")),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn missing() -> Self {
        Self {
            slug: None,
            ..Self::found()
        }
    }

    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::found()
        }
    }

    pub(crate) fn open(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryInfoResolver for FakeResolver {
    async fn repository(&self) -> Option<RepositorySlug> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        self.slug.clone()
    }
}

/// Counts drops of the upload future it is moved into
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records uploads; fails or stalls on request
#[derive(Default)]
pub(crate) struct FakePublisher {
    uploads: Mutex<Vec<String>>,
    fail_containing: Option<String>,
    stall: bool,
    pub(crate) dropped: Arc<AtomicUsize>,
    pub(crate) completed: Arc<AtomicUsize>,
}

impl FakePublisher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Uploads whose name contains `needle` fail with an API error
    pub(crate) fn failing_on(needle: &str) -> Self {
        Self {
            fail_containing: Some(needle.to_string()),
            ..Self::default()
        }
    }

    /// Uploads never finish on their own
    pub(crate) fn stalling() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    pub(crate) fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Publisher for FakePublisher {
    fn upload(&self, path: &Path, artifact_name: &str) -> PublishTask {
        self.uploads.lock().unwrap().push(artifact_name.to_string());

        let fail = self
            .fail_containing
            .as_deref()
            .is_some_and(|needle| artifact_name.contains(needle));
        let stall = self.stall;
        let guard = DropCounter(self.dropped.clone());
        let completed = self.completed.clone();
        let file = path.to_path_buf();
        let name = artifact_name.to_string();

        PublishTask::spawn(path, artifact_name, async move {
            let _guard = guard;
            if stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            completed.fetch_add(1, Ordering::SeqCst);
            if fail {
                Err(PublishError::Api {
                    status: 500,
                    message: "upload rejected".to_string(),
                })
            } else {
                Ok(UploadReceipt::uploaded(name, file, None))
            }
        })
    }
}

/// Hands out one shared publisher and counts constructions
pub(crate) struct FakeFactory {
    publisher: Arc<FakePublisher>,
    pub(crate) options: Mutex<Vec<PublisherOptions>>,
}

impl FakeFactory {
    pub(crate) fn new(publisher: Arc<FakePublisher>) -> Self {
        Self {
            publisher,
            options: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn created(&self) -> usize {
        self.options.lock().unwrap().len()
    }
}

#[async_trait]
impl PublisherFactory for FakeFactory {
    async fn create(&self, options: PublisherOptions) -> Result<Arc<dyn Publisher>> {
        self.options.lock().unwrap().push(options);
        let publisher: Arc<dyn Publisher> = self.publisher.clone();
        Ok(publisher)
    }
}
