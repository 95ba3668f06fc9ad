//! Per-build publish coordination
//!
//! The packager reports finished artifacts through an [`ArtifactSender`].
//! A consumer task builds the publisher lazily on the first artifact (exactly
//! once, however many artifacts race for it) and schedules one upload per
//! artifact. [`PublishCoordinator::finish`] then either cancels every upload
//! (build failed) or waits for all of them (build succeeded).

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{mpsc, OnceCell};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::error::{PublishError, Result, UploadFailure};
use crate::policy::PublishDecision;
use crate::publisher::{PublishTask, Publisher, PublisherFactory, PublisherOptions, UploadReceipt};
use crate::repository::RepositoryInfoResolver;

/// A finished artifact reported by the packager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCreated {
    /// Local artifact path
    pub file: PathBuf,
    /// Display name used for the uploaded asset
    pub artifact_name: String,
}

/// Lifecycle of a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoordinatorState {
    /// Not started
    Idle,
    /// Listening, no artifact seen yet
    AwaitingFirstArtifact,
    /// Publisher construction in progress
    PublisherResolving,
    /// Publisher available, uploads are scheduled
    PublisherReady,
    /// No publisher; artifacts are ignored
    PublisherAbsent,
    /// Build settled, uploads being cancelled or awaited
    Finalizing,
    /// Finished
    Done,
}

/// Reports artifacts to a running coordinator
#[derive(Debug, Clone)]
pub struct ArtifactSender {
    tx: mpsc::UnboundedSender<ArtifactCreated>,
}

impl ArtifactSender {
    /// Report a finished artifact
    pub fn artifact_created(&self, file: impl Into<PathBuf>, artifact_name: impl Into<String>) {
        let event = ArtifactCreated {
            file: file.into(),
            artifact_name: artifact_name.into(),
        };
        if let Err(rejected) = self.tx.send(event) {
            debug!(artifact = %rejected.0.artifact_name, "coordinator finished, artifact not published");
        }
    }
}

/// Outcome of a finished coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishSummary {
    /// Receipts of every settled upload
    pub receipts: Vec<UploadReceipt>,
    /// Uploads cancelled because the build failed
    pub cancelled: usize,
}

enum PublisherSlot {
    Ready(Arc<dyn Publisher>),
    Absent,
    Failed,
}

#[derive(Default)]
struct Registry {
    closed: bool,
    tasks: Vec<PublishTask>,
}

struct Shared {
    decision: PublishDecision,
    version: String,
    token: Option<String>,
    resolver: Arc<dyn RepositoryInfoResolver>,
    factory: Arc<dyn PublisherFactory>,
    publisher: OnceCell<PublisherSlot>,
    construction_error: Mutex<Option<PublishError>>,
    registry: Mutex<Registry>,
    state: Mutex<CoordinatorState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Move forward unless already finalizing
    fn advance(&self, next: CoordinatorState) {
        let mut state = lock(&self.state);
        if !matches!(*state, CoordinatorState::Finalizing | CoordinatorState::Done) {
            *state = next;
        }
    }

    fn accepts(&self, event: &ArtifactCreated) -> bool {
        if !self.decision.publishes() {
            debug!(artifact = %event.artifact_name, "publishing disabled");
            return false;
        }
        !matches!(
            self.publisher.get(),
            Some(PublisherSlot::Absent | PublisherSlot::Failed)
        )
    }

    async fn dispatch(&self, event: ArtifactCreated) {
        let slot = self.publisher.get_or_init(|| self.construct()).await;
        if let PublisherSlot::Ready(publisher) = slot {
            let task = publisher.upload(&event.file, &event.artifact_name);
            self.record(task);
        }
    }

    async fn construct(&self) -> PublisherSlot {
        self.advance(CoordinatorState::PublisherResolving);

        let slot = match self.resolver.repository().await {
            Some(slug) => {
                let options = PublisherOptions {
                    slug,
                    version: self.version.clone(),
                    token: self.token.clone(),
                    require_existing_release: self.decision.requires_existing_release(),
                };
                match self.factory.create(options).await {
                    Ok(publisher) => PublisherSlot::Ready(publisher),
                    Err(e) => self.fail(e),
                }
            }
            None if self.decision.inferred => {
                info!("cannot detect repository, artifacts will not be published");
                PublisherSlot::Absent
            }
            None => self.fail(PublishError::Configuration(
                "cannot detect repository from git remote, set `repository` in gantry.toml".to_string(),
            )),
        };

        self.advance(match slot {
            PublisherSlot::Ready(_) => CoordinatorState::PublisherReady,
            _ => CoordinatorState::PublisherAbsent,
        });
        slot
    }

    fn fail(&self, error: PublishError) -> PublisherSlot {
        warn!(error = %error, "cannot create publisher");
        *lock(&self.construction_error) = Some(error);
        PublisherSlot::Failed
    }

    fn record(&self, task: PublishTask) {
        let mut registry = lock(&self.registry);
        if registry.closed {
            debug!(artifact = %task.artifact_name(), "build already failed, cancelling upload");
            task.cancel();
            return;
        }
        debug!(artifact = %task.artifact_name(), "upload scheduled");
        registry.tasks.push(task);
    }
}

async fn consume(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<ArtifactCreated>) {
    let mut dispatches = JoinSet::new();
    while let Some(event) = events.recv().await {
        if !shared.accepts(&event) {
            continue;
        }
        let shared = shared.clone();
        dispatches.spawn(async move { shared.dispatch(event).await });
    }
    while dispatches.join_next().await.is_some() {}
}

/// Drives publishing for one build
pub struct PublishCoordinator {
    shared: Arc<Shared>,
    events: Option<mpsc::UnboundedSender<ArtifactCreated>>,
    consumer: Option<JoinHandle<()>>,
}

impl PublishCoordinator {
    /// Create an idle coordinator
    pub fn new(
        decision: PublishDecision,
        version: impl Into<String>,
        token: Option<String>,
        resolver: Arc<dyn RepositoryInfoResolver>,
        factory: Arc<dyn PublisherFactory>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                decision,
                version: version.into(),
                token,
                resolver,
                factory,
                publisher: OnceCell::new(),
                construction_error: Mutex::new(None),
                registry: Mutex::new(Registry::default()),
                state: Mutex::new(CoordinatorState::Idle),
            }),
            events: None,
            consumer: None,
        }
    }

    /// Current state
    pub fn state(&self) -> CoordinatorState {
        *lock(&self.shared.state)
    }

    /// The decision this coordinator acts on
    pub fn decision(&self) -> PublishDecision {
        self.shared.decision
    }

    /// Start listening for artifacts.
    ///
    /// Must be called within a tokio runtime. Calling it again returns
    /// another sender for the same coordinator.
    pub fn start(&mut self) -> ArtifactSender {
        if let Some(tx) = &self.events {
            return ArtifactSender { tx: tx.clone() };
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.advance(CoordinatorState::AwaitingFirstArtifact);
        self.consumer = Some(tokio::spawn(consume(self.shared.clone(), rx)));
        self.events = Some(tx.clone());
        ArtifactSender { tx }
    }

    /// Settle all uploads once the build has finished.
    ///
    /// On build failure every recorded upload is cancelled and its outcome
    /// discarded. On success every upload is awaited; failures are reported
    /// together as [`PublishError::Upload`]. Waits for every
    /// [`ArtifactSender`] to be dropped first when the build succeeded.
    #[instrument(skip(self))]
    pub async fn finish(mut self, build_succeeded: bool) -> Result<PublishSummary> {
        *lock(&self.shared.state) = CoordinatorState::Finalizing;
        self.events = None;

        let outcome = if build_succeeded {
            self.complete().await
        } else {
            Ok(self.cancel_all().await)
        };

        *lock(&self.shared.state) = CoordinatorState::Done;
        outcome
    }

    async fn complete(&mut self) -> Result<PublishSummary> {
        if let Some(consumer) = self.consumer.take() {
            if let Err(e) = consumer.await {
                warn!(error = %e, "artifact consumer failed");
            }
        }

        let construction_error = lock(&self.shared.construction_error).take();
        if let Some(error) = construction_error {
            return Err(error);
        }

        let tasks = std::mem::take(&mut lock(&self.shared.registry).tasks);
        let mut receipts = Vec::with_capacity(tasks.len());
        let mut failed = Vec::new();
        for task in tasks {
            let artifact_name = task.artifact_name().to_string();
            match task.wait().await {
                Ok(receipt) => receipts.push(receipt),
                Err(error) => {
                    warn!(artifact = %artifact_name, error = %error, "upload failed");
                    failed.push(UploadFailure { artifact_name, error });
                }
            }
        }

        if !failed.is_empty() {
            return Err(PublishError::Upload {
                failed,
                completed: receipts,
            });
        }
        if !receipts.is_empty() {
            info!(uploads = receipts.len(), "publishing complete");
        }
        Ok(PublishSummary {
            receipts,
            cancelled: 0,
        })
    }

    async fn cancel_all(&mut self) -> PublishSummary {
        let tasks = {
            let mut registry = lock(&self.shared.registry);
            registry.closed = true;
            std::mem::take(&mut registry.tasks)
        };

        if let Some(consumer) = self.consumer.take() {
            consumer.abort();
            let _ = consumer.await;
        }

        for task in &tasks {
            task.cancel();
        }
        let cancelled = tasks.len();
        for task in tasks {
            let _ = task.wait().await;
        }

        if cancelled > 0 {
            info!(cancelled, "build failed, pending uploads cancelled");
        }
        PublishSummary {
            receipts: Vec::new(),
            cancelled,
        }
    }
}

impl Drop for PublishCoordinator {
    fn drop(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.abort();
        }
        let mut registry = lock(&self.shared.registry);
        registry.closed = true;
        for task in registry.tasks.drain(..) {
            task.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFactory, FakePublisher, FakeResolver};
    use gantry_core::PublishPolicy;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn coordinator(
        decision: PublishDecision,
        resolver: Arc<FakeResolver>,
        factory: Arc<FakeFactory>,
    ) -> PublishCoordinator {
        PublishCoordinator::new(decision, "1.0.0", Some("token".to_string()), resolver, factory)
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_concurrent_artifacts_construct_publisher_once() {
        let resolver = Arc::new(FakeResolver::gated());
        let publisher = Arc::new(FakePublisher::new());
        let factory = Arc::new(FakeFactory::new(publisher.clone()));
        let mut coordinator = coordinator(
            PublishDecision::explicit(PublishPolicy::Always),
            resolver.clone(),
            factory.clone(),
        );
        assert_eq!(coordinator.state(), CoordinatorState::Idle);

        let sender = coordinator.start();
        assert_eq!(coordinator.state(), CoordinatorState::AwaitingFirstArtifact);
        for i in 0..3 {
            sender.artifact_created(format!("dist/app-{i}.zip"), format!("app-{i}.zip"));
        }

        eventually(|| coordinator.state() == CoordinatorState::PublisherResolving).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(resolver.calls(), 1);
        assert!(publisher.uploads().is_empty());

        resolver.open();
        eventually(|| coordinator.state() == CoordinatorState::PublisherReady).await;
        drop(sender);

        let summary = coordinator.finish(true).await.unwrap();
        assert_eq!(summary.receipts.len(), 3);
        assert_eq!(resolver.calls(), 1);
        assert_eq!(factory.created(), 1);

        let mut uploads = publisher.uploads();
        uploads.sort();
        assert_eq!(uploads, vec!["app-0.zip", "app-1.zip", "app-2.zip"]);
    }

    #[tokio::test]
    async fn test_publisher_options_follow_decision() {
        let resolver = Arc::new(FakeResolver::found());
        let factory = Arc::new(FakeFactory::new(Arc::new(FakePublisher::new())));
        let mut coordinator = coordinator(
            PublishDecision::inferred(PublishPolicy::OnTagOrDraft),
            resolver,
            factory.clone(),
        );

        coordinator.start().artifact_created("app.zip", "app.zip");
        coordinator.finish(true).await.unwrap();

        let options = factory.options.lock().unwrap();
        assert_eq!(options.len(), 1);
        assert!(options[0].require_existing_release);
        assert_eq!(options[0].version, "1.0.0");
        assert_eq!(options[0].slug.to_string(), "acme/app");
    }

    #[tokio::test]
    async fn test_build_failure_cancels_pending_uploads() {
        let resolver = Arc::new(FakeResolver::found());
        let publisher = Arc::new(FakePublisher::stalling());
        let factory = Arc::new(FakeFactory::new(publisher.clone()));
        let mut coordinator = coordinator(
            PublishDecision::explicit(PublishPolicy::Always),
            resolver,
            factory,
        );

        let sender = coordinator.start();
        sender.artifact_created("app.dmg", "app.dmg");
        sender.artifact_created("app.zip", "app.zip");
        eventually(|| publisher.uploads().len() == 2).await;

        let summary = coordinator.finish(false).await.unwrap();
        assert_eq!(summary.cancelled, 2);
        assert!(summary.receipts.is_empty());
        assert_eq!(publisher.dropped.load(Ordering::SeqCst), 2);
        assert_eq!(publisher.completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_successful_receipts() {
        let resolver = Arc::new(FakeResolver::found());
        let publisher = Arc::new(FakePublisher::failing_on("dmg"));
        let factory = Arc::new(FakeFactory::new(publisher));
        let mut coordinator = coordinator(
            PublishDecision::explicit(PublishPolicy::Always),
            resolver,
            factory,
        );

        let sender = coordinator.start();
        sender.artifact_created("app.dmg", "app.dmg");
        sender.artifact_created("app.zip", "app.zip");
        drop(sender);

        match coordinator.finish(true).await.unwrap_err() {
            PublishError::Upload { failed, completed } => {
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].artifact_name, "app.dmg");
                assert_eq!(completed.len(), 1);
                assert_eq!(completed[0].artifact_name, "app.zip");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_inferred_decision_without_repository_is_silent() {
        let resolver = Arc::new(FakeResolver::missing());
        let factory = Arc::new(FakeFactory::new(Arc::new(FakePublisher::new())));
        let mut coordinator = coordinator(
            PublishDecision::inferred(PublishPolicy::OnTag),
            resolver.clone(),
            factory.clone(),
        );

        let sender = coordinator.start();
        sender.artifact_created("app.zip", "app.zip");
        eventually(|| coordinator.state() == CoordinatorState::PublisherAbsent).await;
        sender.artifact_created("app.dmg", "app.dmg");
        drop(sender);

        let summary = coordinator.finish(true).await.unwrap();
        assert!(summary.receipts.is_empty());
        assert_eq!(resolver.calls(), 1);
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn test_explicit_decision_without_repository_fails() {
        let resolver = Arc::new(FakeResolver::missing());
        let factory = Arc::new(FakeFactory::new(Arc::new(FakePublisher::new())));
        let mut coordinator = coordinator(
            PublishDecision::explicit(PublishPolicy::Always),
            resolver,
            factory,
        );

        coordinator.start().artifact_created("app.zip", "app.zip");
        let err = coordinator.finish(true).await.unwrap_err();
        assert!(matches!(err, PublishError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_construction_failure_discarded_when_build_fails() {
        let resolver = Arc::new(FakeResolver::missing());
        let factory = Arc::new(FakeFactory::new(Arc::new(FakePublisher::new())));
        let mut coordinator = coordinator(
            PublishDecision::explicit(PublishPolicy::Always),
            resolver.clone(),
            factory,
        );

        coordinator.start().artifact_created("app.zip", "app.zip");
        eventually(|| resolver.calls() == 1).await;

        let summary = coordinator.finish(false).await.unwrap();
        assert_eq!(summary.cancelled, 0);
    }

    #[tokio::test]
    async fn test_never_ignores_artifacts() {
        let resolver = Arc::new(FakeResolver::found());
        let factory = Arc::new(FakeFactory::new(Arc::new(FakePublisher::new())));
        let mut coordinator = coordinator(PublishDecision::default(), resolver.clone(), factory.clone());

        coordinator.start().artifact_created("app.zip", "app.zip");
        let summary = coordinator.finish(true).await.unwrap();

        assert_eq!(summary, PublishSummary::default());
        assert_eq!(resolver.calls(), 0);
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn test_finish_without_start() {
        let coordinator = coordinator(
            PublishDecision::explicit(PublishPolicy::Always),
            Arc::new(FakeResolver::found()),
            Arc::new(FakeFactory::new(Arc::new(FakePublisher::new()))),
        );
        assert_eq!(coordinator.finish(true).await.unwrap(), PublishSummary::default());
    }
}
