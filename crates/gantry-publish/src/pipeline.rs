//! Build-and-publish orchestration

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::coordinator::{ArtifactSender, PublishCoordinator, PublishSummary};
use crate::error::{BuildError, PipelineError};

/// Produces artifacts.
///
/// Every finished artifact is reported through `artifacts` before `build`
/// returns. Dropping the sender signals that no more artifacts follow.
#[async_trait]
pub trait Packager: Send + Sync {
    /// Build all targets
    async fn build(&self, artifacts: ArtifactSender) -> Result<(), BuildError>;
}

/// Run the packager and settle publishing according to its outcome.
///
/// A build failure cancels pending uploads and is reported as
/// [`PipelineError::Build`]; upload problems after a successful build are
/// reported as [`PipelineError::Publish`].
#[instrument(skip_all)]
pub async fn build_and_publish(
    packager: &dyn Packager,
    mut coordinator: PublishCoordinator,
) -> Result<PublishSummary, PipelineError> {
    let artifacts = coordinator.start();

    match packager.build(artifacts).await {
        Ok(()) => {
            info!("build succeeded");
            Ok(coordinator.finish(true).await?)
        }
        Err(build) => {
            warn!(error = %build, "build failed");
            if let Err(e) = coordinator.finish(false).await {
                warn!(error = %e, "failed to settle uploads after build failure");
            }
            Err(PipelineError::Build(build))
        }
    }
}
