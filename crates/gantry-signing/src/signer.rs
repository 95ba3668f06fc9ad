//! Code signing with a resolved identity

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::{Result, SigningError};
use crate::identity::SigningIdentity;
use crate::process::ToolRunner;

/// Signs artifacts with `codesign`
pub struct Signer {
    runner: Arc<dyn ToolRunner>,
    codesign_path: String,
}

impl Signer {
    /// Create a signer using `codesign` from `PATH`
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self::with_codesign_path(runner, "codesign")
    }

    /// Create a signer using a specific `codesign` binary
    pub fn with_codesign_path(runner: Arc<dyn ToolRunner>, codesign_path: impl Into<String>) -> Self {
        Self {
            runner,
            codesign_path: codesign_path.into(),
        }
    }

    /// Sign `artifact` in deep, forced mode.
    ///
    /// The call is scoped to the identity's keychain when it has one.
    #[instrument(skip(self, identity), fields(identity = %identity.common_name))]
    pub async fn sign(&self, artifact: &Path, identity: &SigningIdentity) -> Result<()> {
        let mut args = vec![
            "--deep".to_string(),
            "--force".to_string(),
            "--sign".to_string(),
            identity.common_name.clone(),
            artifact.to_string_lossy().to_string(),
        ];
        if let Some(keychain) = identity.keychain_name() {
            args.push("--keychain".to_string());
            args.push(keychain.to_string());
        }

        self.runner
            .run(&self.codesign_path, &args)
            .await
            .map_err(|e| match e {
                SigningError::Command { stderr, .. } => SigningError::SigningFailed {
                    path: artifact.to_path_buf(),
                    reason: stderr,
                },
                other => other,
            })?;

        info!(artifact = %artifact.display(), "signed artifact");
        Ok(())
    }
}
