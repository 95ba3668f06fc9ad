//! Sign command

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use gantry_core::BuildEnvironment;
use gantry_signing::{sign_artifacts, SigningError, SigningRequest};

use super::{signing_tools, Project};
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Sign artifacts in an ephemeral keychain
#[derive(Debug, Args)]
pub struct SignCommand {
    /// Artifacts to sign, in order
    #[arg(required = true)]
    pub artifacts: Vec<PathBuf>,

    /// Installed identity to use when no certificate is configured
    #[arg(short, long)]
    pub identity: Option<String>,
}

impl SignCommand {
    /// Execute the sign command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(artifacts = self.artifacts.len(), "executing sign command");
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let project = Project::load()?;
        let env = BuildEnvironment::from_env();

        let request = SigningRequest::resolve(&env, self.identity.as_deref()).ok_or_else(|| {
            SigningError::Configuration(
                "no certificate configured (CSC_LINK) and no --identity given".to_string(),
            )
        })?;

        for artifact in &self.artifacts {
            if !artifact.exists() {
                anyhow::bail!("Artifact not found: {}", artifact.display());
            }
        }

        if cli.prints_text() {
            let source = match &request {
                SigningRequest::Certificates { .. } => "certificates from environment".to_string(),
                SigningRequest::Ambient { identity } => identity.clone(),
            };
            output::info(&format!("Signing with {}", source));
        }

        let (store, signer) = signing_tools(&project.config.signing);
        let signed = sign_artifacts(&store, &signer, &request, &self.artifacts).await?;

        if cli.format == OutputFormat::Json {
            return output::json(&serde_json::json!({ "signed": signed }));
        }
        if !cli.quiet {
            for path in &signed {
                output::success(&format!(
                    "Signed {}",
                    output::path_style().apply_to(path.display())
                ));
            }
        }
        Ok(())
    }
}
