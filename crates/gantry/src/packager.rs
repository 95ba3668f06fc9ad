//! Packager that runs the configured build command

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use gantry_publish::{ArtifactSender, BuildError, Packager};
use gantry_signing::{sign_artifacts, CredentialStore, Signer, SigningRequest};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Environment variable telling the build command whether to package for distribution
pub const DIST_VAR: &str = "GANTRY_DIST";

/// Signing applied to artifacts before they are reported
pub struct SigningStep {
    pub store: CredentialStore,
    pub signer: Signer,
    pub request: SigningRequest,
}

/// Runs the build command, then reports every artifact matching the configured globs
pub struct CommandPackager {
    project_dir: PathBuf,
    command: Vec<String>,
    artifacts: Vec<String>,
    dist: bool,
    signing: Option<SigningStep>,
}

impl CommandPackager {
    /// Create a packager for a project directory
    pub fn new(project_dir: impl Into<PathBuf>, command: Vec<String>, artifacts: Vec<String>) -> Self {
        Self {
            project_dir: project_dir.into(),
            command,
            artifacts,
            dist: false,
            signing: None,
        }
    }

    /// Package in distributable formats
    pub fn with_dist(mut self, dist: bool) -> Self {
        self.dist = dist;
        self
    }

    /// Sign artifacts before reporting them
    pub fn with_signing(mut self, signing: Option<SigningStep>) -> Self {
        self.signing = signing;
        self
    }

    async fn run_command(&self) -> Result<(), BuildError> {
        let Some((program, args)) = self.command.split_first() else {
            debug!("no build command configured, collecting existing artifacts");
            return Ok(());
        };
        let command_line = self.command.join(" ");
        info!(command = %command_line, dist = self.dist, "running build command");

        let status = Command::new(program)
            .args(args)
            .current_dir(&self.project_dir)
            .env(DIST_VAR, if self.dist { "1" } else { "0" })
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| BuildError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if !status.success() {
            return Err(BuildError::CommandFailed {
                command: command_line,
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }

    /// Files matching the artifact globs, in pattern order without duplicates
    fn collect_artifacts(&self) -> Result<Vec<PathBuf>, BuildError> {
        let mut found = Vec::new();
        for pattern in &self.artifacts {
            let full = self.project_dir.join(pattern);
            let paths = glob::glob(&full.to_string_lossy()).map_err(|e| BuildError::Pattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;

            let mut matched = 0;
            for path in paths.filter_map(|entry| entry.ok()) {
                if path.is_file() && !found.contains(&path) {
                    found.push(path);
                    matched += 1;
                }
            }
            if matched == 0 {
                warn!(pattern = %pattern, "artifact pattern matched no files");
            }
        }
        Ok(found)
    }
}

fn artifact_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

#[async_trait]
impl Packager for CommandPackager {
    async fn build(&self, artifacts: ArtifactSender) -> Result<(), BuildError> {
        self.run_command().await?;
        let paths = self.collect_artifacts()?;

        if let Some(signing) = self.signing.as_ref().filter(|_| !paths.is_empty()) {
            sign_artifacts(&signing.store, &signing.signer, &signing.request, &paths)
                .await
                .map_err(|e| BuildError::step("signing", e))?;
        }

        for path in &paths {
            debug!(artifact = %path.display(), "artifact created");
            artifacts.artifact_created(path.clone(), artifact_name(path));
        }
        info!(count = paths.len(), "build produced artifacts");
        Ok(())
    }
}
