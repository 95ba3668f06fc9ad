//! CLI commands

mod build;
mod decision;
mod keychain;
mod sign;

pub use build::BuildCommand;
pub use decision::{DecisionArgs, DecisionCommand};
pub use keychain::KeychainCommand;
pub use sign::SignCommand;

use std::path::PathBuf;
use std::sync::Arc;

use gantry_core::config::{load_config_or_default, Config, SigningConfig};
use gantry_signing::{
    CredentialStore, HttpDownloader, KeychainSettings, Signer, SystemToolRunner, ToolRunner,
};
use tracing::debug;

/// The project in the working directory
pub(crate) struct Project {
    pub dir: PathBuf,
    pub config: Config,
}

impl Project {
    /// Load configuration for the current directory, falling back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let dir = std::env::current_dir()?;
        let (config, path) = load_config_or_default(&dir)?;
        match &path {
            Some(path) => debug!(config = %path.display(), "loaded configuration"),
            None => debug!("no configuration file, using defaults"),
        }
        Ok(Self { dir, config })
    }
}

/// Credential store and signer backed by the system tools
pub(crate) fn signing_tools(config: &SigningConfig) -> (CredentialStore, Signer) {
    let runner: Arc<dyn ToolRunner> = Arc::new(SystemToolRunner::new());
    let store = CredentialStore::new(
        runner.clone(),
        Arc::new(HttpDownloader::new()),
        KeychainSettings::from_config(config),
    );
    let signer = Signer::with_codesign_path(runner, config.codesign_path.clone());
    (store, signer)
}
