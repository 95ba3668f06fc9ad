//! Keychain maintenance command

use clap::{Args, Subcommand};

use super::{signing_tools, Project};
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Ephemeral keychain commands
#[derive(Debug, Args)]
pub struct KeychainCommand {
    #[command(subcommand)]
    pub command: KeychainSubcommand,
}

/// Keychain subcommands
#[derive(Debug, Subcommand)]
pub enum KeychainSubcommand {
    /// Delete a keychain left behind by an interrupted build
    Delete {
        /// Keychain name (csc-<hex>.keychain)
        name: String,
    },
}

impl KeychainCommand {
    /// Execute the keychain command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            KeychainSubcommand::Delete { name } => {
                let project = Project::load()?;
                let (store, _) = signing_tools(&project.config.signing);
                store.teardown(name).await?;

                if cli.format == OutputFormat::Json {
                    return output::json(&serde_json::json!({ "deleted": name }));
                }
                if !cli.quiet {
                    output::success(&format!("Deleted keychain {}", name));
                }
                Ok(())
            }
        }
    }
}
