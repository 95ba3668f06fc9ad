//! CLI definition and command handling

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use commands::{BuildCommand, DecisionCommand, KeychainCommand, SignCommand};

/// Gantry - Sign, package and publish release artifacts
#[derive(Debug, Parser)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

impl Cli {
    /// Whether human-readable progress should be printed
    pub fn prints_text(&self) -> bool {
        self.format == OutputFormat::Text && !self.quiet
    }

    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Build(ref cmd) => cmd.execute(&self),
            Commands::Sign(ref cmd) => cmd.execute(&self),
            Commands::Keychain(ref cmd) => cmd.execute(&self),
            Commands::PublishDecision(ref cmd) => cmd.execute(&self),
        }
    }
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the build command and publish its artifacts
    Build(BuildCommand),

    /// Sign artifacts with certificates from the environment
    Sign(SignCommand),

    /// Ephemeral keychain maintenance
    Keychain(KeychainCommand),

    /// Show whether a build would package for distribution and publish
    PublishDecision(DecisionCommand),
}
