//! Build command - run the build, sign artifacts and publish them

use std::sync::Arc;

use clap::Args;
use console::style;
use tracing::{info, warn};

use gantry_core::config::Config;
use gantry_core::{BuildEnvironment, ConfigError};
use gantry_git::GitInfoResolver;
use gantry_publish::{
    build_and_publish, GitHubPublisherFactory, GitHubSettings, MemoizedResolver,
    PublishCoordinator, PublishDecision, PublishSummary, RepositoryInfoResolver, UploadStatus,
};
use gantry_signing::SigningRequest;

use super::{signing_tools, DecisionArgs, Project};
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::packager::{CommandPackager, SigningStep};

/// Run the build command and publish its artifacts
#[derive(Debug, Args)]
pub struct BuildCommand {
    #[command(flatten)]
    pub decision: DecisionArgs,

    /// Installed identity to sign with when no certificate is configured
    #[arg(long, value_name = "IDENTITY")]
    pub sign: Option<String>,

    /// Do not sign artifacts
    #[arg(long, conflicts_with = "sign")]
    pub no_sign: bool,
}

impl BuildCommand {
    /// Execute the build command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(dist = self.decision.dist, publish = ?self.decision.publish, "executing build command");
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let project = Project::load()?;
        let config = &project.config;
        let env = BuildEnvironment::from_env();
        let resolution = self.decision.resolve(config, &env);

        let (version, publish) = release_version(config, resolution.publish)?;

        let git: Arc<dyn RepositoryInfoResolver> =
            Arc::new(GitInfoResolver::new(&project.dir).with_configured(config.repository.clone()));
        let coordinator = PublishCoordinator::new(
            publish,
            version.clone(),
            env.token.clone(),
            Arc::new(MemoizedResolver::new(git)),
            Arc::new(GitHubPublisherFactory::new(GitHubSettings::from_config(&config.publish))),
        );

        let signing = if self.no_sign {
            None
        } else {
            SigningRequest::resolve(&env, self.sign.as_deref()).map(|request| {
                let (store, signer) = signing_tools(&config.signing);
                SigningStep {
                    store,
                    signer,
                    request,
                }
            })
        };
        let signs = signing.is_some();

        let packager = CommandPackager::new(
            &project.dir,
            config.build.command.clone(),
            config.build.artifacts.clone(),
        )
        .with_dist(resolution.dist)
        .with_signing(signing);

        if cli.prints_text() {
            println!();
            println!("{}", style("Building project...").bold());
            if let Some(name) = &config.name {
                println!("{}", output::key_value("Name", name));
            }
            if !version.is_empty() {
                println!("{}", output::key_value("Version", &version));
            }
            println!("{}", output::key_value("Dist", &resolution.dist.to_string()));
            println!(
                "{}",
                output::key_value(
                    "Publish",
                    &output::policy_style()
                        .apply_to(publish.effective())
                        .to_string()
                )
            );
            println!("{}", output::key_value("Sign", &signs.to_string()));
            println!();
        }

        let summary = build_and_publish(&packager, coordinator).await?;
        print_summary(cli, &summary)
    }
}

/// Version to publish under, and the decision adjusted for it.
///
/// Publishing needs a version. Without one an explicit request is a
/// configuration error, while an inferred decision falls back to not publishing.
fn release_version(
    config: &Config,
    decision: PublishDecision,
) -> Result<(String, PublishDecision), ConfigError> {
    match &config.version {
        Some(version) => Ok((version.clone(), decision)),
        None if !decision.publishes() => Ok((String::new(), decision)),
        None if decision.inferred => {
            warn!(
                policy = %decision.effective(),
                "no version configured, artifacts will not be published"
            );
            Ok((String::new(), PublishDecision::default()))
        }
        None => Err(ConfigError::InvalidValue {
            field: "version".to_string(),
            message: "must be set to publish".to_string(),
        }),
    }
}

fn print_summary(cli: &Cli, summary: &PublishSummary) -> anyhow::Result<()> {
    if cli.format == OutputFormat::Json {
        return output::json(summary);
    }
    if cli.quiet {
        return Ok(());
    }

    output::success("Build completed successfully!");
    if summary.receipts.is_empty() {
        return Ok(());
    }

    println!();
    println!("{}:", output::header("Artifacts"));
    for receipt in &summary.receipts {
        match receipt.status {
            UploadStatus::Uploaded => println!(
                "  • {} {}",
                output::path_style().apply_to(&receipt.artifact_name),
                style(receipt.url.as_deref().unwrap_or("uploaded")).dim()
            ),
            UploadStatus::Skipped => println!(
                "  • {} {}",
                output::path_style().apply_to(&receipt.artifact_name),
                style(format!("skipped: {}", receipt.reason.as_deref().unwrap_or(""))).yellow()
            ),
        }
    }
    Ok(())
}
