//! Publish decision command

use clap::Args;

use gantry_core::config::Config;
use gantry_core::{BuildEnvironment, PublishPolicy};
use gantry_publish::{resolve, PolicyInputs, Resolution};

use super::Project;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Flags that feed the dist and publish decision
#[derive(Debug, Args)]
pub struct DecisionArgs {
    /// Package in distributable formats
    #[arg(short, long)]
    pub dist: bool,

    /// Publish policy: never, always, onTag or onTagOrDraft
    #[arg(short, long, value_name = "POLICY")]
    pub publish: Option<PublishPolicy>,
}

impl DecisionArgs {
    /// Resolve against configuration and environment; flags win over configuration
    pub fn resolve(&self, config: &Config, env: &BuildEnvironment) -> Resolution {
        let inputs = PolicyInputs::from_environment(env)
            .with_publish(self.publish.or(config.publish.policy))
            .with_dist(if self.dist { Some(true) } else { config.build.dist });
        resolve(&inputs)
    }
}

/// Show whether a build would package for distribution and publish
#[derive(Debug, Args)]
pub struct DecisionCommand {
    #[command(flatten)]
    pub decision: DecisionArgs,
}

impl DecisionCommand {
    /// Execute the publish-decision command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let project = Project::load()?;
        let resolution = self.decision.resolve(&project.config, &BuildEnvironment::from_env());

        if cli.format == OutputFormat::Json {
            return output::json(&resolution);
        }
        if cli.quiet {
            return Ok(());
        }

        let policy = resolution.publish.effective();
        println!("{}", output::header("Publish decision"));
        println!("{}", output::key_value("dist", &resolution.dist.to_string()));
        println!(
            "{}",
            output::key_value("publish", &output::policy_style().apply_to(policy).to_string())
        );
        let source = if resolution.publish.policy.is_none() {
            "default"
        } else if resolution.publish.inferred {
            "inferred from environment"
        } else {
            "explicit"
        };
        println!("{}", output::key_value("source", source));
        Ok(())
    }
}
