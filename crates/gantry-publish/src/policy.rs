//! Dist and publish decision
//!
//! Publishing needs an explicit request or a recognized CI signal (a tag
//! build, or a CI run with a token). Without either nothing is published.

use gantry_core::{BuildEnvironment, PublishPolicy};
use serde::Serialize;
use tracing::info;

/// Everything the decision depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyInputs {
    /// Publish policy given on the command line or in configuration
    pub publish: Option<PublishPolicy>,
    /// Dist flag given on the command line or in configuration
    pub dist: Option<bool>,
    /// Lifecycle hint of the invoking script
    pub lifecycle_event: Option<String>,
    /// Whether a release host token is available
    pub has_token: bool,
    /// Tag being built
    pub tag: Option<String>,
    /// Whether a CI service was detected
    pub ci: bool,
}

impl PolicyInputs {
    /// Environment-derived inputs, no explicit flags
    pub fn from_environment(env: &BuildEnvironment) -> Self {
        Self {
            publish: None,
            dist: None,
            lifecycle_event: env.lifecycle_event.clone(),
            has_token: env.has_token(),
            tag: env.tag.clone(),
            ci: env.ci,
        }
    }

    /// Set the explicit publish policy
    pub fn with_publish(mut self, publish: Option<PublishPolicy>) -> Self {
        self.publish = publish;
        self
    }

    /// Set the explicit dist flag
    pub fn with_dist(mut self, dist: Option<bool>) -> Self {
        self.dist = dist;
        self
    }
}

/// Resolved publish policy and where it came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishDecision {
    /// Resolved policy; `None` means never
    pub policy: Option<PublishPolicy>,
    /// Whether the policy was guessed from the environment
    pub inferred: bool,
}

impl PublishDecision {
    /// A policy the caller asked for
    pub fn explicit(policy: PublishPolicy) -> Self {
        Self {
            policy: Some(policy),
            inferred: false,
        }
    }

    /// A policy guessed from the environment
    pub fn inferred(policy: PublishPolicy) -> Self {
        Self {
            policy: Some(policy),
            inferred: true,
        }
    }

    /// The policy, with unset treated as never
    pub fn effective(&self) -> PublishPolicy {
        self.policy.unwrap_or(PublishPolicy::Never)
    }

    /// Whether artifacts should be handed to a publisher at all
    pub fn publishes(&self) -> bool {
        self.effective() != PublishPolicy::Never
    }

    /// Whether uploads need a release to exist beforehand
    pub fn requires_existing_release(&self) -> bool {
        self.effective() == PublishPolicy::OnTagOrDraft
    }
}

/// Result of [`resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Whether to package in distributable formats
    pub dist: bool,
    /// Publish decision
    pub publish: PublishDecision,
}

/// Lifecycle hints that imply a distributable build
fn is_dist_lifecycle(lifecycle: Option<&str>) -> bool {
    matches!(lifecycle, Some(event) if event == "dist" || event == "build" || event.starts_with("dist:"))
}

/// Resolve the dist flag and publish decision
pub fn resolve(inputs: &PolicyInputs) -> Resolution {
    if let Some(policy) = inputs.publish {
        return Resolution {
            dist: true,
            publish: PublishDecision::explicit(policy),
        };
    }

    let dist = inputs
        .dist
        .unwrap_or_else(|| is_dist_lifecycle(inputs.lifecycle_event.as_deref()));

    Resolution {
        dist,
        publish: infer_publish(inputs),
    }
}

fn infer_publish(inputs: &PolicyInputs) -> PublishDecision {
    if inputs.lifecycle_event.as_deref() == Some("release") {
        return PublishDecision::explicit(PublishPolicy::Always);
    }
    if !inputs.has_token {
        return PublishDecision::default();
    }

    match inputs.tag.as_deref().filter(|tag| !tag.is_empty()) {
        Some(tag) => {
            info!(tag, "tag is defined, artifacts will be published");
            PublishDecision::inferred(PublishPolicy::OnTag)
        }
        None if inputs.ci => {
            info!("CI detected, artifacts will be published if a draft release exists");
            PublishDecision::inferred(PublishPolicy::OnTagOrDraft)
        }
        None => PublishDecision::default(),
    }
}
