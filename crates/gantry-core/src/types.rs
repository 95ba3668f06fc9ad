//! Core types for Gantry

use serde::{Deserialize, Serialize};

/// When built artifacts are uploaded to the release host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PublishPolicy {
    /// Never publish
    Never,
    /// Publish on every build
    Always,
    /// Publish only when the build runs for a pushed tag
    OnTag,
    /// Publish on tag push, or when a draft release already exists
    OnTagOrDraft,
}

impl PublishPolicy {
    /// Returns the string representation used in configuration and flags
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Always => "always",
            Self::OnTag => "onTag",
            Self::OnTagOrDraft => "onTagOrDraft",
        }
    }
}

impl std::fmt::Display for PublishPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PublishPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "never" => Ok(Self::Never),
            "always" => Ok(Self::Always),
            "ontag" => Ok(Self::OnTag),
            "ontagordraft" => Ok(Self::OnTagOrDraft),
            _ => Err(format!("Unknown publish policy: {}", s)),
        }
    }
}

/// Owner and project of the hosting repository (e.g. a GitHub slug)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositorySlug {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Project name
    pub project: String,
}

impl RepositorySlug {
    /// Create a new slug
    pub fn new(owner: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            project: project.into(),
        }
    }
}

impl std::fmt::Display for RepositorySlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.project)
    }
}
