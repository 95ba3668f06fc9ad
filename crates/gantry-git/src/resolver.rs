//! Repository info resolution from configuration and git metadata

use std::path::PathBuf;

use gantry_core::RepositorySlug;
use tracing::{debug, info};

use crate::repository::GitRepo;
use crate::slug::parse_slug;

/// Remote consulted when no repository is configured
pub const DEFAULT_REMOTE: &str = "origin";

/// Resolves the hosting slug for a project.
///
/// An explicitly configured repository wins; otherwise the `origin` remote
/// of the git repository containing the project directory is used. Missing
/// or unreadable git metadata yields `None`, never an error.
#[derive(Debug, Clone)]
pub struct GitInfoResolver {
    project_dir: PathBuf,
    configured: Option<String>,
    remote: String,
}

impl GitInfoResolver {
    /// Create a resolver for the given project directory
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            configured: None,
            remote: DEFAULT_REMOTE.to_string(),
        }
    }

    /// Use an explicitly configured repository reference
    pub fn with_configured(mut self, repository: Option<String>) -> Self {
        self.configured = repository;
        self
    }

    /// Use a remote other than `origin`
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Resolve the slug, if any can be found
    pub fn resolve(&self) -> Option<RepositorySlug> {
        if let Some(configured) = &self.configured {
            if let Some(slug) = parse_slug(configured) {
                info!(repository = %slug, "using configured repository");
                return Some(slug);
            }
            debug!(repository = %configured, "configured repository is not a recognizable slug");
        }

        let repo = match GitRepo::discover(&self.project_dir) {
            Ok(repo) => repo,
            Err(e) => {
                debug!(error = %e, "no git repository found");
                return None;
            }
        };

        let url = match repo.remote_url(&self.remote) {
            Ok(Some(url)) => url,
            Ok(None) => return None,
            Err(e) => {
                debug!(remote = %self.remote, error = %e, "remote lookup failed");
                return None;
            }
        };

        let slug = parse_slug(&url);
        match &slug {
            Some(slug) => info!(repository = %slug, remote = %self.remote, "detected repository from git remote"),
            None => debug!(url = %url, "remote URL is not a recognizable slug"),
        }
        slug
    }
}
