//! Hosting slug parsing from repository URLs

use gantry_core::RepositorySlug;
use url::Url;

/// Parse `owner/project` out of a repository reference.
///
/// Accepts `https://host/owner/project(.git)`, `git+https://…`,
/// `ssh://git@host/owner/project(.git)`, scp-style
/// `git@host:owner/project(.git)` and the bare `owner/project` shorthand.
pub fn parse_slug(reference: &str) -> Option<RepositorySlug> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    if reference.contains("://") {
        let url = Url::parse(reference.trim_start_matches("git+")).ok()?;
        return slug_from_path(url.path());
    }

    // scp-style: user@host:owner/project
    if let Some((host, path)) = reference.split_once(':') {
        if host.is_empty() || host.contains('/') {
            return None;
        }
        return slug_from_path(path);
    }

    let segments: Vec<&str> = reference.split('/').collect();
    if segments.len() != 2 {
        return None;
    }
    slug_from_path(reference)
}

fn slug_from_path(path: &str) -> Option<RepositorySlug> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let project = segments.next()?;
    let project = project.strip_suffix(".git").unwrap_or(project);

    if owner.is_empty() || project.is_empty() {
        return None;
    }
    Some(RepositorySlug::new(owner, project))
}
