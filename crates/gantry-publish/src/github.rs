//! GitHub Releases publisher
//!
//! Artifacts are attached to the release tagged `<prefix><version>`. The
//! release is looked up once per publisher: a draft receives uploads, a
//! published release is left untouched, and a missing release is created as
//! a draft unless an existing one is required.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use gantry_core::config::PublishConfig;
use gantry_core::RepositorySlug;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{PublishError, Result};
use crate::publisher::{PublishTask, Publisher, PublisherFactory, PublisherOptions, UploadReceipt};

const CLIENT_USER_AGENT: &str = concat!("gantry/", env!("CARGO_PKG_VERSION"));

/// Endpoints and tag naming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubSettings {
    /// API base URL
    pub api_url: String,
    /// Asset upload base URL
    pub uploads_url: String,
    /// Prefix prepended to the version to form the tag
    pub tag_prefix: String,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self::from_config(&PublishConfig::default())
    }
}

impl GitHubSettings {
    /// Settings from the `[publish]` configuration section
    pub fn from_config(config: &PublishConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            uploads_url: config.uploads_url.clone(),
            tag_prefix: config.tag_prefix.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Release {
    id: u64,
    tag_name: String,
    draft: bool,
}

#[derive(Debug, Deserialize)]
struct Asset {
    browser_download_url: Option<String>,
}

/// Where uploads go, decided once per publisher
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReleaseTarget {
    Draft(u64),
    Skip(String),
}

/// Uploads artifacts to GitHub Releases
#[derive(Clone)]
pub struct GitHubPublisher {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    settings: GitHubSettings,
    slug: RepositorySlug,
    version: String,
    token: String,
    require_existing_release: bool,
    tag: String,
    target: OnceCell<ReleaseTarget>,
}

impl GitHubPublisher {
    /// Create a publisher; fails without a token
    pub fn new(options: PublisherOptions, settings: GitHubSettings) -> Result<Self> {
        Self::with_client(Client::new(), options, settings)
    }

    /// Create a publisher with a preconfigured HTTP client
    pub fn with_client(client: Client, options: PublisherOptions, settings: GitHubSettings) -> Result<Self> {
        let token = options
            .token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                PublishError::Configuration("GitHub token is not set (GH_TOKEN)".to_string())
            })?;
        let tag = format!("{}{}", settings.tag_prefix, options.version);

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                settings,
                slug: options.slug,
                version: options.version,
                token,
                require_existing_release: options.require_existing_release,
                tag,
                target: OnceCell::new(),
            }),
        })
    }

    /// Release tag uploads are attached to
    pub fn tag(&self) -> &str {
        &self.inner.tag
    }
}

impl Publisher for GitHubPublisher {
    fn upload(&self, path: &Path, artifact_name: &str) -> PublishTask {
        let inner = self.inner.clone();
        let file = path.to_path_buf();
        let name = artifact_name.to_string();
        PublishTask::spawn(path, artifact_name, async move { inner.upload(file, name).await })
    }
}

impl Inner {
    fn repo_url(&self, base: &str, rest: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/repos/{}/{}/{}",
            base.trim_end_matches('/'),
            self.slug.owner,
            self.slug.project,
            rest
        ))?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
    }

    async fn target(&self) -> Result<&ReleaseTarget> {
        self.target.get_or_try_init(|| self.resolve_target()).await
    }

    async fn resolve_target(&self) -> Result<ReleaseTarget> {
        match self.find_release().await? {
            Some(release) if release.draft => {
                debug!(tag = %self.tag, id = release.id, "found draft release");
                Ok(ReleaseTarget::Draft(release.id))
            }
            Some(_) => {
                warn!(tag = %self.tag, "release is already published, artifacts will not be uploaded");
                Ok(ReleaseTarget::Skip(format!("release {} is already published", self.tag)))
            }
            None if self.require_existing_release => {
                warn!(tag = %self.tag, "no draft release exists, artifacts will not be uploaded");
                Ok(ReleaseTarget::Skip(format!("no draft release {} exists", self.tag)))
            }
            None => {
                let release = self.create_draft().await?;
                Ok(ReleaseTarget::Draft(release.id))
            }
        }
    }

    async fn find_release(&self) -> Result<Option<Release>> {
        let mut url = self.repo_url(&self.settings.api_url, "releases")?;
        url.query_pairs_mut().append_pair("per_page", "100");

        let response = self.request(Method::GET, url).send().await?;
        let releases: Vec<Release> = check(response).await?.json().await?;
        Ok(releases.into_iter().find(|release| release.tag_name == self.tag))
    }

    async fn create_draft(&self) -> Result<Release> {
        info!(tag = %self.tag, "creating draft release");
        let body = serde_json::json!({
            "tag_name": self.tag,
            "name": self.version,
            "draft": true,
        });

        let url = self.repo_url(&self.settings.api_url, "releases")?;
        let response = self.request(Method::POST, url).json(&body).send().await?;
        Ok(check(response).await?.json().await?)
    }

    #[instrument(skip(self), fields(tag = %self.tag))]
    async fn upload(&self, path: PathBuf, name: String) -> Result<UploadReceipt> {
        let release_id = match self.target().await? {
            ReleaseTarget::Draft(id) => *id,
            ReleaseTarget::Skip(reason) => return Ok(UploadReceipt::skipped(name, path, reason.as_str())),
        };

        let data = tokio::fs::read(&path).await?;
        let mut url = self.repo_url(
            &self.settings.uploads_url,
            &format!("releases/{}/assets", release_id),
        )?;
        url.query_pairs_mut().append_pair("name", &name);

        debug!(artifact = %name, bytes = data.len(), "uploading artifact");
        let response = self
            .request(Method::POST, url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        let asset: Asset = check(response).await?.json().await?;

        info!(artifact = %name, "uploaded artifact");
        Ok(UploadReceipt::uploaded(name, path, asset.browser_download_url))
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(PublishError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Builds [`GitHubPublisher`]s sharing one HTTP client
#[derive(Clone)]
pub struct GitHubPublisherFactory {
    client: Client,
    settings: GitHubSettings,
}

impl GitHubPublisherFactory {
    /// Create a factory
    pub fn new(settings: GitHubSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }
}

#[async_trait]
impl PublisherFactory for GitHubPublisherFactory {
    async fn create(&self, options: PublisherOptions) -> Result<Arc<dyn Publisher>> {
        info!(repository = %options.slug, version = %options.version, "publishing to GitHub Releases");
        let publisher: Arc<dyn Publisher> = Arc::new(GitHubPublisher::with_client(
            self.client.clone(),
            options,
            self.settings.clone(),
        )?);
        Ok(publisher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::UploadStatus;
    use mockito::{Matcher, Server, ServerGuard};
    use tempfile::TempDir;

    fn options(require_existing_release: bool) -> PublisherOptions {
        PublisherOptions {
            slug: RepositorySlug::new("acme", "app"),
            version: "1.0.0".to_string(),
            token: Some("secret".to_string()),
            require_existing_release,
        }
    }

    fn publisher(server: &ServerGuard, require_existing_release: bool) -> GitHubPublisher {
        let settings = GitHubSettings {
            api_url: server.url(),
            uploads_url: server.url(),
            tag_prefix: "v".to_string(),
        };
        GitHubPublisher::new(options(require_existing_release), settings).unwrap()
    }

    fn artifact(temp: &TempDir, name: &str) -> PathBuf {
        let path = temp.path().join(name);
        std::fs::write(&path, b"artifact bytes").unwrap();
        path
    }

    async fn mock_releases(server: &mut ServerGuard, body: &str) -> mockito::Mock {
        server
            .mock("GET", "/repos/acme/app/releases")
            .match_query(Matcher::UrlEncoded("per_page".into(), "100".into()))
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(1)
            .create_async()
            .await
    }

    #[test]
    fn test_requires_token() {
        let mut options = options(false);
        options.token = None;
        let err = GitHubPublisher::new(options, GitHubSettings::default()).err().unwrap();
        assert!(matches!(err, PublishError::Configuration(_)));
    }

    #[test]
    fn test_tag_uses_prefix() {
        let publisher = GitHubPublisher::new(options(false), GitHubSettings::default()).unwrap();
        assert_eq!(publisher.tag(), "v1.0.0");
    }

    #[tokio::test]
    async fn test_uploads_into_draft_release() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let releases = mock_releases(
            &mut server,
            r#"[{"id": 3, "tag_name": "v0.9.0", "draft": false}, {"id": 4, "tag_name": "v1.0.0", "draft": true}]"#,
        )
        .await;
        let uploads = server
            .mock("POST", "/repos/acme/app/releases/4/assets")
            .match_query(Matcher::Regex("name=app-".into()))
            .match_header("content-type", "application/octet-stream")
            .match_body("artifact bytes")
            .with_status(201)
            .with_body(r#"{"browser_download_url": "https://example.com/app"}"#)
            .expect(2)
            .create_async()
            .await;

        let publisher = publisher(&server, false);
        let first = publisher.upload(&artifact(&temp, "app-1.0.0.dmg"), "app-1.0.0.dmg");
        let second = publisher.upload(&artifact(&temp, "app-1.0.0.zip"), "app-1.0.0.zip");

        let first = first.wait().await.unwrap();
        let second = second.wait().await.unwrap();
        assert_eq!(first.status, UploadStatus::Uploaded);
        assert_eq!(second.url.as_deref(), Some("https://example.com/app"));

        releases.assert_async().await;
        uploads.assert_async().await;
    }

    #[tokio::test]
    async fn test_published_release_is_skipped() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let _releases = mock_releases(&mut server, r#"[{"id": 4, "tag_name": "v1.0.0", "draft": false}]"#).await;
        let uploads = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let receipt = publisher(&server, false)
            .upload(&artifact(&temp, "app.zip"), "app.zip")
            .wait()
            .await
            .unwrap();

        assert_eq!(receipt.status, UploadStatus::Skipped);
        assert_eq!(receipt.reason.as_deref(), Some("release v1.0.0 is already published"));
        uploads.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_release_skipped_when_existing_required() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let _releases = mock_releases(&mut server, "[]").await;

        let receipt = publisher(&server, true)
            .upload(&artifact(&temp, "app.zip"), "app.zip")
            .wait()
            .await
            .unwrap();
        assert_eq!(receipt.status, UploadStatus::Skipped);
    }

    #[tokio::test]
    async fn test_missing_release_created_as_draft() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let _releases = mock_releases(&mut server, "[]").await;
        let create = server
            .mock("POST", "/repos/acme/app/releases")
            .match_body(Matcher::PartialJsonString(
                r#"{"tag_name": "v1.0.0", "draft": true}"#.to_string(),
            ))
            .with_status(201)
            .with_body(r#"{"id": 7, "tag_name": "v1.0.0", "draft": true}"#)
            .expect(1)
            .create_async()
            .await;
        let upload = server
            .mock("POST", "/repos/acme/app/releases/7/assets")
            .match_query(Matcher::UrlEncoded("name".into(), "app.zip".into()))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let receipt = publisher(&server, false)
            .upload(&artifact(&temp, "app.zip"), "app.zip")
            .wait()
            .await
            .unwrap();

        assert_eq!(receipt.status, UploadStatus::Uploaded);
        assert_eq!(receipt.url, None);
        create.assert_async().await;
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_upload_is_api_error() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let _releases = mock_releases(&mut server, r#"[{"id": 4, "tag_name": "v1.0.0", "draft": true}]"#).await;
        let _upload = server
            .mock("POST", "/repos/acme/app/releases/4/assets")
            .match_query(Matcher::Any)
            .with_status(422)
            .with_body("already_exists")
            .create_async()
            .await;

        let err = publisher(&server, false)
            .upload(&artifact(&temp, "app.zip"), "app.zip")
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Api { status: 422, ref message } if message == "already_exists"));
    }
}
