//! Certificate sources and their materialization to local files

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use gantry_core::BuildEnvironment;
use tracing::debug;

use crate::error::{Result, SigningError};

/// Where certificate material comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    /// Fetched over HTTPS
    Url(String),
    /// Decoded from inline base64
    Base64(String),
}

impl CertificateSource {
    /// Interpret a link: `https://` URLs are fetched, anything else is base64
    pub fn from_link(link: &str) -> Self {
        if link.starts_with("https://") {
            Self::Url(link.to_string())
        } else {
            Self::Base64(link.to_string())
        }
    }

    /// Extension for the materialized file: `cer` for CA-style links, else `p12`
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Url(url) if url.ends_with(".cer") => "cer",
            _ => "p12",
        }
    }
}

impl std::fmt::Display for CertificateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{}", url),
            Self::Base64(data) => write!(f, "<inline base64, {} chars>", data.len()),
        }
    }
}

/// Ordered certificates for one provisioning attempt.
///
/// The authority certificate, when present, always precedes the primary
/// `.p12`; the optional secondary `.p12` (installer identity) comes last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    /// CA or auxiliary certificate, imported without a password
    pub authority: Option<CertificateSource>,
    /// Primary signing identity
    pub primary: CertificateSource,
    /// Installer signing identity
    pub secondary: Option<CertificateSource>,
}

impl CertificateBundle {
    /// Bundle with only a primary identity
    pub fn new(primary: CertificateSource) -> Self {
        Self {
            authority: None,
            primary,
            secondary: None,
        }
    }

    /// Add an authority certificate
    pub fn with_authority(mut self, authority: CertificateSource) -> Self {
        self.authority = Some(authority);
        self
    }

    /// Add a secondary (installer) identity
    pub fn with_secondary(mut self, secondary: CertificateSource) -> Self {
        self.secondary = Some(secondary);
        self
    }

    /// Entries in import order
    pub fn entries(&self) -> Vec<&CertificateSource> {
        self.authority
            .iter()
            .chain(std::iter::once(&self.primary))
            .chain(self.secondary.iter())
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// A bundle always carries a primary identity
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of leading entries imported without a password
    pub fn authority_count(&self) -> usize {
        usize::from(self.authority.is_some())
    }

    /// Build the bundle and passwords from `CSC_*` / `CSA_LINK` settings
    pub fn from_environment(env: &BuildEnvironment) -> Option<(Self, CertificatePasswords)> {
        let primary = env.certificate_link.as_deref()?;
        let mut bundle = Self::new(CertificateSource::from_link(primary));

        if let Some(authority) = env.authority_link.as_deref() {
            bundle = bundle.with_authority(CertificateSource::from_link(authority));
        }

        let mut passwords = CertificatePasswords::new(env.certificate_password.clone().unwrap_or_default());
        if let Some(installer) = env.installer_link.as_deref() {
            bundle = bundle.with_secondary(CertificateSource::from_link(installer));
            passwords.secondary = Some(env.installer_password.clone().unwrap_or_default());
        }

        Some((bundle, passwords))
    }
}

/// Passwords protecting the `.p12` entries of a bundle
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CertificatePasswords {
    /// Password of the primary `.p12`
    pub primary: String,
    /// Password of the secondary `.p12`
    pub secondary: Option<String>,
}

impl CertificatePasswords {
    /// Passwords for a bundle without a secondary identity
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: None,
        }
    }

    /// Set the secondary password
    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }
}

impl std::fmt::Debug for CertificatePasswords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificatePasswords")
            .field("primary", &"<redacted>")
            .field("secondary", &self.secondary.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A materialized certificate file, deleted when provisioning finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempCertFile {
    /// Location on disk
    pub path: PathBuf,
    /// Index of the bundle entry it was materialized from
    pub source_index: usize,
}

impl TempCertFile {
    /// Remove the file, ignoring a file that was never written
    pub async fn remove(&self) -> std::io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Materializes certificate sources to local files
#[async_trait::async_trait]
pub trait CredentialDownloader: Send + Sync {
    /// Write the certificate to `destination` and return its path
    async fn fetch(&self, source: &CertificateSource, destination: &Path) -> Result<PathBuf>;
}

/// Fetches URL sources with `reqwest` and decodes base64 sources in place
#[derive(Debug, Clone, Default)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// Create a downloader with a default client
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a downloader with a preconfigured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl CredentialDownloader for HttpDownloader {
    async fn fetch(&self, source: &CertificateSource, destination: &Path) -> Result<PathBuf> {
        let bytes = match source {
            CertificateSource::Url(url) => {
                debug!(url = %url, "downloading certificate");
                self.client
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .bytes()
                    .await?
                    .to_vec()
            }
            CertificateSource::Base64(data) => decode_inline(data)?,
        };

        if bytes.is_empty() {
            return Err(SigningError::InvalidCertificate(format!(
                "{} is empty",
                source
            )));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, &bytes).await?;
        Ok(destination.to_path_buf())
    }
}

/// Decode inline base64, tolerating line breaks from wrapped secrets
fn decode_inline(data: &str) -> Result<Vec<u8>> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(BASE64.decode(compact)?)
}
