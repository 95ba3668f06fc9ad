//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::PublishPolicy;

/// Main configuration for Gantry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub name: Option<String>,

    /// Application version, used for the release tag
    pub version: Option<String>,

    /// Repository override: `owner/project` or a clone URL
    pub repository: Option<String>,

    /// Packaging configuration
    pub build: BuildConfig,

    /// Code signing configuration
    pub signing: SigningConfig,

    /// Publishing configuration
    pub publish: PublishConfig,
}

/// Packaging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Command (program followed by arguments) that produces the artifacts
    pub command: Vec<String>,

    /// Glob patterns matching produced artifacts
    pub artifacts: Vec<String>,

    /// Whether to package in a distributable format
    pub dist: Option<bool>,
}

/// Code signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Auto-lock timeout applied to the ephemeral keychain
    pub keychain_timeout_secs: u32,

    /// Directory holding bundled trust-anchor certificates
    pub certificates_dir: Option<PathBuf>,

    /// Directory for temporary certificate files (OS temp dir if unset)
    pub temp_dir: Option<PathBuf>,

    /// Path to the codesign binary
    pub codesign_path: String,

    /// Path to the security binary
    pub security_path: String,

    /// Path to the openssl binary
    pub openssl_path: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            keychain_timeout_secs: super::defaults::DEFAULT_KEYCHAIN_TIMEOUT_SECS,
            certificates_dir: None,
            temp_dir: None,
            codesign_path: "codesign".to_string(),
            security_path: "security".to_string(),
            openssl_path: "openssl".to_string(),
        }
    }
}

/// Publishing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Explicit publish policy; inferred from the environment when unset
    pub policy: Option<PublishPolicy>,

    /// Release host API base URL
    pub api_url: String,

    /// Release host asset upload base URL
    pub uploads_url: String,

    /// Prefix prepended to the version to form the release tag
    pub tag_prefix: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            policy: None,
            api_url: super::defaults::DEFAULT_API_URL.to_string(),
            uploads_url: super::defaults::DEFAULT_UPLOADS_URL.to_string(),
            tag_prefix: "v".to_string(),
        }
    }
}
