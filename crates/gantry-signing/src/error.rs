//! Error types for signing operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for signing operations
pub type Result<T> = std::result::Result<T, SigningError>;

/// Message printed by `security` when a keychain does not exist
pub const KEYCHAIN_NOT_FOUND: &str = "The specified keychain could not be found.";

/// Signing-related errors
#[derive(Debug, Error)]
pub enum SigningError {
    /// A keychain provisioning step failed
    #[error("Keychain provisioning failed while trying to {step}: {source}")]
    Provisioning {
        step: &'static str,
        #[source]
        source: Box<SigningError>,
    },

    /// No subject common name in the certificate
    #[error("Cannot extract common name from {path}")]
    IdentityExtraction { path: PathBuf },

    /// Signing failed
    #[error("Failed to sign {path}: {reason}")]
    SigningFailed { path: PathBuf, reason: String },

    /// A cleanup step failed after an earlier error
    #[error("{primary} (cleanup also failed: {cleanup})")]
    Cleanup {
        #[source]
        primary: Box<SigningError>,
        cleanup: Box<SigningError>,
    },

    /// Tool not found
    #[error("Signing tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// Command execution error
    #[error("Command '{command}' failed with exit code {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    /// Certificate payload is unusable
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Configuration error
    #[error("Signing configuration error: {0}")]
    Configuration(String),

    /// Background task failed to complete
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// HTTP error while fetching a certificate
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Inline certificate is not valid base64
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SigningError {
    /// Wrap an error as a failure of the named provisioning step
    pub fn provisioning(step: &'static str, source: SigningError) -> Self {
        Self::Provisioning {
            step,
            source: Box::new(source),
        }
    }

    /// Whether this is `security` reporting a missing keychain
    pub fn is_keychain_not_found(&self) -> bool {
        match self {
            Self::Command { stderr, .. } => stderr.contains(KEYCHAIN_NOT_FOUND),
            _ => false,
        }
    }

    /// Attach a cleanup failure to this error without masking it
    pub fn with_cleanup(self, cleanup: SigningError) -> Self {
        Self::Cleanup {
            primary: Box::new(self),
            cleanup: Box::new(cleanup),
        }
    }
}
