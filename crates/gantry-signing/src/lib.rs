//! Gantry Signing - Ephemeral keychains and code signing
//!
//! This crate turns certificate material into a usable signing identity:
//! - Certificate sources (HTTPS links or inline base64) and their download
//! - An ephemeral keychain per build, cleaned up on every exit path
//! - Common-name extraction from `.p12` files
//! - `codesign` invocation scoped to the ephemeral keychain

pub mod certificate;
pub mod error;
pub mod identity;
pub mod keychain;
pub mod process;
pub mod session;
pub mod signer;

#[cfg(test)]
mod testing;

pub use certificate::{
    CertificateBundle, CertificatePasswords, CertificateSource, CredentialDownloader,
    HttpDownloader, TempCertFile,
};
pub use error::{Result, SigningError, KEYCHAIN_NOT_FOUND};
pub use identity::{extract_common_name, parse_common_name, SigningIdentity};
pub use keychain::{CredentialStore, KeychainHandle, KeychainSettings};
pub use process::{SystemToolRunner, ToolOutput, ToolRunner};
pub use session::{sign_artifacts, SigningRequest};
pub use signer::Signer;
