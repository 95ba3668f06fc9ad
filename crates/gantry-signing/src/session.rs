//! Provision, sign and tear down in one call

use std::path::{Path, PathBuf};

use gantry_core::BuildEnvironment;
use tracing::{info, warn};

use crate::certificate::{CertificateBundle, CertificatePasswords};
use crate::error::Result;
use crate::identity::SigningIdentity;
use crate::keychain::CredentialStore;
use crate::signer::Signer;

/// Where the signing identity comes from
#[derive(Debug, Clone)]
pub enum SigningRequest {
    /// Import certificates into an ephemeral keychain
    Certificates {
        bundle: CertificateBundle,
        passwords: CertificatePasswords,
    },
    /// Use an identity already installed on the machine
    Ambient { identity: String },
}

impl SigningRequest {
    /// Certificates from the environment, falling back to an ambient identity
    pub fn resolve(env: &BuildEnvironment, ambient_identity: Option<&str>) -> Option<Self> {
        match CertificateBundle::from_environment(env) {
            Some((bundle, passwords)) => Some(Self::Certificates { bundle, passwords }),
            None => ambient_identity.map(|identity| Self::Ambient {
                identity: identity.to_string(),
            }),
        }
    }
}

/// Sign `artifacts` in order.
///
/// A provisioned keychain is always torn down afterwards. Returns the paths
/// that were signed.
pub async fn sign_artifacts(
    store: &CredentialStore,
    signer: &Signer,
    request: &SigningRequest,
    artifacts: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    let identity = match request {
        SigningRequest::Certificates { bundle, passwords } => {
            // bundled trust anchors only when no authority was supplied
            store
                .provision(bundle, passwords, bundle.authority.is_none())
                .await?
        }
        SigningRequest::Ambient { identity } => SigningIdentity::ambient(identity.as_str()),
    };

    let signed = sign_all(signer, &identity, artifacts).await;

    let Some(keychain) = identity.keychain_name() else {
        return signed;
    };
    match (signed, store.teardown(keychain).await) {
        (Ok(signed), Ok(())) => {
            info!(count = signed.len(), "signing session complete");
            Ok(signed)
        }
        (Ok(_), Err(teardown)) => Err(teardown),
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(teardown)) => {
            warn!(error = %teardown, "keychain teardown failed after signing error");
            Err(primary.with_cleanup(teardown))
        }
    }
}

async fn sign_all(signer: &Signer, identity: &SigningIdentity, artifacts: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut signed = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        signer.sign(Path::new(artifact), identity).await?;
        signed.push(artifact.clone());
    }
    Ok(signed)
}
