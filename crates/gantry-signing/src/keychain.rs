//! Ephemeral keychain provisioning
//!
//! [`CredentialStore::provision`] creates a throwaway keychain with a random
//! name and password, imports the certificate bundle into it and returns the
//! resulting [`SigningIdentity`]. Temporary certificate files are always
//! deleted; the keychain survives only a successful provisioning and must be
//! removed later with [`CredentialStore::teardown`].

use std::path::PathBuf;
use std::sync::Arc;

use gantry_core::config::SigningConfig;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::certificate::{
    CertificateBundle, CertificatePasswords, CertificateSource, CredentialDownloader,
    TempCertFile,
};
use crate::error::{Result, SigningError};
use crate::identity::{extract_common_name, SigningIdentity};
use crate::process::ToolRunner;

/// Tool granted access to every imported certificate
pub const CODESIGN_TOOL: &str = "/usr/bin/codesign";

/// Additional tool granted access to signing identities
pub const PRODUCTBUILD_TOOL: &str = "/usr/bin/productbuild";

/// Trust anchors shipped alongside the tool, looked up in the certificates dir
pub const BUNDLED_CERTIFICATES: &[&str] = &["AppleWWDRCA.cer", "bundle.crt"];

/// 8 random bytes, hex encoded
fn random_hex() -> String {
    let bytes: [u8; 8] = rand::random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Generate a collision-resistant keychain name
pub fn generate_keychain_name() -> String {
    format!("csc-{}.keychain", random_hex())
}

fn to_args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// An ephemeral keychain created for one provisioning call
#[derive(Clone, PartialEq, Eq)]
pub struct KeychainHandle {
    /// Keychain name passed to `security` and `codesign`
    pub name: String,
    /// Random password the keychain was created with
    pub password: String,
    /// Auto-lock timeout applied after unlocking
    pub unlock_timeout_secs: u32,
}

impl KeychainHandle {
    /// Fresh random name and password
    pub fn generate(unlock_timeout_secs: u32) -> Self {
        Self {
            name: generate_keychain_name(),
            password: random_hex(),
            unlock_timeout_secs,
        }
    }
}

impl std::fmt::Debug for KeychainHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainHandle")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .field("unlock_timeout_secs", &self.unlock_timeout_secs)
            .finish()
    }
}

/// Settings for the credential store
#[derive(Debug, Clone)]
pub struct KeychainSettings {
    /// Auto-lock timeout applied to new keychains
    pub unlock_timeout_secs: u32,
    /// Where certificate files are materialized
    pub temp_dir: PathBuf,
    /// Trust anchors imported when the caller asks for bundled CAs
    pub bundled_certificates: Vec<PathBuf>,
    /// Path to the `security` binary
    pub security_path: String,
    /// Path to the `openssl` binary
    pub openssl_path: String,
}

impl Default for KeychainSettings {
    fn default() -> Self {
        Self::from_config(&SigningConfig::default())
    }
}

impl KeychainSettings {
    /// Settings from the `[signing]` configuration section
    pub fn from_config(config: &SigningConfig) -> Self {
        Self {
            unlock_timeout_secs: config.keychain_timeout_secs,
            temp_dir: config.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
            bundled_certificates: config
                .certificates_dir
                .as_ref()
                .map(|dir| BUNDLED_CERTIFICATES.iter().map(|name| dir.join(name)).collect())
                .unwrap_or_default(),
            security_path: config.security_path.clone(),
            openssl_path: config.openssl_path.clone(),
        }
    }
}

/// Provisions and tears down ephemeral signing keychains
pub struct CredentialStore {
    runner: Arc<dyn ToolRunner>,
    downloader: Arc<dyn CredentialDownloader>,
    settings: KeychainSettings,
}

impl CredentialStore {
    /// Create a new credential store
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        downloader: Arc<dyn CredentialDownloader>,
        settings: KeychainSettings,
    ) -> Self {
        Self {
            runner,
            downloader,
            settings,
        }
    }

    /// Get the store settings
    pub fn settings(&self) -> &KeychainSettings {
        &self.settings
    }

    /// Provision a keychain holding the bundle's identities.
    ///
    /// `include_bundled_cas` appends the bundled trust anchors to the
    /// password-less imports; callers set it when the bundle carries no
    /// authority certificate of its own.
    #[instrument(skip_all, fields(certificates = bundle.len()))]
    pub async fn provision(
        &self,
        bundle: &CertificateBundle,
        passwords: &CertificatePasswords,
        include_bundled_cas: bool,
    ) -> Result<SigningIdentity> {
        let keychain = KeychainHandle::generate(self.settings.unlock_timeout_secs);
        let files = self.plan_files(&bundle.entries());
        let mut guard = CleanupGuard {
            runner: self.runner.clone(),
            security: self.settings.security_path.clone(),
            files: files.iter().map(|f| f.path.clone()).collect(),
            keychain: keychain.name.clone(),
            armed: true,
        };

        let outcome = self
            .provision_keychain(&keychain, bundle, &files, passwords, include_bundled_cas)
            .await;

        let failed_keychain = outcome.is_err().then_some(keychain.name.as_str());
        let cleanup = self.cleanup(&files, failed_keychain).await;
        guard.armed = false;

        match (outcome, cleanup) {
            (Ok(identity), Ok(())) => {
                info!(keychain = %keychain.name, identity = %identity.common_name, "provisioned signing keychain");
                Ok(identity)
            }
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Err(primary), Ok(())) => Err(primary),
            (Err(primary), Err(cleanup)) => Err(primary.with_cleanup(cleanup)),
        }
    }

    /// Delete a keychain; a keychain that does not exist counts as deleted
    #[instrument(skip(self))]
    pub async fn teardown(&self, name: &str) -> Result<()> {
        self.delete_keychain(name).await?;
        info!(keychain = %name, "deleted keychain");
        Ok(())
    }

    /// Materialize a single certificate as a `.p12` file owned by the caller
    pub async fn download_certificate(&self, source: &CertificateSource) -> Result<TempCertFile> {
        let file = TempCertFile {
            path: self.settings.temp_dir.join(format!("{}.p12", random_hex())),
            source_index: 0,
        };

        if let Err(e) = self.downloader.fetch(source, &file.path).await {
            if let Err(remove) = file.remove().await {
                debug!(path = %file.path.display(), error = %remove, "failed to remove partial certificate");
            }
            return Err(e);
        }
        Ok(file)
    }

    fn plan_files(&self, entries: &[&CertificateSource]) -> Vec<TempCertFile> {
        entries
            .iter()
            .enumerate()
            .map(|(index, source)| TempCertFile {
                path: self
                    .settings
                    .temp_dir
                    .join(format!("{}.{}", random_hex(), source.file_extension())),
                source_index: index,
            })
            .collect()
    }

    async fn provision_keychain(
        &self,
        keychain: &KeychainHandle,
        bundle: &CertificateBundle,
        files: &[TempCertFile],
        passwords: &CertificatePasswords,
        include_bundled_cas: bool,
    ) -> Result<SigningIdentity> {
        self.materialize(&bundle.entries(), files)
            .await
            .map_err(|e| SigningError::provisioning("materialize certificates", e))?;
        self.setup_keychain(keychain).await?;
        self.import_certificates(keychain, bundle, files, passwords, include_bundled_cas)
            .await
    }

    /// Fetch every entry concurrently; all fetches settle before returning
    async fn materialize(&self, entries: &[&CertificateSource], files: &[TempCertFile]) -> Result<()> {
        let mut fetches = JoinSet::new();
        for (source, file) in entries.iter().zip(files) {
            let downloader = self.downloader.clone();
            let source = (*source).clone();
            let path = file.path.clone();
            fetches.spawn(async move { downloader.fetch(&source, &path).await });
        }

        let mut first_error = None;
        while let Some(joined) = fetches.join_next().await {
            if let Err(e) = joined.map_err(SigningError::from).and_then(|fetched| fetched) {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!(count = files.len(), "materialized certificates");
                Ok(())
            }
        }
    }

    /// Create, unlock and extend the auto-lock window, strictly in that order
    async fn setup_keychain(&self, keychain: &KeychainHandle) -> Result<()> {
        let timeout = keychain.unlock_timeout_secs.to_string();
        let steps = [
            (
                "create keychain",
                to_args(&["create-keychain", "-p", &keychain.password, &keychain.name]),
            ),
            (
                "unlock keychain",
                to_args(&["unlock-keychain", "-p", &keychain.password, &keychain.name]),
            ),
            (
                "set keychain settings",
                to_args(&["set-keychain-settings", "-t", &timeout, "-u", &keychain.name]),
            ),
        ];

        for (step, args) in steps {
            self.security(&args)
                .await
                .map_err(|e| SigningError::provisioning(step, e))?;
        }
        debug!(keychain = %keychain.name, "keychain ready");
        Ok(())
    }

    async fn import_certificates(
        &self,
        keychain: &KeychainHandle,
        bundle: &CertificateBundle,
        files: &[TempCertFile],
        passwords: &CertificatePasswords,
        include_bundled_cas: bool,
    ) -> Result<SigningIdentity> {
        let (authorities, identities) = files.split_at(bundle.authority_count());

        let mut plain: Vec<PathBuf> = authorities.iter().map(|f| f.path.clone()).collect();
        if include_bundled_cas {
            if self.settings.bundled_certificates.is_empty() {
                debug!("no bundled certificates configured");
            }
            plain.extend(self.settings.bundled_certificates.iter().cloned());
        }

        for path in &plain {
            let path = path.to_string_lossy();
            self.security(&to_args(&["import", &path, "-k", &keychain.name, "-T", CODESIGN_TOOL]))
                .await
                .map_err(|e| SigningError::provisioning("import certificate", e))?;
        }

        let mut identity_passwords = vec![passwords.primary.clone()];
        if bundle.secondary.is_some() {
            identity_passwords.push(passwords.secondary.clone().unwrap_or_default());
        }

        // a CN read only touches its own file, so it may overlap the next import
        let mut extractions: Vec<JoinHandle<Result<String>>> = Vec::with_capacity(identities.len());
        for (file, password) in identities.iter().zip(identity_passwords) {
            let path = file.path.to_string_lossy().to_string();
            let imported = self
                .security(&to_args(&[
                    "import",
                    &path,
                    "-k",
                    &keychain.name,
                    "-T",
                    CODESIGN_TOOL,
                    "-T",
                    PRODUCTBUILD_TOOL,
                    "-P",
                    &password,
                ]))
                .await;

            if let Err(e) = imported {
                extractions.iter().for_each(JoinHandle::abort);
                return Err(SigningError::provisioning("import signing identity", e));
            }

            let runner = self.runner.clone();
            let openssl = self.settings.openssl_path.clone();
            let certificate = file.path.clone();
            extractions.push(tokio::spawn(async move {
                extract_common_name(runner.as_ref(), &openssl, &certificate, &password).await
            }));
        }

        let mut names = Vec::with_capacity(extractions.len());
        let mut first_error = None;
        for extraction in extractions {
            match extraction.await.map_err(SigningError::from).and_then(|name| name) {
                Ok(name) => names.push(name),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut names = names.into_iter();
        let common_name = names.next().ok_or_else(|| {
            SigningError::Configuration("certificate bundle has no signing identity".to_string())
        })?;

        Ok(SigningIdentity {
            common_name,
            installer_common_name: names.next(),
            keychain: Some(keychain.clone()),
        })
    }

    /// Delete temp files (in parallel, errors ignored), then the failed keychain
    async fn cleanup(&self, files: &[TempCertFile], failed_keychain: Option<&str>) -> Result<()> {
        let mut removals = JoinSet::new();
        for file in files {
            let file = file.clone();
            removals.spawn(async move {
                let removed = file.remove().await;
                (file.path, removed)
            });
        }

        let keychain = match failed_keychain {
            Some(name) => {
                warn!(keychain = %name, "provisioning failed, deleting keychain");
                self.delete_keychain(name).await
            }
            None => Ok(()),
        };

        while let Some(joined) = removals.join_next().await {
            if let Ok((path, Err(e))) = joined {
                warn!(path = %path.display(), error = %e, "failed to remove temporary certificate");
            }
        }

        keychain
    }

    async fn delete_keychain(&self, name: &str) -> Result<()> {
        match self.security(&to_args(&["delete-keychain", name])).await {
            Err(e) if e.is_keychain_not_found() => {
                debug!(keychain = %name, "keychain already absent");
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    async fn security(&self, args: &[String]) -> Result<crate::process::ToolOutput> {
        self.runner.run(&self.settings.security_path, args).await
    }
}

/// Runs best-effort cleanup when a provisioning future is dropped mid-flight
struct CleanupGuard {
    runner: Arc<dyn ToolRunner>,
    security: String,
    files: Vec<PathBuf>,
    keychain: String,
    armed: bool,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(keychain = %self.keychain, "provisioning interrupted, cleaning up");

        for path in &self.files {
            let _ = std::fs::remove_file(path);
        }

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let runner = self.runner.clone();
            let security = std::mem::take(&mut self.security);
            let args = to_args(&["delete-keychain", &self.keychain]);
            handle.spawn(async move {
                if let Err(e) = runner.run(&security, &args).await {
                    if !e.is_keychain_not_found() {
                        warn!(error = %e, "failed to delete interrupted keychain");
                    }
                }
            });
        }
    }
}
