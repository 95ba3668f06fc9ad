//! Snapshot of the process environment consumed by the pipeline
//!
//! The environment is read once at the binary boundary and passed down as a
//! plain value, so the signing and publishing code never looks at ambient
//! process state.

use std::collections::HashMap;

/// Token variables, first non-empty wins
pub const TOKEN_VARS: &[&str] = &["GH_TOKEN", "GH_TEST_TOKEN"];

/// Tag-name variables set by CI services, first non-empty wins
pub const TAG_VARS: &[&str] = &["TRAVIS_TAG", "APPVEYOR_REPO_TAG_NAME", "CIRCLE_TAG"];

/// CI indicator variables, first non-empty wins
pub const CI_VARS: &[&str] = &["TRAVIS", "APPVEYOR", "CIRCLECI"];

/// Lifecycle hint set by the invoking script runner
pub const LIFECYCLE_VAR: &str = "npm_lifecycle_event";

/// Environment-derived configuration for a single build
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BuildEnvironment {
    /// Release host credential token
    pub token: Option<String>,
    /// Lifecycle hint (e.g. "dist", "release")
    pub lifecycle_event: Option<String>,
    /// Tag being built, if the CI run was triggered by a tag push
    pub tag: Option<String>,
    /// Whether a CI service was detected
    pub ci: bool,
    /// Signing certificate link (https URL or base64 p12)
    pub certificate_link: Option<String>,
    /// Password of the signing certificate
    pub certificate_password: Option<String>,
    /// Installer certificate link (https URL or base64 p12)
    pub installer_link: Option<String>,
    /// Password of the installer certificate
    pub installer_password: Option<String>,
    /// Certificate authority link (https URL or base64 cer)
    pub authority_link: Option<String>,
}

impl BuildEnvironment {
    /// Read the current process environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from an explicit set of variables
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let single = |name: &str| vars.get(name).filter(|v| !v.is_empty()).cloned();
        let first = |names: &[&str]| names.iter().find_map(|name| single(name));

        let ci = first(CI_VARS)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            token: first(TOKEN_VARS),
            lifecycle_event: single(LIFECYCLE_VAR),
            tag: first(TAG_VARS),
            ci,
            certificate_link: single("CSC_LINK"),
            certificate_password: single("CSC_KEY_PASSWORD"),
            installer_link: single("CSC_INSTALLER_LINK"),
            installer_password: single("CSC_INSTALLER_KEY_PASSWORD"),
            authority_link: single("CSA_LINK"),
        }
    }

    /// Whether a release host token is present
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

impl std::fmt::Debug for BuildEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("BuildEnvironment")
            .field("token", &redact(&self.token))
            .field("lifecycle_event", &self.lifecycle_event)
            .field("tag", &self.tag)
            .field("ci", &self.ci)
            .field("certificate_link", &redact(&self.certificate_link))
            .field("certificate_password", &redact(&self.certificate_password))
            .field("installer_link", &redact(&self.installer_link))
            .field("installer_password", &redact(&self.installer_password))
            .field("authority_link", &self.authority_link)
            .finish()
    }
}
