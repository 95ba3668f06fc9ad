//! Signing identities and common-name extraction

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Result, SigningError};
use crate::keychain::KeychainHandle;
use crate::process::ToolRunner;

/// Legacy openssl subject line: `subject=/C=US/O=Acme/CN=Developer ID Application: Acme`
static LEGACY_SUBJECT_CN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^subject.*/CN=([^/\n]+)").expect("Invalid regex"));

/// OpenSSL 1.1+ subject line: `subject=C = US, O = Acme, CN = Developer ID Application: Acme`.
///
/// Commas inside values are not escaped, so the name runs up to the next
/// `, <attribute>=` or the end of the line.
static SUBJECT_CN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^subject\s*=.*?\bCN\s*=\s*(.+?)\s*(?:,\s*[A-Za-z][A-Za-z0-9.]*\s*=|$)")
        .expect("Invalid regex")
});

/// A resolved identity ready for signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningIdentity {
    /// Subject common name of the primary certificate
    pub common_name: String,
    /// Subject common name of the installer certificate, if one was supplied
    pub installer_common_name: Option<String>,
    /// Keychain holding the identity; `None` for ambient/system identities
    pub keychain: Option<KeychainHandle>,
}

impl SigningIdentity {
    /// An identity already available to the signing tool, without keychain scoping
    pub fn ambient(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            installer_common_name: None,
            keychain: None,
        }
    }

    /// Name of the keychain the identity lives in
    pub fn keychain_name(&self) -> Option<&str> {
        self.keychain.as_ref().map(|k| k.name.as_str())
    }
}

impl std::fmt::Display for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.keychain_name() {
            Some(keychain) => write!(f, "{} [{}]", self.common_name, keychain),
            None => write!(f, "{}", self.common_name),
        }
    }
}

/// Find the subject common name in openssl's certificate dump
pub fn parse_common_name(output: &str) -> Option<String> {
    LEGACY_SUBJECT_CN
        .captures(output)
        .or_else(|| SUBJECT_CN.captures(output))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|cn| !cn.is_empty())
}

/// Read the subject common name of a password-protected `.p12`
pub async fn extract_common_name(
    runner: &dyn ToolRunner,
    openssl: &str,
    certificate: &Path,
    password: &str,
) -> Result<String> {
    let args = vec![
        "pkcs12".to_string(),
        "-nokeys".to_string(),
        "-nodes".to_string(),
        "-passin".to_string(),
        format!("pass:{}", password),
        "-nomacver".to_string(),
        "-clcerts".to_string(),
        "-in".to_string(),
        certificate.to_string_lossy().to_string(),
    ];

    let output = runner.run(openssl, &args).await?;
    let common_name = parse_common_name(&output.stdout).ok_or_else(|| {
        SigningError::IdentityExtraction {
            path: certificate.to_path_buf(),
        }
    })?;

    debug!(certificate = %certificate.display(), common_name = %common_name, "extracted common name");
    Ok(common_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;

    #[test]
    fn test_parse_legacy_subject() {
        let output = "Bag Attributes\n    localKeyID: 01\nsubject=/UID=ABCD1234/CN=Developer ID Application: Acme Inc (ABCD1234)/OU=ABCD1234/O=Acme Inc/C=US\nissuer=/CN=Developer ID Certification Authority\n";
        assert_eq!(
            parse_common_name(output).as_deref(),
            Some("Developer ID Application: Acme Inc (ABCD1234)")
        );
    }

    #[test]
    fn test_parse_modern_subject() {
        let output = "subject=UID = ABCD1234, CN = Developer ID Installer: Acme Inc (ABCD1234), OU = ABCD1234, O = Acme Inc, C = US\nissuer=CN = Developer ID Certification Authority\n";
        assert_eq!(
            parse_common_name(output).as_deref(),
            Some("Developer ID Installer: Acme Inc (ABCD1234)")
        );
    }

    #[test]
    fn test_parse_subject_with_comma_in_trailing_name() {
        let output = "subject=C=US, O=Acme, Inc., CN=Developer ID Application: Acme, Inc. (ABCD1234)\nissuer=CN=Developer ID Certification Authority\n";
        assert_eq!(
            parse_common_name(output).as_deref(),
            Some("Developer ID Application: Acme, Inc. (ABCD1234)")
        );
    }

    #[test]
    fn test_parse_subject_with_comma_in_middle_name() {
        let output = "subject=UID=ABCD1234, CN=Developer ID Application: Acme, Inc. (ABCD1234), OU=ABCD1234, O=Acme, Inc., C=US\n";
        assert_eq!(
            parse_common_name(output).as_deref(),
            Some("Developer ID Application: Acme, Inc. (ABCD1234)")
        );
    }

    #[test]
    fn test_parse_ignores_issuer() {
        let output = "issuer=/CN=Some Authority\nsubject=/O=Acme\n";
        assert_eq!(parse_common_name(output), None);
    }

    #[test]
    fn test_ambient_identity() {
        let identity = SigningIdentity::ambient("Developer ID Application: Acme");
        assert!(identity.keychain.is_none());
        assert!(identity.installer_common_name.is_none());
        assert_eq!(identity.to_string(), "Developer ID Application: Acme");
    }

    #[tokio::test]
    async fn test_extract_common_name_invokes_openssl() {
        let runner = FakeRunner::new().with_common_name("id.p12", "Acme Signing");
        let cn = extract_common_name(&runner, "openssl", Path::new("/tmp/id.p12"), "pw")
            .await
            .unwrap();
        assert_eq!(cn, "Acme Signing");

        let calls = runner.calls_for("openssl");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], "pkcs12");
        assert!(calls[0].contains(&"pass:pw".to_string()));
        assert_eq!(calls[0].last().map(String::as_str), Some("/tmp/id.p12"));
    }

    #[tokio::test]
    async fn test_extract_without_subject_fails() {
        let runner = FakeRunner::new().with_openssl_output("no subject here\n");
        let err = extract_common_name(&runner, "openssl", Path::new("/tmp/id.p12"), "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::IdentityExtraction { .. }));
    }
}
