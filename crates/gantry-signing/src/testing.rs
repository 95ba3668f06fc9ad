//! In-memory fakes for the process and download boundaries

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::certificate::{CertificateSource, CredentialDownloader};
use crate::error::{Result, SigningError};
use crate::process::{ToolOutput, ToolRunner};

/// Records every tool call and answers from canned responses
#[derive(Default)]
pub(crate) struct FakeRunner {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    common_names: Vec<(String, String)>,
    openssl_output: Option<String>,
    failures: Vec<(String, String, String)>,
}

impl FakeRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer openssl calls on files ending with `suffix` with this CN
    pub(crate) fn with_common_name(mut self, suffix: &str, cn: &str) -> Self {
        self.common_names.push((suffix.to_string(), cn.to_string()));
        self
    }

    /// Answer every openssl call with this raw output
    pub(crate) fn with_openssl_output(mut self, output: &str) -> Self {
        self.openssl_output = Some(output.to_string());
        self
    }

    /// Fail calls to `program` whose first argument is `subcommand`
    pub(crate) fn with_failure(mut self, program: &str, subcommand: &str, stderr: &str) -> Self {
        self.failures
            .push((program.to_string(), subcommand.to_string(), stderr.to_string()));
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_for(&self, program: &str) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|(p, _)| p == program)
            .map(|(_, args)| args)
            .collect()
    }

    pub(crate) fn subcommands_for(&self, program: &str) -> Vec<String> {
        self.calls_for(program)
            .into_iter()
            .filter_map(|args| args.first().cloned())
            .collect()
    }
}

#[async_trait::async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));

        let subcommand = args.first().map(String::as_str).unwrap_or("");
        if let Some((_, _, stderr)) = self
            .failures
            .iter()
            .find(|(p, s, _)| p == program && s == subcommand)
        {
            return Err(SigningError::Command {
                command: program.to_string(),
                status: 1,
                stderr: stderr.clone(),
            });
        }

        if program == "openssl" {
            if let Some(output) = &self.openssl_output {
                return Ok(ToolOutput {
                    stdout: output.clone(),
                    stderr: String::new(),
                });
            }
            let file = args.last().cloned().unwrap_or_default();
            let cn = self
                .common_names
                .iter()
                .find(|(suffix, _)| file.ends_with(suffix.as_str()))
                .map(|(_, cn)| cn.clone())
                .unwrap_or_else(|| "Default Identity".to_string());
            return Ok(ToolOutput {
                stdout: format!("subject=/CN={}/O=Acme\n", cn),
                stderr: String::new(),
            });
        }

        Ok(ToolOutput::default())
    }
}

/// Writes fixed bytes for every source, optionally failing some of them
#[derive(Default)]
pub(crate) struct FakeDownloader {
    fetched: Mutex<Vec<(CertificateSource, PathBuf)>>,
    fail_containing: Option<String>,
}

impl FakeDownloader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fail sources whose text contains `needle`, after the others are written
    pub(crate) fn failing_on(needle: &str) -> Self {
        Self {
            fetched: Mutex::new(Vec::new()),
            fail_containing: Some(needle.to_string()),
        }
    }

    pub(crate) fn fetched(&self) -> Vec<(CertificateSource, PathBuf)> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CredentialDownloader for FakeDownloader {
    async fn fetch(&self, source: &CertificateSource, destination: &Path) -> Result<PathBuf> {
        self.fetched
            .lock()
            .unwrap()
            .push((source.clone(), destination.to_path_buf()));

        let text = match source {
            CertificateSource::Url(url) => url.as_str(),
            CertificateSource::Base64(data) => data.as_str(),
        };
        if let Some(needle) = &self.fail_containing {
            if text.contains(needle.as_str()) {
                return Err(SigningError::InvalidCertificate(format!("cannot fetch {}", text)));
            }
        }

        tokio::fs::write(destination, b"certificate").await?;
        Ok(destination.to_path_buf())
    }
}
