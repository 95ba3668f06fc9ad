//! External tool invocation

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SigningError};

/// Captured output of a successful tool run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

/// Runs external tools (`security`, `codesign`, `openssl`).
///
/// A call resolves with the captured output when the tool exits with status
/// zero and fails with [`SigningError::Command`] otherwise.
#[async_trait::async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `program` with the given argument vector
    async fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput>;
}

/// Runs tools as child processes of the current process
#[derive(Debug, Clone, Default)]
pub struct SystemToolRunner;

impl SystemToolRunner {
    /// Create a new runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ToolRunner for SystemToolRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput> {
        // arguments may carry passwords, only the subcommand is logged
        debug!(
            program,
            subcommand = args.first().map(String::as_str).unwrap_or(""),
            "running tool"
        );

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SigningError::ToolNotFound {
                        tool: program.to_string(),
                    }
                } else {
                    SigningError::Io(e)
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(SigningError::Command {
                command: program.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: if stderr.is_empty() { stdout } else { stderr },
            });
        }

        Ok(ToolOutput { stdout, stderr })
    }
}
