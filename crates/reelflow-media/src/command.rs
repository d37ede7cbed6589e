//! Builder for running external media tools with a timeout.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use reelflow_types::{ReelflowError, Result};
use tokio::process::Command;

/// Default command timeout: 30 minutes. Transcodes of long inputs are slow.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Output captured from a tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// An external tool invocation.
///
/// The child is killed when the returned future is dropped, so aborting the
/// task that awaits [`execute`](ToolCommand::execute) stops the process too.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Run the command and capture stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`ReelflowError::ToolError`] if spawning fails or the process exits
    ///   with a non-zero status (the message carries stderr).
    /// - [`ReelflowError::CommandTimeout`] if the process outlives the timeout.
    pub async fn execute(&self) -> Result<ToolOutput> {
        let tool = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(tool = %tool, args = ?self.args, "Spawning tool");
        let child = cmd.spawn().map_err(|e| ReelflowError::ToolError {
            tool: tool.clone(),
            message: format!("failed to spawn: {e}"),
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ReelflowError::CommandTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|e| ReelflowError::ToolError {
                tool: tool.clone(),
                message: format!("failed to wait: {e}"),
            })?;

        let out = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !out.status.success() {
            return Err(ReelflowError::ToolError {
                tool,
                message: format!("exited with status {}: {}", out.status, out.stderr.trim()),
            });
        }
        Ok(out)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let out = ToolCommand::new("sh")
            .args(["-c", "echo hello"])
            .execute()
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let err = ToolCommand::new("sh")
            .args(["-c", "echo broken >&2; exit 3"])
            .execute()
            .await
            .unwrap_err();
        match err {
            ReelflowError::ToolError { tool, message } => {
                assert_eq!(tool, "sh");
                assert!(message.contains("broken"), "message: {message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let err = ToolCommand::new("sh")
            .args(["-c", "sleep 5"])
            .timeout(Duration::from_millis(100))
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, ReelflowError::CommandTimeout { timeout_ms: 100 }));
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let err = ToolCommand::new("/definitely/not/a/tool")
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, ReelflowError::ToolError { .. }));
    }
}
