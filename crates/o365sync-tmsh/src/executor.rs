//! Command execution abstraction for testability.
//!
//! The policy store never spawns processes directly; it goes through
//! [`CommandExecutor`] so unit tests can script tmsh output.

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;

#[cfg(test)]
use mockall::automock;

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// The exit code, if available
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    /// Failed output with the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            code: Some(1),
        }
    }

    /// stdout and stderr joined
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }
}

/// Trait for command execution, allowing dependency injection for testing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute `program` with `args` and capture its output
    ///
    /// A non-zero exit status is reported in the output, not as an error.
    async fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Real implementation of CommandExecutor that runs actual system commands.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for RealCommandExecutor {
    async fn execute(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(program).args(args).output().await?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        assert_eq!(CommandOutput::ok("listed\n").combined(), "listed");
        assert_eq!(CommandOutput::failed("boom").combined(), "boom");

        let both = CommandOutput {
            stdout: "a".to_string(),
            stderr: "b".to_string(),
            success: false,
            code: Some(1),
        };
        assert_eq!(both.combined(), "a\nb");
    }

    #[tokio::test]
    async fn test_real_executor_runs_echo() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute("echo", &["-n".to_string(), "hello".to_string()])
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
    }

    #[tokio::test]
    async fn test_real_executor_reports_failure_status() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute("ls", &["--invalid-flag".to_string()])
            .await
            .unwrap();
        assert!(!output.success);
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let executor = RealCommandExecutor::new();
        assert!(executor.execute("/nonexistent/tmsh", &[]).await.is_err());
    }
}
