//! Timed external command execution
//!
//! Everything devrig learns about the outside world comes from shelling out
//! to discovery binaries. The [`CommandRunner`] trait is the single seam for
//! that: production code uses [`TokioCommandRunner`], tests script responses
//! through `test_utils::ScriptedRunner`.

use std::process::Stdio;
use std::time::Duration;

use devrig_core::prelude::*;
use tokio::process::Command;
use tokio::time::timeout;

/// Outcome classification of one external command run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Exited with status zero
    Success,
    /// Non-zero exit, or the command could not be started
    Failed,
    /// Did not finish within the caller's timeout
    TimedOut,
}

/// Captured result of one external command run
///
/// Failure is data, not an error: a failed or timed-out command degrades to
/// a result the caller inspects, it never aborts the caller.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn failed(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Failed,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn timed_out() -> Self {
        Self {
            status: CommandStatus::TimedOut,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }

    /// Combined stdout + stderr, as a probe over a raw transport sees it
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Seam for running external commands with a timeout
///
/// `run_timed_quiet` is for periodic polling commands whose output would
/// flood the debug log; implementations should skip output logging there.
#[allow(async_fn_in_trait)]
pub trait CommandRunner: Send + Sync {
    async fn run_timed(&self, time_limit: Duration, binary: &str, args: &[&str]) -> CommandResult;

    async fn run_timed_quiet(
        &self,
        time_limit: Duration,
        binary: &str,
        args: &[&str],
    ) -> CommandResult {
        self.run_timed(time_limit, binary, args).await
    }
}

/// Production command runner on top of tokio's process support
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    async fn run(
        &self,
        time_limit: Duration,
        binary: &str,
        args: &[&str],
        log_output: bool,
    ) -> CommandResult {
        let child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = match timeout(time_limit, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!("Failed to run {} {:?}: {}", binary, args, e);
                return CommandResult::failed("", e.to_string());
            }
            Err(_) => {
                warn!("{} {:?} timed out after {:?}", binary, args, time_limit);
                return CommandResult::timed_out();
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if log_output {
            debug!("{} {:?} stdout: {}", binary, args, stdout);
            if !stderr.is_empty() {
                debug!("{} {:?} stderr: {}", binary, args, stderr);
            }
        }

        if output.status.success() {
            CommandResult::success(stdout, stderr)
        } else {
            debug!(
                "{} {:?} exited with code {:?}",
                binary,
                args,
                output.status.code()
            );
            CommandResult::failed(stdout, stderr)
        }
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run_timed(&self, time_limit: Duration, binary: &str, args: &[&str]) -> CommandResult {
        self.run(time_limit, binary, args, true).await
    }

    async fn run_timed_quiet(
        &self,
        time_limit: Duration,
        binary: &str,
        args: &[&str],
    ) -> CommandResult {
        self.run(time_limit, binary, args, false).await
    }
}
