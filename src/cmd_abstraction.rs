//! Command execution abstraction for testability.
//!
//! Every filter-engine command goes through the [`CommandExecutor`] trait, so
//! the table store and the rule allocator can be exercised against mocks,
//! recorders or an in-memory engine instead of a live `ipfw`.

use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::info;

use crate::error::EngineError;

#[cfg(test)]
use mockall::automock;

/// How often a running child is polled while a timeout is armed.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

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
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            code: Some(code),
        }
    }

    /// Standard output split into lines.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }
}

/// Trait for command execution, allowing dependency injection for testing.
///
/// Implementations run a single command to completion. They never retry, and
/// an `Err` means the command could not be run at all (spawn failure or
/// timeout); a command that ran and exited non-zero is an `Ok` output with
/// `success == false`.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with the given arguments.
    ///
    /// # Arguments
    /// * `cmd` - The command to execute (e.g., "/sbin/ipfw")
    /// * `args` - The arguments to pass to the command
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Real implementation of CommandExecutor that runs actual system commands.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor {
    timeout: Option<Duration>,
}

impl RealCommandExecutor {
    /// Create a new RealCommandExecutor without a time limit
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Create an executor that kills commands running longer than `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    fn wait_bounded(
        &self,
        cmd: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to execute {}", cmd))?;

        // Pipes are drained on their own threads so a chatty child cannot
        // block on a full pipe while we poll for its exit.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Timeout {
                    command: display_command(cmd, args),
                    timeout,
                }
                .into());
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(CommandOutput {
            stdout: collect(stdout),
            stderr: collect(stderr),
            success: status.success(),
            code: status.code(),
        })
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        if let Some(timeout) = self.timeout {
            return self.wait_bounded(cmd, args, timeout);
        }

        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to execute {}", cmd))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Executor for dry-run mode: logs each command and reports success with no
/// output, so listings come back empty.
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor;

impl DryRunExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for DryRunExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        info!("[dry-run] {}", display_command(cmd, args));
        Ok(CommandOutput::ok(""))
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).to_string())
        .unwrap_or_default()
}

/// Render a command line for logs and error messages.
pub fn display_command(cmd: &str, args: &[String]) -> String {
    let program = cmd.rsplit('/').next().unwrap_or(cmd);
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Helper function to convert a slice of &str to Vec<String>.
///
/// This is needed because mockall has issues with lifetimes in `&[&str]`,
/// so we use `&[String]` in the trait signature instead.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_strings() {
        let args = args_to_strings(&["table", "blocklist", "list"]);
        assert_eq!(args, vec!["table", "blocklist", "list"]);
    }

    #[test]
    fn test_args_to_strings_empty() {
        let args = args_to_strings(&[]);
        assert!(args.is_empty());
    }

    #[test]
    fn test_command_output_default() {
        let output = CommandOutput::default();
        assert!(output.stdout.is_empty());
        assert!(output.stderr.is_empty());
        assert!(!output.success);
        assert!(output.code.is_none());
    }

    #[test]
    fn test_command_output_lines() {
        let output = CommandOutput::ok("--- table(blocklist), set(0) ---\n10.0.0.1/32 0\n");
        let lines: Vec<&str> = output.stdout_lines().collect();
        assert_eq!(lines, vec!["--- table(blocklist), set(0) ---", "10.0.0.1/32 0"]);
    }

    #[test]
    fn test_display_command_strips_program_dir() {
        let args = args_to_strings(&["table", "t055", "flush"]);
        assert_eq!(display_command("/sbin/ipfw", &args), "ipfw table t055 flush");
        assert_eq!(display_command("ipfw", &[]), "ipfw");
    }

    #[test]
    fn test_real_command_executor_execute_echo() {
        let executor = RealCommandExecutor::new();
        let args = args_to_strings(&["-n", "hello"]);
        let output = executor.execute("echo", &args).unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
    }

    #[test]
    fn test_real_command_executor_execute_failure() {
        let executor = RealCommandExecutor::new();
        let args = args_to_strings(&["--invalid-flag"]);
        // ls --invalid-flag runs, just fails
        let output = executor.execute("ls", &args).unwrap();
        assert!(!output.success);
    }

    #[test]
    fn test_real_command_executor_missing_binary() {
        let executor = RealCommandExecutor::with_timeout(Duration::from_secs(1));
        let result = executor.execute("/nonexistent/ipfw", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_real_command_executor_with_timeout_completes() {
        let executor = RealCommandExecutor::with_timeout(Duration::from_secs(5));
        let args = args_to_strings(&["-n", "within budget"]);
        let output = executor.execute("echo", &args).unwrap();
        assert!(output.success);
        assert_eq!(output.code, Some(0));
        assert_eq!(output.stdout, "within budget");
    }

    #[test]
    fn test_real_command_executor_timeout_expires() {
        let executor = RealCommandExecutor::with_timeout(Duration::from_millis(100));
        let args = args_to_strings(&["5"]);
        let started = Instant::now();
        let err = executor.execute("sleep", &args).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(4));
        match err.downcast_ref::<EngineError>() {
            Some(EngineError::Timeout { command, .. }) => assert_eq!(command, "sleep 5"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_dry_run_executor_reports_success() {
        let executor = DryRunExecutor::new();
        let args = args_to_strings(&["table", "blocklist", "add", "10.0.0.1"]);
        let output = executor.execute("/sbin/ipfw", &args).unwrap();
        assert!(output.success);
        assert!(output.stdout.is_empty());
    }

    #[test]
    fn test_mock_command_executor() {
        let mut mock = MockCommandExecutor::new();

        mock.expect_execute()
            .withf(|cmd, args| cmd == "ipfw" && args == ["table".to_string(), "fwdlist".to_string(), "flush".to_string()])
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let args = args_to_strings(&["table", "fwdlist", "flush"]);
        let output = mock.execute("ipfw", &args).unwrap();
        assert!(output.success);
    }
}
