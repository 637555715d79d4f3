//! External command execution
//!
//! Backends talk to hardware through vendor tools. [`ProcessExecutor`] runs a
//! tool from an explicit argument vector (never through a shell), captures
//! its output and kills it, along with anything it forked, if it outlives its
//! timeout.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::ExecutionError;

/// Output of one finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Process exit code (-1 if terminated by a signal)
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout as text with trailing whitespace removed
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim_end().to_string()
    }

    /// Stderr as text with surrounding whitespace removed
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Runs external control commands
///
/// A non-zero exit code is returned as data; only failure to start the
/// process or a timeout is an error. Implementations never retry.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandResult, ExecutionError>;
}

/// Executor backed by OS processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, argv: &[String], timeout: Duration) -> Result<CommandResult, ExecutionError> {
        let (program, args) = argv.split_first().ok_or_else(|| ExecutionError::LaunchFailure {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argument vector"),
        })?;

        debug!(program = %program, args = ?args, timeout_ms = timeout.as_millis() as u64, "Running command");

        let start = Instant::now();
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so helpers the tool forks can be killed with it
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| ExecutionError::LaunchFailure {
            program: program.clone(),
            source: e,
        })?;
        let group = child.id();

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let waited = {
            let out_pipe = child.stdout.take();
            let err_pipe = child.stderr.take();
            let pipes = async {
                tokio::join!(drain(out_pipe, &mut stdout), drain(err_pipe, &mut stderr));
            };
            tokio::pin!(pipes);

            let deadline = tokio::time::Instant::now() + timeout;
            let mut pipes_closed = false;
            let waited = loop {
                tokio::select! {
                    status = child.wait() => break Some(status),
                    _ = &mut pipes, if !pipes_closed => pipes_closed = true,
                    _ = tokio::time::sleep_until(deadline) => break None,
                }
            };

            // Whatever is left of the group goes down with the tool; that
            // closes any pipe a leftover helper still held open.
            kill_group(group, program);
            if !pipes_closed && tokio::time::timeout(DRAIN_GRACE, &mut pipes).await.is_err() {
                warn!(program = %program, "Output pipes still open after the command ended");
            }
            waited
        };

        match waited {
            Some(Ok(status)) => {
                let result = CommandResult {
                    exit_code: status.code().unwrap_or(-1),
                    stdout,
                    stderr,
                    duration: start.elapsed(),
                };
                debug!(
                    program = %program,
                    exit_code = result.exit_code,
                    elapsed_ms = result.duration.as_millis() as u64,
                    "Command finished"
                );
                Ok(result)
            }
            Some(Err(e)) => {
                terminate(&mut child, program).await;
                Err(ExecutionError::LaunchFailure {
                    program: program.clone(),
                    source: e,
                })
            }
            None => {
                warn!(program = %program, timeout_ms = timeout.as_millis() as u64, "Command timed out, killed it");
                terminate(&mut child, program).await;
                Err(ExecutionError::Timeout {
                    program: program.clone(),
                    timeout,
                })
            }
        }
    }
}

/// How long to keep reading output once the command itself is gone
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Append everything read from `pipe` to `buf` until EOF
///
/// Reads in chunks so output gathered before a cancellation is kept.
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>, buf: &mut Vec<u8>) {
    let Some(mut pipe) = pipe else {
        return;
    };
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => {
                debug!(error = %e, "Stopped reading command output");
                break;
            }
        }
    }
}

/// SIGKILL every process still in the command's group
#[cfg(unix)]
fn kill_group(group: Option<u32>, program: &str) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(group) = group else {
        return;
    };
    match killpg(Pid::from_raw(group as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(program = %program, error = %e, "Failed to kill command process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>, _program: &str) {}

/// Kill the child and reap it so no zombie is left behind
async fn terminate(child: &mut Child, program: &str) {
    if let Err(e) = child.kill().await {
        warn!(program = %program, error = %e, "Failed to kill command");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionErrorKind;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_captures_stdout_and_exit_code() {
        let result = ProcessExecutor::new()
            .run(&argv(&["sh", "-c", "echo ON; echo oops >&2; exit 3"]), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert!(!result.success());
        assert_eq!(result.stdout_text(), "ON");
        assert_eq!(result.stderr_text(), "oops");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let result = ProcessExecutor::new()
            .run(&argv(&["false"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert_ne!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_arguments_are_not_shell_interpreted() {
        let result = ProcessExecutor::new()
            .run(&argv(&["echo", "14; echo injected"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.stdout_text(), "14; echo injected");
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_failure() {
        let err = ProcessExecutor::new()
            .run(&argv(&["/nonexistent/plmpower", "status", "14"]), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExecutionErrorKind::LaunchFailure);
    }

    #[tokio::test]
    async fn test_empty_argv_is_launch_failure() {
        let err = ProcessExecutor::new()
            .run(&[], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExecutionErrorKind::LaunchFailure);
    }

    /// Whether `pid` is still a live (non-zombie) process, polling briefly
    /// so a just-delivered SIGKILL has time to land
    async fn still_running(pid: &str) -> bool {
        let stat = std::path::Path::new("/proc").join(pid.trim()).join("stat");
        for _ in 0..40 {
            let alive = match std::fs::read_to_string(&stat) {
                // The state letter follows the parenthesised command name
                Ok(stat) => stat
                    .rsplit_once(')')
                    .and_then(|(_, rest)| rest.trim_start().chars().next())
                    .map_or(false, |state| state != 'Z' && state != 'X'),
                Err(_) => false,
            };
            if !alive {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());

        let start = Instant::now();
        let err = ProcessExecutor::new()
            .run(&argv(&["sh", "-c", &script]), Duration::from_millis(500))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ExecutionErrorKind::Timeout);
        assert!(start.elapsed() < Duration::from_secs(10));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(!still_running(&pid).await, "timed out process {} is still alive", pid.trim());
    }

    #[tokio::test]
    async fn test_timeout_kills_forked_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        // The shell forks the sleeper and waits on it, so the sleeper is not
        // the process the executor spawned
        let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

        let start = Instant::now();
        let err = ProcessExecutor::new()
            .run(&argv(&["sh", "-c", &script]), Duration::from_millis(500))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ExecutionErrorKind::Timeout);
        assert!(start.elapsed() < Duration::from_secs(10));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(!still_running(&pid).await, "forked helper {} outlived the timeout", pid.trim());
    }

    #[tokio::test]
    async fn test_exited_tool_with_lingering_helper_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        // The helper inherits stdout and keeps it open after the tool exits
        let script = format!("sleep 30 & echo $! > {}; echo ON; exit 0", pid_file.display());

        let start = Instant::now();
        let result = ProcessExecutor::new()
            .run(&argv(&["sh", "-c", &script]), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout_text(), "ON");
        assert!(start.elapsed() < Duration::from_secs(5));

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(!still_running(&pid).await, "helper {} outlived its tool", pid.trim());
    }
}
