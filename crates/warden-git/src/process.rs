//! Generic subprocess runner with a hard deadline.
//!
//! Output pipes are drained on dedicated threads so a chatty child cannot
//! deadlock against the pipe buffer while we poll for exit.

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("command failed to start ({command}): {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command returned non-zero exit ({command}) status={status:?}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
    },
    #[error("command failed ({command}) status={status:?}: {stderr}")]
    CommandFailedWithStderr {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("command timed out after {timeout_secs}s ({command})")]
    Timeout {
        command: String,
        timeout_secs: u64,
    },
    #[error("command output was not valid UTF-8 ({command}, {stream}): {source}")]
    NonUtf8Output {
        command: String,
        stream: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

impl From<ProcessError> for warden_core::WorkflowError {
    fn from(err: ProcessError) -> Self {
        warden_core::WorkflowError::general(err.to_string())
    }
}

/// Runner for arbitrary tools (tar and friends). 120 s default timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRunner {
    pub timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROCESS_TIMEOUT,
        }
    }
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run and require exit 0. Non-zero exits with and without stderr are
    /// distinct error variants; timeouts are never retried.
    pub fn run<I, S>(&self, cwd: &Path, program: &str, args: I) -> Result<ProcessOutput, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.run_unchecked(cwd, program, args, &[])?;
        if !output.success() {
            let command = program.to_string();
            if output.stderr.trim().is_empty() {
                return Err(ProcessError::CommandFailed {
                    command,
                    status: output.status,
                });
            }
            return Err(ProcessError::CommandFailedWithStderr {
                command,
                status: output.status,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Run without checking the exit status (conflicts are expected for
    /// some callers, e.g. `git apply --cached`).
    pub fn run_unchecked<I, S>(
        &self,
        cwd: &Path,
        program: &str,
        args: I,
        env: &[(OsString, OsString)],
    ) -> Result<ProcessOutput, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let owned_args: Vec<OsString> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        let rendered = render_command(Path::new(program), &owned_args);

        let mut command = Command::new(program);
        command
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for arg in &owned_args {
            command.arg(arg);
        }
        for (key, value) in env {
            command.env(key, value);
        }

        run_with_deadline(command, self.timeout, &rendered)
    }
}

pub fn render_command(binary: &Path, args: &[OsString]) -> String {
    let mut rendered = binary.to_string_lossy().into_owned();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

/// Spawn, drain pipes on threads, poll for exit until the deadline, kill
/// on overrun.
pub(crate) fn run_with_deadline(
    mut command: Command,
    timeout: Duration,
    rendered: &str,
) -> Result<ProcessOutput, ProcessError> {
    let span = tracing::debug_span!("process", command = rendered);
    let _guard = span.enter();
    let started = Instant::now();

    let mut child = command.spawn().map_err(|source| ProcessError::Io {
        command: rendered.to_string(),
        source,
    })?;

    let stdout_reader = spawn_reader(child.stdout.take());
    let stderr_reader = spawn_reader(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if started.elapsed() >= timeout {
                    kill_quietly(&mut child, rendered);
                    let _ = stdout_reader.join();
                    let _ = stderr_reader.join();
                    return Err(ProcessError::Timeout {
                        command: rendered.to_string(),
                        timeout_secs: timeout.as_secs(),
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                kill_quietly(&mut child, rendered);
                let _ = stdout_reader.join();
                let _ = stderr_reader.join();
                return Err(ProcessError::Io {
                    command: rendered.to_string(),
                    source,
                });
            }
        }
    };

    let stdout_bytes = stdout_reader.join().unwrap_or_default();
    let stderr_bytes = stderr_reader.join().unwrap_or_default();

    let stdout = String::from_utf8(stdout_bytes).map_err(|source| ProcessError::NonUtf8Output {
        command: rendered.to_string(),
        stream: "stdout",
        source,
    })?;
    let stderr = String::from_utf8(stderr_bytes).map_err(|source| ProcessError::NonUtf8Output {
        command: rendered.to_string(),
        stream: "stderr",
        source,
    })?;

    debug!(
        status = ?status.code(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "process finished"
    );

    Ok(ProcessOutput {
        status: status.code(),
        stdout,
        stderr,
    })
}

fn spawn_reader<R: Read + Send + 'static>(
    source: Option<R>,
) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = source {
            let _ = reader.read_to_end(&mut buf);
        }
        buf
    })
}

fn kill_quietly(child: &mut Child, rendered: &str) {
    if let Err(err) = child.kill() {
        warn!("failed to kill timed-out process ({rendered}): {err}");
    }
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_status() {
        let runner = ProcessRunner::default();
        let dir = std::env::temp_dir();
        let output = runner.run(&dir, "sh", ["-c", "printf hello"]).unwrap();
        assert_eq!(output.stdout, "hello");
        assert!(output.success());
    }

    #[test]
    fn nonzero_exit_without_stderr_is_command_failed() {
        let runner = ProcessRunner::default();
        let dir = std::env::temp_dir();
        let err = runner.run(&dir, "sh", ["-c", "exit 3"]).unwrap_err();
        assert!(matches!(
            err,
            ProcessError::CommandFailed {
                status: Some(3),
                ..
            }
        ));
    }

    #[test]
    fn nonzero_exit_with_stderr_is_distinct() {
        let runner = ProcessRunner::default();
        let dir = std::env::temp_dir();
        let err = runner
            .run(&dir, "sh", ["-c", "echo boom >&2; exit 1"])
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessError::CommandFailedWithStderr { .. }
        ));
    }

    #[test]
    fn deadline_kills_runaway_process() {
        let runner = ProcessRunner::new(Duration::from_millis(200));
        let dir = std::env::temp_dir();
        let err = runner.run(&dir, "sh", ["-c", "sleep 30"]).unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }
}
