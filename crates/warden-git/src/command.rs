//! Git command wrapper with a 30 s timeout and retry for idempotent reads.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::warn;

use crate::error::GitError;
use crate::process::{render_command, run_with_deadline, ProcessError, ProcessOutput};

pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(500);
const RETRY_CAP: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCli {
    pub binary: PathBuf,
    pub timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }
}

impl GitCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    /// Run a git command, requiring exit 0.
    pub fn run<I, S>(&self, cwd: &Path, args: I) -> Result<GitOutput, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run_with_env(cwd, args, &[])
    }

    /// Same as [`GitCli::run`] with extra environment variables, used for
    /// `GIT_INDEX_FILE` temporary-index overrides.
    pub fn run_with_env<I, S>(
        &self,
        cwd: &Path,
        args: I,
        env: &[(OsString, OsString)],
    ) -> Result<GitOutput, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (rendered, output) = self.spawn(cwd, args, env)?;
        if !output.success() {
            if output.stderr.trim().is_empty() {
                return Err(GitError::CommandFailed {
                    command: rendered,
                    status: output.status,
                });
            }
            return Err(GitError::CommandFailedWithStderr {
                command: rendered,
                status: output.status,
                stderr: output.stderr,
            });
        }
        Ok(GitOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Retrying variant for idempotent read commands: three attempts with
    /// exponential back-off. Timeouts and stderr failures are terminal.
    pub fn run_retry<S>(&self, cwd: &Path, args: &[S]) -> Result<GitOutput, GitError>
    where
        S: AsRef<OsStr>,
    {
        self.run_retry_with_env(cwd, args, &[])
    }

    pub fn run_retry_with_env<S>(
        &self,
        cwd: &Path,
        args: &[S],
        env: &[(OsString, OsString)],
    ) -> Result<GitOutput, GitError>
    where
        S: AsRef<OsStr>,
    {
        let mut delay = RETRY_BASE;
        let mut attempt = 1;
        loop {
            match self.run_with_env(cwd, args.iter().map(AsRef::as_ref), env) {
                Ok(output) => return Ok(output),
                Err(err) if err.is_retryable() && attempt < RETRY_ATTEMPTS => {
                    warn!("git command failed (attempt {attempt}/{RETRY_ATTEMPTS}), retrying: {err}");
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(RETRY_CAP);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run without checking the exit status. Used where non-zero exits are
    /// an expected outcome (`apply --cached` conflicts, `add -N` on
    /// already-tracked paths).
    pub fn run_unchecked<I, S>(
        &self,
        cwd: &Path,
        args: I,
        env: &[(OsString, OsString)],
    ) -> Result<ProcessOutput, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (_, output) = self.spawn(cwd, args, env)?;
        Ok(output)
    }

    fn spawn<I, S>(
        &self,
        cwd: &Path,
        args: I,
        env: &[(OsString, OsString)],
    ) -> Result<(String, ProcessOutput), GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let owned_args: Vec<OsString> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        let rendered = render_command(&self.binary, &owned_args);

        let mut command = Command::new(&self.binary);
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

        let output = run_with_deadline(command, self.timeout, &rendered)
            .map_err(|err| convert(err))?;
        Ok((rendered, output))
    }
}

fn convert(err: ProcessError) -> GitError {
    match err {
        ProcessError::Io { command, source } => GitError::Io { command, source },
        ProcessError::CommandFailed { command, status } => {
            GitError::CommandFailed { command, status }
        }
        ProcessError::CommandFailedWithStderr {
            command,
            status,
            stderr,
        } => GitError::CommandFailedWithStderr {
            command,
            status,
            stderr,
        },
        ProcessError::Timeout {
            command,
            timeout_secs,
        } => GitError::Timeout {
            command,
            timeout_secs,
        },
        ProcessError::NonUtf8Output {
            command,
            stream,
            source,
        } => GitError::NonUtf8Output {
            command,
            stream,
            source,
        },
    }
}
