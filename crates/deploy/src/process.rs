//! External command port
//!
//! Some resources expose their state only through a CLI (`kubectl get ...`).
//! [`ProcessRunner`] runs one argument vector and captures its output;
//! [`TokioProcessRunner`] does so with `tokio::process`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ProcessError;

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
    /// Exit status; `-1` when terminated by a signal.
    pub status: i32,
}

impl ProcessOutput {
    /// Output of a command that exited with status 0.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            status: 0,
        }
    }

    /// Whether the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.status == 0
    }

    /// Standard output if the command succeeded, otherwise
    /// [`ProcessError::Failed`].
    pub fn into_stdout(self, program: &str) -> Result<String, ProcessError> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(ProcessError::Failed {
                program: program.to_string(),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs external commands.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `argv[0]` with the remaining arguments and wait for it to exit.
    ///
    /// A non-zero exit is not an error at this level; see
    /// [`ProcessOutput::into_stdout`].
    async fn run(&self, argv: &[String]) -> Result<ProcessOutput, ProcessError>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner {
    timeout: Option<Duration>,
}

impl TokioProcessRunner {
    /// Runner without a deadline.
    #[must_use]
    pub const fn new() -> Self {
        Self { timeout: None }
    }

    /// Kill commands that run longer than `limit`.
    #[must_use]
    pub const fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, argv: &[String]) -> Result<ProcessOutput, ProcessError> {
        let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args).kill_on_drop(true);

        tracing::debug!(%program, ?args, "running command");
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| ProcessError::TimedOut {
                    program: program.clone(),
                    limit,
                })?,
            None => cmd.output().await,
        }
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        let status = output.status.code().unwrap_or(-1);
        if status != 0 {
            tracing::debug!(%program, status, "command exited unsuccessfully");
        }

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status,
        })
    }
}
