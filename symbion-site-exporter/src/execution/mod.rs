//! External command execution for probes
//!
//! Probes shell out to system tools (`du`, `systemctl`). This module handles:
//! - Command lines configured as plain strings (shell-words syntax)
//! - Execution with a hard timeout, killing the child when it fires
//! - Captured stdout/stderr and exit status for the caller to interpret

use std::borrow::Cow;
use std::ffi::OsString;
use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Program plus fixed leading arguments, e.g. `du -sb`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    /// Raw OS strings: site paths are not guaranteed to be UTF-8
    pub args: Vec<OsString>,
}

impl CommandLine {
    pub fn new<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a command line using shell quoting rules.
    /// Returns `Ok(None)` when the line holds no words at all.
    pub fn parse(line: &str) -> Result<Option<Self>, shell_words::ParseError> {
        let mut words = shell_words::split(line)?.into_iter();
        Ok(words.next().map(|program| Self {
            program,
            args: words.map(OsString::from).collect(),
        }))
    }

    /// Copy of this command with one trailing argument appended
    pub fn with_arg(&self, arg: impl Into<OsString>) -> Self {
        let mut command = self.clone();
        command.args.push(arg.into());
        command
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(Cow::Borrowed(self.program.as_str()))
            .chain(self.args.iter().map(|arg| arg.to_string_lossy()));
        f.write_str(&shell_words::join(words))
    }
}

/// Command execution result
#[derive(Debug)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub execution_time: Duration,
}

/// Reasons a command produced no result at all
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to execute `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

/// Runs probe commands, each bounded by the same timeout
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute a command and capture its output.
    ///
    /// A non-zero exit is not an error here: it is reported through
    /// [`ExecutionResult::success`] so probes can still read stdout.
    pub async fn run(&self, command: &CommandLine) -> Result<ExecutionResult, ExecutionError> {
        let start_time = Instant::now();
        debug!("Executing command: {} (timeout: {:?})", command, self.timeout);

        let child = AsyncCommand::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                command: command.to_string(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecutionError::Timeout {
                command: command.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| ExecutionError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let execution_time = start_time.elapsed();
        debug!(
            "Command finished: {} (status: {}, {:?})",
            command, output.status, execution_time
        );

        Ok(ExecutionResult {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            execution_time,
        })
    }
}
