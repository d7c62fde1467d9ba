//! Process request and result types

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Default timeout for a shell command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Exit code reported when a command is killed for exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when a command is killed by a user interrupt.
pub const INTERRUPT_EXIT_CODE: i32 = 130;

/// Exit code reported when the shell could not be spawned.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = -1;

/// A shell command to run.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Command line passed to the shell
    pub command: String,
    /// Working directory (inherits the current one when `None`)
    pub cwd: Option<PathBuf>,
    /// Kill the process after this long
    pub timeout: Duration,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Mirror output to the terminal while it runs
    pub echo: bool,
}

impl ProcessRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
            env: Vec::new(),
            echo: false,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

/// Result of a finished (or killed) command.
///
/// Serializes with the field names tools hand back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub timed_out: bool,
    pub interrupted: bool,
}

impl ProcessOutput {
    /// Output for a process that ran to completion.
    pub fn completed(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: exit_code == 0,
            timed_out: false,
            interrupted: false,
        }
    }

    /// Output for a process killed after its timeout.
    pub fn timed_out(stdout: String, stderr: String) -> Self {
        Self {
            timed_out: true,
            ..Self::completed(TIMEOUT_EXIT_CODE, stdout, stderr)
        }
    }

    /// Output for a process killed by an interrupt.
    pub fn interrupted(stdout: String, stderr: String) -> Self {
        Self {
            interrupted: true,
            ..Self::completed(INTERRUPT_EXIT_CODE, stdout, stderr)
        }
    }

    /// Output for a shell that never started.
    pub fn spawn_failed(error: impl std::fmt::Display) -> Self {
        Self::completed(SPAWN_FAILURE_EXIT_CODE, String::new(), error.to_string())
    }
}
