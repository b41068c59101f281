//! Command execution abstraction with privilege escalation support.
//!
//! Every system tool the library consumes is invoked through a
//! [`CommandRunner`], so tests can substitute a scripted runner and no
//! parsing code ever spawns a process itself. Mutating commands (mount,
//! umount) may additionally be wrapped with `pkexec` (GUI) or `sudo` (TTY).

use std::process::Command;

use tracing::debug;

use crate::error::{Error, IoResultExt, Result};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Creates a successful output with the given stdout.
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: Vec::new(),
            code: Some(0),
        }
    }

    /// Creates a failed output with the given exit code and stderr.
    pub fn failed(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into(),
            code: Some(code),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Converts a non-zero exit into [`Error::CommandExit`].
    pub fn check(self, command: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(Error::CommandExit {
            command: command.to_string(),
            code: self.code.unwrap_or(-1),
            stderr: self.stderr_lossy(),
        })
    }
}

/// Launches external programs and captures their output.
///
/// Implementations must not interpret exit codes; callers decide whether a
/// non-zero status is fatal or an ordinary "not found" answer.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        (**self).run(program, args)
    }
}

/// Runs commands on the host with `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        debug!(program, ?args, "running command");
        let output = Command::new(program)
            .args(args)
            .output()
            .command_context(program)?;

        debug!(program, code = ?output.status.code(), "command finished");
        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            code: output.status.code(),
        })
    }
}

/// Privilege escalation method for executing commands that require root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrivilegeEscalation {
    /// Execute directly without privilege escalation.
    #[default]
    None,
    /// Use `pkexec` for GUI-based privilege escalation (polkit).
    Pkexec,
    /// Use `sudo` for TTY-based privilege escalation.
    Sudo,
}

impl PrivilegeEscalation {
    fn wrapper(self) -> Option<&'static str> {
        match self {
            PrivilegeEscalation::None => None,
            PrivilegeEscalation::Pkexec => Some("pkexec"),
            PrivilegeEscalation::Sudo => Some("sudo"),
        }
    }
}

impl std::str::FromStr for PrivilegeEscalation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(PrivilegeEscalation::None),
            "pkexec" => Ok(PrivilegeEscalation::Pkexec),
            "sudo" => Ok(PrivilegeEscalation::Sudo),
            other => Err(format!("unknown privilege escalation '{other}'")),
        }
    }
}

/// Execution context for running system commands.
///
/// Couples a [`CommandRunner`] with the escalation used for commands that
/// mutate system state.
///
/// # Example
///
/// ```
/// use disk_manager_core::executor::{ExecutionContext, PrivilegeEscalation};
///
/// // Default: host runner, no privilege escalation
/// let ctx = ExecutionContext::default();
/// assert_eq!(ctx.escalation(), PrivilegeEscalation::None);
///
/// // For terminal applications
/// let tty_ctx = ExecutionContext::default().with_escalation(PrivilegeEscalation::Sudo);
/// assert_eq!(tty_ctx.escalation(), PrivilegeEscalation::Sudo);
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionContext<R = SystemRunner> {
    runner: R,
    escalation: PrivilegeEscalation,
}

impl Default for ExecutionContext<SystemRunner> {
    fn default() -> Self {
        Self::new(SystemRunner)
    }
}

impl<R: CommandRunner> ExecutionContext<R> {
    /// Creates a context around a specific runner with no escalation.
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            escalation: PrivilegeEscalation::None,
        }
    }

    /// Sets the escalation method for privileged commands.
    pub fn with_escalation(mut self, escalation: PrivilegeEscalation) -> Self {
        self.escalation = escalation;
        self
    }

    /// Returns the current privilege escalation method.
    pub fn escalation(&self) -> PrivilegeEscalation {
        self.escalation
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Executes a read-only query command directly.
    pub fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        self.runner.run(cmd, args)
    }

    /// Executes a command that requires root privileges.
    ///
    /// The command is wrapped with the configured escalation tool. A pkexec
    /// exit status of 126 means the user dismissed the dialog.
    pub fn run_privileged(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = match self.escalation.wrapper() {
            None => self.runner.run(cmd, args)?,
            Some(wrapper) => {
                let mut wrapped = Vec::with_capacity(args.len() + 1);
                wrapped.push(cmd);
                wrapped.extend_from_slice(args);
                self.runner.run(wrapper, &wrapped)?
            }
        };

        if self.escalation == PrivilegeEscalation::Pkexec && output.code == Some(126) {
            return Err(Error::AuthenticationCancelled);
        }
        Ok(output)
    }
}
