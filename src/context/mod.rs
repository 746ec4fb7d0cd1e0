//! Execution contexts: where and how external commands run.
//!
//! The orchestrator never spawns processes itself. It builds a
//! [`CommandLine`] and hands it to an [`ExecutionContext`], which decides
//! whether the command runs locally or over SSH, whether it is elevated, and
//! whether it gets the terminal. Only [`ExecutionContext::execute`] is
//! required; the probes used by the crypttab emulation have default
//! implementations built on top of it.

pub mod local;
pub mod recording;
pub mod remote;

pub use local::LocalContext;
pub use recording::RecordingContext;
pub use remote::SshContext;

use std::fmt;
use std::path::Path;

use crate::error::{CryptError, Result};

/// How a single command should be run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Run with elevated privileges
    pub sudo: bool,
    /// Attach the command to the controlling terminal (interactive prompts)
    pub tty: bool,
    /// Discard the command's output instead of capturing it
    pub silent: bool,
}

impl ExecOptions {
    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

/// A program, its arguments and the options it runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub options: ExecOptions,
}

impl CommandLine {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            options: ExecOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    /// Program followed by arguments.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// The command quoted for a POSIX shell.
    pub fn to_shell_string(&self) -> String {
        self.argv().into_iter().map(quote).collect::<Vec<_>>().join(" ")
    }

    /// Build the failure for this command from its outcome.
    pub fn failure(&self, exit_code: Option<i32>, stdout: String, stderr: String) -> CryptError {
        CryptError::CommandFailed {
            command: self.to_shell_string(),
            exit_code,
            stdout,
            stderr,
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell_string())
    }
}

/// Output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output (empty when not captured).
    pub stdout: String,
    /// Standard error (empty when not captured).
    pub stderr: String,
    /// Exit code (None when the command was not actually run).
    pub exit_code: Option<i32>,
    /// Whether the command was skipped by a dry run.
    pub dry_run: bool,
}

/// Somewhere commands can be executed.
pub trait ExecutionContext {
    /// Run a command, returning its captured output or `CommandFailed`.
    fn execute(&self, command: &CommandLine) -> Result<CommandOutput>;

    /// Whether `program` can be found on this context's search path.
    fn find_program(&self, program: &str) -> bool {
        self.execute(&CommandLine::new("which", [program])).is_ok()
    }

    /// Whether `path` exists on this context's filesystem.
    fn exists(&self, path: &Path) -> bool {
        let probe = CommandLine::new("test", ["-e".to_string(), path.display().to_string()]);
        self.execute(&probe).is_ok()
    }

    /// Read a (small, text) file from this context's filesystem.
    fn read_file(&self, path: &Path) -> Result<String> {
        let cat = CommandLine::new("cat", [path.display().to_string()]);
        self.execute(&cat).map(|output| output.stdout)
    }

    /// Human readable description for log messages.
    fn describe(&self) -> String;
}

/// Quote a word for a POSIX shell, leaving safe words untouched.
pub fn quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\"'\"'"))
    }
}
