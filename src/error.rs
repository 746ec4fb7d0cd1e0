//! Error handling module for cryptdisks
//!
//! Provides the crate-wide error type using thiserror. Every fallible
//! operation in the library returns [`Result`], so callers can match on the
//! three user-facing kinds (`InvalidSize`, `CommandFailed`, `TargetNotFound`)
//! without string inspection.

use thiserror::Error;

/// Main error type for cryptdisks
#[derive(Error, Debug)]
pub enum CryptError {
    /// A size value could not be normalized to a byte count
    #[error("Invalid size: {0}")]
    InvalidSize(String),

    /// An external command exited unsuccessfully
    #[error(
        "External command failed with {}: {command}{}",
        describe_exit(.exit_code),
        describe_stderr(.stderr)
    )]
    CommandFailed {
        /// The command as it would be typed into a shell
        command: String,
        /// Exit code (None if terminated by a signal)
        exit_code: Option<i32>,
        /// Captured standard output (empty for interactive commands)
        stdout: String,
        /// Captured standard error (empty for interactive commands)
        stderr: String,
    },

    /// No applicable crypttab entry exists for a target
    #[error("Encrypted filesystem not listed in {crypttab}! ({target:?})")]
    TargetNotFound { target: String, crypttab: String },

    /// An encryption option carried a value that cannot be used
    #[error("Invalid encryption option: {0}")]
    InvalidOption(String),

    /// The external program could not be started at all
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// IO errors (reading crypttab through the local context)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for cryptdisks operations
pub type Result<T> = std::result::Result<T, CryptError>;

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}

fn describe_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(" ({})", trimmed)
    }
}

// Convenient error constructors
impl CryptError {
    /// Create an invalid size error
    pub fn invalid_size(msg: impl Into<String>) -> Self {
        Self::InvalidSize(msg.into())
    }

    /// Create an invalid option error
    pub fn invalid_option(msg: impl Into<String>) -> Self {
        Self::InvalidOption(msg.into())
    }

    /// Create a target-not-found error for the given crypttab path
    pub fn target_not_found(target: impl Into<String>, crypttab: impl Into<String>) -> Self {
        Self::TargetNotFound {
            target: target.into(),
            crypttab: crypttab.into(),
        }
    }

    /// Whether this error is an unsuccessful external command
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }

    /// Exit code of a failed command, if this is one and it exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}
