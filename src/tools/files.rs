//! Type-safe arguments for the coreutils steps around key and image files.
//!
//! - `ZeroFillArgs` for `head --bytes=N /dev/zero > path`
//! - `RandomKeyArgs` for `dd if=/dev/urandom of=path bs=N count=1`
//! - `ChownArgs`, `ChmodArgs` for the key file permission fix-up
//! - `RemoveArgs` for `rm --force path`

use std::path::PathBuf;

use crate::context::{ExecOptions, quote};
use crate::size::ByteSize;
use crate::tool_traits::ToolArgs;

/// Account that owns generated key files.
pub const KEY_FILE_OWNER: &str = "root:root";

/// Permission bits of generated key files (owner read/write only).
pub const KEY_FILE_MODE: u32 = 0o600;

/// Write exactly `size` zero bytes to `path`, truncating it first.
///
/// `head` has no output-file flag, so this runs through `sh -c` with the
/// path shell-quoted.
#[derive(Debug, Clone)]
pub struct ZeroFillArgs {
    pub path: PathBuf,
    pub size: ByteSize,
}

impl ToolArgs for ZeroFillArgs {
    fn program(&self) -> &'static str {
        "sh"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "-c".to_string(),
            format!(
                "head --bytes={} /dev/zero > {}",
                self.size.bytes(),
                quote(&self.path.display().to_string())
            ),
        ]
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions::default()
    }

    fn is_destructive(&self) -> bool {
        true
    }
}

/// Write one block of `size` random bytes to `path`.
#[derive(Debug, Clone)]
pub struct RandomKeyArgs {
    pub path: PathBuf,
    pub size: ByteSize,
}

impl ToolArgs for RandomKeyArgs {
    fn program(&self) -> &'static str {
        "dd"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "if=/dev/urandom".to_string(),
            format!("of={}", self.path.display()),
            format!("bs={}", self.size.bytes()),
            "count=1".to_string(),
        ]
    }

    /// dd reports statistics on stderr; `status=none` is not portable to
    /// older coreutils, so the output is discarded instead.
    fn exec_options(&self) -> ExecOptions {
        ExecOptions::default().sudo(true).silent(true)
    }

    fn is_destructive(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct ChownArgs {
    pub path: PathBuf,
    /// `user:group`
    pub owner: String,
}

impl ToolArgs for ChownArgs {
    fn program(&self) -> &'static str {
        "chown"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![self.owner.clone(), self.path.display().to_string()]
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions::default().sudo(true)
    }
}

#[derive(Debug, Clone)]
pub struct ChmodArgs {
    pub path: PathBuf,
    pub mode: u32,
}

impl ToolArgs for ChmodArgs {
    fn program(&self) -> &'static str {
        "chmod"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![format!("{:o}", self.mode), self.path.display().to_string()]
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions::default().sudo(true)
    }
}

#[derive(Debug, Clone)]
pub struct RemoveArgs {
    pub path: PathBuf,
}

impl ToolArgs for RemoveArgs {
    fn program(&self) -> &'static str {
        "rm"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["--force".to_string(), self.path.display().to_string()]
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions::default().sudo(true)
    }

    fn is_destructive(&self) -> bool {
        true
    }
}
