//! Type-safe arguments for `cryptsetup`.
//!
//! - `LuksFormatArgs` for `cryptsetup [--batch-mode] luksFormat <device> [<key-file>]`
//! - `LuksOpenArgs` for `cryptsetup [flags] luksOpen <device> <target>`
//! - `LuksCloseArgs` for `cryptsetup luksClose <target>`
//!
//! # Key files vs passphrases
//!
//! When a key file is given the command runs in batch mode without a
//! terminal. Without one, cryptsetup prompts for a passphrase, so the command
//! is attached to the terminal instead.

use std::collections::BTreeSet;
use std::path::PathBuf;

use strum::{Display, EnumString};

use crate::context::ExecOptions;
use crate::error::{CryptError, Result};
use crate::tool_traits::ToolArgs;

/// Number of unlock attempts when `tries=` is not given.
pub const DEFAULT_TRIES: u32 = 3;

// ============================================================================
// LuksFormatArgs
// ============================================================================

/// Format a device or image file as a LUKS volume. Destructive.
#[derive(Debug, Clone)]
pub struct LuksFormatArgs {
    pub device: PathBuf,
    pub key_file: Option<PathBuf>,
}

impl ToolArgs for LuksFormatArgs {
    fn program(&self) -> &'static str {
        "cryptsetup"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(4);
        if self.key_file.is_some() {
            args.push("--batch-mode".to_string());
        }
        args.push("luksFormat".to_string());
        args.push(self.device.display().to_string());
        if let Some(key_file) = &self.key_file {
            args.push(key_file.display().to_string());
        }
        args
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions::default()
            .sudo(true)
            .tty(self.key_file.is_none())
    }

    fn is_destructive(&self) -> bool {
        true
    }
}

// ============================================================================
// Unlock options
// ============================================================================

/// Encryption options from crypttab that change how a volume is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
pub enum OpenOption {
    /// Pass discard (TRIM) requests through to the device
    #[strum(serialize = "discard")]
    Discard,
    /// Map the volume read-only
    #[strum(serialize = "readonly")]
    Readonly,
}

impl OpenOption {
    pub fn flag(&self) -> &'static str {
        match self {
            OpenOption::Discard => "--allow-discards",
            OpenOption::Readonly => "--readonly",
        }
    }
}

/// Parsed unlock options: the recognized flags and the attempt limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockOptions {
    pub flags: BTreeSet<OpenOption>,
    pub tries: u32,
}

impl Default for UnlockOptions {
    fn default() -> Self {
        Self {
            flags: BTreeSet::new(),
            tries: DEFAULT_TRIES,
        }
    }
}

impl UnlockOptions {
    /// Parse crypttab-style option tokens.
    ///
    /// `discard`, `readonly` and `tries=<N>` are recognized; anything else
    /// (`luks`, `noauto`, ...) is ignored.
    ///
    /// `tries=0` is raised to a single attempt instead of failing without
    /// trying: an unlock request always reaches cryptsetup at least once.
    pub fn parse<S: AsRef<str>>(options: &[S]) -> Result<Self> {
        let mut parsed = Self::default();
        for option in options {
            let option = option.as_ref().trim();
            if let Some(value) = option.strip_prefix("tries=") {
                let tries: u32 = value.parse().map_err(|_| {
                    CryptError::invalid_option(format!(
                        "{:?} (tries must be a non-negative integer)",
                        option
                    ))
                })?;
                parsed.tries = tries.max(1);
            } else if let Ok(flag) = option.parse::<OpenOption>() {
                parsed.flags.insert(flag);
            } else {
                tracing::trace!("ignoring unlock option {:?}", option);
            }
        }
        Ok(parsed)
    }
}

// ============================================================================
// LuksOpenArgs
// ============================================================================

/// Open (unlock) a LUKS volume as `/dev/mapper/<target>`.
///
/// All flags, including `--key-file=<path>`, are sorted lexicographically
/// before `luksOpen` so the same inputs always produce the same command.
#[derive(Debug, Clone)]
pub struct LuksOpenArgs {
    pub device: PathBuf,
    pub target: String,
    pub key_file: Option<PathBuf>,
    pub flags: BTreeSet<OpenOption>,
}

impl LuksOpenArgs {
    pub fn new(
        device: impl Into<PathBuf>,
        target: impl Into<String>,
        key_file: Option<PathBuf>,
        options: &UnlockOptions,
    ) -> Self {
        Self {
            device: device.into(),
            target: target.into(),
            key_file,
            flags: options.flags.clone(),
        }
    }
}

impl ToolArgs for LuksOpenArgs {
    fn program(&self) -> &'static str {
        "cryptsetup"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut flags: Vec<String> = self.flags.iter().map(|f| f.flag().to_string()).collect();
        if let Some(key_file) = &self.key_file {
            flags.push(format!("--key-file={}", key_file.display()));
        }
        flags.sort();

        let mut args = flags;
        args.push("luksOpen".to_string());
        args.push(self.device.display().to_string());
        args.push(self.target.clone());
        args
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions::default()
            .sudo(true)
            .tty(self.key_file.is_none())
    }
}

// ============================================================================
// LuksCloseArgs
// ============================================================================

/// Close (lock) the mapping `/dev/mapper/<target>`.
#[derive(Debug, Clone)]
pub struct LuksCloseArgs {
    pub target: String,
}

impl ToolArgs for LuksCloseArgs {
    fn program(&self) -> &'static str {
        "cryptsetup"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["luksClose".to_string(), self.target.clone()]
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions::default().sudo(true)
    }
}
