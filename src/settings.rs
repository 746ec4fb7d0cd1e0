//! Settings file handling.
//!
//! Settings are stored as JSON. Every field has a default, so a partial file
//! (or none at all) is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::{LocalContext, SshContext};
use crate::crypttab::DEFAULT_CRYPTTAB;
use crate::luks::DEFAULT_KEY_SIZE;
use crate::size::ByteSize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// crypttab read when emulating cryptdisks_start / cryptdisks_stop
    pub crypttab_path: PathBuf,
    /// Size of generated key files (bytes or a string like "4 KiB")
    pub default_key_size: ByteSize,
    pub sudo_program: String,
    pub ssh_program: String,
    /// Elevate privileged commands (ignored when already root)
    pub use_sudo: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            crypttab_path: PathBuf::from(DEFAULT_CRYPTTAB),
            default_key_size: ByteSize::new(DEFAULT_KEY_SIZE),
            sudo_program: "sudo".to_string(),
            ssh_program: "ssh".to_string(),
            use_sudo: true,
        }
    }
}

impl Settings {
    /// Save settings to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize settings to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write settings to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load settings from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings from {:?}", path.as_ref()))?;

        let settings: Self =
            serde_json::from_str(&content).context("Failed to parse settings JSON")?;

        settings
            .validate()
            .with_context(|| format!("Invalid settings in {:?}", path.as_ref()))?;

        Ok(settings)
    }

    /// Load `path` if given, otherwise use the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.crypttab_path.as_os_str().is_empty() {
            anyhow::bail!("crypttab_path must not be empty");
        }
        if self.default_key_size.bytes() == 0 {
            anyhow::bail!("default_key_size must be at least one byte");
        }
        if self.sudo_program.trim().is_empty() {
            anyhow::bail!("sudo_program must not be empty");
        }
        if self.ssh_program.trim().is_empty() {
            anyhow::bail!("ssh_program must not be empty");
        }
        Ok(())
    }

    /// Local execution context configured from these settings
    pub fn local_context(&self, dry_run: bool) -> LocalContext {
        let context = LocalContext::new()
            .with_sudo_program(self.sudo_program.clone())
            .with_dry_run(dry_run);
        if self.use_sudo {
            context
        } else {
            context.without_sudo()
        }
    }

    /// SSH execution context for `destination` (`[user@]host`)
    pub fn ssh_context(&self, destination: &str, dry_run: bool) -> SshContext {
        let context = SshContext::new(destination)
            .with_ssh_program(self.ssh_program.clone())
            .with_sudo_program(self.sudo_program.clone())
            .with_dry_run(dry_run);
        if self.use_sudo {
            context
        } else {
            context.without_sudo()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.crypttab_path, PathBuf::from("/etc/crypttab"));
        assert_eq!(settings.default_key_size.bytes(), 2048);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings {
            crypttab_path: PathBuf::from("/srv/crypttab"),
            default_key_size: ByteSize::new(4096),
            use_sudo: false,
            ..Settings::default()
        };
        settings.save_to_file(&path).unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "default_key_size": "4 KiB" }"#).unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded.default_key_size.bytes(), 4096);
        assert_eq!(loaded.sudo_program, "sudo");
        assert!(loaded.use_sudo);
    }

    #[test]
    fn test_use_sudo_applies_to_every_context() {
        use crate::context::{CommandLine, ExecOptions};

        let settings = Settings {
            use_sudo: false,
            ..Settings::default()
        };
        let close = CommandLine::new("cryptsetup", ["luksClose", "vault"])
            .with_options(ExecOptions::default().sudo(true));

        let local = settings.local_context(true);
        assert!(local.is_dry_run());
        assert_eq!(local.resolve_argv(&close), vec!["cryptsetup", "luksClose", "vault"]);

        let remote = settings.ssh_context("nas", false);
        assert_eq!(remote.remote_command(&close), "cryptsetup luksClose vault");

        let remote = Settings::default().ssh_context("nas", false);
        assert_eq!(remote.remote_command(&close), "sudo -- cryptsetup luksClose vault");
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "sudo_program": " " }"#).unwrap();
        assert!(Settings::load_from_file(&path).is_err());

        fs::write(&path, r#"{ "default_key_size": "lots" }"#).unwrap();
        assert!(Settings::load_from_file(&path).is_err());

        assert!(Settings::load_from_file(dir.path().join("missing.json")).is_err());
    }
}
