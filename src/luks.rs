//! LUKS orchestration.
//!
//! Every operation builds a typed tool invocation and runs it through an
//! [`ExecutionContext`], so the same code drives the local machine, a remote
//! host over SSH, or a [`RecordingContext`](crate::context::RecordingContext)
//! in tests.
//!
//! ```no_run
//! use cryptdisks::context::LocalContext;
//! use cryptdisks::luks;
//! use cryptdisks::size::ByteSize;
//!
//! let context = LocalContext::default();
//! luks::create_image_file(&context, "/srv/vault.img", ByteSize::new(64 * 1024 * 1024))?;
//! luks::with_temporary_key_file(&context, "/root/vault.key", ByteSize::new(2048), |key| {
//!     luks::create_encrypted_filesystem(&context, "/srv/vault.img", Some(key))?;
//!     luks::unlock_filesystem(&context, "/srv/vault.img", "vault", Some(key), &["discard"])?;
//!     luks::lock_filesystem(&context, "vault")
//! })?;
//! # Ok::<(), cryptdisks::CryptError>(())
//! ```

use std::path::{Path, PathBuf};

use crate::context::ExecutionContext;
use crate::crypttab::{self, DEFAULT_CRYPTTAB};
use crate::error::{CryptError, Result};
use crate::size::ByteSize;
use crate::tool_runner::run_tool;
use crate::tools::cryptdisks::{CryptdisksArgs, HelperAction, HelperMode};
use crate::tools::cryptsetup::{LuksCloseArgs, LuksFormatArgs, LuksOpenArgs, UnlockOptions};
use crate::tools::files::{
    ChmodArgs, ChownArgs, KEY_FILE_MODE, KEY_FILE_OWNER, RandomKeyArgs, RemoveArgs, ZeroFillArgs,
};

pub use crate::tools::cryptsetup::DEFAULT_TRIES;

/// Default size in bytes of generated key files.
pub const DEFAULT_KEY_SIZE: u64 = 2048;

// ============================================================================
// Image and key files
// ============================================================================

/// Create (or truncate) `path` as an image file of exactly `size` zero bytes.
pub fn create_image_file(
    context: &dyn ExecutionContext,
    path: impl AsRef<Path>,
    size: ByteSize,
) -> Result<()> {
    let path = path.as_ref();
    tracing::debug!("Creating image file of {} bytes: {}", size.bytes(), path.display());
    run_tool(
        context,
        &ZeroFillArgs {
            path: path.to_path_buf(),
            size,
        },
    )?;
    Ok(())
}

/// Generate a key file of `size` random bytes, owned by root with mode 600.
///
/// The three steps run in order and the first failure aborts the rest. A
/// failed permission fix-up leaves the key file in place.
pub fn generate_key_file(
    context: &dyn ExecutionContext,
    path: impl AsRef<Path>,
    size: ByteSize,
) -> Result<()> {
    let path = path.as_ref().to_path_buf();
    tracing::debug!("Creating key file of {} bytes: {}", size.bytes(), path.display());
    run_tool(
        context,
        &RandomKeyArgs {
            path: path.clone(),
            size,
        },
    )?;
    run_tool(
        context,
        &ChownArgs {
            path: path.clone(),
            owner: KEY_FILE_OWNER.to_string(),
        },
    )?;
    run_tool(
        context,
        &ChmodArgs {
            path,
            mode: KEY_FILE_MODE,
        },
    )?;
    Ok(())
}

// ============================================================================
// cryptsetup
// ============================================================================

/// Format `device` as a LUKS volume.
///
/// Without a key file cryptsetup asks the operator for a passphrase.
pub fn create_encrypted_filesystem(
    context: &dyn ExecutionContext,
    device: impl AsRef<Path>,
    key_file: Option<&Path>,
) -> Result<()> {
    let device = device.as_ref();
    tracing::debug!("Creating encrypted filesystem on {} ..", device.display());
    run_tool(
        context,
        &LuksFormatArgs {
            device: device.to_path_buf(),
            key_file: key_file.map(Path::to_path_buf),
        },
    )?;
    Ok(())
}

/// Unlock `device` as `/dev/mapper/<target>`.
///
/// `options` are crypttab-style tokens: `discard`, `readonly` and `tries=N`
/// are honored, anything else is ignored. When prompting for a passphrase,
/// failed attempts are retried up to `tries` times whatever the cause. With a
/// key file the first failure is returned.
pub fn unlock_filesystem<S: AsRef<str>>(
    context: &dyn ExecutionContext,
    device: impl AsRef<Path>,
    target: &str,
    key_file: Option<&Path>,
    options: &[S],
) -> Result<()> {
    let device = device.as_ref();
    tracing::debug!("Unlocking filesystem {} ..", device.display());
    let options = UnlockOptions::parse(options)?;
    let args = LuksOpenArgs::new(device, target, key_file.map(Path::to_path_buf), &options);

    let mut attempt = 1;
    loop {
        match run_tool(context, &args) {
            Ok(_) => return Ok(()),
            Err(err) if err.is_command_failure() && key_file.is_none() && attempt < options.tries => {
                tracing::warn!(attempt, tries = options.tries, "Failed to unlock, retrying ..");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Lock (close) the mapping named `target`.
pub fn lock_filesystem(context: &dyn ExecutionContext, target: &str) -> Result<()> {
    tracing::debug!("Locking filesystem {} ..", target);
    run_tool(
        context,
        &LuksCloseArgs {
            target: target.to_string(),
        },
    )?;
    Ok(())
}

// ============================================================================
// cryptdisks_start / cryptdisks_stop
// ============================================================================

/// Run `cryptdisks_start` or emulate it from `/etc/crypttab`.
pub fn cryptdisks_start(context: &dyn ExecutionContext, target: &str) -> Result<()> {
    cryptdisks_start_from(context, target, DEFAULT_CRYPTTAB)
}

/// [`cryptdisks_start`] reading entries from `crypttab` when emulating.
pub fn cryptdisks_start_from(
    context: &dyn ExecutionContext,
    target: &str,
    crypttab: impl AsRef<Path>,
) -> Result<()> {
    match HelperMode::probe(context, HelperAction::Start) {
        HelperMode::Native => run_helper(context, HelperAction::Start, target),
        HelperMode::Emulated => {
            tracing::debug!("Emulating `cryptdisks_start' functionality (program not installed) ..");
            let crypttab = crypttab.as_ref();
            let entries = crypttab::parse_crypttab(context, crypttab)?;
            let entry = crypttab::find_luks_entry(&entries, target)
                .ok_or_else(|| CryptError::target_not_found(target, crypttab.display().to_string()))?;
            tracing::debug!("Matched {} entry: {}", crypttab.display(), entry);
            if entry.is_unlocked {
                tracing::debug!("Encrypted filesystem is already unlocked, doing nothing ..");
                return Ok(());
            }
            unlock_filesystem(
                context,
                &entry.source_device,
                &entry.target,
                entry.key_file.as_deref(),
                entry.options.as_slice(),
            )
        }
    }
}

/// Run `cryptdisks_stop` or emulate it from `/etc/crypttab`.
pub fn cryptdisks_stop(context: &dyn ExecutionContext, target: &str) -> Result<()> {
    cryptdisks_stop_from(context, target, DEFAULT_CRYPTTAB)
}

/// [`cryptdisks_stop`] reading entries from `crypttab` when emulating.
pub fn cryptdisks_stop_from(
    context: &dyn ExecutionContext,
    target: &str,
    crypttab: impl AsRef<Path>,
) -> Result<()> {
    match HelperMode::probe(context, HelperAction::Stop) {
        HelperMode::Native => run_helper(context, HelperAction::Stop, target),
        HelperMode::Emulated => {
            tracing::debug!("Emulating `cryptdisks_stop' functionality (program not installed) ..");
            let crypttab = crypttab.as_ref();
            let entries = crypttab::parse_crypttab(context, crypttab)?;
            let entry = crypttab::find_luks_entry(&entries, target)
                .ok_or_else(|| CryptError::target_not_found(target, crypttab.display().to_string()))?;
            tracing::debug!("Matched {} entry: {}", crypttab.display(), entry);
            if !entry.is_unlocked {
                tracing::debug!("Encrypted filesystem is already locked, doing nothing ..");
                return Ok(());
            }
            lock_filesystem(context, &entry.target)
        }
    }
}

fn run_helper(context: &dyn ExecutionContext, action: HelperAction, target: &str) -> Result<()> {
    tracing::debug!("Using the real `{}' program ..", action);
    run_tool(
        context,
        &CryptdisksArgs {
            action,
            target: target.to_string(),
        },
    )?;
    Ok(())
}

// ============================================================================
// Temporary key files
// ============================================================================

/// A generated key file that is removed when the guard goes away.
///
/// Prefer [`close`](Self::close) to observe removal failures; `Drop` only
/// logs them.
pub struct TemporaryKeyFile<'a> {
    context: &'a dyn ExecutionContext,
    path: PathBuf,
    released: bool,
}

impl<'a> TemporaryKeyFile<'a> {
    /// Generate the key file. On failure any partial file is removed before
    /// the generation error is returned.
    pub fn create(
        context: &'a dyn ExecutionContext,
        path: impl AsRef<Path>,
        size: ByteSize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Err(err) = generate_key_file(context, &path, size) {
            if let Err(cleanup) = remove_key_file(context, &path) {
                tracing::warn!("Failed to remove partial key file {}: {}", path.display(), cleanup);
            }
            return Err(err);
        }
        Ok(Self {
            context,
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the key file now.
    pub fn close(mut self) -> Result<()> {
        self.released = true;
        remove_key_file(self.context, &self.path)
    }
}

impl Drop for TemporaryKeyFile<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = remove_key_file(self.context, &self.path) {
            tracing::warn!("Failed to remove key file {}: {}", self.path.display(), err);
        }
    }
}

impl std::fmt::Debug for TemporaryKeyFile<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryKeyFile")
            .field("context", &self.context.describe())
            .field("path", &self.path)
            .field("released", &self.released)
            .finish()
    }
}

fn remove_key_file(context: &dyn ExecutionContext, path: &Path) -> Result<()> {
    tracing::debug!("Removing key file {} ..", path.display());
    run_tool(
        context,
        &RemoveArgs {
            path: path.to_path_buf(),
        },
    )?;
    Ok(())
}

/// Run `body` with a freshly generated key file and remove it afterwards.
///
/// The key file is removed whether `body` succeeds, fails or panics. An
/// error from `body` takes precedence over a removal error.
pub fn with_temporary_key_file<T, F>(
    context: &dyn ExecutionContext,
    path: impl AsRef<Path>,
    size: ByteSize,
    body: F,
) -> Result<T>
where
    F: FnOnce(&Path) -> Result<T>,
{
    let key_file = TemporaryKeyFile::create(context, path, size)?;
    match body(key_file.path()) {
        Ok(value) => {
            key_file.close()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(cleanup) = key_file.close() {
                tracing::warn!("Failed to remove key file after error: {}", cleanup);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RecordingContext;

    #[test]
    fn test_create_image_file_command() {
        let context = RecordingContext::new();
        create_image_file(&context, "/srv/vault.img", ByteSize::new(1_048_576)).unwrap();
        assert_eq!(
            context.command_strings(),
            vec!["sh -c 'head --bytes=1048576 /dev/zero > /srv/vault.img'"]
        );
        assert!(context.exists(Path::new("/srv/vault.img")));
    }

    #[test]
    fn test_generate_key_file_steps() {
        let context = RecordingContext::new();
        generate_key_file(&context, "/root/vault.key", ByteSize::new(DEFAULT_KEY_SIZE)).unwrap();
        assert_eq!(
            context.command_strings(),
            vec![
                "dd if=/dev/urandom of=/root/vault.key bs=2048 count=1",
                "chown root:root /root/vault.key",
                "chmod 600 /root/vault.key",
            ]
        );
        assert!(context.commands().iter().all(|c| c.options.sudo));
    }

    #[test]
    fn test_generate_key_file_stops_at_first_failure() {
        let context = RecordingContext::new().fail_when("chown", 1);
        let err = generate_key_file(&context, "/root/vault.key", ByteSize::new(16)).unwrap_err();
        assert!(err.is_command_failure());
        assert_eq!(context.commands().len(), 2);
        assert!(context.exists(Path::new("/root/vault.key")));
    }

    #[test]
    fn test_format_with_and_without_key() {
        let context = RecordingContext::new();
        create_encrypted_filesystem(&context, "/dev/sdb1", Some(Path::new("/root/vault.key"))).unwrap();
        create_encrypted_filesystem(&context, "/dev/sdb1", None).unwrap();
        let commands = context.commands();
        assert_eq!(
            commands[0].to_string(),
            "cryptsetup --batch-mode luksFormat /dev/sdb1 /root/vault.key"
        );
        assert!(!commands[0].options.tty);
        assert_eq!(commands[1].to_string(), "cryptsetup luksFormat /dev/sdb1");
        assert!(commands[1].options.tty);
    }

    #[test]
    fn test_unlock_succeeds_after_retry() {
        let context = RecordingContext::new().fail_when("luksOpen", 2);
        unlock_filesystem(&context, "/dev/sdb1", "vault", None, &["tries=3"]).unwrap();
        assert_eq!(context.commands().len(), 3);
        assert!(context.exists(Path::new("/dev/mapper/vault")));
    }

    #[test]
    fn test_unlock_rejects_bad_tries_before_running() {
        let context = RecordingContext::new();
        let err = unlock_filesystem(&context, "/dev/sdb1", "vault", None, &["tries=many"]).unwrap_err();
        assert!(matches!(err, CryptError::InvalidOption(_)));
        assert!(context.commands().is_empty());
    }

    #[test]
    fn test_lock_filesystem() {
        let context = RecordingContext::new().with_path("/dev/mapper/vault");
        lock_filesystem(&context, "vault").unwrap();
        assert_eq!(context.command_strings(), vec!["cryptsetup luksClose vault"]);
        assert!(!context.exists(Path::new("/dev/mapper/vault")));
    }

    #[test]
    fn test_temporary_key_file_close() {
        let context = RecordingContext::new();
        let key = TemporaryKeyFile::create(&context, "/tmp/vault.key", ByteSize::new(32)).unwrap();
        assert!(context.exists(key.path()));
        key.close().unwrap();
        assert!(!context.exists(Path::new("/tmp/vault.key")));
        assert_eq!(
            context.command_strings().last().map(String::as_str),
            Some("rm --force /tmp/vault.key")
        );
    }

    #[test]
    fn test_temporary_key_file_drop_removes_once() {
        let context = RecordingContext::new();
        {
            let _key = TemporaryKeyFile::create(&context, "/tmp/vault.key", ByteSize::new(32)).unwrap();
        }
        assert!(!context.exists(Path::new("/tmp/vault.key")));
        let removals = context
            .command_strings()
            .iter()
            .filter(|c| c.starts_with("rm "))
            .count();
        assert_eq!(removals, 1);
    }

    #[test]
    fn test_temporary_key_file_failed_acquisition_cleans_up() {
        let context = RecordingContext::new().fail_when("chmod", 1);
        let err = TemporaryKeyFile::create(&context, "/tmp/vault.key", ByteSize::new(32)).unwrap_err();
        assert!(err.is_command_failure());
        assert!(!context.exists(Path::new("/tmp/vault.key")));
    }
}
