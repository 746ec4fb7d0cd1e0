//! `/etc/crypttab` parsing.
//!
//! One entry per line, whitespace separated:
//!
//! ```text
//! <target> <source device> [<key file> [<options>]]
//! ```
//!
//! Options are comma separated. Lines starting with `#` and blank lines are
//! ignored. Source devices given as `UUID=`, `LABEL=`, `PARTUUID=` or
//! `PARTLABEL=` specs are resolved to their `/dev/disk/by-*` symlinks.
//!
//! Entries are read fresh on every call. Whether a target is unlocked is
//! probed on the execution context at parse time, never cached.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::context::ExecutionContext;
use crate::error::{CryptError, Result};

/// Default location of the crypttab file.
pub const DEFAULT_CRYPTTAB: &str = "/etc/crypttab";

/// Directory holding device-mapper nodes of unlocked targets.
pub const MAPPER_DIR: &str = "/dev/mapper";

/// Option marking an entry as a LUKS volume.
pub const LUKS_OPTION: &str = "luks";

/// One parsed crypttab line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrypttabEntry {
    pub target: String,
    pub source_device: PathBuf,
    /// `None` when the passphrase is prompted for (`none`, `-` or absent)
    pub key_file: Option<PathBuf>,
    pub options: Vec<String>,
    /// Whether `/dev/mapper/<target>` existed when the entry was parsed
    pub is_unlocked: bool,
}

impl CrypttabEntry {
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    pub fn is_luks(&self) -> bool {
        self.has_option(LUKS_OPTION)
    }

    /// Path of the mapped device once unlocked.
    pub fn mapper_path(&self) -> PathBuf {
        mapper_path(&self.target)
    }
}

impl fmt::Display for CrypttabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.target,
            self.source_device.display(),
            self.key_file
                .as_ref()
                .map(|k| k.display().to_string())
                .unwrap_or_else(|| "none".to_string()),
            if self.options.is_empty() {
                "-".to_string()
            } else {
                self.options.join(",")
            }
        )
    }
}

/// `/dev/mapper/<target>`
pub fn mapper_path(target: &str) -> PathBuf {
    Path::new(MAPPER_DIR).join(target)
}

/// Resolve `UUID=`/`LABEL=`/`PARTUUID=`/`PARTLABEL=` specs to device paths.
pub fn resolve_device_spec(spec: &str) -> PathBuf {
    const PREFIXES: [(&str, &str); 4] = [
        ("UUID=", "/dev/disk/by-uuid"),
        ("LABEL=", "/dev/disk/by-label"),
        ("PARTUUID=", "/dev/disk/by-partuuid"),
        ("PARTLABEL=", "/dev/disk/by-partlabel"),
    ];
    for (prefix, dir) in PREFIXES {
        if let Some(value) = spec.strip_prefix(prefix) {
            return Path::new(dir).join(value);
        }
    }
    PathBuf::from(spec)
}

fn parse_key_file(field: Option<&str>) -> Option<PathBuf> {
    match field {
        None | Some("none") | Some("-") | Some("") => None,
        Some(path) => Some(PathBuf::from(path)),
    }
}

fn parse_options(field: Option<&str>) -> Vec<String> {
    field
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|option| !option.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse crypttab text. `is_unlocked` is answered by `context`.
pub fn parse_crypttab_contents(
    context: &dyn ExecutionContext,
    contents: &str,
) -> Vec<CrypttabEntry> {
    let mut entries = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            tracing::warn!("Ignoring invalid crypttab line {}: {:?}", index + 1, line);
            continue;
        }
        let target = fields[0].to_string();
        let is_unlocked = context.exists(&mapper_path(&target));
        entries.push(CrypttabEntry {
            source_device: resolve_device_spec(fields[1]),
            key_file: parse_key_file(fields.get(2).copied()),
            options: parse_options(fields.get(3).copied()),
            is_unlocked,
            target,
        });
    }
    entries
}

/// Read and parse the crypttab at `path` on `context`.
///
/// A missing file yields no entries.
pub fn parse_crypttab(context: &dyn ExecutionContext, path: &Path) -> Result<Vec<CrypttabEntry>> {
    if !context.exists(path) {
        tracing::debug!("No {} found on {}", path.display(), context.describe());
        return Ok(Vec::new());
    }
    let contents = match context.read_file(path) {
        Ok(contents) => contents,
        Err(CryptError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("{} disappeared while reading it", path.display());
            return Ok(Vec::new());
        }
        Err(err) => return Err(err),
    };
    let entries = parse_crypttab_contents(context, &contents);
    tracing::debug!("Parsed {} entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// First LUKS entry for `target`, if any.
pub fn find_luks_entry<'a>(entries: &'a [CrypttabEntry], target: &str) -> Option<&'a CrypttabEntry> {
    entries
        .iter()
        .find(|entry| entry.target == target && entry.is_luks())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RecordingContext;

    const SAMPLE: &str = "\
# <target name> <source device> <key file> <options>
vault   /dev/sdb1                                  /root/keys/vault.key  luks,discard
swap    UUID=8b1c2f0e-2d1c-4b1e-9b0a-3f5c4e7d9a10 none                  luks,tries=1

backup  LABEL=backup  -  luks,readonly
plain   /dev/sdc1
broken
";

    #[test]
    fn test_parse_sample() {
        let context = RecordingContext::new().with_path("/dev/mapper/vault");
        let entries = parse_crypttab_contents(&context, SAMPLE);
        assert_eq!(entries.len(), 4);

        assert_eq!(entries[0].target, "vault");
        assert_eq!(entries[0].source_device, PathBuf::from("/dev/sdb1"));
        assert_eq!(entries[0].key_file, Some(PathBuf::from("/root/keys/vault.key")));
        assert_eq!(entries[0].options, vec!["luks", "discard"]);
        assert!(entries[0].is_unlocked);

        assert_eq!(
            entries[1].source_device,
            PathBuf::from("/dev/disk/by-uuid/8b1c2f0e-2d1c-4b1e-9b0a-3f5c4e7d9a10")
        );
        assert_eq!(entries[1].key_file, None);
        assert!(!entries[1].is_unlocked);

        assert_eq!(entries[2].source_device, PathBuf::from("/dev/disk/by-label/backup"));
        assert_eq!(entries[2].key_file, None);
        assert!(entries[2].has_option("readonly"));

        assert_eq!(entries[3].key_file, None);
        assert!(entries[3].options.is_empty());
        assert!(!entries[3].is_luks());
    }

    #[test]
    fn test_mapper_path_is_under_dev_mapper() {
        assert_eq!(mapper_path("vault"), PathBuf::from("/dev/mapper/vault"));
        assert_eq!(mapper_path("root_crypt"), PathBuf::from("/dev/mapper/root_crypt"));
    }

    #[test]
    fn test_resolve_device_spec() {
        assert_eq!(resolve_device_spec("PARTUUID=abcd"), PathBuf::from("/dev/disk/by-partuuid/abcd"));
        assert_eq!(resolve_device_spec("PARTLABEL=data"), PathBuf::from("/dev/disk/by-partlabel/data"));
        assert_eq!(resolve_device_spec("/dev/nvme0n1p2"), PathBuf::from("/dev/nvme0n1p2"));
    }

    #[test]
    fn test_missing_crypttab_is_empty() {
        let context = RecordingContext::new();
        let entries = parse_crypttab(&context, Path::new(DEFAULT_CRYPTTAB)).unwrap();
        assert!(entries.is_empty());
        assert!(context.reads().is_empty());
    }

    #[test]
    fn test_find_luks_entry_requires_marker() {
        let context = RecordingContext::new();
        let entries = parse_crypttab_contents(
            &context,
            "data /dev/sdd1 none discard\ndata /dev/sde1 none luks\n",
        );
        let entry = find_luks_entry(&entries, "data").unwrap();
        assert_eq!(entry.source_device, PathBuf::from("/dev/sde1"));
        assert!(find_luks_entry(&entries, "other").is_none());
    }

    #[test]
    fn test_entry_display() {
        let context = RecordingContext::new();
        let entries = parse_crypttab_contents(&context, "vault /dev/sdb1 none luks,discard\n");
        assert_eq!(entries[0].to_string(), "vault /dev/sdb1 none luks,discard");
        assert_eq!(entries[0].mapper_path(), PathBuf::from("/dev/mapper/vault"));
    }
}
