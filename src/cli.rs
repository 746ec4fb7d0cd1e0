use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::size::ByteSize;

/// cryptdisks - LUKS setup and teardown through cryptsetup
#[derive(Parser, Debug)]
#[command(name = "cryptdisks")]
#[command(about = "Create, unlock and lock LUKS volumes, with a crypttab fallback for cryptdisks_start/stop")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: log every command instead of running it.
    ///
    /// Probes (program lookup, crypttab, /dev/mapper) still look at the real
    /// system so the preview follows the same branches.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Run commands on a remote host over SSH ([user@]host)
    #[arg(long, global = true, value_name = "DESTINATION")]
    pub remote: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an image file filled with zero bytes
    CreateImage {
        /// Path of the image file
        path: PathBuf,
        /// Size in bytes or with a unit (e.g. 512MiB, 1GB)
        #[arg(short, long)]
        size: ByteSize,
    },
    /// Generate a random key file owned by root with mode 600
    GenerateKey {
        /// Path of the key file
        path: PathBuf,
        /// Key size (defaults to the configured default_key_size)
        #[arg(short, long)]
        size: Option<ByteSize>,
    },
    /// Format a device or image file as a LUKS volume
    Format {
        /// Block device or image file
        device: PathBuf,
        /// Key file (prompts for a passphrase when omitted)
        #[arg(short, long)]
        key_file: Option<PathBuf>,
    },
    /// Unlock a LUKS volume as /dev/mapper/<target>
    Unlock {
        /// Block device or image file
        device: PathBuf,
        /// Mapped device name
        target: String,
        /// Key file (prompts for a passphrase when omitted)
        #[arg(short, long)]
        key_file: Option<PathBuf>,
        /// Encryption options (discard, readonly, tries=N)
        #[arg(short, long = "option", value_delimiter = ',')]
        options: Vec<String>,
    },
    /// Lock /dev/mapper/<target>
    Lock {
        /// Mapped device name
        target: String,
    },
    /// Unlock a crypttab target (cryptdisks_start or emulation)
    Start {
        /// Target name from crypttab
        target: String,
        /// crypttab to read when emulating
        #[arg(long)]
        crypttab: Option<PathBuf>,
    },
    /// Lock a crypttab target (cryptdisks_stop or emulation)
    Stop {
        /// Target name from crypttab
        target: String,
        /// crypttab to read when emulating
        #[arg(long)]
        crypttab: Option<PathBuf>,
    },
    /// List crypttab entries and whether they are unlocked
    List {
        /// crypttab to read
        #[arg(long)]
        crypttab: Option<PathBuf>,
    },
    /// Check that the required programs are installed
    Check,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
