//! cryptdisks library
//!
//! LUKS setup and teardown on top of `cryptsetup`, with an emulation of the
//! Debian `cryptdisks_start` / `cryptdisks_stop` helpers driven by
//! `/etc/crypttab`. Every command runs through an execution context, so the
//! same operations work locally, over SSH, or against a recording context.

pub mod cli;
pub mod context;
pub mod crypttab;
pub mod error;
pub mod luks;
pub mod process_guard;
pub mod sanity;
pub mod settings;
pub mod size;
pub mod tool_runner;
pub mod tool_traits;
pub mod tools;

// Re-export main types for convenience
pub use context::{
    CommandLine, CommandOutput, ExecOptions, ExecutionContext, LocalContext, RecordingContext,
    SshContext,
};
pub use crypttab::{CrypttabEntry, parse_crypttab};
pub use error::{CryptError, Result};
pub use luks::{
    DEFAULT_KEY_SIZE, TemporaryKeyFile, create_encrypted_filesystem, create_image_file,
    cryptdisks_start, cryptdisks_stop, generate_key_file, lock_filesystem, unlock_filesystem,
    with_temporary_key_file,
};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use settings::Settings;
pub use size::ByteSize;
pub use tool_runner::run_tool;
pub use tool_traits::ToolArgs;
pub use tools::cryptdisks::{HelperAction, HelperMode};
pub use tools::cryptsetup::{LuksCloseArgs, LuksFormatArgs, LuksOpenArgs, OpenOption, UnlockOptions};
