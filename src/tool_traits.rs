//! Type-safe tool argument contracts.
//!
//! Every external program the orchestrator runs (`cryptsetup`, `dd`,
//! `chown`, ...) is described by a struct implementing [`ToolArgs`]. The
//! struct is the single source of truth for the exact argv and for how the
//! command must be executed, so flag spelling and ordering are fixed at
//! compile time instead of being assembled from loose strings at call sites.
//!
//! # Example
//!
//! ```
//! use cryptdisks::tool_traits::ToolArgs;
//! use cryptdisks::tools::cryptsetup::LuksCloseArgs;
//!
//! let args = LuksCloseArgs { target: "vault".to_string() };
//! assert_eq!(args.to_cli_args(), vec!["luksClose", "vault"]);
//! assert!(args.exec_options().sudo);
//! ```

use crate::context::{CommandLine, ExecOptions};

/// Trait for typed tool invocations.
///
/// # Contract
///
/// - `program()`: the executable name, resolved on the execution context.
/// - `to_cli_args()`: arguments exactly as the program expects them.
/// - `exec_options()`: elevation, terminal and output handling.
/// - `is_destructive()`: whether the command irreversibly overwrites data.
pub trait ToolArgs {
    fn program(&self) -> &'static str;

    fn to_cli_args(&self) -> Vec<String>;

    fn exec_options(&self) -> ExecOptions;

    fn is_destructive(&self) -> bool {
        false
    }

    /// Assemble the full command line.
    fn to_command(&self) -> CommandLine {
        CommandLine::new(self.program(), self.to_cli_args()).with_options(self.exec_options())
    }
}
