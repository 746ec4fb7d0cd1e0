//! Type-safe arguments for the Debian `cryptdisks_start` / `cryptdisks_stop`
//! helpers, and the probe that decides whether they can be used.

use strum::{Display, EnumString};

use crate::context::{ExecOptions, ExecutionContext};
use crate::tool_traits::ToolArgs;

/// Which helper program is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum HelperAction {
    #[strum(serialize = "cryptdisks_start")]
    Start,
    #[strum(serialize = "cryptdisks_stop")]
    Stop,
}

impl HelperAction {
    pub fn program(&self) -> &'static str {
        match self {
            HelperAction::Start => "cryptdisks_start",
            HelperAction::Stop => "cryptdisks_stop",
        }
    }
}

/// Whether a helper runs natively or is emulated from crypttab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum HelperMode {
    #[strum(serialize = "native")]
    Native,
    #[strum(serialize = "emulated")]
    Emulated,
}

impl HelperMode {
    /// Check whether `action`'s program is installed on `context`.
    pub fn probe(context: &dyn ExecutionContext, action: HelperAction) -> Self {
        tracing::debug!("Checking if `{}' program is installed ..", action);
        if context.find_program(action.program()) {
            HelperMode::Native
        } else {
            HelperMode::Emulated
        }
    }
}

/// Run the real helper for one crypttab target.
///
/// The helper may prompt for a passphrase, so it gets the terminal.
#[derive(Debug, Clone)]
pub struct CryptdisksArgs {
    pub action: HelperAction,
    pub target: String,
}

impl ToolArgs for CryptdisksArgs {
    fn program(&self) -> &'static str {
        self.action.program()
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![self.target.clone()]
    }

    fn exec_options(&self) -> ExecOptions {
        ExecOptions::default().sudo(true).tty(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RecordingContext;

    #[test]
    fn test_helper_action_names() {
        assert_eq!(HelperAction::Start.to_string(), "cryptdisks_start");
        assert_eq!(HelperAction::Stop.program(), "cryptdisks_stop");
        assert_eq!("cryptdisks_stop".parse::<HelperAction>().unwrap(), HelperAction::Stop);
    }

    #[test]
    fn test_probe_selects_mode() {
        let with_helpers = RecordingContext::new().with_program("cryptdisks_start");
        assert_eq!(HelperMode::probe(&with_helpers, HelperAction::Start), HelperMode::Native);
        assert_eq!(HelperMode::probe(&with_helpers, HelperAction::Stop), HelperMode::Emulated);
    }

    #[test]
    fn test_cryptdisks_args() {
        let args = CryptdisksArgs {
            action: HelperAction::Stop,
            target: "vault".to_string(),
        };
        assert_eq!(args.to_command().to_string(), "cryptdisks_stop vault");
        assert!(args.exec_options().sudo);
    }
}
