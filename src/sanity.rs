//! Pre-flight checks for the environment commands will run in.
//!
//! Verifies on an execution context that:
//! - the programs every operation needs are installed
//! - the optional Debian helpers are installed (otherwise they are emulated)
//!
//! and records whether this process already runs as root, in which case no
//! `sudo` prefix is needed locally.

use crate::context::ExecutionContext;
use crate::tools::cryptdisks::HelperAction;

/// Result of environment verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    /// Helpers that will be emulated from crypttab
    pub missing_helpers: Vec<String>,
    pub is_root: bool,
}

impl SanityCheckResult {
    /// Returns true if every required program is present
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty()
    }
}

/// Programs the orchestrator invokes directly
const REQUIRED_BINARIES: &[&str] = &[
    "cryptsetup", // luksFormat / luksOpen / luksClose
    "dd",         // Random key material
    "head",       // Zero-filled image files
    "chown",
    "chmod",
    "rm",
];

const OPTIONAL_BINARIES: &[HelperAction] = &[HelperAction::Start, HelperAction::Stop];

fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Check every program on `context`.
pub fn verify_environment(context: &dyn ExecutionContext) -> SanityCheckResult {
    tracing::debug!("Running pre-flight checks on {} ..", context.describe());

    let missing_binaries = REQUIRED_BINARIES
        .iter()
        .filter(|binary| !context.find_program(binary))
        .map(|binary| binary.to_string())
        .collect();

    let missing_helpers = OPTIONAL_BINARIES
        .iter()
        .map(HelperAction::program)
        .filter(|helper| !context.find_program(helper))
        .inspect(|helper| tracing::debug!("Optional helper not found: {} (will be emulated)", helper))
        .map(str::to_string)
        .collect();

    SanityCheckResult {
        missing_binaries,
        missing_helpers,
        is_root: is_running_as_root(),
    }
}

/// Map program names to the Debian packages providing them
pub fn package_for_binary(binary: &str) -> &'static str {
    match binary {
        "cryptsetup" | "cryptdisks_start" | "cryptdisks_stop" => "cryptsetup",
        "dd" | "head" | "chown" | "chmod" | "rm" => "coreutils",
        _ => "unknown",
    }
}

/// Render a report for the `check` subcommand.
pub fn format_report(result: &SanityCheckResult) -> String {
    let mut lines = Vec::new();

    if result.missing_binaries.is_empty() {
        lines.push("✓ All required programs are installed".to_string());
    } else {
        lines.push("✗ Missing required programs:".to_string());
        for binary in &result.missing_binaries {
            lines.push(format!("   • {} (install: apt install {})", binary, package_for_binary(binary)));
        }
    }

    if result.missing_helpers.is_empty() {
        lines.push("✓ cryptdisks_start / cryptdisks_stop are installed".to_string());
    } else {
        lines.push(format!(
            "• Not installed, emulated from crypttab: {}",
            result.missing_helpers.join(", ")
        ));
    }

    if result.is_root {
        lines.push("• Running as root, commands are not elevated".to_string());
    } else {
        lines.push("• Not running as root, privileged commands use sudo".to_string());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RecordingContext;

    #[test]
    fn test_verify_environment_reports_missing() {
        let context = RecordingContext::new()
            .with_program("cryptsetup")
            .with_program("dd")
            .with_program("head")
            .with_program("chown")
            .with_program("cryptdisks_start");
        let result = verify_environment(&context);
        assert_eq!(result.missing_binaries, vec!["chmod", "rm"]);
        assert_eq!(result.missing_helpers, vec!["cryptdisks_stop"]);
        assert!(!result.is_ok());
    }

    #[test]
    fn test_verify_environment_complete() {
        let context = ["cryptsetup", "dd", "head", "chown", "chmod", "rm"]
            .into_iter()
            .fold(RecordingContext::new(), |ctx, program| ctx.with_program(program));
        let result = verify_environment(&context);
        assert!(result.is_ok());
        assert_eq!(result.missing_helpers.len(), 2);
    }

    #[test]
    fn test_package_mapping() {
        assert_eq!(package_for_binary("cryptsetup"), "cryptsetup");
        assert_eq!(package_for_binary("dd"), "coreutils");
        assert_eq!(package_for_binary("mkfs.ext4"), "unknown");
    }

    #[test]
    fn test_format_report() {
        let result = SanityCheckResult {
            missing_binaries: vec!["cryptsetup".to_string()],
            missing_helpers: vec![],
            is_root: true,
        };
        let report = format_report(&result);
        assert!(report.contains("✗ Missing required programs:"));
        assert!(report.contains("apt install cryptsetup"));
        assert!(report.contains("Running as root"));
    }
}
