//! Running commands on the local machine.

use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use super::{CommandLine, CommandOutput, ExecutionContext};
use crate::error::{CryptError, Result};
use crate::process_guard::{ChildRegistry, CommandProcessGroup};

/// Executes commands on this machine with `std::process::Command`.
///
/// Elevated commands are prefixed with `sudo --` unless the process already
/// runs as root or elevation is disabled. In dry-run mode nothing is
/// executed: every command is logged and reported as successful, while the
/// probes (`find_program`, `exists`, `read_file`) still look at the real
/// system so the preview matches what would happen.
#[derive(Debug, Clone)]
pub struct LocalContext {
    sudo_program: String,
    use_sudo: bool,
    dry_run: bool,
}

impl Default for LocalContext {
    fn default() -> Self {
        Self {
            sudo_program: "sudo".to_string(),
            use_sudo: true,
            dry_run: false,
        }
    }
}

impl LocalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sudo_program(mut self, program: impl Into<String>) -> Self {
        self.sudo_program = program.into();
        self
    }

    /// Disable elevation entirely (commands run as the current user)
    pub fn without_sudo(mut self) -> Self {
        self.use_sudo = false;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// The argv actually spawned for `command`, including any elevation prefix.
    pub fn resolve_argv(&self, command: &CommandLine) -> Vec<String> {
        let mut argv = Vec::with_capacity(command.args.len() + 3);
        if command.options.sudo && self.use_sudo && !nix::unistd::geteuid().is_root() {
            argv.push(self.sudo_program.clone());
            argv.push("--".to_string());
        }
        argv.push(command.program.clone());
        argv.extend(command.args.iter().cloned());
        argv
    }
}

impl ExecutionContext for LocalContext {
    fn execute(&self, command: &CommandLine) -> Result<CommandOutput> {
        if self.dry_run {
            tracing::info!("[DRY RUN] Skipped: {}", command);
            return Ok(CommandOutput {
                dry_run: true,
                ..CommandOutput::default()
            });
        }

        let argv = self.resolve_argv(command);
        let mut process = Command::new(&argv[0]);
        process.args(&argv[1..]);
        run_process(process, command)
    }

    fn find_program(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn describe(&self) -> String {
        if self.dry_run {
            "local (dry run)".to_string()
        } else {
            "local".to_string()
        }
    }
}

/// Spawn `process` according to `command.options` and wait for it.
///
/// Interactive commands inherit the terminal and stay in our process group so
/// they can read a passphrase. Everything else runs in its own process group,
/// registered with the global [`ChildRegistry`] for signal cleanup.
pub(crate) fn run_process(mut process: Command, command: &CommandLine) -> Result<CommandOutput> {
    process.env("LC_ALL", "C");

    if command.options.tty {
        process
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        let status = process.status().map_err(|source| CryptError::Spawn {
            command: command.to_shell_string(),
            source,
        })?;
        return finish(command, status, String::new(), String::new());
    }

    process.stdin(Stdio::null());
    if command.options.silent {
        process.stdout(Stdio::null()).stderr(Stdio::null());
    } else {
        process.stdout(Stdio::piped()).stderr(Stdio::piped());
    }
    process.in_new_process_group();

    let child = process.spawn().map_err(|source| CryptError::Spawn {
        command: command.to_shell_string(),
        source,
    })?;
    let pid = child.id();
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid);
    }

    let output = child.wait_with_output();

    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }

    let output = output?;
    finish(
        command,
        output.status,
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}

fn finish(
    command: &CommandLine,
    status: ExitStatus,
    stdout: String,
    stderr: String,
) -> Result<CommandOutput> {
    if status.success() {
        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code: status.code(),
            dry_run: false,
        })
    } else {
        tracing::debug!(exit_code = ?status.code(), "command failed: {}", command);
        Err(command.failure(status.code(), stdout, stderr))
    }
}
