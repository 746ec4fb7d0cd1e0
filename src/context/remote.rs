//! Running commands on another machine over SSH.

use std::path::Path;
use std::process::Command;

use super::local::run_process;
use super::{CommandLine, CommandOutput, ExecutionContext, quote};
use crate::error::Result;

/// Executes commands on `[user@]host` through the `ssh` client.
///
/// The remote command is quoted into a single string; elevation is a
/// `sudo` prefix on the remote side. Interactive commands get `-t` so
/// cryptsetup can prompt for a passphrase through the SSH session.
#[derive(Debug, Clone)]
pub struct SshContext {
    host: String,
    user: Option<String>,
    ssh_program: String,
    sudo_program: String,
    use_sudo: bool,
    dry_run: bool,
}

impl SshContext {
    /// Create a context for `host`, which may be given as `user@host`.
    pub fn new(host: impl AsRef<str>) -> Self {
        let (user, host) = match host.as_ref().split_once('@') {
            Some((user, host)) => (Some(user.to_string()), host.to_string()),
            None => (None, host.as_ref().to_string()),
        };
        Self {
            host,
            user,
            ssh_program: "ssh".to_string(),
            sudo_program: "sudo".to_string(),
            use_sudo: true,
            dry_run: false,
        }
    }

    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    pub fn with_sudo_program(mut self, program: impl Into<String>) -> Self {
        self.sudo_program = program.into();
        self
    }

    /// Never prefix remote commands with the elevation program
    pub fn without_sudo(mut self) -> Self {
        self.use_sudo = false;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// The remote command string, with the elevation prefix when requested.
    pub fn remote_command(&self, command: &CommandLine) -> String {
        let rendered = command.to_shell_string();
        if command.options.sudo && self.use_sudo {
            format!("{} -- {}", quote(&self.sudo_program), rendered)
        } else {
            rendered
        }
    }

    /// Full local argv of the `ssh` invocation for `command`.
    pub fn ssh_argv(&self, command: &CommandLine) -> Vec<String> {
        vec![
            self.ssh_program.clone(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            if command.options.tty { "-t" } else { "-T" }.to_string(),
            self.destination(),
            "--".to_string(),
            self.remote_command(command),
        ]
    }

    fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        let argv = self.ssh_argv(command);
        let mut process = Command::new(&argv[0]);
        process.args(&argv[1..]);
        run_process(process, command)
    }
}

impl ExecutionContext for SshContext {
    fn execute(&self, command: &CommandLine) -> Result<CommandOutput> {
        if self.dry_run {
            tracing::info!("[DRY RUN] Skipped on {}: {}", self.destination(), command);
            return Ok(CommandOutput {
                dry_run: true,
                ..CommandOutput::default()
            });
        }
        self.run(command)
    }

    // Probes bypass dry-run so previews see the remote system as it is.

    fn find_program(&self, program: &str) -> bool {
        self.run(&CommandLine::new("which", [program])).is_ok()
    }

    fn exists(&self, path: &Path) -> bool {
        self.run(&CommandLine::new("test", ["-e".to_string(), path.display().to_string()]))
            .is_ok()
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        self.run(&CommandLine::new("cat", [path.display().to_string()]))
            .map(|output| output.stdout)
    }

    fn describe(&self) -> String {
        format!("ssh://{}", self.destination())
    }
}
