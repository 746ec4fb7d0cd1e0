//! An in-memory execution context for tests and previews.
//!
//! `RecordingContext` never spawns anything. It records each command, answers
//! probes from what it was configured with, and simulates the side effects
//! the orchestrator relies on: files written by `head`/`dd`, files removed by
//! `rm`, and `/dev/mapper/<target>` nodes created by `luksOpen` and removed
//! by `luksClose`. Failures can be scripted per program or argument.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::{CommandLine, CommandOutput, ExecutionContext};
use crate::error::Result;

#[derive(Debug)]
struct ScriptedFailure {
    word: String,
    remaining: Option<usize>,
    exit_code: i32,
}

#[derive(Debug, Default)]
pub struct RecordingContext {
    programs: HashSet<String>,
    files: HashMap<PathBuf, String>,
    paths: RefCell<BTreeSet<PathBuf>>,
    failures: RefCell<Vec<ScriptedFailure>>,
    commands: RefCell<Vec<CommandLine>>,
    reads: RefCell<Vec<PathBuf>>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `program` as installed.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.programs.insert(program.into());
        self
    }

    /// Provide a readable file.
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let path = path.into();
        self.paths.get_mut().insert(path.clone());
        self.files.insert(path, contents.into());
        self
    }

    /// Mark a path (device node, mapping) as existing.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.get_mut().insert(path.into());
        self
    }

    /// Fail the next `times` commands whose program or any argument equals `word`.
    pub fn fail_when(self, word: impl Into<String>, times: usize) -> Self {
        self.failures.borrow_mut().push(ScriptedFailure {
            word: word.into(),
            remaining: Some(times),
            exit_code: 1,
        });
        self
    }

    /// Fail every command whose program or any argument equals `word`.
    pub fn fail_always_when(self, word: impl Into<String>, exit_code: i32) -> Self {
        self.failures.borrow_mut().push(ScriptedFailure {
            word: word.into(),
            remaining: None,
            exit_code,
        });
        self
    }

    /// Every command executed so far, in order.
    pub fn commands(&self) -> Vec<CommandLine> {
        self.commands.borrow().clone()
    }

    /// Every command executed so far, rendered for a shell.
    pub fn command_strings(&self) -> Vec<String> {
        self.commands
            .borrow()
            .iter()
            .map(CommandLine::to_shell_string)
            .collect()
    }

    /// Files read through [`ExecutionContext::read_file`].
    pub fn reads(&self) -> Vec<PathBuf> {
        self.reads.borrow().clone()
    }

    fn scripted_failure(&self, command: &CommandLine) -> Option<i32> {
        let mut failures = self.failures.borrow_mut();
        let failure = failures.iter_mut().find(|failure| {
            failure.remaining != Some(0) && command.argv().contains(&failure.word.as_str())
        })?;
        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(failure.exit_code)
    }

    fn apply_side_effects(&self, command: &CommandLine) {
        let mut paths = self.paths.borrow_mut();
        let args = &command.args;
        match command.program.as_str() {
            "dd" => {
                if let Some(path) = args.iter().find_map(|arg| arg.strip_prefix("of=")) {
                    paths.insert(PathBuf::from(path));
                }
            }
            "rm" => {
                for arg in args.iter().filter(|arg| !arg.starts_with('-')) {
                    paths.remove(Path::new(arg));
                }
            }
            "sh" => {
                if let Some(target) = args.last().and_then(|script| redirect_target(script)) {
                    paths.insert(target);
                }
            }
            "cryptsetup" | "cryptdisks_start" | "cryptdisks_stop" => {
                let mapper = |target: &String| Path::new("/dev/mapper").join(target);
                let opening = args.iter().any(|arg| arg == "luksOpen")
                    || command.program == "cryptdisks_start";
                let closing = args.iter().any(|arg| arg == "luksClose")
                    || command.program == "cryptdisks_stop";
                if let Some(target) = args.last() {
                    if opening {
                        paths.insert(mapper(target));
                    } else if closing {
                        paths.remove(&mapper(target));
                    }
                }
            }
            _ => {}
        }
    }
}

/// Target of a `... > path` redirection in a shell snippet.
fn redirect_target(script: &str) -> Option<PathBuf> {
    let (_, target) = script.rsplit_once("> ")?;
    let target = target.trim();
    let unquoted = target
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .map(|t| t.replace("'\"'\"'", "'"))
        .unwrap_or_else(|| target.to_string());
    Some(PathBuf::from(unquoted))
}

impl ExecutionContext for RecordingContext {
    fn execute(&self, command: &CommandLine) -> Result<CommandOutput> {
        self.commands.borrow_mut().push(command.clone());

        if let Some(exit_code) = self.scripted_failure(command) {
            return Err(command.failure(
                Some(exit_code),
                String::new(),
                "simulated failure".to_string(),
            ));
        }

        self.apply_side_effects(command);
        Ok(CommandOutput {
            exit_code: Some(0),
            ..CommandOutput::default()
        })
    }

    fn find_program(&self, program: &str) -> bool {
        self.programs.contains(program)
    }

    fn exists(&self, path: &Path) -> bool {
        self.paths.borrow().contains(path)
    }

    fn read_file(&self, path: &Path) -> Result<String> {
        self.reads.borrow_mut().push(path.to_path_buf());
        self.files.get(path).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )
            .into()
        })
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_and_simulates_files() {
        let context = RecordingContext::new();
        context
            .execute(&CommandLine::new("dd", ["if=/dev/urandom", "of=/tmp/key", "bs=16", "count=1"]))
            .unwrap();
        assert!(context.exists(Path::new("/tmp/key")));

        context
            .execute(&CommandLine::new("rm", ["--force", "/tmp/key"]))
            .unwrap();
        assert!(!context.exists(Path::new("/tmp/key")));
        assert_eq!(context.commands().len(), 2);
    }

    #[test]
    fn test_scripted_failures_run_out() {
        let context = RecordingContext::new().fail_when("luksOpen", 1);
        let open = CommandLine::new("cryptsetup", ["luksOpen", "/dev/sdb1", "vault"]);

        assert!(context.execute(&open).is_err());
        assert!(!context.exists(Path::new("/dev/mapper/vault")));
        assert!(context.execute(&open).is_ok());
        assert!(context.exists(Path::new("/dev/mapper/vault")));
    }

    #[test]
    fn test_redirect_target_unquotes() {
        assert_eq!(
            redirect_target("head --bytes=10 /dev/zero > '/srv/it'\"'\"'s.img'"),
            Some(PathBuf::from("/srv/it's.img"))
        );
        assert_eq!(
            redirect_target("head --bytes=10 /dev/zero > /srv/disk.img"),
            Some(PathBuf::from("/srv/disk.img"))
        );
        assert_eq!(redirect_target("true"), None);
    }

    #[test]
    fn test_read_file_records_access() {
        let context = RecordingContext::new().with_file("/etc/crypttab", "vault /dev/sdb1\n");
        assert_eq!(
            context.read_file(Path::new("/etc/crypttab")).unwrap(),
            "vault /dev/sdb1\n"
        );
        assert!(context.read_file(Path::new("/etc/fstab")).is_err());
        assert_eq!(context.reads().len(), 2);
    }
}
