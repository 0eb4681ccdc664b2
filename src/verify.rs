//! Build verification: runs the project's verify command and captures the
//! outcome.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Command;

use tracing::info;

/// Result of one verify invocation. The transcript is empty exactly when
/// the build succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub success: bool,
    pub transcript: String,
}

impl BuildOutcome {
    pub fn succeeded() -> Self {
        BuildOutcome {
            success: true,
            transcript: String::new(),
        }
    }

    pub fn failed(transcript: impl Into<String>) -> Self {
        BuildOutcome {
            success: false,
            transcript: transcript.into(),
        }
    }
}

/// Something that can verify a working tree. The production runner shells
/// out; tests script outcomes instead.
pub trait BuildRunner {
    fn verify(&self, root: &Path) -> BuildOutcome;
}

/// Runs a caller-supplied command (whitespace-split into argv, no shell)
/// in the tree root, blocking until it exits. There is no internal
/// timeout; wrap the command in `timeout(1)` or similar if one is needed.
pub struct CommandRunner {
    command: String,
}

impl CommandRunner {
    pub fn new(command: impl Into<String>) -> Self {
        CommandRunner {
            command: command.into(),
        }
    }
}

impl BuildRunner for CommandRunner {
    fn verify(&self, root: &Path) -> BuildOutcome {
        let mut words = self.command.split_whitespace();
        let Some(program) = words.next() else {
            return BuildOutcome::failed("verify command is empty");
        };

        info!("running verify command: {}", self.command);
        let output = Command::new(program)
            .args(words)
            .current_dir(root)
            .output();

        match output {
            Ok(out) if out.status.success() => BuildOutcome::succeeded(),
            Ok(out) => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                let stderr = String::from_utf8_lossy(&out.stderr);
                BuildOutcome::failed(format!(
                    "--- STDOUT ---\n{}\n\n--- STDERR ---\n{}",
                    stdout, stderr
                ))
            }
            Err(err) => BuildOutcome::failed(format!(
                "failed to run verify command `{}`: {}",
                self.command, err
            )),
        }
    }
}

/// Test runner that replays queued outcomes in order. Once the queue is
/// empty it keeps reporting success.
pub struct ScriptedRunner {
    outcomes: RefCell<VecDeque<BuildOutcome>>,
    calls: RefCell<usize>,
}

impl ScriptedRunner {
    pub fn new(outcomes: Vec<BuildOutcome>) -> Self {
        ScriptedRunner {
            outcomes: RefCell::new(outcomes.into()),
            calls: RefCell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }
}

impl BuildRunner for ScriptedRunner {
    fn verify(&self, _root: &Path) -> BuildOutcome {
        *self.calls.borrow_mut() += 1;
        self.outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(BuildOutcome::succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_successful_command_has_empty_transcript() {
        let dir = tempdir().unwrap();
        let outcome = CommandRunner::new("true").verify(dir.path());
        assert!(outcome.success);
        assert!(outcome.transcript.is_empty());
    }

    #[test]
    fn test_failing_command_captures_transcript() {
        let dir = tempdir().unwrap();
        let outcome = CommandRunner::new("false").verify(dir.path());
        assert!(!outcome.success);
        assert!(outcome.transcript.contains("STDOUT"));
        assert!(outcome.transcript.contains("STDERR"));
    }

    #[test]
    fn test_missing_program_reports_failure() {
        let dir = tempdir().unwrap();
        let outcome = CommandRunner::new("definitely-not-a-real-binary-xyz").verify(dir.path());
        assert!(!outcome.success);
        assert!(!outcome.transcript.is_empty());
    }

    #[test]
    fn test_empty_command_reports_failure() {
        let dir = tempdir().unwrap();
        let outcome = CommandRunner::new("   ").verify(dir.path());
        assert!(!outcome.success);
    }

    #[test]
    fn test_scripted_runner_replays_then_succeeds() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new(vec![BuildOutcome::failed("boom")]);
        assert!(!runner.verify(dir.path()).success);
        assert!(runner.verify(dir.path()).success);
        assert_eq!(runner.calls(), 2);
    }
}
