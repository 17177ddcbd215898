//! Mock shell for testing.
//!
//! Allows scripting command output and capturing executed commands for
//! verification.

use super::{ProcessOutput, Shell, ShellError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock shell for testing.
///
/// Each command has a queue of scripted outputs. The last output of a queue
/// is sticky, so a command scripted once answers every call. Unscripted
/// commands produce empty output.
#[derive(Debug)]
pub struct MockShell {
    name: String,
    inner: Arc<Mutex<MockShellInner>>,
}

#[derive(Debug, Default)]
struct MockShellInner {
    responses: HashMap<String, VecDeque<ProcessOutput>>,
    commands: Vec<String>,
    fail_next: Option<String>,
}

impl Default for MockShell {
    fn default() -> Self {
        Self::new("local")
    }
}

impl MockShell {
    /// Create a mock shell for the named machine.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockShellInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue stdout lines for a command.
    pub fn respond(&self, command: &str, output: &[&str]) -> &Self {
        self.respond_with(command, output, &[])
    }

    /// Queue stdout and stderr lines for a command.
    pub fn respond_with(&self, command: &str, output: &[&str], error: &[&str]) -> &Self {
        let owned =
            |lines: &[&str]| -> Vec<String> { lines.iter().map(|s| s.to_string()).collect() };
        self.lock()
            .responses
            .entry(command.to_string())
            .or_default()
            .push_back(ProcessOutput::new(owned(output), owned(error)));
        self
    }

    /// Cause the next `process()` to fail to spawn.
    pub fn fail_next(&self, error: &str) {
        self.lock().fail_next = Some(error.to_string());
    }

    /// Every command run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }
}

impl Clone for MockShell {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Shell for MockShell {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, command: &str, _shell: bool) -> Result<ProcessOutput, ShellError> {
        let mut inner = self.lock();
        inner.commands.push(command.to_string());

        if let Some(error) = inner.fail_next.take() {
            return Err(ShellError::Spawn {
                machine: self.name.clone(),
                command: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, error),
            });
        }

        let Some(queue) = inner.responses.get_mut(command) else {
            return Ok(ProcessOutput::default());
        };
        let out = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(out.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_output_is_returned() {
        let shell = MockShell::new("local");
        shell.respond("uname -m", &["x86_64"]);

        let out = shell.process("uname -m", false).await.unwrap();
        assert_eq!(out.output, vec!["x86_64"]);
        assert_eq!(shell.commands(), vec!["uname -m"]);
    }

    #[tokio::test]
    async fn queue_advances_and_last_answer_sticks() {
        let shell = MockShell::default();
        shell.respond("wc", &["1"]).respond("wc", &["2"]);

        assert_eq!(shell.process("wc", true).await.unwrap().output, vec!["1"]);
        assert_eq!(shell.process("wc", true).await.unwrap().output, vec!["2"]);
        assert_eq!(shell.process("wc", true).await.unwrap().output, vec!["2"]);
    }

    #[tokio::test]
    async fn unscripted_command_is_empty() {
        let shell = MockShell::default();
        assert_eq!(
            shell.process("lscpu", false).await.unwrap(),
            ProcessOutput::default()
        );
    }

    #[tokio::test]
    async fn stderr_and_forced_failure() {
        let shell = MockShell::default();
        shell.respond_with("brctl show", &[], &["brctl: not found"]);
        let out = shell.process("brctl show", true).await.unwrap();
        assert_eq!(out.error, vec!["brctl: not found"]);

        shell.fail_next("no such file");
        assert!(matches!(
            shell.process("brctl show", true).await,
            Err(ShellError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let shell = MockShell::default();
        let clone = shell.clone();
        clone.process("ip route", true).await.unwrap();
        assert_eq!(shell.commands(), vec!["ip route"]);
    }
}
