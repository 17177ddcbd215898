//! Command execution on physical machines.
//!
//! # Design
//!
//! Every host interaction goes through the async [`Shell`] trait:
//! - [`PhysicalMachine`] runs commands locally or over `ssh user@host`
//! - [`MockShell`] replays scripted output for tests
//!
//! Output is returned line by line, split into stdout and stderr. Callers
//! decide what counts as failure; most discovery and probing steps treat any
//! stderr output or an empty stdout as fatal.
//!
//! # Example
//!
//! ```ignore
//! let machine = PhysicalMachine::local();
//! let out = machine.process("brctl show | grep '^br0' | wc -l", true).await?;
//! ```

mod machine;
mod mock;

pub use machine::PhysicalMachine;
pub use mock::MockShell;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from running a command.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The process could not be spawned.
    #[error("failed to run `{command}` on {machine}: {source}")]
    Spawn {
        /// Machine name.
        machine: String,
        /// Command as given.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Nothing to run.
    #[error("empty command")]
    EmptyCommand,

    /// A machine name is neither `local` nor `user@host`.
    #[error("invalid machine name {0:?}, expected user@host")]
    InvalidTarget(String),
}

/// Captured output of one command, split into lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// stdout lines.
    pub output: Vec<String>,
    /// stderr lines.
    pub error: Vec<String>,
}

impl ProcessOutput {
    /// Build from already split lines.
    pub fn new(output: Vec<String>, error: Vec<String>) -> Self {
        Self { output, error }
    }

    /// Decode raw process output; invalid UTF-8 is replaced.
    pub fn from_bytes(stdout: &[u8], stderr: &[u8]) -> Self {
        let lines = |bytes: &[u8]| -> Vec<String> {
            String::from_utf8_lossy(bytes)
                .lines()
                .map(str::to_string)
                .collect()
        };
        Self {
            output: lines(stdout),
            error: lines(stderr),
        }
    }
}

/// Something that can run commands on a physical machine.
#[async_trait]
pub trait Shell: Send + Sync {
    /// Machine name: `local` or `user@host`.
    fn name(&self) -> &str;

    /// Run a command and collect its output.
    ///
    /// With `shell`, the command is handed to `/bin/bash -c` so pipes work;
    /// otherwise it is split on whitespace and executed directly.
    async fn process(&self, command: &str, shell: bool) -> Result<ProcessOutput, ShellError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_split_into_lines() {
        let out = ProcessOutput::from_bytes(b"CPU(s): 8\nThread(s) per core: 2\n", b"");
        assert_eq!(out.output, vec!["CPU(s): 8", "Thread(s) per core: 2"]);
        assert!(out.error.is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let out = ProcessOutput::from_bytes(b"", b"bad \xff byte\n");
        assert_eq!(out.error.len(), 1);
        assert!(out.error[0].starts_with("bad "));
    }
}
