//! Real command execution, locally or over SSH.

use super::{ProcessOutput, Shell, ShellError};
use async_trait::async_trait;
use tracing::debug;

/// Name of the machine the tool runs on.
pub const LOCAL: &str = "local";

/// Where a machine's commands run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    /// This host.
    Local,
    /// A host reached with `ssh user@host`.
    Remote {
        /// Login user.
        user: String,
        /// Host name or address.
        host: String,
    },
}

/// A physical machine of the testbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalMachine {
    name: String,
    target: Target,
}

impl PhysicalMachine {
    /// The machine the tool runs on.
    pub fn local() -> Self {
        Self {
            name: LOCAL.to_string(),
            target: Target::Local,
        }
    }

    /// A remote machine named `user@host`.
    pub fn remote(name: &str) -> Result<Self, ShellError> {
        let invalid = || ShellError::InvalidTarget(name.to_string());
        let (user, host) = name.trim().split_once('@').ok_or_else(invalid)?;
        if user.is_empty() || host.is_empty() || host.contains('@') {
            return Err(invalid());
        }
        Ok(Self {
            name: name.trim().to_string(),
            target: Target::Remote {
                user: user.to_string(),
                host: host.to_string(),
            },
        })
    }

    /// `local` first, then every external `user@host`.
    pub fn from_names(external: &[String]) -> Result<Vec<Self>, ShellError> {
        std::iter::once(Ok(Self::local()))
            .chain(external.iter().map(|name| Self::remote(name)))
            .collect()
    }

    /// Program and arguments that run `command` on this machine.
    pub fn invocation(&self, command: &str, shell: bool) -> Result<Vec<String>, ShellError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ShellError::EmptyCommand);
        }
        let argv = match (&self.target, shell) {
            (Target::Local, true) => vec!["/bin/bash".into(), "-c".into(), command.into()],
            (Target::Local, false) => command.split_whitespace().map(str::to_string).collect(),
            (Target::Remote { user, host }, _) => vec![
                "ssh".into(),
                "-o".into(),
                "BatchMode=yes".into(),
                format!("{user}@{host}"),
                command.into(),
            ],
        };
        Ok(argv)
    }
}

#[async_trait]
impl Shell for PhysicalMachine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, command: &str, shell: bool) -> Result<ProcessOutput, ShellError> {
        let argv = self.invocation(command, shell)?;
        let Some((program, args)) = argv.split_first() else {
            return Err(ShellError::EmptyCommand);
        };
        debug!(machine = %self.name, ?argv, "Start subprocess");

        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| ShellError::Spawn {
                machine: self.name.clone(),
                command: command.to_string(),
                source,
            })?;

        Ok(ProcessOutput::from_bytes(&output.stdout, &output.stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_shell_uses_bash() {
        let machine = PhysicalMachine::local();
        assert_eq!(
            machine.invocation("ip route | grep ' br0 '", true).unwrap(),
            vec!["/bin/bash", "-c", "ip route | grep ' br0 '"]
        );
        assert_eq!(machine.invocation("uname -m", false).unwrap(), vec!["uname", "-m"]);
    }

    #[test]
    fn remote_commands_go_through_ssh() {
        let machine = PhysicalMachine::remote("jdoe@10.0.0.2").unwrap();
        assert_eq!(
            machine.target,
            Target::Remote {
                user: "jdoe".into(),
                host: "10.0.0.2".into()
            }
        );
        assert_eq!(
            machine.invocation("lscpu", false).unwrap(),
            vec!["ssh", "-o", "BatchMode=yes", "jdoe@10.0.0.2", "lscpu"]
        );
    }

    #[test]
    fn rejects_bad_names_and_commands() {
        assert!(PhysicalMachine::remote("10.0.0.2").is_err());
        assert!(PhysicalMachine::remote("@10.0.0.2").is_err());
        assert!(PhysicalMachine::remote("a@b@c").is_err());
        assert!(matches!(
            PhysicalMachine::local().invocation("  ", true),
            Err(ShellError::EmptyCommand)
        ));
    }

    #[test]
    fn local_comes_first() {
        let machines =
            PhysicalMachine::from_names(&["jdoe@10.0.0.2".into(), "jdoe@10.0.0.3".into()])
                .unwrap();
        let names: Vec<_> = machines.iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["local", "jdoe@10.0.0.2", "jdoe@10.0.0.3"]);
    }

    #[tokio::test]
    async fn runs_local_commands() {
        let out = PhysicalMachine::local()
            .process("echo one; echo two >&2", true)
            .await
            .unwrap();
        assert_eq!(out.output, vec!["one"]);
        assert_eq!(out.error, vec!["two"]);
    }
}
