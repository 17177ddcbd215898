//! The SSH keypair used to log into every VM.
//!
//! The pair lives on the first machine. It is generated there with
//! `ssh-keygen` when the public half is missing, then copied into
//! `~/.ssh/` of every other machine so each can reach its own VMs.

use crate::shell::{Shell, ShellError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Line `ssh-keygen` prints when it saved a key.
const SAVED_MARKER: &str = "Your public key has been saved in";

/// Errors from preparing the keypair.
#[derive(Debug, Error)]
pub enum KeypairError {
    /// The configured public key has no `.pub` extension to strip.
    #[error("SSH public key {0} must end in .pub")]
    NotAPublicKey(PathBuf),

    /// Checking for the public key failed.
    #[error("failed to check for {path}: {source}")]
    Io {
        /// Public key path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A key command reported an error.
    #[error("`{command}` failed on {machine}: {message}")]
    Command {
        /// Machine the command ran on.
        machine: String,
        /// Command as run.
        command: String,
        /// stderr, or unexpected stdout.
        message: String,
    },

    /// A key command could not be run.
    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// Private half of `public`: the same path without `.pub`.
pub fn private_key_path(public: &Path) -> Result<PathBuf, KeypairError> {
    match public.extension() {
        Some(ext) if ext == "pub" => Ok(public.with_extension("")),
        _ => Err(KeypairError::NotAPublicKey(public.to_path_buf())),
    }
}

pub(crate) fn keygen_command(private: &Path) -> String {
    let keygen = format!(
        "ssh-keygen -t rsa -b 4096 -f '{}' -C continuum -N '' -q",
        private.display()
    );
    match private.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        Some(dir) => format!("mkdir -p '{}' && {keygen}", dir.display()),
        None => keygen,
    }
}

pub(crate) fn copy_command(private: &Path, machine: &str) -> String {
    format!(
        "scp '{key}' '{key}.pub' {machine}:./.ssh/",
        key = private.display()
    )
}

async fn run<S: Shell>(shell: &S, command: &str) -> Result<(), KeypairError> {
    let out = shell.process(command, true).await?;
    let unexpected =
        !out.output.is_empty() && !out.output.iter().any(|line| line.contains(SAVED_MARKER));
    if out.error.is_empty() && !unexpected {
        return Ok(());
    }
    let message = if out.error.is_empty() {
        out.output.join("\n")
    } else {
        out.error.join("\n")
    };
    Err(KeypairError::Command {
        machine: shell.name().to_string(),
        command: command.to_string(),
        message,
    })
}

/// Make sure the keypair behind `public_key` exists and is on every machine.
///
/// Generates the pair on the first machine if `public_key` is missing, then
/// copies both halves from there to the others. Returns the private key
/// path.
pub async fn ensure_keypair<S: Shell>(
    machines: &[S],
    public_key: &Path,
) -> Result<PathBuf, KeypairError> {
    let private = private_key_path(public_key)?;
    let Some((first, others)) = machines.split_first() else {
        return Ok(private);
    };

    let exists = tokio::fs::try_exists(public_key)
        .await
        .map_err(|source| KeypairError::Io {
            path: public_key.to_path_buf(),
            source,
        })?;
    if exists {
        debug!(key = %public_key.display(), "SSH keypair present");
    } else {
        run(first, &keygen_command(&private)).await?;
        info!(key = %public_key.display(), "SSH keypair created");
    }

    for machine in others {
        run(first, &copy_command(&private, machine.name())).await?;
        debug!(machine = machine.name(), "SSH keypair copied");
    }
    Ok(private)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::MockShell;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn private_key_drops_pub() {
        assert_eq!(
            private_key_path(Path::new("/home/jdoe/.ssh/id_rsa_benchmark.pub")).unwrap(),
            PathBuf::from("/home/jdoe/.ssh/id_rsa_benchmark")
        );
        assert!(matches!(
            private_key_path(Path::new("/home/jdoe/.ssh/id_rsa_benchmark")),
            Err(KeypairError::NotAPublicKey(_))
        ));
    }

    #[test]
    fn keygen_creates_the_key_directory() {
        assert_eq!(
            keygen_command(Path::new("/keys/bench")),
            "mkdir -p '/keys' && ssh-keygen -t rsa -b 4096 -f '/keys/bench' -C continuum -N '' -q"
        );
        assert_eq!(
            keygen_command(Path::new("bench")),
            "ssh-keygen -t rsa -b 4096 -f 'bench' -C continuum -N '' -q"
        );
    }

    #[tokio::test]
    async fn existing_key_is_left_alone() {
        let mut key = tempfile::Builder::new().suffix(".pub").tempfile().unwrap();
        writeln!(key, "ssh-rsa AAAA jdoe@host").unwrap();
        let shell = MockShell::default();

        let private = ensure_keypair(&[shell.clone()], key.path()).await.unwrap();
        assert_eq!(private, key.path().with_extension(""));
        assert!(shell.commands().is_empty());
    }

    #[tokio::test]
    async fn missing_key_is_generated_on_the_first_machine() {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("keys").join("bench.pub");
        let private = dir.path().join("keys").join("bench");
        let local = MockShell::default();
        let remote = MockShell::new("jdoe@10.0.0.2");

        ensure_keypair(&[local.clone(), remote.clone()], &public)
            .await
            .unwrap();

        assert_eq!(
            local.commands(),
            vec![
                keygen_command(&private),
                copy_command(&private, "jdoe@10.0.0.2")
            ]
        );
        assert!(local.commands()[0].contains("ssh-keygen -t rsa -b 4096"));
        assert!(local.commands()[1].ends_with("jdoe@10.0.0.2:./.ssh/"));
        assert!(remote.commands().is_empty());
    }

    #[tokio::test]
    async fn keygen_stderr_is_an_error() {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("bench.pub");
        let command = keygen_command(&dir.path().join("bench"));
        let shell = MockShell::default();
        shell.respond_with(&command, &[], &["Saving key failed: Permission denied"]);

        match ensure_keypair(&[shell], &public).await {
            Err(KeypairError::Command { machine, message, .. }) => {
                assert_eq!(machine, "local");
                assert!(message.contains("Permission denied"));
            }
            other => panic!("expected command error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn keygen_confirmation_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let command = keygen_command(&dir.path().join("bench"));
        let shell = MockShell::default();
        shell.respond(&command, &["Your public key has been saved in bench.pub"]);
        assert!(ensure_keypair(&[shell], &dir.path().join("bench.pub"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn failed_copy_names_the_source_machine() {
        let mut key = tempfile::Builder::new().suffix(".pub").tempfile().unwrap();
        writeln!(key, "ssh-rsa AAAA jdoe@host").unwrap();
        let command = copy_command(&key.path().with_extension(""), "jdoe@10.0.0.2");
        let local = MockShell::default();
        local.respond_with(&command, &[], &["ssh: connect to host 10.0.0.2: No route to host"]);

        let err = ensure_keypair(&[local, MockShell::new("jdoe@10.0.0.2")], key.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed on local"));
    }
}
