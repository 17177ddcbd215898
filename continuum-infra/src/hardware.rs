//! Hardware probing: physical core count and CPU architecture.
//!
//! Probing doubles as a reachability check; a machine that does not answer
//! `lscpu` stops the run.

use crate::shell::Shell;
use crate::ProvisionError;
use continuum_types::{Architecture, HostInfo};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from interpreting probe output.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// The probe command printed nothing.
    #[error("{machine}: `{command}` produced no output: {stderr}")]
    NoOutput {
        /// Machine name.
        machine: String,
        /// Probe command.
        command: &'static str,
        /// stderr lines joined.
        stderr: String,
    },

    /// An `lscpu` field is missing or not a number.
    #[error("{machine}: lscpu did not report a usable {field:?}")]
    MissingField {
        /// Machine name.
        machine: String,
        /// Field label.
        field: &'static str,
    },
}

const LSCPU: &str = "lscpu";
const UNAME: &str = "uname -m";
const CPUS: &str = "CPU(s):";
const THREADS_PER_CORE: &str = "Thread(s) per core:";

fn field(output: &[String], label: &'static str, machine: &str) -> Result<u32, ProbeError> {
    output
        .iter()
        .find_map(|line| line.strip_prefix(label))
        .and_then(|value| value.trim().parse().ok())
        .filter(|&n| n > 0)
        .ok_or_else(|| ProbeError::MissingField {
            machine: machine.to_string(),
            field: label,
        })
}

/// Physical cores from `lscpu`: threads divided by threads per core.
pub fn parse_lscpu(machine: &str, output: &[String]) -> Result<u32, ProbeError> {
    let threads = field(output, CPUS, machine)?;
    let per_core = field(output, THREADS_PER_CORE, machine)?;
    debug!(machine, threads, per_core, "Parsed lscpu");
    Ok(threads / per_core)
}

/// Architecture from `uname -m`; anything unrecognized is treated as x86_64.
pub fn parse_arch(machine: &str, output: &[String]) -> Architecture {
    let raw = output.first().map(|s| s.trim()).unwrap_or_default();
    raw.parse().unwrap_or_else(|_| {
        warn!(machine, arch = raw, "Architecture not recognized, assuming x86_64");
        Architecture::X86_64
    })
}

async fn run_probe(shell: &dyn Shell, command: &'static str) -> Result<Vec<String>, ProvisionError> {
    let out = shell.process(command, false).await?;
    if out.output.is_empty() {
        return Err(ProbeError::NoOutput {
            machine: shell.name().to_string(),
            command,
            stderr: out.error.join("\n"),
        }
        .into());
    }
    Ok(out.output)
}

/// Probe one machine's core count and architecture.
pub async fn probe(shell: &dyn Shell) -> Result<HostInfo, ProvisionError> {
    info!(machine = shell.name(), "Check hardware");
    let machine = shell.name();
    let cores = parse_lscpu(machine, &run_probe(shell, LSCPU).await?)?;
    let arch = parse_arch(machine, &run_probe(shell, UNAME).await?);
    Ok(HostInfo {
        name: machine.to_string(),
        arch,
        cores,
    })
}

/// Probe every machine in order.
pub async fn probe_all<S: Shell>(machines: &[S]) -> Result<Vec<HostInfo>, ProvisionError> {
    let mut hosts = Vec::with_capacity(machines.len());
    for machine in machines {
        hosts.push(probe(machine).await?);
    }
    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::MockShell;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    const LSCPU_OUTPUT: &str = "Architecture:        x86_64\n\
CPU op-mode(s):      32-bit, 64-bit\n\
CPU(s):              16\n\
On-line CPU(s) list: 0-15\n\
Thread(s) per core:  2\n\
Core(s) per socket:  8\n";

    #[test]
    fn cores_are_threads_per_thread_per_core() {
        assert_eq!(parse_lscpu("local", &lines(LSCPU_OUTPUT)).unwrap(), 8);
    }

    #[test]
    fn on_line_cpu_list_is_not_the_cpu_count() {
        let output = lines("On-line CPU(s) list: 0-3\nCPU(s): 4\nThread(s) per core: 1\n");
        assert_eq!(parse_lscpu("local", &output).unwrap(), 4);
    }

    #[test]
    fn missing_fields_are_errors() {
        assert_eq!(
            parse_lscpu("local", &lines("CPU(s): 4\n")).unwrap_err(),
            ProbeError::MissingField {
                machine: "local".into(),
                field: THREADS_PER_CORE
            }
        );
        assert!(parse_lscpu("local", &lines("CPU(s): x\nThread(s) per core: 1")).is_err());
    }

    #[test]
    fn architecture_fallback() {
        assert_eq!(parse_arch("local", &lines("aarch64\n")), Architecture::Aarch64);
        assert_eq!(parse_arch("local", &lines("riscv64")), Architecture::X86_64);
        assert_eq!(parse_arch("local", &[]), Architecture::X86_64);
    }

    #[tokio::test]
    async fn probes_through_shell() {
        let shell = MockShell::new("jdoe@10.0.0.2");
        shell
            .respond(LSCPU, &["CPU(s): 8", "Thread(s) per core: 1"])
            .respond(UNAME, &["aarch64"]);

        let host = probe(&shell).await.unwrap();
        assert_eq!(
            host,
            HostInfo {
                name: "jdoe@10.0.0.2".into(),
                arch: Architecture::Aarch64,
                cores: 8
            }
        );
        assert_eq!(shell.commands(), vec!["lscpu", "uname -m"]);
    }

    #[tokio::test]
    async fn unreachable_machine_fails() {
        let shell = MockShell::new("jdoe@10.0.0.9");
        shell.respond_with(LSCPU, &[], &["ssh: connect to host 10.0.0.9 port 22: No route to host"]);
        let err = probe(&shell).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Probe(ProbeError::NoOutput { .. })
        ));
    }
}
