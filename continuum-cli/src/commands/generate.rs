//! Generate VM artifacts for an experiment.

use anyhow::{Context, Result};
use continuum_infra::{pipeline, ProvisionReport, Settings};
use std::path::{Path, PathBuf};
use tracing::info;

/// Run the generate command.
pub async fn run(config_path: &Path, settings_path: Option<&Path>, output: Option<PathBuf>) -> Result<()> {
    let config = super::load_experiment(config_path).await?;
    let mut settings = Settings::load(settings_path).context("Failed to load tool settings")?;
    if let Some(output) = output {
        settings.output_dir = output;
    }

    let machines = pipeline::machines_for(&config)?;
    info!(machines = machines.len(), mode = %config.mode, "Start provisioning");
    let report = pipeline::provision(&config, &machines, &settings).await?;

    println!("{}", summary(&report, &settings.output_dir));
    Ok(())
}

fn summary(report: &ProvisionReport, output_dir: &Path) -> String {
    let mut lines = vec![
        format!(
            "Wrote {} file(s) to {}",
            report.artifacts.len(),
            output_dir.display()
        ),
        format!(
            "Bridge {} via gateway {}",
            report.network.bridge, report.network.gateway
        ),
    ];
    lines.extend(report.machines.iter().map(|machine| {
        format!(
            "  {} ({}): {} VM(s), {} base image(s)",
            machine.machine,
            machine.arch,
            machine.nodes().count() - machine.bases.len(),
            machine.bases.len()
        )
    }));

    lines.push("To access the VMs:".to_string());
    for (label, targets) in [
        ("cloud", &report.ssh.cloud),
        ("edge", &report.ssh.edge),
        ("endpoint", &report.ssh.endpoint),
    ] {
        lines.extend(
            targets
                .iter()
                .map(|target| format!("  [{label}] ssh {target} -i {}", report.private_key.display())),
        );
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use continuum_core::{NetworkEnvironment, SshTargets};
    use continuum_types::{Architecture, MachineAssignment, NodeSlot};
    use std::net::Ipv4Addr;

    #[test]
    fn summary_lists_ssh_targets() {
        let mut machine = MachineAssignment::new("local", Architecture::X86_64);
        machine
            .endpoints
            .push(NodeSlot::new(Ipv4Addr::new(192, 168, 122, 10), "endpoint0"));
        machine
            .bases
            .push(NodeSlot::new(Ipv4Addr::new(192, 168, 122, 210), "base_endpoint0"));
        let report = ProvisionReport {
            ssh: SshTargets::collect(std::slice::from_ref(&machine)),
            machines: vec![machine],
            artifacts: vec![PathBuf::from("out/domain_endpoint0.xml")],
            network: NetworkEnvironment {
                bridge: "virbr0".into(),
                gateway: Ipv4Addr::new(192, 168, 122, 1),
            },
            private_key: PathBuf::from("/home/jdoe/.ssh/id_rsa_benchmark"),
        };

        let text = summary(&report, Path::new("out"));
        assert!(text.starts_with("Wrote 1 file(s) to out\n"));
        assert!(text.contains("Bridge virbr0 via gateway 192.168.122.1"));
        assert!(text.contains("local (x86_64): 1 VM(s), 1 base image(s)"));
        assert!(text.contains(
            "[endpoint] ssh endpoint0@192.168.122.10 -i /home/jdoe/.ssh/id_rsa_benchmark"
        ));
        assert!(!text.contains("[cloud]"));
    }
}
