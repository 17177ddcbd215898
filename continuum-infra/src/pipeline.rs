//! The provisioning run: probe, place, discover, key, generate, write.
//!
//! Everything is rendered in memory first. The output directory is only
//! touched once every VM has produced both of its artifacts.

use crate::artifacts::ArtifactWriter;
use crate::discover::discover_network;
use crate::hardware::probe_all;
use crate::keypair::ensure_keypair;
use crate::settings::Settings;
use crate::shell::{PhysicalMachine, Shell};
use crate::ProvisionError;
use continuum_core::{
    placement, ExperimentConfig, Generator, GeneratorSettings, NetworkEnvironment,
    PlacementRequest, ScheduleError, SshTargets,
};
use continuum_types::MachineAssignment;
use std::path::PathBuf;
use tracing::info;

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Used machines with their VMs, in machine order.
    pub machines: Vec<MachineAssignment>,
    /// Files written.
    pub artifacts: Vec<PathBuf>,
    /// `name@ip` per tier.
    pub ssh: SshTargets,
    /// Bridge and gateway the VMs use.
    pub network: NetworkEnvironment,
    /// Private key that logs into the VMs.
    pub private_key: PathBuf,
}

/// Physical machines of an experiment: this host, then the external ones.
pub fn machines_for(config: &ExperimentConfig) -> Result<Vec<PhysicalMachine>, ProvisionError> {
    Ok(PhysicalMachine::from_names(
        &config.infrastructure.external_physical_machines,
    )?)
}

/// Run a full provisioning pass over `machines`.
///
/// The first machine is the one the run is driven from; bridge discovery
/// happens there.
pub async fn provision<S: Shell>(
    config: &ExperimentConfig,
    machines: &[S],
    settings: &Settings,
) -> Result<ProvisionReport, ProvisionError> {
    let first = machines.first().ok_or(ScheduleError::NoMachines)?;

    let hosts = probe_all(machines).await?;
    let total: u64 = hosts.iter().map(|h| u64::from(h.cores)).sum();
    info!(machines = hosts.len(), cores = total, "Hardware probed");

    let request = PlacementRequest::from_config(config);
    let plan = settings.address_plan()?;
    let assignments = placement::assign(&request, &hosts, &plan)?;
    info!(
        used = assignments.len(),
        mode = %config.mode,
        "VMs placed"
    );

    let network = discover_network(first, &settings.bridges()).await?;
    let private_key = ensure_keypair(machines, &settings.ssh_public_key).await?;

    let generator_settings = GeneratorSettings {
        image_dir: settings.image_dir.clone(),
        ssh_key: settings.read_ssh_key().await?,
    };
    let generator = Generator::new(&config.infrastructure, &network, &generator_settings)?;
    let artifacts = generator.generate(&assignments)?;
    info!(vms = artifacts.len(), "Artifacts rendered");

    let writer = ArtifactWriter::new(&settings.output_dir);
    let written = writer.write(&artifacts, &assignments).await?;
    info!(
        files = written.len(),
        dir = %writer.dir().display(),
        "Artifacts written"
    );

    Ok(ProvisionReport {
        ssh: SshTargets::collect(&assignments),
        machines: assignments,
        artifacts: written,
        network,
        private_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::MockShell;
    use continuum_core::DiscoveryError;
    use std::io::Write;
    use std::net::Ipv4Addr;
    use tempfile::{NamedTempFile, TempDir};

    const CLOUD_EXPERIMENT: &str = r#"
[infrastructure]
provider = qemu
infra_only = false
cloud_nodes = 2
edge_nodes = 0
endpoint_nodes = 2
cloud_cores = 2
edge_cores = 0
endpoint_cores = 1
cloud_quota = 1.0
edge_quota = 0
endpoint_quota = 0.5
cpu_pin = false
custom_scheduling = false
network_emulation = false
network_preset = 4g
netperf = false

[resource_manager]
cloud_rm = kubernetes

[benchmark]
mode = cloud
application = image_classification
frequency = 5
docker_pull = true
delete = false
"#;

    fn local_machine(bridge_count: &str) -> MockShell {
        let shell = MockShell::default();
        shell
            .respond("lscpu", &["CPU(s): 16", "Thread(s) per core: 2"])
            .respond("uname -m", &["x86_64"])
            .respond("brctl show | grep '^br0' | wc -l", &[bridge_count])
            .respond("brctl show | grep '^virbr0' | wc -l", &["0"])
            .respond("ip route | grep ' br0 '", &["default via 10.0.0.1 dev br0"]);
        shell
    }

    fn settings(dir: &TempDir, key: &NamedTempFile) -> Settings {
        Settings {
            output_dir: dir.path().join("out"),
            ssh_public_key: key.path().to_path_buf(),
            ..Settings::default()
        }
    }

    fn ssh_key() -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".pub").tempfile().unwrap();
        writeln!(file, "ssh-rsa AAAA jdoe@host").unwrap();
        file
    }

    #[tokio::test]
    async fn cloud_experiment_on_one_machine() {
        let config = ExperimentConfig::from_ini_str(CLOUD_EXPERIMENT).unwrap();
        let dir = TempDir::new().unwrap();
        let key = ssh_key();

        let report = provision(&config, &[local_machine("1")], &settings(&dir, &key))
            .await
            .unwrap();

        assert_eq!(report.network.bridge, "br0");
        assert_eq!(report.network.gateway, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(report.machines.len(), 1);
        assert_eq!(
            report.ssh.cloud,
            vec!["cloud_controller@192.168.122.10", "cloud0@192.168.122.11"]
        );
        assert_eq!(
            report.ssh.endpoint,
            vec!["endpoint0@192.168.122.12", "endpoint1@192.168.122.13"]
        );
        assert!(report.ssh.edge.is_empty());
        assert_eq!(report.private_key, key.path().with_extension(""));

        // controller, cloud0, two endpoints, two base images
        assert_eq!(report.artifacts.len(), 6 * 2 + 1);
        let out = dir.path().join("out");
        assert!(out.join("domain_cloud_controller.xml").is_file());
        assert!(out.join("user_data_base_cloud_kubernetes0.yml").is_file());
        let user_data = std::fs::read_to_string(out.join("user_data_endpoint1.yml")).unwrap();
        assert!(user_data.starts_with("#cloud-config\n"));
        assert!(user_data.contains("ssh-rsa AAAA jdoe@host"));
    }

    #[tokio::test]
    async fn missing_bridge_writes_nothing() {
        let config = ExperimentConfig::from_ini_str(CLOUD_EXPERIMENT).unwrap();
        let dir = TempDir::new().unwrap();
        let key = ssh_key();

        let err = provision(&config, &[local_machine("0")], &settings(&dir, &key))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Discovery(DiscoveryError::BridgeNotFound { .. })
        ));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn missing_keypair_is_generated_before_reading() {
        let config = ExperimentConfig::from_ini_str(CLOUD_EXPERIMENT).unwrap();
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            output_dir: dir.path().join("out"),
            ssh_public_key: dir.path().join("keys").join("bench.pub"),
            ..Settings::default()
        };
        let shell = local_machine("1");

        // the mock never writes the key, so reading it still fails
        let err = provision(&config, &[shell.clone()], &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Settings(_)));
        assert_eq!(
            shell.commands().last().unwrap(),
            &crate::keypair::keygen_command(&dir.path().join("keys").join("bench"))
        );
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn keygen_failure_stops_the_run() {
        let config = ExperimentConfig::from_ini_str(CLOUD_EXPERIMENT).unwrap();
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("bench.pub");
        let shell = local_machine("1");
        shell.respond_with(
            &crate::keypair::keygen_command(&dir.path().join("bench")),
            &[],
            &["Saving key failed"],
        );
        let settings = Settings {
            output_dir: dir.path().join("out"),
            ssh_public_key: public,
            ..Settings::default()
        };

        let err = provision(&config, &[shell], &settings).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Keypair(_)));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn pinned_vms_beyond_capacity_fail_placement() {
        let pinned = CLOUD_EXPERIMENT.replace("cpu_pin = false", "cpu_pin = true");
        let config = ExperimentConfig::from_ini_str(&pinned).unwrap();
        let dir = TempDir::new().unwrap();
        let key = ssh_key();
        let shell = MockShell::default();
        shell
            .respond("lscpu", &["CPU(s): 2", "Thread(s) per core: 1"])
            .respond("uname -m", &["x86_64"]);

        let err = provision(&config, &[shell.clone()], &settings(&dir, &key))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Schedule(ScheduleError::InsufficientCapacity { .. })
        ));
        // discovery never ran
        assert_eq!(shell.commands(), vec!["lscpu", "uname -m"]);
    }

    #[tokio::test]
    async fn no_machines() {
        let config = ExperimentConfig::from_ini_str(CLOUD_EXPERIMENT).unwrap();
        let err = provision::<MockShell>(&config, &[], &Settings::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Schedule(ScheduleError::NoMachines)
        ));
    }

    #[test]
    fn local_machine_comes_first() {
        let config = ExperimentConfig::from_ini_str(CLOUD_EXPERIMENT).unwrap();
        let machines = machines_for(&config).unwrap();
        assert_eq!(machines.len(), 1);
        assert_eq!(machines[0].name(), "local");
    }
}
