//! Per-VM artifact generation.
//!
//! For every node on every machine the generator builds a
//! [`VirtualMachineSpec`] and a [`ProvisioningPayload`], then renders both.
//! Nothing is written here; callers receive the finished artifacts and write
//! them only once every node has rendered.
//!
//! vCPU pinning is a fold over each machine's nodes in creation order: a
//! [`PinCursor`] is threaded from one VM to the next and never shared
//! between machines.

use crate::config::InfrastructureConfig;
use crate::domain::{cpu_quota, CpuTune, FirmwareProfile, VcpuPin, VirtualMachineSpec, CPU_PERIOD};
use crate::provision::ProvisioningPayload;
use continuum_types::{MachineAssignment, NodeRole, NodeSlot};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors from artifact generation.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// A node has an empty name.
    #[error("node name is empty")]
    EmptyNodeName,

    /// A node name cannot be used in file names or as a login.
    #[error("invalid node name: {0:?}")]
    InvalidNodeName(String),

    /// No bridge to attach VMs to.
    #[error("bridge name is empty")]
    EmptyBridge,

    /// No SSH public key to authorize.
    #[error("SSH public key is empty")]
    EmptySshKey,

    /// Pinning ran past the last addressable core.
    #[error("vCPU pinning overflows after core {next_core} ({vcpus} more requested)")]
    PinOverflow {
        /// First core not yet handed out.
        next_core: u32,
        /// vCPUs the node asked for.
        vcpus: u32,
    },

    /// Cloud-init rendering failed.
    #[error("failed to render cloud-init user data: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Accept a node name usable as a file name component and login.
pub(crate) fn check_node_name(name: String) -> Result<String, GenerateError> {
    if name.is_empty() {
        return Err(GenerateError::EmptyNodeName);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(GenerateError::InvalidNodeName(name));
    }
    Ok(name)
}

/// Bridge and gateway found on the first physical machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEnvironment {
    /// Bridge the VM NICs attach to.
    pub bridge: String,
    /// Default gateway written into every guest.
    pub gateway: Ipv4Addr,
}

/// Host-side paths and credentials baked into every VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorSettings {
    /// Directory holding the VM disk images on the physical machine.
    pub image_dir: String,
    /// SSH public key authorized for every admin user.
    pub ssh_key: String,
}

/// Next physical core to pin to on one machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinCursor {
    next_core: u32,
}

impl PinCursor {
    /// Pin `vcpus` vCPUs to the next contiguous cores and advance.
    pub fn take(self, vcpus: u32) -> Result<(Vec<VcpuPin>, Self), GenerateError> {
        let next_core = self
            .next_core
            .checked_add(vcpus)
            .ok_or(GenerateError::PinOverflow {
                next_core: self.next_core,
                vcpus,
            })?;
        let pins = (0..vcpus)
            .map(|vcpu| VcpuPin {
                vcpu,
                cpuset: self.next_core + vcpu,
            })
            .collect();
        Ok((pins, Self { next_core }))
    }

    /// First core not yet handed out.
    pub fn next_core(&self) -> u32 {
        self.next_core
    }
}

/// Both rendered artifacts of one VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeArtifacts {
    /// Node role.
    pub role: NodeRole,
    /// Node name.
    pub name: String,
    /// libvirt domain XML.
    pub domain_xml: String,
    /// cloud-init user data.
    pub user_data: String,
}

impl NodeArtifacts {
    /// `domain_<name>.xml`.
    pub fn domain_file_name(&self) -> String {
        format!("domain_{}.xml", self.name)
    }

    /// `user_data_<name>.yml`.
    pub fn user_data_file_name(&self) -> String {
        format!("user_data_{}.yml", self.name)
    }
}

/// The typed records for one VM, before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePlan {
    /// Node role.
    pub role: NodeRole,
    /// Domain descriptor.
    pub spec: VirtualMachineSpec,
    /// First-boot payload.
    pub payload: ProvisioningPayload,
}

/// Builds the descriptors and payloads for a placed testbed.
#[derive(Debug, Clone, Copy)]
pub struct Generator<'a> {
    infra: &'a InfrastructureConfig,
    network: &'a NetworkEnvironment,
    settings: &'a GeneratorSettings,
}

impl<'a> Generator<'a> {
    /// Create a generator.
    pub fn new(
        infra: &'a InfrastructureConfig,
        network: &'a NetworkEnvironment,
        settings: &'a GeneratorSettings,
    ) -> Result<Self, GenerateError> {
        if network.bridge.trim().is_empty() {
            return Err(GenerateError::EmptyBridge);
        }
        if settings.ssh_key.trim().is_empty() {
            return Err(GenerateError::EmptySshKey);
        }
        Ok(Self {
            infra,
            network,
            settings,
        })
    }

    fn node_plan(
        &self,
        firmware: FirmwareProfile,
        cursor: PinCursor,
        role: NodeRole,
        slot: &NodeSlot,
    ) -> Result<(NodePlan, PinCursor), GenerateError> {
        let (vcpus, cputune, cursor) = match role.tier() {
            None => (1, None, cursor),
            Some(tier) => {
                let resources = self.infra.resources(tier);
                let (pins, next) = if self.infra.cpu_pin {
                    cursor.take(resources.cores)?
                } else {
                    (Vec::new(), cursor)
                };
                let tune = CpuTune {
                    period: CPU_PERIOD,
                    quota: cpu_quota(resources.quota),
                    pins,
                };
                (resources.cores, Some(tune), next)
            }
        };

        let spec = VirtualMachineSpec::new(
            slot.name.clone(),
            vcpus,
            firmware,
            cputune,
            self.network.bridge.clone(),
            self.settings.image_dir.clone(),
        )?;
        let payload = ProvisioningPayload::new(
            slot.name.clone(),
            slot.ip,
            self.network.gateway,
            firmware.interface(),
            self.settings.ssh_key.clone(),
        )?;
        Ok((NodePlan { role, spec, payload }, cursor))
    }

    /// Typed records for every VM on one machine, in creation order.
    pub fn machine_plan(&self, machine: &MachineAssignment) -> Result<Vec<NodePlan>, GenerateError> {
        let firmware = FirmwareProfile::for_arch(machine.arch);
        let (plans, _) = machine.nodes().try_fold(
            (Vec::new(), PinCursor::default()),
            |(mut plans, cursor), (role, slot)| {
                let (plan, cursor) = self.node_plan(firmware, cursor, role, slot)?;
                plans.push(plan);
                Ok::<_, GenerateError>((plans, cursor))
            },
        )?;
        Ok(plans)
    }

    /// Render every VM of every machine.
    ///
    /// Fails on the first invalid node; no partial result is returned.
    pub fn generate(&self, machines: &[MachineAssignment]) -> Result<Vec<NodeArtifacts>, GenerateError> {
        let mut artifacts = Vec::new();
        for machine in machines {
            for plan in self.machine_plan(machine)? {
                artifacts.push(NodeArtifacts {
                    role: plan.role,
                    name: plan.spec.name().to_string(),
                    domain_xml: plan.spec.to_xml(),
                    user_data: plan.payload.to_cloud_config()?,
                });
            }
        }
        Ok(artifacts)
    }
}
