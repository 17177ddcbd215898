//! VM placement and addressing.
//!
//! Placement happens in two steps:
//! - a scheduler decides how many VMs of each tier go on each physical
//!   machine ([`schedule_greedy`] when vCPUs are pinned, [`schedule_custom`]
//!   when the experiment lists per-machine counts, [`schedule_balanced`]
//!   otherwise);
//! - [`assign`] drops idle machines and hands every VM its logical name and
//!   address, including the cloud controller and the per-machine base images.
//!
//! Names and addresses come from global counters, so they are unique across
//! the whole testbed and stable for identical inputs.

use crate::config::{ExperimentConfig, NodeCounts};
use continuum_types::{
    CloudManager, DeploymentMode, EdgeManager, HostInfo, MachineAssignment, NodeSlot, Tier,
};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Name of the cloud node that runs the resource-manager control plane.
pub const CLOUD_CONTROLLER: &str = "cloud_controller";

/// Errors from scheduling and addressing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// No physical machine to place VMs on.
    #[error("no physical machines available")]
    NoMachines,

    /// Pinned VMs do not fit on the offered hardware.
    #[error("not all VMs fit on the available hardware ({remaining} left); request fewer nodes or cores, or add machines")]
    InsufficientCapacity {
        /// VMs that could not be placed.
        remaining: u64,
    },

    /// The address prefix is not three dotted octets.
    #[error("invalid address prefix: {0}")]
    InvalidPrefix(String),

    /// Ran out of host addresses in the prefix.
    #[error("address space exhausted: host octet {host} does not fit in {limit}")]
    AddressSpaceExhausted {
        /// Host octet that would be needed.
        host: u32,
        /// Exclusive upper bound for this kind of node.
        limit: u32,
    },

    /// Custom scheduling lists a different number of machines than there are hosts.
    #[error("custom schedule covers {configured} machines but {available} are available")]
    ScheduleMachineCount {
        /// Machines in the custom schedule.
        configured: usize,
        /// Hosts available.
        available: usize,
    },

    /// A tier hosts VMs but has no resource manager to name its base image after.
    #[error("{0} nodes placed but no {0} resource manager configured")]
    ManagerMissing(Tier),
}

/// How VM addresses are derived: `<prefix>.<host>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPlan {
    prefix: [u8; 3],
    first_host: u8,
    base_offset: u8,
}

impl Default for AddressPlan {
    fn default() -> Self {
        Self {
            prefix: [192, 168, 122],
            first_host: 10,
            base_offset: 200,
        }
    }
}

impl AddressPlan {
    /// Build a plan from a dotted three-octet prefix such as `192.168.122`.
    pub fn new(prefix: &str, first_host: u8, base_offset: u8) -> Result<Self, ScheduleError> {
        let invalid = || ScheduleError::InvalidPrefix(prefix.to_string());
        let octets = prefix
            .split('.')
            .map(|part| part.trim().parse::<u8>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        let prefix: [u8; 3] = octets.try_into().map_err(|_| invalid())?;
        Ok(Self {
            prefix,
            first_host,
            base_offset,
        })
    }

    fn address(&self, host: u32, limit: u32) -> Result<Ipv4Addr, ScheduleError> {
        let octet = u8::try_from(host)
            .ok()
            .filter(|_| host < limit)
            .ok_or(ScheduleError::AddressSpaceExhausted { host, limit })?;
        let [a, b, c] = self.prefix;
        Ok(Ipv4Addr::new(a, b, c, octet))
    }

    /// How many benchmark VMs fit below the base-image range.
    pub fn node_capacity(&self) -> u32 {
        let first = u32::from(self.first_host);
        (first + u32::from(self.base_offset)).min(256) - first
    }

    /// Address of the `index`-th benchmark VM.
    ///
    /// Benchmark VMs must stay below the base-image range.
    pub fn node_address(&self, index: u32) -> Result<Ipv4Addr, ScheduleError> {
        let base = u32::from(self.first_host) + u32::from(self.base_offset);
        self.address(u32::from(self.first_host) + index, base.min(256))
    }

    /// Address of the `index`-th base image.
    pub fn base_address(&self, index: u32) -> Result<Ipv4Addr, ScheduleError> {
        let host = u32::from(self.first_host) + u32::from(self.base_offset) + index;
        self.address(host, 256)
    }
}

/// What placement needs from the experiment description.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRequest {
    /// VMs to place per tier.
    pub nodes: NodeCounts,
    /// vCPUs per VM, per tier.
    pub cores: NodeCounts,
    /// Whether vCPUs are pinned (selects the greedy scheduler).
    pub cpu_pin: bool,
    /// Provisioning only: no controller, one generic base image per machine.
    pub infra_only: bool,
    /// Inferred deployment mode.
    pub mode: DeploymentMode,
    /// Cloud resource manager, names cloud base images.
    pub cloud_rm: Option<CloudManager>,
    /// Edge resource manager, names edge base images.
    pub edge_rm: Option<EdgeManager>,
    /// Per-machine counts given in the experiment description.
    pub custom: Option<Vec<NodeCounts>>,
}

impl PlacementRequest {
    /// Extract the placement inputs of a validated experiment.
    pub fn from_config(config: &ExperimentConfig) -> Self {
        let infra = &config.infrastructure;
        let rm = config.resource_manager.unwrap_or_default();
        Self {
            nodes: infra.nodes,
            cores: NodeCounts {
                cloud: infra.cloud.cores,
                edge: infra.edge.cores,
                endpoint: infra.endpoint.cores,
            },
            cpu_pin: infra.cpu_pin,
            infra_only: infra.infra_only,
            mode: config.mode,
            cloud_rm: rm.cloud_rm,
            edge_rm: rm.edge_rm,
            custom: config.custom_schedule.clone(),
        }
    }

    /// Tiers in placement order, each repeated once per requested VM.
    fn vms(&self) -> impl Iterator<Item = Tier> + '_ {
        Tier::ALL
            .iter()
            .flat_map(move |&tier| std::iter::repeat(tier).take(self.nodes.get(tier) as usize))
    }
}

fn bump(counts: &mut NodeCounts, tier: Tier) {
    match tier {
        Tier::Cloud => counts.cloud += 1,
        Tier::Edge => counts.edge += 1,
        Tier::Endpoint => counts.endpoint += 1,
    }
}

/// Spread VMs over machines by utilization.
///
/// Each VM (clouds, then edges, then endpoints) goes to the machine with the
/// lowest used/total core ratio; ties go to the earliest machine.
pub fn schedule_balanced(
    request: &PlacementRequest,
    hosts: &[HostInfo],
) -> Result<Vec<NodeCounts>, ScheduleError> {
    if hosts.is_empty() {
        return Err(ScheduleError::NoMachines);
    }
    let mut counts = vec![NodeCounts::default(); hosts.len()];
    let mut used = vec![0u64; hosts.len()];

    for tier in request.vms() {
        let ratio = |i: usize| match hosts[i].cores {
            0 => f64::INFINITY,
            cores => used[i] as f64 / f64::from(cores),
        };
        let mut target = 0;
        for i in 1..hosts.len() {
            if ratio(i) < ratio(target) {
                target = i;
            }
        }
        used[target] += u64::from(request.cores.get(tier));
        bump(&mut counts[target], tier);
    }
    Ok(counts)
}

/// Fit pinned VMs greedily.
///
/// Machine 0 is filled first; once a VM does not fit, scheduling moves to
/// the next machine and never returns to earlier ones.
pub fn schedule_greedy(
    request: &PlacementRequest,
    hosts: &[HostInfo],
) -> Result<Vec<NodeCounts>, ScheduleError> {
    let Some(first) = hosts.first() else {
        return Err(ScheduleError::NoMachines);
    };
    let mut counts = vec![NodeCounts::default(); hosts.len()];
    let mut node = 0;
    let mut cores_left = first.cores;

    for (placed, tier) in request.vms().enumerate() {
        let need = request.cores.get(tier);
        while need > cores_left {
            node += 1;
            let Some(host) = hosts.get(node) else {
                return Err(ScheduleError::InsufficientCapacity {
                    remaining: request.nodes.total() - placed as u64,
                });
            };
            cores_left = host.cores;
        }
        cores_left -= need;
        bump(&mut counts[node], tier);
    }
    Ok(counts)
}

/// Take the per-machine counts as written, one entry per machine in order.
pub fn schedule_custom(
    custom: &[NodeCounts],
    hosts: &[HostInfo],
) -> Result<Vec<NodeCounts>, ScheduleError> {
    if hosts.is_empty() {
        return Err(ScheduleError::NoMachines);
    }
    if custom.len() != hosts.len() {
        return Err(ScheduleError::ScheduleMachineCount {
            configured: custom.len(),
            available: hosts.len(),
        });
    }
    Ok(custom.to_vec())
}

/// Pick the scheduler: pinning wins over a custom schedule, which wins over
/// balancing.
pub fn schedule(
    request: &PlacementRequest,
    hosts: &[HostInfo],
) -> Result<Vec<NodeCounts>, ScheduleError> {
    match &request.custom {
        _ if request.cpu_pin => schedule_greedy(request, hosts),
        Some(custom) => schedule_custom(custom, hosts),
        None => schedule_balanced(request, hosts),
    }
}

/// Global name and address counters shared by all machines.
#[derive(Debug, Default)]
struct Counters {
    address: u32,
    base: u32,
    cloud: u32,
    edge: u32,
    endpoint: u32,
}

impl Counters {
    fn next_name(&mut self, tier: Tier) -> String {
        let (prefix, counter) = match tier {
            Tier::Cloud => ("cloud", &mut self.cloud),
            Tier::Edge => ("edge", &mut self.edge),
            Tier::Endpoint => ("endpoint", &mut self.endpoint),
        };
        let name = format!("{prefix}{counter}");
        *counter += 1;
        name
    }

    fn node(&mut self, plan: &AddressPlan, name: String) -> Result<NodeSlot, ScheduleError> {
        let ip = plan.node_address(self.address)?;
        self.address += 1;
        Ok(NodeSlot::new(ip, name))
    }

    fn base(&mut self, plan: &AddressPlan, name: String) -> Result<NodeSlot, ScheduleError> {
        let ip = plan.base_address(self.base)?;
        self.base += 1;
        Ok(NodeSlot::new(ip, name))
    }
}

/// Schedule, drop idle machines, then name and address every VM.
pub fn assign(
    request: &PlacementRequest,
    hosts: &[HostInfo],
    plan: &AddressPlan,
) -> Result<Vec<MachineAssignment>, ScheduleError> {
    let total = request.nodes.total();
    let capacity = plan.node_capacity();
    if total > u64::from(capacity) {
        return Err(ScheduleError::AddressSpaceExhausted {
            host: u32::try_from(u64::from(plan.first_host) + total).unwrap_or(u32::MAX),
            limit: u32::from(plan.first_host) + capacity,
        });
    }
    let counts = schedule(request, hosts)?;
    let used: Vec<_> = hosts
        .iter()
        .zip(counts)
        .filter(|(_, counts)| counts.total() > 0)
        .collect();

    let mut counters = Counters::default();
    let mut machines = Vec::with_capacity(used.len());

    for (index, (host, mut counts)) in used.into_iter().enumerate() {
        let mut machine = MachineAssignment::new(host.name.clone(), host.arch);

        if index == 0
            && !request.infra_only
            && request.mode != DeploymentMode::Endpoint
            && counts.cloud > 0
        {
            let slot = counters.node(plan, CLOUD_CONTROLLER.to_string())?;
            machine.cloud_controllers.push(slot);
            counts.cloud -= 1;
        }

        for &tier in Tier::ALL {
            for _ in 0..counts.get(tier) {
                let name = counters.next_name(tier);
                let slot = counters.node(plan, name)?;
                match tier {
                    Tier::Cloud => machine.clouds.push(slot),
                    Tier::Edge => machine.edges.push(slot),
                    Tier::Endpoint => machine.endpoints.push(slot),
                }
            }
        }

        for name in base_names(request, &machine, index)? {
            let slot = counters.base(plan, name)?;
            machine.bases.push(slot);
        }

        machines.push(machine);
    }
    Ok(machines)
}

fn base_names(
    request: &PlacementRequest,
    machine: &MachineAssignment,
    index: usize,
) -> Result<Vec<String>, ScheduleError> {
    if request.infra_only {
        return Ok(vec![format!("base{index}")]);
    }
    let mut names = Vec::new();
    if machine.cloud_count() > 0 {
        let rm = request
            .cloud_rm
            .ok_or(ScheduleError::ManagerMissing(Tier::Cloud))?;
        names.push(format!("base_cloud_{rm}{index}"));
    }
    if !machine.edges.is_empty() {
        let rm = request
            .edge_rm
            .ok_or(ScheduleError::ManagerMissing(Tier::Edge))?;
        names.push(format!("base_edge_{rm}{index}"));
    }
    if !machine.endpoints.is_empty() {
        names.push(format!("base_endpoint{index}"));
    }
    Ok(names)
}

/// `name@ip` targets per tier, used to reach the VMs once they boot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshTargets {
    /// Cloud controller and cloud workers.
    pub cloud: Vec<String>,
    /// Edge workers.
    pub edge: Vec<String>,
    /// Endpoints.
    pub endpoint: Vec<String>,
}

impl SshTargets {
    /// Collect targets over all machines in order.
    pub fn collect(machines: &[MachineAssignment]) -> Self {
        let mut targets = Self::default();
        for machine in machines {
            targets.cloud.extend(
                machine
                    .cloud_controllers
                    .iter()
                    .chain(&machine.clouds)
                    .map(NodeSlot::ssh_target),
            );
            targets
                .edge
                .extend(machine.edges.iter().map(NodeSlot::ssh_target));
            targets
                .endpoint
                .extend(machine.endpoints.iter().map(NodeSlot::ssh_target));
        }
        targets
    }
}
