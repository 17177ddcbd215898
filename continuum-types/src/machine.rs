//! Physical machines and the VMs assigned to them.

use crate::{Architecture, NodeRole, NodeSlot};
use serde::{Deserialize, Serialize};

/// Probed hardware of a physical machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Machine name: `local` or `user@host`.
    pub name: String,
    /// CPU architecture.
    pub arch: Architecture,
    /// Physical cores (threads / threads-per-core).
    pub cores: u32,
}

/// The logical nodes placed on one physical machine.
///
/// Every sequence is ordered; names and addresses are unique across the
/// whole testbed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineAssignment {
    /// Machine name: `local` or `user@host`.
    pub machine: String,
    /// CPU architecture of the machine.
    pub arch: Architecture,
    /// Cloud controller (at most one, on the first machine only).
    pub cloud_controllers: Vec<NodeSlot>,
    /// Cloud workers.
    pub clouds: Vec<NodeSlot>,
    /// Edge workers.
    pub edges: Vec<NodeSlot>,
    /// Endpoints.
    pub endpoints: Vec<NodeSlot>,
    /// Base images.
    pub bases: Vec<NodeSlot>,
}

impl MachineAssignment {
    /// Create an empty assignment for a machine.
    pub fn new(machine: impl Into<String>, arch: Architecture) -> Self {
        Self {
            machine: machine.into(),
            arch,
            ..Default::default()
        }
    }

    /// Slots of one role.
    pub fn slots(&self, role: NodeRole) -> &[NodeSlot] {
        match role {
            NodeRole::CloudController => &self.cloud_controllers,
            NodeRole::Cloud => &self.clouds,
            NodeRole::Edge => &self.edges,
            NodeRole::Endpoint => &self.endpoints,
            NodeRole::Base => &self.bases,
        }
    }

    /// All nodes in creation order: controller, clouds, edges, endpoints, base images.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeRole, &NodeSlot)> + '_ {
        [
            NodeRole::CloudController,
            NodeRole::Cloud,
            NodeRole::Edge,
            NodeRole::Endpoint,
            NodeRole::Base,
        ]
        .into_iter()
        .flat_map(move |role| self.slots(role).iter().map(move |slot| (role, slot)))
    }

    /// Number of cloud nodes including the controller.
    pub fn cloud_count(&self) -> usize {
        self.cloud_controllers.len() + self.clouds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn slot(last: u8, name: &str) -> NodeSlot {
        NodeSlot::new(Ipv4Addr::new(192, 168, 122, last), name)
    }

    #[test]
    fn nodes_follow_creation_order() {
        let mut machine = MachineAssignment::new("local", Architecture::X86_64);
        machine.bases.push(slot(210, "base0"));
        machine.endpoints.push(slot(13, "endpoint0"));
        machine.edges.push(slot(12, "edge0"));
        machine.clouds.push(slot(11, "cloud0"));
        machine.cloud_controllers.push(slot(10, "cloud_controller"));

        let names: Vec<_> = machine.nodes().map(|(_, s)| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["cloud_controller", "cloud0", "edge0", "endpoint0", "base0"]
        );
    }

    #[test]
    fn assignment_serializes_to_json() {
        let mut machine = MachineAssignment::new("jdoe@10.0.0.2", Architecture::Aarch64);
        machine.edges.push(slot(12, "edge0"));
        let json = serde_json::to_value(&machine).unwrap();
        assert_eq!(json["arch"], "aarch64");
        assert_eq!(json["edges"][0]["ip"], "192.168.122.12");
    }
}
