//! Per-VM identity: role, name/address slot and host architecture.

use crate::{Tier, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Role of a VM on its physical machine.
///
/// The declaration order is the creation order on every machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Cloud node running the resource-manager control plane.
    CloudController,
    /// Cloud worker.
    Cloud,
    /// Edge worker.
    Edge,
    /// Endpoint device.
    Endpoint,
    /// Base image VM from which the other VMs are cloned.
    Base,
}

impl NodeRole {
    /// Tier whose resources (cores, quota) this role consumes.
    ///
    /// Base images are sized independently and have no tier.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Self::CloudController | Self::Cloud => Some(Tier::Cloud),
            Self::Edge => Some(Tier::Edge),
            Self::Endpoint => Some(Tier::Endpoint),
            Self::Base => None,
        }
    }
}

/// A logical node: its name and its address on the testbed network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSlot {
    /// Address on the bridged network.
    pub ip: Ipv4Addr,
    /// Logical node name (also the VM and admin user name).
    pub name: String,
}

impl NodeSlot {
    /// Create a slot.
    pub fn new(ip: Ipv4Addr, name: impl Into<String>) -> Self {
        Self {
            ip,
            name: name.into(),
        }
    }

    /// `name@ip` target used to reach the VM over SSH.
    pub fn ssh_target(&self) -> String {
        format!("{}@{}", self.name, self.ip)
    }
}

/// CPU architecture of a physical machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    /// 64-bit x86, the default.
    #[default]
    #[serde(rename = "x86_64")]
    X86_64,
    /// 64-bit ARM.
    #[serde(rename = "aarch64")]
    Aarch64,
}

impl Architecture {
    /// Canonical `uname -m` spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" => Ok(Self::X86_64),
            "aarch64" => Ok(Self::Aarch64),
            other => Err(TypesError::unknown("architecture", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_order_is_creation_order() {
        let mut roles = vec![
            NodeRole::Base,
            NodeRole::Endpoint,
            NodeRole::Cloud,
            NodeRole::Edge,
            NodeRole::CloudController,
        ];
        roles.sort();
        assert_eq!(
            roles,
            vec![
                NodeRole::CloudController,
                NodeRole::Cloud,
                NodeRole::Edge,
                NodeRole::Endpoint,
                NodeRole::Base,
            ]
        );
    }

    #[test]
    fn controller_uses_cloud_resources() {
        assert_eq!(NodeRole::CloudController.tier(), Some(Tier::Cloud));
        assert_eq!(NodeRole::Base.tier(), None);
    }

    #[test]
    fn ssh_target_format() {
        let slot = NodeSlot::new(Ipv4Addr::new(192, 168, 122, 11), "cloud0");
        assert_eq!(slot.ssh_target(), "cloud0@192.168.122.11");
    }

    #[test]
    fn architecture_parse() {
        assert_eq!("aarch64".parse::<Architecture>().unwrap(), Architecture::Aarch64);
        assert!("riscv64".parse::<Architecture>().is_err());
        assert_eq!(Architecture::default(), Architecture::X86_64);
    }
}
