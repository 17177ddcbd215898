//! Bridge and gateway discovery on the first physical machine.

use crate::shell::Shell;
use crate::ProvisionError;
use continuum_core::discovery::{
    bridge_count_command, gateway_command, parse_bridge_count, select_gateway, BridgeKind,
    DiscoveryError,
};
use continuum_core::NetworkEnvironment;
use tracing::{debug, info};

/// Bridges to look for, in order of preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeCandidates {
    /// Host bridge.
    pub primary: String,
    /// libvirt NAT bridge.
    pub fallback: String,
}

impl Default for BridgeCandidates {
    fn default() -> Self {
        Self {
            primary: "br0".to_string(),
            fallback: "virbr0".to_string(),
        }
    }
}

async fn bridge_exists(shell: &dyn Shell, bridge: &str) -> Result<bool, ProvisionError> {
    let out = shell.process(&bridge_count_command(bridge), true).await?;
    let count = parse_bridge_count(bridge, &out.output, &out.error)?;
    debug!(bridge, count, "Bridge lookup");
    Ok(count > 0)
}

/// Pick the bridge VMs attach to and the gateway they route through.
pub async fn discover_network(
    shell: &dyn Shell,
    candidates: &BridgeCandidates,
) -> Result<NetworkEnvironment, ProvisionError> {
    info!(machine = shell.name(), "Discover network bridge and gateway");

    let (bridge, kind) = if bridge_exists(shell, &candidates.primary).await? {
        (&candidates.primary, BridgeKind::Primary)
    } else if bridge_exists(shell, &candidates.fallback).await? {
        (&candidates.fallback, BridgeKind::Fallback)
    } else {
        return Err(DiscoveryError::BridgeNotFound {
            tried: vec![candidates.primary.clone(), candidates.fallback.clone()],
        }
        .into());
    };

    let out = shell.process(&gateway_command(bridge), true).await?;
    let gateway = select_gateway(bridge, kind, &out.output, &out.error)?;
    info!(bridge = %bridge, %gateway, "Network discovered");

    Ok(NetworkEnvironment {
        bridge: bridge.clone(),
        gateway,
    })
}
