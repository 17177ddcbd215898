//! Bridge and gateway discovery: commands and output interpretation.
//!
//! The commands themselves run on the first physical machine (see the infra
//! crate); this module only builds them and interprets their output, so the
//! heuristics are testable without a host.

use regex::Regex;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors from bridge and gateway discovery. All of them are fatal.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A discovery command printed to stderr or printed nothing.
    #[error("{what} query for bridge {bridge} failed: {detail}")]
    QueryFailed {
        /// `bridge` or `gateway`.
        what: &'static str,
        /// Bridge being queried.
        bridge: String,
        /// stderr, or a note that the output was empty.
        detail: String,
    },

    /// The bridge count is not a number.
    #[error("unexpected bridge count output for {bridge}: {output:?}")]
    InvalidBridgeCount {
        /// Bridge being queried.
        bridge: String,
        /// First output line.
        output: String,
    },

    /// None of the candidate bridges exists.
    #[error("could not find a network bridge (tried {})", .tried.join(", "))]
    BridgeNotFound {
        /// Bridges that were looked for.
        tried: Vec<String>,
    },

    /// The routing table has no usable gateway for the bridge.
    #[error("could not find gateway address for bridge {bridge}")]
    GatewayNotFound {
        /// Chosen bridge.
        bridge: String,
    },

    /// More than one route yields a gateway on the fallback bridge.
    #[error("found multiple gateways for bridge {bridge}: {}", .candidates.join(", "))]
    AmbiguousGateway {
        /// Chosen bridge.
        bridge: String,
        /// Every candidate found.
        candidates: Vec<String>,
    },

    /// A token looked like an IPv4 address but is not one.
    #[error("invalid gateway address: {0}")]
    InvalidGateway(String),

    /// The address pattern failed to compile.
    #[error("address pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// IPv4-looking tokens.
const IPV4_PATTERN: &str = r"(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})";

/// Which candidate bridge is in use; decides the gateway heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeKind {
    /// Host bridge (`br0`): the gateway is the first address of the first route.
    Primary,
    /// libvirt NAT bridge (`virbr0`): the gateway is the second address of
    /// the one route that carries two.
    Fallback,
}

/// Shell pipeline counting bridges whose name starts with `bridge`.
pub fn bridge_count_command(bridge: &str) -> String {
    format!("brctl show | grep '^{bridge}' | wc -l")
}

/// Shell pipeline listing routes through `bridge`.
pub fn gateway_command(bridge: &str) -> String {
    format!("ip route | grep ' {bridge} '")
}

fn check_output(
    what: &'static str,
    bridge: &str,
    output: &[String],
    error: &[String],
) -> Result<(), DiscoveryError> {
    let failed = |detail: String| DiscoveryError::QueryFailed {
        what,
        bridge: bridge.to_string(),
        detail,
    };
    if !error.is_empty() {
        return Err(failed(error.join("\n")));
    }
    if output.is_empty() {
        return Err(failed("no output".to_string()));
    }
    Ok(())
}

/// Interpret the output of [`bridge_count_command`].
pub fn parse_bridge_count(
    bridge: &str,
    output: &[String],
    error: &[String],
) -> Result<u32, DiscoveryError> {
    check_output("bridge", bridge, output, error)?;
    let first = output[0].trim();
    first
        .parse()
        .map_err(|_| DiscoveryError::InvalidBridgeCount {
            bridge: bridge.to_string(),
            output: first.to_string(),
        })
}

/// Interpret the output of [`gateway_command`].
pub fn select_gateway(
    bridge: &str,
    kind: BridgeKind,
    output: &[String],
    error: &[String],
) -> Result<Ipv4Addr, DiscoveryError> {
    check_output("gateway", bridge, output, error)?;
    let pattern = Regex::new(IPV4_PATTERN)?;
    let tokens: Vec<Vec<&str>> = output
        .iter()
        .map(|line| pattern.find_iter(line).map(|m| m.as_str()).collect())
        .collect();

    let not_found = || DiscoveryError::GatewayNotFound {
        bridge: bridge.to_string(),
    };
    let chosen = match kind {
        BridgeKind::Primary => *tokens[0].first().ok_or_else(not_found)?,
        BridgeKind::Fallback => {
            let candidates: Vec<&str> = tokens
                .iter()
                .filter(|line| line.len() > 1)
                .map(|line| line[1])
                .collect();
            match candidates.as_slice() {
                [] => return Err(not_found()),
                [one] => *one,
                _ => {
                    return Err(DiscoveryError::AmbiguousGateway {
                        bridge: bridge.to_string(),
                        candidates: candidates.iter().map(|s| s.to_string()).collect(),
                    })
                }
            }
        }
    };
    chosen
        .parse()
        .map_err(|_| DiscoveryError::InvalidGateway(chosen.to_string()))
}
