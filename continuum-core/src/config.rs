//! Typed view of a validated experiment description.
//!
//! [`ExperimentConfig`] is built from a [`ValidatedConfig`] once every rule
//! has passed, so lookups here only fail if the schema and this module
//! disagree.

use crate::schema::{Section, Value, BENCHMARK, INFRASTRUCTURE, RESOURCE_MANAGER};
use crate::validate::{validate, ConfigError, RawConfig, ValidatedConfig};
use continuum_types::{
    Application, CloudManager, DeploymentMode, EdgeManager, NetworkPreset, Provider, Tier,
};
use std::str::FromStr;

/// Requested number of nodes per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCounts {
    /// Cloud nodes, including the controller.
    pub cloud: u32,
    /// Edge nodes.
    pub edge: u32,
    /// Endpoints.
    pub endpoint: u32,
}

impl NodeCounts {
    /// Read the three counts from a validated section: `[infrastructure]`
    /// or a per-machine section under custom scheduling.
    pub fn from_section(section: &Section, name: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            cloud: count(section, name, "cloud_nodes")?,
            edge: count(section, name, "edge_nodes")?,
            endpoint: count(section, name, "endpoint_nodes")?,
        })
    }

    /// Total nodes over all tiers.
    pub fn total(&self) -> u64 {
        u64::from(self.cloud) + u64::from(self.edge) + u64::from(self.endpoint)
    }

    /// Count for one tier.
    pub fn get(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Cloud => self.cloud,
            Tier::Edge => self.edge,
            Tier::Endpoint => self.endpoint,
        }
    }
}

/// VM size of one tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierResources {
    /// vCPUs per VM.
    pub cores: u32,
    /// Fraction of each scheduling period a VM may run.
    pub quota: f64,
}

/// Optional overrides for one emulated link.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkSettings {
    /// Average latency in milliseconds.
    pub latency_avg: Option<f64>,
    /// Latency variation in milliseconds.
    pub latency_var: Option<f64>,
    /// Throughput in Mbit/s.
    pub throughput: Option<f64>,
}

impl LinkSettings {
    fn from_section(section: &Section, prefix: &str) -> Self {
        let lookup = |suffix: &str| {
            let key = format!("{prefix}_{suffix}");
            section.get(key.as_str()).and_then(Value::as_float)
        };
        Self {
            latency_avg: lookup("latency_avg"),
            latency_var: lookup("latency_var"),
            throughput: lookup("throughput"),
        }
    }
}

/// Network emulation settings, consumed by the network-emulation stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkSettings {
    /// Whether link emulation is applied at all.
    pub emulation: bool,
    /// Wireless preset for endpoint links.
    pub preset: Option<NetworkPreset>,
    /// Between cloud nodes.
    pub cloud: LinkSettings,
    /// Between edge nodes.
    pub edge: LinkSettings,
    /// Between cloud and edge.
    pub cloud_edge: LinkSettings,
    /// Between cloud and endpoints.
    pub cloud_endpoint: LinkSettings,
    /// Between edge and endpoints.
    pub edge_endpoint: LinkSettings,
    /// Whether to run a netperf measurement after setup.
    pub netperf: bool,
}

/// `[infrastructure]`.
#[derive(Debug, Clone, PartialEq)]
pub struct InfrastructureConfig {
    /// Virtualization provider.
    pub provider: Provider,
    /// Stop after provisioning; no resource manager or benchmark.
    pub infra_only: bool,
    /// Requested nodes per tier.
    pub nodes: NodeCounts,
    /// Cloud VM size.
    pub cloud: TierResources,
    /// Edge VM size.
    pub edge: TierResources,
    /// Endpoint VM size.
    pub endpoint: TierResources,
    /// Pin every vCPU to a dedicated physical core.
    pub cpu_pin: bool,
    /// Take per-machine node counts from the machine sections.
    pub custom_scheduling: bool,
    /// Link emulation settings.
    pub network: NetworkSettings,
    /// Extra machines (`user@host`) besides the local one.
    pub external_physical_machines: Vec<String>,
}

impl InfrastructureConfig {
    /// VM size of one tier.
    pub fn resources(&self, tier: Tier) -> TierResources {
        match tier {
            Tier::Cloud => self.cloud,
            Tier::Edge => self.edge,
            Tier::Endpoint => self.endpoint,
        }
    }

    fn from_section(section: &Section) -> Result<Self, ConfigError> {
        let s = INFRASTRUCTURE;
        Ok(Self {
            provider: parse(section, s, "provider")?,
            infra_only: flag(section, s, "infra_only")?,
            nodes: NodeCounts::from_section(section, s)?,
            cloud: TierResources {
                cores: count(section, s, "cloud_cores")?,
                quota: fraction(section, s, "cloud_quota")?,
            },
            edge: TierResources {
                cores: count(section, s, "edge_cores")?,
                quota: fraction(section, s, "edge_quota")?,
            },
            endpoint: TierResources {
                cores: count(section, s, "endpoint_cores")?,
                quota: fraction(section, s, "endpoint_quota")?,
            },
            cpu_pin: flag(section, s, "cpu_pin")?,
            custom_scheduling: flag(section, s, "custom_scheduling")?,
            network: NetworkSettings {
                emulation: flag(section, s, "network_emulation")?,
                preset: parse_optional(section, s, "network_preset")?,
                cloud: LinkSettings::from_section(section, "cloud"),
                edge: LinkSettings::from_section(section, "edge"),
                cloud_edge: LinkSettings::from_section(section, "cloud_edge"),
                cloud_endpoint: LinkSettings::from_section(section, "cloud_endpoint"),
                edge_endpoint: LinkSettings::from_section(section, "edge_endpoint"),
                netperf: flag(section, s, "netperf")?,
            },
            external_physical_machines: section
                .get("external_physical_machines")
                .and_then(Value::as_list)
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
        })
    }
}

/// `[resource_manager]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceManagerConfig {
    /// Manager on the cloud tier; set iff there are cloud nodes.
    pub cloud_rm: Option<CloudManager>,
    /// Manager on the edge tier; set iff there are edge nodes.
    pub edge_rm: Option<EdgeManager>,
}

impl ResourceManagerConfig {
    fn from_section(section: &Section) -> Result<Self, ConfigError> {
        Ok(Self {
            cloud_rm: parse_optional(section, RESOURCE_MANAGER, "cloud_rm")?,
            edge_rm: parse_optional(section, RESOURCE_MANAGER, "edge_rm")?,
        })
    }
}

/// `[benchmark]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkConfig {
    /// Declared deployment mode; always equal to the inferred one.
    pub mode: DeploymentMode,
    /// Workload.
    pub application: Application,
    /// Data generation frequency per endpoint.
    pub frequency: u32,
    /// Pull container images into the base images before cloning.
    pub docker_pull: bool,
    /// Delete the VMs when the benchmark finishes.
    pub delete: bool,
}

impl BenchmarkConfig {
    fn from_section(section: &Section) -> Result<Self, ConfigError> {
        let s = BENCHMARK;
        Ok(Self {
            mode: parse(section, s, "mode")?,
            application: parse(section, s, "application")?,
            frequency: count(section, s, "frequency")?,
            docker_pull: flag(section, s, "docker_pull")?,
            delete: flag(section, s, "delete")?,
        })
    }
}

/// A complete, consistent experiment description.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    /// Infrastructure settings.
    pub infrastructure: InfrastructureConfig,
    /// Resource-manager settings, absent under `infra_only` or endpoint-only runs.
    pub resource_manager: Option<ResourceManagerConfig>,
    /// Benchmark settings, absent under `infra_only`.
    pub benchmark: Option<BenchmarkConfig>,
    /// Per-machine node counts in machine order (local first), under
    /// `custom_scheduling=true`.
    pub custom_schedule: Option<Vec<NodeCounts>>,
    /// Mode implied by the node counts.
    pub mode: DeploymentMode,
}

impl ExperimentConfig {
    /// Parse and validate an INI experiment description.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let raw = RawConfig::parse(text)?;
        let validated = validate(&raw)?;
        Self::from_validated(&validated)
    }

    /// Build the typed view of a validated configuration.
    pub fn from_validated(validated: &ValidatedConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            infrastructure: InfrastructureConfig::from_section(&validated.infrastructure)?,
            resource_manager: validated
                .resource_manager
                .as_ref()
                .map(ResourceManagerConfig::from_section)
                .transpose()?,
            benchmark: validated
                .benchmark
                .as_ref()
                .map(BenchmarkConfig::from_section)
                .transpose()?,
            custom_schedule: validated
                .machines
                .as_ref()
                .map(|machines| {
                    machines
                        .iter()
                        .map(|(name, section)| NodeCounts::from_section(section, name))
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?,
            mode: validated.mode,
        })
    }

    /// Whether a resource manager and benchmark follow provisioning.
    pub fn runs_benchmark(&self) -> bool {
        !self.infrastructure.infra_only
    }
}

fn lookup<'a>(
    section: &'a Section,
    name: &str,
    option: &'static str,
) -> Result<&'a Value, ConfigError> {
    section.get(option).ok_or_else(|| ConfigError::MissingOption {
        section: name.to_string(),
        option,
    })
}

fn invalid(section: &str, option: &'static str, value: &Value) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        option,
        value: value.to_string(),
    }
}

/// Non-negative integer option that fits in `u32`.
pub(crate) fn count(
    section: &Section,
    name: &str,
    option: &'static str,
) -> Result<u32, ConfigError> {
    let value = lookup(section, name, option)?;
    value
        .as_int()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| invalid(name, option, value))
}

fn fraction(
    section: &Section,
    name: &str,
    option: &'static str,
) -> Result<f64, ConfigError> {
    let value = lookup(section, name, option)?;
    value.as_float().ok_or_else(|| invalid(name, option, value))
}

pub(crate) fn flag(
    section: &Section,
    name: &str,
    option: &'static str,
) -> Result<bool, ConfigError> {
    let value = lookup(section, name, option)?;
    value.as_bool().ok_or_else(|| invalid(name, option, value))
}

fn parse<T: FromStr>(
    section: &Section,
    name: &str,
    option: &'static str,
) -> Result<T, ConfigError> {
    let value = lookup(section, name, option)?;
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid(name, option, value))
}

fn parse_optional<T: FromStr>(
    section: &Section,
    name: &str,
    option: &'static str,
) -> Result<Option<T>, ConfigError> {
    match section.get(option) {
        Some(_) => parse(section, name, option).map(Some),
        None => Ok(None),
    }
}
