//! Experiment description validation.
//!
//! Validation happens in two passes:
//!
//! 1. [`check_section`] interprets a [`SectionSchema`] table against the raw
//!    text of one section: coercion to the declared type, then the predicate.
//! 2. [`validate`] applies the cross-field rules (node totals, deployment
//!    mode, resource-manager presence, benchmark topology) in a fixed order.
//!
//! The first failure aborts; there is no warnings mode.

use crate::config::{flag, NodeCounts};
use crate::schema::{
    OptionKind, Requirement, Rule, Section, SectionSchema, Value, BENCHMARK, BENCHMARK_SCHEMA,
    INFRASTRUCTURE, INFRASTRUCTURE_SCHEMA, LOCAL_MACHINE, MACHINE_SCHEMA, RESOURCE_MANAGER,
    RESOURCE_MANAGER_SCHEMA,
};
use continuum_types::{DeploymentMode, Tier};
use ini::Ini;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from experiment description validation.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The file is not valid INI.
    #[error("Config: syntax error: {0}")]
    Syntax(String),

    /// A mandatory section is missing.
    #[error("Config: {0} section missing")]
    MissingSection(&'static str),

    /// A mandatory option is missing or empty.
    #[error("Config: Missing option {section}->{option}")]
    MissingOption {
        /// Section name.
        section: String,
        /// Option name.
        option: &'static str,
    },

    /// The option text does not coerce to the declared type.
    #[error("Config: Invalid type for option {section}->{option}, expected {expected}")]
    InvalidType {
        /// Section name.
        section: String,
        /// Option name.
        option: &'static str,
        /// Declared type.
        expected: OptionKind,
    },

    /// The coerced value fails the option's predicate.
    #[error("Config: Invalid value for option {section}->{option}: {value}")]
    InvalidValue {
        /// Section name.
        section: String,
        /// Option name.
        option: &'static str,
        /// Offending value as written.
        value: String,
    },

    /// Custom scheduling without a section for one of the machines.
    #[error("Config: custom scheduling specified but no specifications for machine: {0}")]
    MissingMachineSection(String),

    /// Per-machine counts under custom scheduling do not add up to the tier total.
    #[error("Config: custom scheduling places {scheduled} {tier} nodes but {tier}_nodes={requested}")]
    CustomScheduleMismatch {
        /// Tier whose counts disagree.
        tier: Tier,
        /// Total from `[infrastructure]`.
        requested: u32,
        /// Sum over the machine sections.
        scheduled: u64,
    },

    /// No nodes requested at all.
    #[error("Config: number of cloud+edge+endpoint nodes should be >= 1, not 0")]
    NoNodes,

    /// `benchmark.mode` disagrees with the mode implied by the node counts.
    #[error("Config: benchmark mode {configured} does not match the {inferred} mode implied by the node counts")]
    ModeMismatch {
        /// Mode written in the file.
        configured: String,
        /// Mode implied by the node counts.
        inferred: DeploymentMode,
    },

    /// `[resource_manager]` given although `infra_only=true`.
    #[error("Config: resource_manager section is present but infra_only=True")]
    ResourceManagerNotAllowed,

    /// `[resource_manager]` required for this mode but absent.
    #[error("Config: {mode} mode requires a resource_manager section")]
    ResourceManagerMissing {
        /// Inferred mode.
        mode: DeploymentMode,
    },

    /// `cloud_rm` set without cloud nodes.
    #[error("Config: resource_manager->cloud_rm is set but cloud_nodes=0")]
    CloudManagerWithoutCloudNodes,

    /// Cloud nodes requested without `cloud_rm`.
    #[error("Config: cloud_nodes>0 requires resource_manager->cloud_rm")]
    CloudNodesWithoutCloudManager,

    /// `edge_rm` set without edge nodes.
    #[error("Config: resource_manager->edge_rm is set but edge_nodes=0")]
    EdgeManagerWithoutEdgeNodes,

    /// Edge nodes requested without `edge_rm`.
    #[error("Config: edge_nodes>0 requires resource_manager->edge_rm")]
    EdgeNodesWithoutEdgeManager,

    /// `[benchmark]` given although `infra_only=true`.
    #[error("Config: benchmark section is present but infra_only=True")]
    BenchmarkNotAllowed,

    /// Node counts unsuitable for a cloud benchmark.
    #[error("Config: For cloud benchmark, #clouds>1, #edges=0, #endpoints>0, and #clouds % #endpoints=0 (got {cloud}/{edge}/{endpoint})")]
    CloudTopology {
        /// Cloud nodes.
        cloud: u32,
        /// Edge nodes.
        edge: u32,
        /// Endpoints.
        endpoint: u32,
    },

    /// Node counts unsuitable for an edge benchmark.
    #[error("Config: For edge benchmark, #clouds=1, #edges>0, #endpoints>0, and #edges % #endpoints=0 (got {cloud}/{edge}/{endpoint})")]
    EdgeTopology {
        /// Cloud nodes.
        cloud: u32,
        /// Edge nodes.
        edge: u32,
        /// Endpoints.
        endpoint: u32,
    },

    /// Node counts unsuitable for an endpoint-only benchmark.
    #[error("Config: For endpoint benchmark, #clouds=0, #edges=0, and #endpoints>0 (got {cloud}/{edge}/{endpoint})")]
    EndpointTopology {
        /// Cloud nodes.
        cloud: u32,
        /// Edge nodes.
        edge: u32,
        /// Endpoints.
        endpoint: u32,
    },
}

/// Raw option text of one section, keys lowercased.
pub type RawSection = BTreeMap<String, String>;

/// Raw text mapping of an experiment description: section -> option -> text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConfig {
    sections: BTreeMap<String, RawSection>,
}

impl RawConfig {
    /// Parse INI text.
    ///
    /// Option names are case-insensitive and stored lowercased; section
    /// names are kept verbatim. Options outside any section are ignored.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Syntax(e.to_string()))?;
        let mut raw = Self::default();
        for (section, properties) in ini.iter() {
            let Some(section) = section else { continue };
            let entry = raw.sections.entry(section.to_string()).or_default();
            for (key, value) in properties.iter() {
                entry.insert(key.to_lowercase(), value.to_string());
            }
        }
        Ok(raw)
    }

    /// Set one option, creating the section if needed.
    pub fn set(&mut self, section: &str, option: &str, value: &str) -> &mut Self {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(option.to_lowercase(), value.to_string());
        self
    }

    /// Remove a whole section.
    pub fn remove_section(&mut self, section: &str) -> &mut Self {
        self.sections.remove(section);
        self
    }

    /// Raw options of a section.
    pub fn section(&self, name: &str) -> Option<&RawSection> {
        self.sections.get(name)
    }
}

/// Output of [`validate`]: every applicable section checked, mode inferred.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    /// `[infrastructure]`.
    pub infrastructure: Section,
    /// `[resource_manager]`, when present and applicable.
    pub resource_manager: Option<Section>,
    /// `[benchmark]`, when present and applicable.
    pub benchmark: Option<Section>,
    /// Per-machine sections in machine order (`[local]` first), under
    /// `custom_scheduling=true`.
    pub machines: Option<Vec<(String, Section)>>,
    /// Mode implied by the node counts.
    pub mode: DeploymentMode,
}

/// Coerce raw option text to a declared type.
///
/// Returns `None` when the text is not a valid literal of the type.
pub fn coerce(text: &str, kind: OptionKind) -> Option<Value> {
    let text = text.trim();
    match kind {
        OptionKind::Int => text.parse().ok().map(Value::Int),
        OptionKind::Float => text.parse().ok().map(Value::Float),
        OptionKind::Bool => match text.to_ascii_lowercase().as_str() {
            "1" | "yes" | "true" | "on" => Some(Value::Bool(true)),
            "0" | "no" | "false" | "off" => Some(Value::Bool(false)),
            _ => None,
        },
        OptionKind::Str => Some(Value::Str(text.to_string())),
        OptionKind::List => Some(Value::List(
            text.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect(),
        )),
    }
}

fn is_required(rule: &Rule, validated: &Section) -> bool {
    match rule.requirement {
        Requirement::Mandatory => true,
        Requirement::Optional => false,
        Requirement::MandatoryUnless(other) => !validated.contains_key(other),
    }
}

/// Evaluate one rule.
///
/// Returns `Ok(None)` for an absent optional option; absent means missing,
/// empty, or a list with only blank entries.
pub fn check_option(
    section: &str,
    rule: &Rule,
    raw: &RawSection,
    validated: &Section,
) -> Result<Option<Value>, ConfigError> {
    let absent = || {
        if is_required(rule, validated) {
            Err(ConfigError::MissingOption {
                section: section.to_string(),
                option: rule.option,
            })
        } else {
            Ok(None)
        }
    };

    let Some(text) = raw
        .get(rule.option)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    else {
        return absent();
    };

    let value = coerce(text, rule.kind).ok_or_else(|| ConfigError::InvalidType {
        section: section.to_string(),
        option: rule.option,
        expected: rule.kind,
    })?;

    if matches!(&value, Value::List(entries) if entries.is_empty()) {
        return absent();
    }

    if !rule.check.admits(&value, validated) {
        return Err(ConfigError::InvalidValue {
            section: section.to_string(),
            option: rule.option,
            value: text.to_string(),
        });
    }

    Ok(Some(value))
}

/// Interpret a section's rule table against its raw text.
///
/// Options not named by the schema are ignored.
pub fn check_section(schema: &SectionSchema, raw: &RawSection) -> Result<Section, ConfigError> {
    check_named_section(schema.name, schema, raw)
}

/// Like [`check_section`], reporting errors under `name`.
///
/// Used for sections whose name is chosen by the user, such as the
/// per-machine sections of custom scheduling.
pub fn check_named_section(
    name: &str,
    schema: &SectionSchema,
    raw: &RawSection,
) -> Result<Section, ConfigError> {
    let mut validated = Section::new();
    for rule in schema.rules {
        if let Some(value) = check_option(name, rule, raw, &validated)? {
            validated.insert(rule.option, value);
        }
    }
    Ok(validated)
}

/// Validate a raw experiment description.
///
/// `[resource_manager]` and `[benchmark]` are only type-checked when
/// `infra_only=false`; otherwise their mere presence is an error.
pub fn validate(raw: &RawConfig) -> Result<ValidatedConfig, ConfigError> {
    let infrastructure = check_section(
        &INFRASTRUCTURE_SCHEMA,
        raw.section(INFRASTRUCTURE)
            .ok_or(ConfigError::MissingSection(INFRASTRUCTURE))?,
    )?;
    let infra_only = flag(&infrastructure, INFRASTRUCTURE, "infra_only")?;
    let nodes = NodeCounts::from_section(&infrastructure, INFRASTRUCTURE)?;

    let rm_raw = raw.section(RESOURCE_MANAGER);
    let bench_raw = raw.section(BENCHMARK);

    let resource_manager = match rm_raw {
        Some(section) if !infra_only => Some(check_section(&RESOURCE_MANAGER_SCHEMA, section)?),
        _ => None,
    };
    let benchmark = match bench_raw {
        Some(section) if !infra_only => Some(check_section(&BENCHMARK_SCHEMA, section)?),
        _ => None,
    };

    if nodes.total() == 0 {
        return Err(ConfigError::NoNodes);
    }

    let machines = if flag(&infrastructure, INFRASTRUCTURE, "custom_scheduling")? {
        Some(check_machine_sections(raw, &infrastructure, nodes)?)
    } else {
        None
    };

    let mode = DeploymentMode::infer(nodes.cloud, nodes.edge);
    if let Some(configured) = benchmark
        .as_ref()
        .and_then(|b| b.get("mode"))
        .and_then(Value::as_str)
    {
        if configured != mode.as_str() {
            return Err(ConfigError::ModeMismatch {
                configured: configured.to_string(),
                inferred: mode,
            });
        }
    }

    if rm_raw.is_some() && infra_only {
        return Err(ConfigError::ResourceManagerNotAllowed);
    }
    if !infra_only {
        match &resource_manager {
            Some(rm) => check_managers(rm, nodes)?,
            None if mode != DeploymentMode::Endpoint => {
                return Err(ConfigError::ResourceManagerMissing { mode });
            }
            None => {}
        }
    }

    if bench_raw.is_some() && infra_only {
        return Err(ConfigError::BenchmarkNotAllowed);
    }
    if benchmark.is_some() {
        check_topology(mode, nodes)?;
    }

    Ok(ValidatedConfig {
        infrastructure,
        resource_manager,
        benchmark,
        machines,
        mode,
    })
}

/// Check `[local]` and one section per external machine, and that their
/// counts add up to the `[infrastructure]` totals.
fn check_machine_sections(
    raw: &RawConfig,
    infrastructure: &Section,
    nodes: NodeCounts,
) -> Result<Vec<(String, Section)>, ConfigError> {
    let externals = infrastructure
        .get("external_physical_machines")
        .and_then(Value::as_list)
        .unwrap_or_default();
    let names = std::iter::once(LOCAL_MACHINE.to_string()).chain(externals.iter().cloned());

    let mut machines = Vec::new();
    let mut scheduled = [0u64; 3];
    for name in names {
        let section = raw
            .section(&name)
            .ok_or_else(|| ConfigError::MissingMachineSection(name.clone()))?;
        let validated = check_named_section(&name, &MACHINE_SCHEMA, section)?;
        let counts = NodeCounts::from_section(&validated, &name)?;
        for (sum, &tier) in scheduled.iter_mut().zip(Tier::ALL) {
            *sum += u64::from(counts.get(tier));
        }
        machines.push((name, validated));
    }

    for (&sum, &tier) in scheduled.iter().zip(Tier::ALL) {
        if sum != u64::from(nodes.get(tier)) {
            return Err(ConfigError::CustomScheduleMismatch {
                tier,
                requested: nodes.get(tier),
                scheduled: sum,
            });
        }
    }
    Ok(machines)
}

fn check_managers(rm: &Section, nodes: NodeCounts) -> Result<(), ConfigError> {
    match (rm.contains_key("cloud_rm"), nodes.cloud > 0) {
        (true, false) => return Err(ConfigError::CloudManagerWithoutCloudNodes),
        (false, true) => return Err(ConfigError::CloudNodesWithoutCloudManager),
        _ => {}
    }
    match (rm.contains_key("edge_rm"), nodes.edge > 0) {
        (true, false) => Err(ConfigError::EdgeManagerWithoutEdgeNodes),
        (false, true) => Err(ConfigError::EdgeNodesWithoutEdgeManager),
        _ => Ok(()),
    }
}

/// Node-count arithmetic each benchmark mode needs.
pub fn check_topology(mode: DeploymentMode, nodes: NodeCounts) -> Result<(), ConfigError> {
    let NodeCounts {
        cloud,
        edge,
        endpoint,
    } = nodes;
    let fits = match mode {
        DeploymentMode::Cloud => cloud >= 2 && edge == 0 && endpoint >= 1 && cloud % endpoint == 0,
        DeploymentMode::Edge => cloud == 1 && edge >= 1 && endpoint >= 1 && edge % endpoint == 0,
        DeploymentMode::Endpoint => cloud == 0 && edge == 0 && endpoint >= 1,
    };
    if fits {
        return Ok(());
    }
    Err(match mode {
        DeploymentMode::Cloud => ConfigError::CloudTopology {
            cloud,
            edge,
            endpoint,
        },
        DeploymentMode::Edge => ConfigError::EdgeTopology {
            cloud,
            edge,
            endpoint,
        },
        DeploymentMode::Endpoint => ConfigError::EndpointTopology {
            cloud,
            edge,
            endpoint,
        },
    })
}
