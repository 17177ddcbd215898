//! Declarative schema of the experiment description.
//!
//! Each section is a static table of [`Rule`]s. The tables are pure data; the
//! single interpreter lives in [`crate::validate`]. Rules are evaluated top to
//! bottom, so a [`Check`] may depend on options declared above it in the same
//! section.

use std::collections::BTreeMap;
use std::fmt;

/// A validated option value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer option.
    Int(i64),
    /// Floating point option.
    Float(f64),
    /// Boolean option.
    Bool(bool),
    /// Free-form or enumerated string option.
    Str(String),
    /// Comma-separated list with blank entries removed.
    List(Vec<String>),
}

impl Value {
    /// Integer payload, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload, if this is a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// List payload, if this is a list.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::List(v) => f.write_str(&v.join(", ")),
        }
    }
}

/// Validated options of one section, keyed by option name.
pub type Section = BTreeMap<&'static str, Value>;

/// Declared type of an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Signed integer.
    Int,
    /// Floating point number.
    Float,
    /// `1/yes/true/on` or `0/no/false/off`.
    Bool,
    /// Raw string.
    Str,
    /// Comma-separated list.
    List,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Str => "string",
            Self::List => "list",
        })
    }
}

/// Predicate an option value must satisfy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Check {
    /// Any value of the declared type.
    Any,
    /// String equal to one of the listed spellings.
    OneOf(&'static [&'static str]),
    /// Integer `>=` bound.
    IntAtLeast(i64),
    /// Float `>=` bound.
    FloatAtLeast(f64),
    /// Float within the inclusive range.
    FloatWithin(f64, f64),
    /// Every list entry has the form `user@host`.
    UserAtHost,
    /// `active` applies when the integer option `count` is positive, `idle` otherwise.
    ByCount {
        /// Name of an integer option declared earlier in the same section.
        count: &'static str,
        /// Check used when `count > 0`.
        active: &'static Check,
        /// Check used when `count == 0` or absent.
        idle: &'static Check,
    },
}

impl Check {
    /// Evaluate against a coerced value, given the options validated so far.
    pub fn admits(&self, value: &Value, section: &Section) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::OneOf(allowed), Value::Str(s)) => allowed.contains(&s.as_str()),
            (Self::IntAtLeast(min), Value::Int(v)) => v >= min,
            (Self::FloatAtLeast(min), Value::Float(v)) => v >= min,
            (Self::FloatWithin(lo, hi), Value::Float(v)) => lo <= v && v <= hi,
            (Self::UserAtHost, Value::List(entries)) => entries.iter().all(|e| {
                let mut parts = e.trim().splitn(2, '@');
                matches!(
                    (parts.next(), parts.next()),
                    (Some(user), Some(host)) if !user.is_empty() && !host.is_empty()
                )
            }),
            (Self::ByCount { count, active, idle }, _) => {
                let positive = section
                    .get(count)
                    .and_then(Value::as_int)
                    .is_some_and(|n| n > 0);
                if positive {
                    active.admits(value, section)
                } else {
                    idle.admits(value, section)
                }
            }
            _ => false,
        }
    }
}

/// Whether an option must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Always required.
    Mandatory,
    /// May be omitted; omitted options are left out of the result.
    Optional,
    /// Required unless the named option (declared earlier) was supplied.
    MandatoryUnless(&'static str),
}

/// One (option, type, predicate, requirement) entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    /// Option name.
    pub option: &'static str,
    /// Declared type.
    pub kind: OptionKind,
    /// Value predicate.
    pub check: Check,
    /// Presence requirement.
    pub requirement: Requirement,
}

impl Rule {
    const fn new(
        option: &'static str,
        kind: OptionKind,
        check: Check,
        requirement: Requirement,
    ) -> Self {
        Self {
            option,
            kind,
            check,
            requirement,
        }
    }
}

/// Rule table for one section.
#[derive(Debug, Clone, Copy)]
pub struct SectionSchema {
    /// Section name as written in the file.
    pub name: &'static str,
    /// Rules in evaluation order.
    pub rules: &'static [Rule],
}

/// Name of the mandatory infrastructure section.
pub const INFRASTRUCTURE: &str = "infrastructure";
/// Name of the optional resource-manager section.
pub const RESOURCE_MANAGER: &str = "resource_manager";
/// Name of the optional benchmark section.
pub const BENCHMARK: &str = "benchmark";

/// Per-machine section of the local host under custom scheduling. External
/// machines use their `user@host` name as section name.
pub const LOCAL_MACHINE: &str = "local";

/// Option that replaces the endpoint link settings.
pub const NETWORK_PRESET: &str = "network_preset";

use Check::*;
use OptionKind::*;
use Requirement::*;

const ANY_QUOTA: Check = FloatWithin(0.0, 1.0);
const ACTIVE_QUOTA: Check = FloatWithin(0.1, 1.0);
const LATENCY_AVG: Check = FloatAtLeast(5.0);
const LATENCY_VAR: Check = FloatAtLeast(0.0);
const THROUGHPUT: Check = FloatAtLeast(1.0);

/// `[infrastructure]`: node counts, VM sizes, pinning and link settings.
pub static INFRASTRUCTURE_SCHEMA: SectionSchema = SectionSchema {
    name: INFRASTRUCTURE,
    rules: &[
        Rule::new("provider", Str, OneOf(&["qemu"]), Mandatory),
        Rule::new("infra_only", Bool, Any, Mandatory),
        Rule::new("cloud_nodes", Int, IntAtLeast(0), Mandatory),
        Rule::new("edge_nodes", Int, IntAtLeast(0), Mandatory),
        Rule::new("endpoint_nodes", Int, IntAtLeast(0), Mandatory),
        Rule::new(
            "cloud_cores",
            Int,
            ByCount {
                count: "cloud_nodes",
                active: &IntAtLeast(2),
                idle: &IntAtLeast(0),
            },
            Mandatory,
        ),
        Rule::new(
            "edge_cores",
            Int,
            ByCount {
                count: "edge_nodes",
                active: &IntAtLeast(1),
                idle: &IntAtLeast(0),
            },
            Mandatory,
        ),
        Rule::new(
            "endpoint_cores",
            Int,
            ByCount {
                count: "endpoint_nodes",
                active: &IntAtLeast(1),
                idle: &IntAtLeast(0),
            },
            Mandatory,
        ),
        Rule::new(
            "cloud_quota",
            Float,
            ByCount {
                count: "cloud_nodes",
                active: &ACTIVE_QUOTA,
                idle: &ANY_QUOTA,
            },
            Mandatory,
        ),
        Rule::new(
            "edge_quota",
            Float,
            ByCount {
                count: "edge_nodes",
                active: &ACTIVE_QUOTA,
                idle: &ANY_QUOTA,
            },
            Mandatory,
        ),
        Rule::new(
            "endpoint_quota",
            Float,
            ByCount {
                count: "endpoint_nodes",
                active: &ACTIVE_QUOTA,
                idle: &ANY_QUOTA,
            },
            Mandatory,
        ),
        Rule::new("cpu_pin", Bool, Any, Mandatory),
        Rule::new("custom_scheduling", Bool, Any, Mandatory),
        Rule::new("network_emulation", Bool, Any, Mandatory),
        Rule::new(NETWORK_PRESET, Str, OneOf(&["4g", "5g"]), Optional),
        Rule::new("cloud_latency_avg", Float, LATENCY_AVG, Optional),
        Rule::new("cloud_latency_var", Float, LATENCY_VAR, Optional),
        Rule::new("cloud_throughput", Float, THROUGHPUT, Optional),
        Rule::new("edge_latency_avg", Float, LATENCY_AVG, Optional),
        Rule::new("edge_latency_var", Float, LATENCY_VAR, Optional),
        Rule::new("edge_throughput", Float, THROUGHPUT, Optional),
        Rule::new("cloud_edge_latency_avg", Float, LATENCY_AVG, Optional),
        Rule::new("cloud_edge_latency_var", Float, LATENCY_VAR, Optional),
        Rule::new("cloud_edge_throughput", Float, THROUGHPUT, Optional),
        Rule::new(
            "cloud_endpoint_latency_avg",
            Float,
            LATENCY_AVG,
            MandatoryUnless(NETWORK_PRESET),
        ),
        Rule::new(
            "cloud_endpoint_latency_var",
            Float,
            LATENCY_VAR,
            MandatoryUnless(NETWORK_PRESET),
        ),
        Rule::new(
            "cloud_endpoint_throughput",
            Float,
            THROUGHPUT,
            MandatoryUnless(NETWORK_PRESET),
        ),
        Rule::new(
            "edge_endpoint_latency_avg",
            Float,
            LATENCY_AVG,
            MandatoryUnless(NETWORK_PRESET),
        ),
        Rule::new(
            "edge_endpoint_latency_var",
            Float,
            LATENCY_VAR,
            MandatoryUnless(NETWORK_PRESET),
        ),
        Rule::new(
            "edge_endpoint_throughput",
            Float,
            THROUGHPUT,
            MandatoryUnless(NETWORK_PRESET),
        ),
        Rule::new("external_physical_machines", List, UserAtHost, Optional),
        Rule::new("netperf", Bool, Any, Mandatory),
    ],
};

/// `[resource_manager]`: which manager runs on each tier.
///
/// Both options are optional here; their presence is cross-checked against
/// the node counts afterwards.
pub static RESOURCE_MANAGER_SCHEMA: SectionSchema = SectionSchema {
    name: RESOURCE_MANAGER,
    rules: &[
        Rule::new("cloud_rm", Str, OneOf(&["kubernetes"]), Optional),
        Rule::new("edge_rm", Str, OneOf(&["kubeedge"]), Optional),
    ],
};

/// Per-machine node counts, used when `custom_scheduling=true`.
pub static MACHINE_SCHEMA: SectionSchema = SectionSchema {
    name: LOCAL_MACHINE,
    rules: &[
        Rule::new("cloud_nodes", Int, IntAtLeast(0), Mandatory),
        Rule::new("edge_nodes", Int, IntAtLeast(0), Mandatory),
        Rule::new("endpoint_nodes", Int, IntAtLeast(0), Mandatory),
    ],
};

/// `[benchmark]`: the workload to run on the testbed.
pub static BENCHMARK_SCHEMA: SectionSchema = SectionSchema {
    name: BENCHMARK,
    rules: &[
        Rule::new("mode", Str, OneOf(&["cloud", "edge", "endpoint"]), Mandatory),
        Rule::new(
            "application",
            Str,
            OneOf(&["image_classification"]),
            Mandatory,
        ),
        Rule::new("frequency", Int, IntAtLeast(1), Mandatory),
        Rule::new("docker_pull", Bool, Any, Mandatory),
        Rule::new("delete", Bool, Any, Mandatory),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    fn section(entries: &[(&'static str, Value)]) -> Section {
        entries.iter().cloned().collect()
    }

    #[test]
    fn one_of_matches_exact_spelling() {
        let check = OneOf(&["4g", "5g"]);
        let empty = Section::new();
        assert!(check.admits(&Value::Str("5g".into()), &empty));
        assert!(!check.admits(&Value::Str("5G".into()), &empty));
        assert!(!check.admits(&Value::Int(5), &empty));
    }

    #[test]
    fn quota_bounds_are_inclusive() {
        let empty = Section::new();
        assert!(ACTIVE_QUOTA.admits(&Value::Float(0.1), &empty));
        assert!(ACTIVE_QUOTA.admits(&Value::Float(1.0), &empty));
        assert!(!ACTIVE_QUOTA.admits(&Value::Float(0.09), &empty));
        assert!(!ACTIVE_QUOTA.admits(&Value::Float(f64::NAN), &empty));
    }

    #[test]
    fn by_count_switches_on_earlier_option() {
        let rule = INFRASTRUCTURE_SCHEMA
            .rules
            .iter()
            .find(|r| r.option == "cloud_cores")
            .unwrap();

        let with_clouds = section(&[("cloud_nodes", Value::Int(2))]);
        let without_clouds = section(&[("cloud_nodes", Value::Int(0))]);

        assert!(!rule.check.admits(&Value::Int(1), &with_clouds));
        assert!(rule.check.admits(&Value::Int(2), &with_clouds));
        assert!(rule.check.admits(&Value::Int(0), &without_clouds));
    }

    #[test]
    fn user_at_host_requires_both_parts() {
        let empty = Section::new();
        let ok = Value::List(vec!["jdoe@10.0.0.2".into(), "root@node7".into()]);
        let missing_user = Value::List(vec!["@10.0.0.2".into()]);
        let bare_host = Value::List(vec!["node7".into()]);
        assert!(UserAtHost.admits(&ok, &empty));
        assert!(!UserAtHost.admits(&missing_user, &empty));
        assert!(!UserAtHost.admits(&bare_host, &empty));
    }

    #[test]
    fn preset_precedes_the_options_it_replaces() {
        let rules = INFRASTRUCTURE_SCHEMA.rules;
        let preset = rules.iter().position(|r| r.option == NETWORK_PRESET).unwrap();
        for (i, rule) in rules.iter().enumerate() {
            if rule.requirement == MandatoryUnless(NETWORK_PRESET) {
                assert!(i > preset, "{} must follow {}", rule.option, NETWORK_PRESET);
            }
        }
        let replaced = rules
            .iter()
            .filter(|r| r.requirement == MandatoryUnless(NETWORK_PRESET))
            .count();
        assert_eq!(replaced, 6);
    }

    #[test]
    fn option_names_are_unique_per_section() {
        for schema in [
            &INFRASTRUCTURE_SCHEMA,
            &RESOURCE_MANAGER_SCHEMA,
            &BENCHMARK_SCHEMA,
            &MACHINE_SCHEMA,
        ] {
            let mut names: Vec<_> = schema.rules.iter().map(|r| r.option).collect();
            names.sort_unstable();
            let before = names.len();
            names.dedup();
            assert_eq!(before, names.len(), "duplicate option in {}", schema.name);
        }
    }
}
