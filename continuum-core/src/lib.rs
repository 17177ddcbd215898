//! # continuum-core
//!
//! Pure logic for the Continuum testbed (no I/O, instant tests).
//!
//! This crate turns an experiment description into the per-VM artifacts that
//! provision a cloud/edge/endpoint testbed, without touching a host.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - [`schema`] and [`validate`] check an experiment description against a
//!   static rule table, then apply the cross-field rules
//! - [`config`] is the typed view of a validated description
//! - [`placement`] schedules VMs on physical machines and addresses them
//! - [`domain`], [`provision`] and [`generate`] render libvirt domains and
//!   cloud-init user data
//! - [`discovery`] builds the bridge/gateway queries and interprets their output
//!
//! Running commands and writing files is done by `continuum-infra`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod discovery;
pub mod domain;
pub mod generate;
pub mod placement;
pub mod provision;
pub mod schema;
pub mod validate;

pub use config::{
    BenchmarkConfig, ExperimentConfig, InfrastructureConfig, LinkSettings, NetworkSettings,
    NodeCounts, ResourceManagerConfig, TierResources,
};
pub use discovery::{BridgeKind, DiscoveryError};
pub use domain::{CpuTune, FirmwareProfile, VcpuPin, VirtualMachineSpec};
pub use generate::{
    GenerateError, Generator, GeneratorSettings, NetworkEnvironment, NodeArtifacts, NodePlan,
    PinCursor,
};
pub use placement::{AddressPlan, PlacementRequest, ScheduleError, SshTargets};
pub use provision::{CloudConfig, ProvisioningPayload};
pub use validate::{ConfigError, RawConfig, ValidatedConfig};
