//! # continuum-types
//!
//! Shared vocabulary for the Continuum testbed.
//!
//! This crate provides the types used across all Continuum crates:
//! - [`Tier`], [`DeploymentMode`] - Where a node lives in the continuum
//! - [`Provider`], [`CloudManager`], [`EdgeManager`], [`Application`],
//!   [`NetworkPreset`] - Enumerated experiment options
//! - [`NodeRole`], [`NodeSlot`], [`Architecture`] - Per-VM identity
//! - [`HostInfo`], [`MachineAssignment`] - Physical machines and the VMs placed on them
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod machine;
mod node;
mod tier;

pub use error::TypesError;
pub use machine::{HostInfo, MachineAssignment};
pub use node::{Architecture, NodeRole, NodeSlot};
pub use tier::{Application, CloudManager, DeploymentMode, EdgeManager, NetworkPreset, Provider, Tier};
