//! # continuum-infra
//!
//! Side-effecting half of the Continuum testbed provisioner.
//!
//! Pure decisions (validation, placement, rendering) live in
//! `continuum-core`; this crate talks to the physical machines and the
//! filesystem around them.
//!
//! ## Features
//!
//! - **Shell Abstraction**: commands run locally or over SSH behind [`Shell`]
//! - **Hardware Probing**: core counts and architecture per machine
//! - **Network Discovery**: bridge and gateway on the first machine
//! - **SSH Keypair**: generated once, copied to every machine
//! - **Artifact Output**: libvirt domains and cloud-init user data on disk
//!
//! ## Example
//!
//! ```ignore
//! use continuum_core::ExperimentConfig;
//! use continuum_infra::{pipeline, Settings};
//!
//! let config = ExperimentConfig::from_ini_str(&text)?;
//! let machines = pipeline::machines_for(&config)?;
//! let report = pipeline::provision(&config, &machines, &Settings::load(None)?).await?;
//! println!("{:?}", report.ssh.cloud);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifacts;
pub mod discover;
pub mod error;
pub mod hardware;
pub mod keypair;
pub mod pipeline;
pub mod settings;
pub mod shell;

pub use artifacts::{ArtifactWriter, MACHINES_FILE};
pub use discover::{discover_network, BridgeCandidates};
pub use error::{ProvisionError, Result};
pub use hardware::{probe, probe_all, ProbeError};
pub use keypair::{ensure_keypair, private_key_path, KeypairError};
pub use pipeline::{machines_for, provision, ProvisionReport};
pub use settings::{NetworkConfig, Settings, SettingsError, SETTINGS_FILE};
pub use shell::{MockShell, PhysicalMachine, ProcessOutput, Shell, ShellError};
