//! Error types for continuum-infra.

use std::path::PathBuf;

/// Main error type for provisioning runs.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Experiment description rejected.
    #[error("{0}")]
    Config(#[from] continuum_core::ConfigError),

    /// Tool settings unusable.
    #[error("settings error: {0}")]
    Settings(#[from] crate::settings::SettingsError),

    /// Running a command failed.
    #[error("shell error: {0}")]
    Shell(#[from] crate::shell::ShellError),

    /// Hardware probe output unusable.
    #[error("probe error: {0}")]
    Probe(#[from] crate::hardware::ProbeError),

    /// The SSH keypair could not be created or copied.
    #[error("keypair error: {0}")]
    Keypair(#[from] crate::keypair::KeypairError),

    /// VMs could not be placed or addressed.
    #[error("placement error: {0}")]
    Schedule(#[from] continuum_core::ScheduleError),

    /// Bridge or gateway discovery failed.
    #[error("discovery error: {0}")]
    Discovery(#[from] continuum_core::DiscoveryError),

    /// Artifact rendering failed.
    #[error("generation error: {0}")]
    Generate(#[from] continuum_core::GenerateError),

    /// Reading an input or writing an artifact failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Machine summary serialization failed.
    #[error("machine summary serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProvisionError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;
