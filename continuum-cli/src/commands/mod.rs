//! CLI command implementations.

pub mod generate;
pub mod validate;

use anyhow::{Context, Result};
use continuum_core::ExperimentConfig;
use std::path::Path;

/// Read and validate an experiment description.
pub async fn load_experiment(path: &Path) -> Result<ExperimentConfig> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(ExperimentConfig::from_ini_str(&text)?)
}
