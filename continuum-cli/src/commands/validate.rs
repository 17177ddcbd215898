//! Validate an experiment description.

use anyhow::Result;
use continuum_core::ExperimentConfig;
use continuum_types::Tier;
use std::path::Path;
use tracing::info;

/// Run the validate command.
pub async fn run(path: &Path) -> Result<()> {
    let config = super::load_experiment(path).await?;
    info!(path = %path.display(), mode = %config.mode, "Configuration valid");
    println!("{}", summary(&config));
    Ok(())
}

fn summary(config: &ExperimentConfig) -> String {
    let infra = &config.infrastructure;
    let mut lines = vec![
        "Configuration OK".to_string(),
        format!("  Mode:     {}", config.mode),
        format!("  Provider: {}", infra.provider),
    ];
    for &tier in Tier::ALL {
        let nodes = infra.nodes.get(tier);
        if nodes == 0 {
            continue;
        }
        let resources = infra.resources(tier);
        lines.push(format!(
            "  {:<9} {} VM(s), {} core(s), quota {}",
            format!("{tier}:"),
            nodes,
            resources.cores,
            resources.quota
        ));
    }
    if infra.cpu_pin {
        lines.push("  vCPUs pinned to physical cores".to_string());
    } else if let Some(schedule) = &config.custom_schedule {
        lines.push(format!("  Custom schedule over {} machine(s)", schedule.len()));
    }
    if let Some(rm) = &config.resource_manager {
        if let Some(cloud) = rm.cloud_rm {
            lines.push(format!("  Cloud RM: {cloud}"));
        }
        if let Some(edge) = rm.edge_rm {
            lines.push(format!("  Edge RM:  {edge}"));
        }
    }
    match &config.benchmark {
        Some(benchmark) if config.runs_benchmark() => {
            lines.push(format!("  Benchmark: {}", benchmark.application));
        }
        _ => lines.push("  Provisioning only".to_string()),
    }
    lines.join("\n")
}
