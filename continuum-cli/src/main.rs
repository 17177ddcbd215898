//! # continuum
//!
//! Provisions emulated cloud, edge and endpoint VMs for a Continuum
//! benchmark run.
//!
//! ## Commands
//!
//! - `validate`: Check an experiment description and report its mode
//! - `generate`: Probe the machines, place the VMs and write their artifacts
//!
//! ## Example
//!
//! ```bash
//! # Check the description only
//! continuum validate configuration/edge.cfg
//!
//! # Write libvirt domains and cloud-init user data to ./out
//! continuum generate configuration/edge.cfg --output out
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{generate, validate};

/// Continuum testbed provisioner.
#[derive(Parser, Debug)]
#[command(name = "continuum")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Tool settings file (default: continuum.toml if present)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate an experiment description
    Validate {
        /// Experiment description (INI)
        config: PathBuf,
    },

    /// Generate VM definitions and cloud-init user data
    Generate {
        /// Experiment description (INI)
        config: PathBuf,

        /// Output directory, overrides the settings file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { config } => {
            validate::run(&config).await?;
        }
        Commands::Generate { config, output } => {
            generate::run(&config, cli.settings.as_deref(), output).await?;
        }
    }

    Ok(())
}
