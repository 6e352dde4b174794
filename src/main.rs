use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueHint};
use serde_json::to_writer_pretty;
use shipwright::config::{Config, DEFAULT_CONFIG_FILE};
use shipwright::logger::{Logger, TracingLogger};
use shipwright::observability::log_snapshot;
use shipwright::pipeline::Pipeline;
use shipwright::process::SystemRunner;
use tracing::info;
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    let config_path = cli.config;
    let config = Config::load(&config_path)?;
    let logger: Arc<dyn Logger> = Arc::new(TracingLogger);
    let mut pipeline = Pipeline::new(&config, Arc::new(SystemRunner), logger.clone())
        .with_context(|| format!("Invalid configuration: {}", config_path.display()))?;
    logger.check_ok(&format!(
        "Using configuration file '{}'",
        config_path.display()
    ));

    let (verb, succeeded) = match cli.command.unwrap_or(Commands::Package) {
        Commands::Check => ("Preflight check", pipeline.preflight_check()),
        Commands::Package => ("Packaging", pipeline.execute()),
    };

    if cli.print_metrics || cli.metrics_json.is_some() {
        let snapshot = pipeline.metrics().snapshot();
        if cli.print_metrics {
            log_snapshot(&snapshot);
        }
        if let Some(path) = cli.metrics_json {
            write_metrics_json(&path, &snapshot)?;
        }
    }

    if succeeded {
        info!("{verb} succeeded");
        Ok(())
    } else {
        Err(anyhow!("{verb} failed"))
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

fn write_metrics_json(path: &Path, snapshot: &impl serde::Serialize) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create metrics directory: {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create metrics file: {}", path.display()))?;
    to_writer_pretty(file, snapshot)
        .with_context(|| format!("Failed to write metrics JSON: {}", path.display()))?;
    info!(metrics = %path.display(), "Metrics JSON written");
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "shipwright",
    version,
    about = "Builds, prunes and packages an application for distribution"
)]
struct Cli {
    /// Configuration file describing the packaging run.
    #[arg(long, short, default_value = DEFAULT_CONFIG_FILE, value_hint = ValueHint::FilePath)]
    config: PathBuf,
    #[arg(long)]
    print_metrics: bool,
    #[arg(long = "metrics-json", value_hint = ValueHint::FilePath)]
    metrics_json: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Verify tools and configuration without touching the filesystem.
    Check,
    /// Run the full packaging pipeline (default).
    Package,
}
