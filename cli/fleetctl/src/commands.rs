//! Command definitions and execution.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleetplan_core::{Catalog, DemandTable};
use fleetplan_reconcile::Reconciler;

/// fleetctl - turn demand plans into fleet action traces.
#[derive(Debug, Parser)]
#[command(name = "fleetctl", version, about)]
pub struct Cli {
    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "FLEETCTL_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile a demand plan into an ordered buy/dismiss action trace.
    Plan {
        /// Demand plan JSON, as emitted by the upstream optimizer.
        #[arg(long)]
        demand: PathBuf,

        /// Catalog JSON; defaults to the built-in reference catalog.
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Output path for the action trace, or `-` for stdout.
        #[arg(long, default_value = "actions.json")]
        output: PathBuf,
    },
}

impl Cli {
    /// Run the parsed command.
    pub fn run(&self) -> Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_new(&self.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();

        match &self.command {
            Command::Plan {
                demand,
                catalog,
                output,
            } => plan(demand, catalog.as_deref(), output),
        }
    }
}

fn plan(demand_path: &Path, catalog_path: Option<&Path>, output: &Path) -> Result<()> {
    let catalog = match catalog_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read catalog {}", path.display()))?;
            serde_json::from_str::<Catalog>(&raw)
                .with_context(|| format!("invalid catalog {}", path.display()))?
        }
        None => Catalog::reference(),
    };

    let raw = fs::read_to_string(demand_path)
        .with_context(|| format!("failed to read demand plan {}", demand_path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("demand plan {} is not valid JSON", demand_path.display()))?;
    let table = DemandTable::from_json(&value)
        .with_context(|| format!("demand plan {} failed validation", demand_path.display()))?;

    info!(steps = table.len(), "Demand plan loaded");

    let mut reconciler = Reconciler::new(catalog);
    let actions = reconciler.run(&table).context("reconciliation failed")?;

    let stats = reconciler.stats();
    info!(
        actions = actions.len(),
        bought = stats.instances_bought,
        dismissed = stats.instances_dismissed,
        skipped_cells = stats.cells_skipped,
        "Action trace ready"
    );

    let rendered = serde_json::to_string_pretty(&actions).context("failed to encode actions")?;
    if output == Path::new("-") {
        println!("{rendered}");
    } else {
        fs::write(output, rendered)
            .with_context(|| format!("failed to write {}", output.display()))?;
        info!(output = %output.display(), "Action trace written");
    }

    Ok(())
}
