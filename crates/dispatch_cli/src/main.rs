use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dispatch_core::scenario::build_engine_parts;
use dispatch_core::trace_export::write_report;
use dispatch_core::{Config, Engine, SimError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "dispatch",
    about = "Ride-hailing dispatch simulator",
    long_about = "Replays historical ride requests against a simulated fleet inside a geofence\n\
                  and writes the full event trace of the run."
)]
struct Cli {
    /// Log at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one simulation and write the trace
    Run {
        /// Scenario config (TOML)
        #[arg(env = "DISPATCH_CONFIG")]
        config: PathBuf,
        /// Override `simulation.output`
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a config and load its inputs without running
    Check {
        /// Scenario config (TOML)
        #[arg(env = "DISPATCH_CONFIG")]
        config: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("dispatch=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dispatch=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(config_path: &Path, output: Option<PathBuf>) -> Result<(), SimError> {
    let config = Config::load(config_path)?;
    let output = output.unwrap_or_else(|| config.output_path());

    let mut engine = Engine::from_config(&config)?;
    let report = engine.run()?;
    let paths = write_report(&report, &output)?;

    let summary = &report.summary;
    info!(
        requested = summary.requested,
        assigned = summary.assigned,
        completed = summary.completed,
        expired = summary.expired,
        unresolved_pending = summary.unresolved_pending,
        unresolved_assigned = summary.unresolved_assigned,
        routing_failures = summary.routing_failures,
        map_match_failures = summary.map_match_failures,
        mean_wait_secs = summary.mean_wait_secs.unwrap_or_default(),
        mean_ride_secs = summary.mean_ride_secs.unwrap_or_default(),
        trace = %paths.trace.display(),
        "run complete"
    );
    Ok(())
}

fn check(config_path: &Path) -> Result<(), SimError> {
    let config = Config::load(config_path)?;
    let parts = build_engine_parts(&config)?;
    info!(
        config = %config_path.display(),
        vehicles = parts.vehicles.len(),
        bookings = parts.demand.remaining(),
        "config ok"
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run { config, output } => run(&config, output),
        Commands::Check { config } => check(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
