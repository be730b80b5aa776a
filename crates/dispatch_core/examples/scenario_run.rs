//! Run a scenario from a TOML config and print the summary plus a sample of bookings.
//!
//! Run with: cargo run -p dispatch_core --example scenario_run -- path/to/scenario.toml

use std::path::PathBuf;
use std::process::ExitCode;

use dispatch_core::clock::ONE_SEC_MS;
use dispatch_core::{Config, Engine, SimError};

fn run(path: PathBuf) -> Result<(), SimError> {
    let config = Config::load(&path)?;
    let mut engine = Engine::from_config(&config)?;
    let report = engine.run()?;
    let summary = &report.summary;

    println!("--- Scenario run ({}) ---", path.display());
    println!("Ticks: {}", summary.ticks);
    println!(
        "Bookings: {} requested, {} completed, {} expired, {} pending and {} assigned at the end",
        summary.requested,
        summary.completed,
        summary.expired,
        summary.unresolved_pending,
        summary.unresolved_assigned
    );
    println!("Routing failures: {}", summary.routing_failures);
    println!("Map match failures: {}", summary.map_match_failures);
    if let Some(wait) = summary.mean_wait_secs {
        println!("Mean wait: {wait:.1} s");
    }

    const SAMPLE: usize = 20;
    println!("\nFirst {SAMPLE} bookings:");
    for booking in report.bookings.iter().take(SAMPLE) {
        println!(
            "  booking={} status={} vehicle={:?} requested={} s wait={:?} s",
            booking.id,
            booking.status.as_str(),
            booking.vehicle.map(|v| v.0),
            booking.requested_at / ONE_SEC_MS,
            booking.wait_ms().map(|ms| ms / ONE_SEC_MS),
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let Some(path) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("usage: scenario_run <scenario.toml>");
        return ExitCode::FAILURE;
    };
    match run(path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
