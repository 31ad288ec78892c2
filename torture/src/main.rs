use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use cli::Cli;
use workload::Workload;

mod cli;
mod logging;
mod panic;
mod workload;

fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let seed = cli.seed.unwrap_or_else(rand::random);
    let params = cli.workload_params;
    info!(
        seed,
        iterations = params.iterations,
        setters = params.setters,
        pollers = params.pollers,
        waiters = params.waiters,
        "starting flag torture"
    );

    let iterations = params.iterations;
    let mut workload = Workload::new(seed, params);
    let started = Instant::now();
    let mut failures = 0;
    let mut completed = 0;
    for iteration in 0..iterations {
        completed += 1;
        if let Err(violation) = workload.run_iteration(iteration)? {
            failures += 1;
            error!(iteration, %violation, "iteration failed");
            if failures >= cli.failure_limit {
                warn!(failures, "failure limit reached, stopping");
                break;
            }
        }
    }

    info!(
        completed,
        failures,
        elapsed = %humantime::format_duration(started.elapsed()),
        "done"
    );
    if failures > 0 {
        anyhow::bail!(
            "{} of {} iterations failed (seed {})",
            failures,
            completed,
            seed
        );
    }
    Ok(())
}
