mod cli;
mod env;
mod error;
mod logging;
mod progress;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use error::{CliError, Result};
use fdpb::engine::config::RunConfigBuilder;
use fdpb::engine::progress::ProgressReporter;
use fdpb::workflows::run;
use progress::CliProgressHandler;
use std::time::Duration;
use tracing::info;

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run_app(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run_app(cli: Cli) -> Result<()> {
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.clone())?;
    info!(version = env!("CARGO_PKG_VERSION"), "fdpb starting");

    cli.check_override()?;
    let bin_dir = env::solver_bin_dir()?;
    let params = cli.parameters();
    let spec = cli.sweep_spec()?;

    let scratch_root = cli
        .scratch_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("fdpb-scratch"));
    std::fs::create_dir_all(&scratch_root)
        .with_context(|| format!("failed to create scratch root {}", scratch_root.display()))?;
    let config = RunConfigBuilder::new()
        .bin_dir(bin_dir)
        .scratch_root(scratch_root)
        .output_root(cli.out_dir.clone())
        .poll_interval(Duration::from_millis(cli.poll_interval_ms))
        .max_refine_iterations(cli.max_refine_iterations)
        .stage_timeout(cli.stage_timeout_secs.map(Duration::from_secs))
        .keep_scratch(cli.keep_temp)
        .continue_on_failure(cli.continue_on_failure)
        .build()?;

    let handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(handler.get_callback());
    let summary = run::run(&config, &params, &spec, &cli.target, &reporter)?;

    if summary.failures.is_empty() {
        println!(
            "Completed {} calculation(s); results under {}",
            summary.completed,
            cli.out_dir.display()
        );
        Ok(())
    } else {
        eprintln!("Failed calculations:");
        for failure in &summary.failures {
            eprintln!("  {} [{}]: {}", failure.structure, failure.point, failure.message);
        }
        Err(CliError::PointsFailed {
            failed: summary.failures.len(),
            total: summary.completed + summary.failures.len(),
        })
    }
}
