//! rechunk - Cluster-Wide File Rewriter
//!
//! Entry point for the CLI application. The same binary runs in two modes:
//! coordinator mode on the driving host and worker mode when launched on a
//! remote host by the coordinator.

use anyhow::{Context, Result};
use clap::Parser;
use rechunk::config::{CliArgs, CoordinatorConfig, RunMode, WorkerConfig};
use rechunk::coordinator::Coordinator;
use rechunk::executor::WorkerOutcome;
use rechunk::progress::{print_header, print_summary};
use rechunk::worker::WorkerEngine;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    match RunMode::from_args(args).context("Invalid configuration")? {
        RunMode::Coordinator(config) => run_coordinator(config),
        RunMode::Worker(config) => run_worker(config),
    }
}

fn run_coordinator(config: CoordinatorConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    let worker_count = config.nodes.len() * config.multiplier;
    if config.show_progress {
        print_header(
            &config.root.display().to_string(),
            config.nodes.len(),
            worker_count,
            &config.cache_dir.display().to_string(),
        );
    }

    let show_progress = config.show_progress;
    let coordinator = Coordinator::new(config);

    // Interrupting the run abandons the workers; their output channels
    // break when the ssh processes die, and they stop cooperatively.
    let shutdown = coordinator.shutdown_token();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown.cancel();
    })
    .context("Failed to set signal handler")?;

    let summary = runtime
        .block_on(coordinator.run())
        .context("Rechunk failed")?;

    if show_progress {
        print_summary(
            summary.completed,
            summary.total_files,
            summary.total_bytes,
            summary.duration,
            &summary.reports,
        );
    }

    let failed = summary
        .reports
        .iter()
        .filter(|r| r.outcome != WorkerOutcome::Completed)
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} worker(s) did not complete");
    }

    Ok(())
}

fn run_worker(config: WorkerConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    let engine = WorkerEngine::new(config);
    runtime.block_on(engine.run()).context("Worker failed")?;

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("rechunk=debug,warn")
    } else {
        EnvFilter::new("rechunk=info,warn")
    };

    // Logs go to stderr in both modes: a worker's stdout is the progress
    // wire channel, and the coordinator's stdout carries the display.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
