//! tallyd: the tally daemon.
//!
//! Runs one request-count pipeline end to end:
//! - Synthetic producer
//! - Bucket aggregator
//! - Gated sink
//! - Control loop + scale-up signals
//! - Reconciliation against the producer's ground truth
//!
//! # Usage
//!
//! ```text
//! tallyd run --config tally.toml --seed 7 --metrics
//! tallyd config > tally.toml
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tally_autoscale::ScaleUp;
use tally_core::{PipelineConfig, TokioClock};
use tally_metrics::render_prometheus;
use tally_pipeline::run_synthetic;

const DEFAULT_FILTER: &str = "info,tally=debug,tallyd=debug";

#[derive(Parser)]
#[command(name = "tallyd", about = "Request-count pipeline daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline once and reconcile.
    Run(RunArgs),

    /// Print the default configuration as TOML.
    Config,
}

#[derive(Args)]
struct RunArgs {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the scale-up threshold.
    #[arg(long)]
    threshold: Option<u64>,

    /// Seed the synthetic producer for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Print Prometheus metrics to stdout when the run ends.
    #[arg(long)]
    metrics: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            init_tracing(args.json_logs);
            run(args).await
        }
        Command::Config => {
            print!("{}", PipelineConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.autoscale.threshold = threshold;
    }
    if let Some(seed) = args.seed {
        config.producer.seed = Some(seed);
    }
    let settings = config.resolve().context("invalid configuration")?;

    info!(config = ?args.config, "tallyd starting");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!(error = %e, "failed to install Ctrl-C handler"),
        }
    });

    // ── Scale controller ───────────────────────────────────────

    // Stands in for the external controller: logs every request.
    let (signals_tx, mut signals_rx) = mpsc::unbounded_channel::<ScaleUp>();
    let controller = tokio::spawn(async move {
        let mut requests = 0u64;
        while let Some(signal) = signals_rx.recv().await {
            requests += 1;
            info!(
                key = %signal.key,
                observed = signal.observed,
                threshold = signal.threshold,
                "scale-up requested"
            );
        }
        requests
    });

    // ── Pipeline ───────────────────────────────────────────────

    let result = run_synthetic(settings, TokioClock::system(), Some(signals_tx), shutdown_rx).await;
    let requests = controller.await.unwrap_or_default();

    let summary = result.context("pipeline run failed")?;

    if args.metrics {
        print!("{}", render_prometheus(&summary.stats));
    }

    info!(
        compared = summary.report.compared,
        scale_ups = requests,
        "tallyd stopped"
    );
    Ok(())
}
