//! genbatch CLI
//!
//! Submits a batch of curated inputs to the remote generation service, polls
//! it to completion, downloads the artifacts and writes the batch report.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use genbatch::types::Platform;
use genbatch::{Config, HttpRemote, Orchestrator, RunSummary, load_inputs, run_with_shutdown};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "genbatch", version)]
#[command(about = "Batch orchestrator for remote image-to-video jobs", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "GENBATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit, poll, download and report a new batch
    Run(RunArgs),
    /// Continue polling a persisted batch, then download and report
    Resume(QueueArgs),
    /// Download artifacts of a persisted batch without polling
    Download(QueueArgs),
    /// Recompute the report of a persisted batch
    Report(QueueArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Image directory or JSON manifest
    #[arg(long, default_value = "./curated_images")]
    inputs: PathBuf,

    /// Submit at most this many inputs
    #[arg(long)]
    max_jobs: Option<usize>,

    /// Platform tag used in artifact names (ig, tt, tw, fb, li, yt)
    #[arg(long)]
    platform: Option<Platform>,

    /// Global polling timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the batch plan without calling the service
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct QueueArgs {
    /// Queue file to use (defaults to the newest in the state directory)
    #[arg(long)]
    queue_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Run(args) => {
            if let Some(max) = args.max_jobs {
                config.generation.max_jobs = Some(max);
            }
            if let Some(platform) = args.platform {
                config.generation.platform = platform;
            }
            if let Some(secs) = args.timeout {
                config.polling.global_timeout = Duration::from_secs(secs);
            }

            let inputs = load_inputs(&args.inputs, &config.generation.default_prompt)
                .with_context(|| format!("loading inputs from {}", args.inputs.display()))?;

            if args.dry_run {
                let orchestrator = build_offline(config)?;
                let plan = orchestrator.plan(&inputs, Utc::now())?;
                println!("{}", serde_json::to_string_pretty(&plan)?);
                return Ok(());
            }

            let orchestrator = build_with_key(config)?;
            let summary = run_with_shutdown(&orchestrator, orchestrator.run(&inputs)).await?;
            print_summary(&summary);
        }
        Command::Resume(args) => {
            let orchestrator = build_with_key(config)?;
            let summary =
                run_with_shutdown(&orchestrator, orchestrator.resume(args.queue_file)).await?;
            print_summary(&summary);
        }
        Command::Download(args) => {
            let orchestrator = build_with_key(config)?;
            let (batch, downloads) =
                run_with_shutdown(&orchestrator, orchestrator.download_only(args.queue_file))
                    .await?;
            println!(
                "Batch {}: {} downloaded, {} already present, {} failed",
                batch.batch_id,
                downloads.stats.downloaded,
                downloads.stats.already_existed,
                downloads.stats.failed
            );
        }
        Command::Report(args) => {
            let orchestrator = build_offline(config)?;
            let summary = orchestrator.report_only(args.queue_file).await?;
            print_summary(&summary);
        }
    }

    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn build_with_key(config: Config) -> Result<Orchestrator> {
    let key = config.api_key()?;
    build(config, key)
}

/// For commands that never call the service, so a missing key is fine
fn build_offline(config: Config) -> Result<Orchestrator> {
    let key = config.api_key().unwrap_or_default();
    build(config, key)
}

fn build(config: Config, api_key: String) -> Result<Orchestrator> {
    let remote = HttpRemote::new(&config.api, api_key)?;
    Ok(Orchestrator::new(config, Arc::new(remote))?)
}

fn print_summary(summary: &RunSummary) {
    let s = &summary.report.batch_summary;
    println!(
        "Batch {}: {} total, {} succeeded, {} failed, {} cancelled, {} pending ({:.2}% success)",
        summary.batch.batch_id,
        s.total,
        s.succeeded,
        s.failed,
        s.cancelled,
        s.pending,
        summary.report.performance_metrics.success_rate_percent
    );
    if let Some(path) = &summary.report_path {
        println!("Report: {}", path.display());
    }
    if summary.interrupted {
        println!("Interrupted; run `genbatch resume` to continue");
    }
}
