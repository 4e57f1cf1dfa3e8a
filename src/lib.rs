//! # genbatch
//!
//! Batch orchestrator for asynchronous remote generation jobs.
//!
//! A batch is a set of curated inputs (an image plus a prompt) submitted to a
//! remote job service. genbatch drives each batch through four phases:
//! - **Submit** - one create-job call per input, paced and retried only when
//!   the service was provably not reached
//! - **Poll** - jittered status passes under a global deadline
//! - **Download** - streamed artifacts with a JSON sidecar each
//! - **Report** - a per-day report file, upserted by batch id
//!
//! Every phase persists the queue to disk, so an interrupted batch can be
//! resumed later.
//!
//! ## Quick Start
//!
//! ```no_run
//! use genbatch::{Config, HttpRemote, Orchestrator, load_inputs, run_with_shutdown};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let remote = HttpRemote::new(&config.api, config.api_key()?)?;
//!     let inputs = load_inputs(Path::new("./images"), &config.generation.default_prompt)?;
//!
//!     let orchestrator = Orchestrator::new(config, Arc::new(remote))?;
//!
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = run_with_shutdown(&orchestrator, orchestrator.run(&inputs)).await?;
//!     println!("{} of {} succeeded", summary.report.batch_summary.succeeded, summary.batch.jobs.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

use std::future::Future;

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Curated input discovery
pub mod inputs;
/// Batch orchestration (decomposed into focused submodules)
pub mod orchestrator;
/// Remote job service client
pub mod remote;
/// Batch reports
pub mod report;
/// Retry logic and poll interval jitter
pub mod retry;
/// Queue file persistence
pub mod store;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{DownloadError, Error, PollError, Result, SubmissionError};
pub use inputs::{CuratedInput, load_inputs};
pub use orchestrator::{BatchPlan, Orchestrator, RunSummary};
pub use remote::{CreateJobRequest, HttpRemote, RemoteApi};
pub use report::BatchReport;
pub use store::QueueStore;
pub use types::{
    BatchRecord, DownloadSummary, Event, FailureKind, JobId, JobRecord, JobStatus, Platform,
    PollOutcome, RemoteJob,
};

/// Drive `work` to completion, stopping the orchestrator gracefully on a
/// termination signal.
///
/// On a signal the orchestrator's `shutdown()` is called; `work` then
/// finishes its in-flight call, persists the queue, and returns normally.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown<F>(orchestrator: &Orchestrator, work: F) -> F::Output
where
    F: Future,
{
    let watcher = {
        let orchestrator = orchestrator.clone();
        let token = orchestrator.cancellation_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_signal() => orchestrator.shutdown(),
                _ = token.cancelled() => {}
            }
        })
    };

    let output = work.await;
    watcher.abort();
    output
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(_), Err(e)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
