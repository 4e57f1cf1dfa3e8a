//! Batch orchestration split into focused submodules.
//!
//! The [`Orchestrator`] struct and its methods are organized by phase:
//! - [`submit`] - one create-job call per curated input
//! - [`poll`] - jittered status polling under a global deadline
//! - [`download`] - streaming artifacts and writing sidecar metadata
//! - [`lifecycle`] - full runs, resumes, and standalone download/report passes

mod download;
mod lifecycle;
mod poll;
mod submit;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use download::ArtifactMetadata;
pub use lifecycle::{BatchPlan, PlannedJob, RunSummary};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::remote::RemoteApi;
use crate::store::QueueStore;
use crate::types::Event;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Drives one batch from submission to report (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Orchestrator {
    /// Configuration (validated at construction)
    pub(crate) config: Arc<Config>,
    /// Remote job service
    pub(crate) remote: Arc<dyn RemoteApi>,
    /// HTTP client for artifact transfers
    pub(crate) http: reqwest::Client,
    /// Queue persistence
    pub(crate) store: Arc<QueueStore>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Cancelled when a termination signal arrives
    pub(crate) cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator over a remote service
    ///
    /// Validates the configuration and builds the artifact HTTP client.
    pub fn new(config: Config, remote: Arc<dyn RemoteApi>) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.download.request_timeout)
            .connect_timeout(config.api.connect_timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {e}")))?;

        let store = Arc::new(QueueStore::new(config.persistence.state_dir.clone()));
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        tracing::info!(
            remote = remote.name(),
            state_dir = %config.persistence.state_dir.display(),
            output_dir = %config.download.output_dir.display(),
            "Orchestrator initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            remote,
            http,
            store,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops the run at the next safe point when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a graceful stop: finish the in-flight call, persist, return
    pub fn shutdown(&self) {
        tracing::info!("Shutdown requested");
        self.cancel.cancel();
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Queue persistence
    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    /// Broadcast an event; having no subscribers is fine
    pub(crate) fn emit(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }
}
