//! Shared test helpers: a scripted remote service and a scratch orchestrator.

use crate::config::Config;
use crate::error::{PollError, SubmissionError};
use crate::orchestrator::Orchestrator;
use crate::remote::{CreateJobRequest, RemoteApi};
use crate::types::{JobId, RemoteJob};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory [`RemoteApi`] driven by per-input and per-job scripts
///
/// - `create_job` pops the script registered for the request's `input_ref`;
///   with no script it returns `job-{n}`.
/// - `get_job` pops the next status for the job; the last entry repeats.
///   Jobs with no script report `PENDING`.
#[derive(Default)]
pub(crate) struct ScriptedRemote {
    creates: Mutex<HashMap<String, VecDeque<Result<JobId, SubmissionError>>>>,
    statuses: Mutex<HashMap<JobId, VecDeque<Result<RemoteJob, PollError>>>>,
    next_id: AtomicUsize,
    latency: Duration,
    pub(crate) create_calls: AtomicUsize,
    pub(crate) get_calls: AtomicUsize,
}

impl ScriptedRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every `get_job` call take `latency` before answering
    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue create-job results for an input
    pub(crate) fn on_create(
        &self,
        input_ref: &str,
        results: Vec<Result<JobId, SubmissionError>>,
    ) -> &Self {
        self.creates
            .lock()
            .unwrap()
            .insert(input_ref.to_string(), results.into());
        self
    }

    /// Queue status observations for a job
    pub(crate) fn on_status(&self, job_id: &str, results: Vec<Result<RemoteJob, PollError>>) -> &Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(JobId::from(job_id), results.into());
        self
    }

    pub(crate) fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn create_job(&self, request: &CreateJobRequest) -> Result<JobId, SubmissionError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self
            .creates
            .lock()
            .unwrap()
            .get_mut(&request.input_ref)
            .and_then(|q| q.pop_front());
        match scripted {
            Some(result) => result,
            None => {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                Ok(JobId::new(format!("job-{n}")))
            }
        }
    }

    async fn get_job(&self, job_id: &JobId) -> Result<RemoteJob, PollError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut statuses = self.statuses.lock().unwrap();
        match statuses.get_mut(job_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if queue.len() == 1 => queue[0].clone(),
            _ => Ok(remote_job(job_id.as_str(), "PENDING")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Remote payload with a status and nothing else
pub(crate) fn remote_job(id: &str, status: &str) -> RemoteJob {
    RemoteJob {
        id: id.to_string(),
        status: status.to_string(),
        ..Default::default()
    }
}

/// Successful remote payload pointing at `url`
pub(crate) fn succeeded(id: &str, url: &str) -> RemoteJob {
    RemoteJob {
        output: vec![url.to_string()],
        ..remote_job(id, "SUCCEEDED")
    }
}

/// Failed remote payload with a reason
pub(crate) fn failed(id: &str, reason: &str) -> RemoteJob {
    RemoteJob {
        failure_reason: Some(reason.to_string()),
        ..remote_job(id, "FAILED")
    }
}

/// Config rooted in `dir` with fast polling and no pacing
pub(crate) fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.persistence.state_dir = dir.join("state");
    config.download.output_dir = dir.join("out");
    config.generation.submit_delay = Duration::ZERO;
    config.polling.min_interval = Duration::from_millis(10);
    config.polling.max_interval = Duration::from_millis(20);
    config.polling.global_timeout = Duration::from_secs(5);
    config.submit_retry.initial_delay = Duration::from_millis(1);
    config.submit_retry.max_delay = Duration::from_millis(5);
    config.submit_retry.jitter = false;
    config
}

/// Orchestrator over a scripted remote, plus the tempdir that must stay alive
pub(crate) fn create_test_orchestrator(
    remote: Arc<ScriptedRemote>,
) -> (Orchestrator, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let orchestrator = Orchestrator::new(config, remote).unwrap();
    (orchestrator, dir)
}

/// Same as [`create_test_orchestrator`] with a config tweak applied
pub(crate) fn create_test_orchestrator_with(
    remote: Arc<ScriptedRemote>,
    tweak: impl FnOnce(&mut Config),
) -> (Orchestrator, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    tweak(&mut config);
    let orchestrator = Orchestrator::new(config, remote).unwrap();
    (orchestrator, dir)
}
