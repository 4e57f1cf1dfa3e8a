//! Status polling.

use crate::retry::PollBackoff;
use crate::types::{BatchRecord, Event, JobStatus, PollOutcome, Transition};
use chrono::Utc;
use tokio::time::Instant;

use super::Orchestrator;

impl Orchestrator {
    /// Poll every non-terminal job until all are terminal, the global timeout
    /// expires, or the run is cancelled
    ///
    /// Each pass queries every pollable job once, then persists a snapshot.
    /// A status error leaves the job untouched for the next pass. Jobs still
    /// non-terminal at the deadline are reported in
    /// [`PollOutcome::still_pending`] and can be resumed later.
    pub async fn poll(&self, batch: &mut BatchRecord) -> PollOutcome {
        let timeout = self.config.polling.global_timeout;
        let deadline = Instant::now() + timeout;
        let backoff = PollBackoff::from_config(&self.config.polling);
        let mut outcome = PollOutcome::default();

        tracing::info!(
            batch_id = %batch.batch_id,
            pending = batch.pending_ids().len(),
            timeout_secs = timeout.as_secs(),
            min_interval_secs = backoff.min.as_secs_f64(),
            max_interval_secs = backoff.max.as_secs_f64(),
            "Polling started"
        );

        loop {
            let active: Vec<usize> = batch
                .jobs
                .iter()
                .enumerate()
                .filter(|(_, j)| j.needs_polling())
                .map(|(i, _)| i)
                .collect();
            if active.is_empty() {
                break;
            }
            if self.cancel.is_cancelled() {
                outcome.interrupted = true;
                break;
            }
            if Instant::now() >= deadline {
                outcome.timed_out = true;
                break;
            }

            batch.poll_count += 1;
            outcome.passes += 1;
            self.emit(Event::PollPass {
                pass: batch.poll_count,
                active: active.len(),
            });
            tracing::debug!(pass = batch.poll_count, active = active.len(), "Poll pass");

            for idx in active {
                if self.cancel.is_cancelled() {
                    outcome.interrupted = true;
                    break;
                }
                // No request may start once the deadline has passed, even mid-pass
                if Instant::now() >= deadline {
                    outcome.timed_out = true;
                    break;
                }
                outcome.requests += 1;
                self.poll_job(batch, idx).await;
            }

            batch.end_time = Some(Utc::now());
            if let Err(e) = self.store.save(batch).await {
                tracing::error!(
                    batch_id = %batch.batch_id,
                    error = %e,
                    "Failed to persist queue after poll pass"
                );
            }

            if outcome.interrupted
                || outcome.timed_out
                || !batch.jobs.iter().any(|j| j.needs_polling())
            {
                break;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                outcome.timed_out = true;
                break;
            }
            let wait = backoff.next_within(remaining);
            tracing::debug!(wait_secs = wait.as_secs_f64(), "Waiting before next pass");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.cancel.cancelled() => {
                    outcome.interrupted = true;
                    break;
                }
            }
        }

        batch.end_time = Some(Utc::now());
        if let Err(e) = self.store.save(batch).await {
            tracing::error!(
                batch_id = %batch.batch_id,
                error = %e,
                "Failed to persist queue after polling"
            );
        }

        outcome.still_pending = batch.pending_ids();
        if outcome.interrupted {
            tracing::warn!(
                still_pending = outcome.still_pending.len(),
                "Polling interrupted, state persisted"
            );
            self.emit(Event::Interrupted);
        } else if outcome.timed_out {
            tracing::warn!(
                still_pending = outcome.still_pending.len(),
                ids = ?outcome.still_pending,
                "Global timeout reached"
            );
            self.emit(Event::PollTimedOut {
                still_pending: outcome.still_pending.clone(),
            });
        } else {
            tracing::info!(
                passes = outcome.passes,
                succeeded = batch.count(JobStatus::Succeeded),
                failed = batch.count(JobStatus::Failed),
                cancelled = batch.count(JobStatus::Cancelled),
                "All jobs terminal"
            );
        }
        outcome
    }

    async fn poll_job(&self, batch: &mut BatchRecord, idx: usize) {
        let Some(job_id) = batch.jobs[idx].job_id.clone() else {
            return;
        };

        let remote = match self.remote.get_job(&job_id).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Status check failed, will retry next pass");
                return;
            }
        };

        let raw_status = remote.status.clone();
        let observed = JobStatus::from_remote(&raw_status);
        if observed == JobStatus::Unknown {
            tracing::warn!(job_id = %job_id, status = %raw_status, "Unrecognized remote status");
        }

        let job = &mut batch.jobs[idx];
        match job.observe(remote, Utc::now()) {
            Transition::Unchanged => {}
            Transition::Advanced { from, to } => {
                tracing::info!(job_id = %job_id, from = %from, to = %to, "Status changed");
                self.emit(Event::StatusChanged { job_id, from, to });
            }
            Transition::Completed { from, to } => {
                match to {
                    JobStatus::Succeeded => tracing::info!(
                        job_id = %job_id,
                        result_url = job.result_url.as_deref().unwrap_or_default(),
                        "Job succeeded"
                    ),
                    _ => tracing::warn!(
                        job_id = %job_id,
                        status = %to,
                        failure_kind = ?job.failure_kind,
                        reason = job.failure_reason.as_deref().unwrap_or("none given"),
                        "Job finished without artifact"
                    ),
                }
                self.emit(Event::StatusChanged { job_id, from, to });
            }
            Transition::Rejected { current, observed } => {
                tracing::debug!(
                    job_id = %job_id,
                    current = %current,
                    observed = %observed,
                    "Ignoring backwards status observation"
                );
            }
        }
    }
}
