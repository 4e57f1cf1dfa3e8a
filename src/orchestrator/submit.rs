//! Job submission.

use crate::error::{Error, Result};
use crate::inputs::CuratedInput;
use crate::remote::CreateJobRequest;
use crate::retry::with_retry;
use crate::types::{BatchRecord, Event, JobRecord};
use crate::utils::target_stub;
use chrono::Utc;

use super::Orchestrator;

impl Orchestrator {
    /// Submit one input as the `index`-th job of `batch`
    ///
    /// The target stub is fixed before the remote call. Any failure yields a
    /// terminal Failed record; nothing is dropped. Only connect failures are
    /// retried, since a request that reached the service may have created a job.
    pub async fn submit(&self, batch: &BatchRecord, index: usize, input: &CuratedInput) -> JobRecord {
        let submitted_at = Utc::now();
        let stub = target_stub(&input.input_ref, batch.platform, submitted_at, index);
        let request =
            CreateJobRequest::new(&input.input_ref, &input.prompt, &self.config.generation);

        let attempted = with_retry(&self.config.submit_retry, || {
            self.remote.create_job(&request)
        })
        .await;

        let failure = match attempted.result {
            Ok(job_id) if batch.jobs.iter().any(|j| j.job_id.as_ref() == Some(&job_id)) => {
                format!("service returned duplicate job id {job_id}")
            }
            Ok(job_id) => {
                tracing::info!(
                    index,
                    job_id = %job_id,
                    input = %input.input_ref,
                    target_stub = %stub,
                    attempts = attempted.attempts,
                    "Job submitted"
                );
                self.emit(Event::JobSubmitted {
                    index,
                    job_id: job_id.clone(),
                    target_stub: stub.clone(),
                });
                return JobRecord::submitted(
                    job_id,
                    &input.input_ref,
                    &input.prompt,
                    stub,
                    submitted_at,
                    attempted.attempts,
                );
            }
            Err(e) => e.to_string(),
        };

        tracing::error!(
            index,
            input = %input.input_ref,
            attempts = attempted.attempts,
            error = %failure,
            "Submission failed"
        );
        self.emit(Event::SubmissionFailed {
            index,
            input_ref: input.input_ref.clone(),
            error: failure.clone(),
        });
        JobRecord::submission_failed(
            &input.input_ref,
            &input.prompt,
            stub,
            submitted_at,
            attempted.attempts,
            failure,
        )
    }

    /// Submit every input in order, persisting the queue after each one
    ///
    /// Successive submissions are separated by `generation.submit_delay`. On
    /// cancellation the remaining inputs are skipped, the queue is persisted,
    /// and [`Error::Interrupted`] is returned.
    pub async fn submit_all(&self, batch: &mut BatchRecord, inputs: &[CuratedInput]) -> Result<()> {
        let offset = batch.jobs.len();
        tracing::info!(
            batch_id = %batch.batch_id,
            count = inputs.len(),
            "Submitting batch"
        );

        for (i, input) in inputs.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return self.interrupted_during_submit(batch, inputs.len() - i).await;
            }

            if i > 0 && !self.config.generation.submit_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.generation.submit_delay) => {}
                    _ = self.cancel.cancelled() => {
                        return self.interrupted_during_submit(batch, inputs.len() - i).await;
                    }
                }
            }

            let record = self.submit(batch, offset + i, input).await;
            batch.jobs.push(record);

            if let Err(e) = self.store.save(batch).await {
                tracing::error!(
                    batch_id = %batch.batch_id,
                    error = %e,
                    "Failed to persist queue after submission"
                );
            }
        }

        let failed = batch.jobs[offset..]
            .iter()
            .filter(|j| j.job_id.is_none())
            .count();
        tracing::info!(
            batch_id = %batch.batch_id,
            submitted = inputs.len() - failed,
            failed,
            "Submission complete"
        );
        Ok(())
    }

    async fn interrupted_during_submit(&self, batch: &BatchRecord, skipped: usize) -> Result<()> {
        tracing::warn!(
            batch_id = %batch.batch_id,
            submitted = batch.jobs.len(),
            skipped,
            "Interrupted during submission"
        );
        if let Err(e) = self.store.save(batch).await {
            tracing::error!(error = %e, "Failed to persist queue on interrupt");
        }
        self.emit(Event::Interrupted);
        Err(Error::Interrupted)
    }
}
