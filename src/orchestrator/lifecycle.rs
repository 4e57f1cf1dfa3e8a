//! Whole-batch flows: run, resume, and standalone download/report passes.

use crate::error::{Error, Result};
use crate::inputs::CuratedInput;
use crate::report::{self, BatchReport};
use crate::types::{BatchRecord, DownloadSummary, Event, PollOutcome};
use crate::utils::{batch_id, target_stub};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use super::Orchestrator;

/// What a run would submit, without calling the service
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchPlan {
    /// Batch id the run would use
    pub batch_id: String,
    /// Jobs in submission order
    pub jobs: Vec<PlannedJob>,
}

/// One planned submission
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlannedJob {
    /// Source asset
    pub input_ref: String,
    /// Prompt
    pub prompt: String,
    /// Artifact base name
    pub target_stub: String,
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunSummary {
    /// Final batch state
    pub batch: BatchRecord,
    /// Polling outcome, when polling ran
    pub poll: Option<PollOutcome>,
    /// Download outcome
    pub downloads: DownloadSummary,
    /// Computed report
    pub report: BatchReport,
    /// Where the report was written, if it could be
    pub report_path: Option<PathBuf>,
    /// Whether a termination signal cut the run short
    pub interrupted: bool,
}

impl Orchestrator {
    /// Dry run: the batch id and target stubs a run would use right now
    ///
    /// An empty input set is the same setup error [`Orchestrator::run`] reports.
    pub fn plan(&self, inputs: &[CuratedInput], at: DateTime<Utc>) -> Result<BatchPlan> {
        let inputs = self.limit(inputs);
        if inputs.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let platform = self.config.generation.platform;
        let jobs = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| PlannedJob {
                input_ref: input.input_ref.clone(),
                prompt: input.prompt.clone(),
                target_stub: target_stub(&input.input_ref, platform, at, i),
            })
            .collect();
        Ok(BatchPlan {
            batch_id: batch_id(at),
            jobs,
        })
    }

    /// Submit, poll, download and report a new batch
    ///
    /// An empty input set is a setup error. Interruption during submission or
    /// polling skips the download phase; the report still reflects what was
    /// observed.
    pub async fn run(&self, inputs: &[CuratedInput]) -> Result<RunSummary> {
        let inputs = self.limit(inputs);
        if inputs.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let started = Utc::now();
        let mut batch = BatchRecord::new(batch_id(started), started, self.config.generation.platform);
        tracing::info!(
            batch_id = %batch.batch_id,
            jobs = inputs.len(),
            platform = %batch.platform,
            "Starting batch"
        );

        match self.submit_all(&mut batch, inputs).await {
            Ok(()) => {}
            Err(Error::Interrupted) => return Ok(self.finish(batch, None, true).await),
            Err(e) => return Err(e),
        }

        Ok(self.poll_and_finish(batch).await)
    }

    /// Continue polling a persisted batch, then download and report
    ///
    /// With no path, the newest queue file in the state directory is used.
    pub async fn resume(&self, queue_file: Option<PathBuf>) -> Result<RunSummary> {
        let path = self.resolve_queue(queue_file)?;
        let batch = self.store.load(&path).await?;
        tracing::info!(
            batch_id = %batch.batch_id,
            pending = batch.pending_ids().len(),
            poll_count = batch.poll_count,
            "Resuming batch"
        );
        Ok(self.poll_and_finish(batch).await)
    }

    /// Download artifacts of a persisted batch without polling
    pub async fn download_only(
        &self,
        queue_file: Option<PathBuf>,
    ) -> Result<(BatchRecord, DownloadSummary)> {
        let path = self.resolve_queue(queue_file)?;
        let batch = self.store.load(&path).await?;
        let downloads = self.download_results(&batch).await;
        Ok((batch, downloads))
    }

    /// Recompute and persist the report of a persisted batch from disk state
    pub async fn report_only(&self, queue_file: Option<PathBuf>) -> Result<RunSummary> {
        let path = self.resolve_queue(queue_file)?;
        let batch = self.store.load(&path).await?;
        let downloads = self.existing_artifacts(&batch).await;
        let (report, report_path) = self.write_report(&batch, &downloads).await;
        Ok(RunSummary {
            batch,
            poll: None,
            downloads,
            report,
            report_path,
            interrupted: false,
        })
    }

    async fn poll_and_finish(&self, mut batch: BatchRecord) -> RunSummary {
        let outcome = self.poll(&mut batch).await;
        let interrupted = outcome.interrupted;
        self.finish(batch, Some(outcome), interrupted).await
    }

    async fn finish(
        &self,
        batch: BatchRecord,
        poll: Option<PollOutcome>,
        interrupted: bool,
    ) -> RunSummary {
        let downloads = if interrupted {
            tracing::warn!("Skipping downloads after interrupt; resume to continue");
            self.existing_artifacts(&batch).await
        } else {
            self.download_results(&batch).await
        };
        let (report, report_path) = self.write_report(&batch, &downloads).await;
        RunSummary {
            batch,
            poll,
            downloads,
            report,
            report_path,
            interrupted,
        }
    }

    /// Report persistence failures are logged, never fatal.
    async fn write_report(
        &self,
        batch: &BatchRecord,
        downloads: &DownloadSummary,
    ) -> (BatchReport, Option<PathBuf>) {
        let now = Utc::now();
        let report = BatchReport::compute(batch, downloads, now);
        report.log_summary();

        let key = report::report_key(now, &self.config.persistence.report_key_format);
        let path = report::report_path(&self.config.download.output_dir, &key);
        match report::persist(&report, &path).await {
            Ok(()) => {
                self.emit(Event::ReportWritten { path: path.clone() });
                (report, Some(path))
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to write report");
                (report, None)
            }
        }
    }

    fn resolve_queue(&self, queue_file: Option<PathBuf>) -> Result<PathBuf> {
        match queue_file {
            Some(path) => Ok(path),
            None => self.store.latest()?.ok_or_else(|| Error::QueueFile {
                path: self.store.state_dir().to_path_buf(),
                reason: "no task_queue_*.json file found".to_string(),
            }),
        }
    }

    fn limit<'a>(&self, inputs: &'a [CuratedInput]) -> &'a [CuratedInput] {
        match self.config.generation.max_jobs {
            Some(max) if max < inputs.len() => &inputs[..max],
            _ => inputs,
        }
    }
}
