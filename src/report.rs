//! Batch reporting
//!
//! [`BatchReport::compute`] is a pure function of the batch and its downloads.
//! [`persist`] merges the report into a keyed report file holding a list of
//! entries, one per batch.

use crate::error::Result;
use crate::types::{
    BatchRecord, DownloadSummary, FailureKind, JobId, JobRecord, JobStatus,
};
use crate::utils::{bytes_to_mb, format_duration, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Version stamped into every report entry
pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prompts longer than this are truncated in the per-artifact list
const PROMPT_PREVIEW_CHARS: usize = 100;

/// Outcome counts and wall time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Jobs in the batch
    pub total: usize,
    /// Jobs that produced an artifact
    pub succeeded: usize,
    /// Jobs that failed (submission, remote, or succeeded-without-output)
    pub failed: usize,
    /// Jobs cancelled remotely
    pub cancelled: usize,
    /// Jobs still non-terminal
    pub pending: usize,
    /// Seconds from batch start to end of polling
    pub elapsed_seconds: f64,
    /// `elapsed_seconds` for humans
    pub elapsed_formatted: String,
}

/// Rates and latencies
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// `succeeded / total * 100`, two decimals
    pub success_rate_percent: f64,
    /// Mean submit-to-terminal latency over jobs with both timestamps
    pub average_task_duration_seconds: f64,
    /// `average_task_duration_seconds` for humans
    pub average_task_duration_formatted: String,
    /// Jobs that contributed to the mean latency
    pub latency_samples: usize,
    /// Poll passes across the batch's lifetime
    pub total_poll_count: u32,
    /// `total / elapsed_seconds`
    pub tasks_per_second: f64,
}

/// Artifact storage figures
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadMetrics {
    /// Artifacts on disk for this batch
    pub videos_downloaded: usize,
    /// Artifacts streamed in this run
    pub newly_downloaded: usize,
    /// Artifacts that were already present
    pub already_existed: usize,
    /// Downloads that failed
    pub download_failures: usize,
    /// Total artifact size
    pub total_storage_bytes: u64,
    /// Total artifact size in MB
    pub total_storage_mb: f64,
    /// Total artifact size in GB
    pub total_storage_gb: f64,
    /// Mean artifact size in MB
    pub average_video_size_mb: f64,
}

/// Failure counts by cause
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounts {
    /// Create-job calls that failed
    pub submission_failures: usize,
    /// Jobs the service reported as failed
    pub remote_failures: usize,
    /// Jobs reported successful without an artifact
    pub succeeded_without_output: usize,
    /// Artifacts that could not be fetched
    pub download_failures: usize,
}

/// One artifact in the report
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadedVideo {
    /// Artifact file name
    pub filename: String,
    /// Size in MB
    pub size_mb: f64,
    /// Job that produced it
    pub job_id: JobId,
    /// Prompt, truncated
    pub prompt: String,
}

/// Per-job line in the report
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    /// Remote id (absent for submission failures)
    pub job_id: Option<JobId>,
    /// Source asset
    pub input_ref: String,
    /// Artifact base name
    pub target_stub: String,
    /// Local status
    pub status: JobStatus,
    /// Last raw status seen remotely
    pub remote_status: Option<String>,
    /// Submit-to-terminal latency
    pub latency_seconds: Option<f64>,
    /// Failure cause
    pub failure_kind: Option<FailureKind>,
    /// Failure reason
    pub failure_reason: Option<String>,
    /// Create-job attempts
    pub retry_count: u32,
}

/// Report provenance
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Batch identifier; entries in a report file are unique by this
    pub batch_id: String,
    /// When this entry was computed
    pub generated_at: DateTime<Utc>,
    /// Crate version that produced it
    pub generator_version: String,
}

/// One entry in a report file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Outcome counts
    pub batch_summary: BatchSummary,
    /// Rates and latencies
    pub performance_metrics: PerformanceMetrics,
    /// Storage figures
    pub download_metrics: DownloadMetrics,
    /// Failure counts by cause
    pub error_counts: ErrorCounts,
    /// Job count per raw remote status
    pub detailed_status_counts: BTreeMap<String, usize>,
    /// Jobs left non-terminal
    pub still_pending: Vec<JobId>,
    /// Artifacts on disk
    pub downloaded_videos: Vec<DownloadedVideo>,
    /// Every job
    pub jobs: Vec<JobDetail>,
    /// Provenance
    pub batch_metadata: ReportMetadata,
}

impl BatchReport {
    /// Compute the report for a batch
    ///
    /// Never mutates its inputs. Elapsed time runs to the batch's end time, or
    /// to `generated_at` when polling never recorded one.
    pub fn compute(
        batch: &BatchRecord,
        downloads: &DownloadSummary,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let total = batch.jobs.len();
        let succeeded = batch.count(JobStatus::Succeeded);
        let failed = batch.count(JobStatus::Failed);
        let cancelled = batch.count(JobStatus::Cancelled);
        let pending = batch.jobs.iter().filter(|j| !j.is_terminal()).count();

        let end = batch.end_time.unwrap_or(generated_at);
        let elapsed_seconds = ((end - batch.start_time).num_milliseconds().max(0)) as f64 / 1000.0;

        let latencies: Vec<f64> = batch
            .jobs
            .iter()
            .filter_map(JobRecord::latency_seconds)
            .collect();
        let average_latency = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };

        let success_rate = if total == 0 {
            0.0
        } else {
            round2(succeeded as f64 / total as f64 * 100.0)
        };
        let tasks_per_second = if elapsed_seconds > 0.0 {
            (total as f64 / elapsed_seconds * 1000.0).round() / 1000.0
        } else {
            0.0
        };

        let mut detailed_status_counts = BTreeMap::new();
        for job in &batch.jobs {
            let key = job
                .remote_status
                .as_deref()
                .map(str::to_ascii_uppercase)
                .unwrap_or_else(|| job.status.as_str().to_ascii_uppercase());
            *detailed_status_counts.entry(key).or_insert(0) += 1;
        }

        let kind_count = |kind: FailureKind| {
            batch
                .jobs
                .iter()
                .filter(|j| j.failure_kind == Some(kind))
                .count()
        };
        let error_counts = ErrorCounts {
            submission_failures: kind_count(FailureKind::Submission),
            remote_failures: kind_count(FailureKind::Remote),
            succeeded_without_output: kind_count(FailureKind::SucceededWithoutOutput),
            download_failures: downloads.stats.failed,
        };

        let downloaded_videos: Vec<DownloadedVideo> = downloads
            .records
            .iter()
            .map(|record| {
                let prompt = batch
                    .jobs
                    .iter()
                    .find(|j| j.job_id.as_ref() == Some(&record.job_id))
                    .map(|j| preview(&j.prompt))
                    .unwrap_or_default();
                DownloadedVideo {
                    filename: record
                        .local_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    size_mb: bytes_to_mb(record.size_bytes),
                    job_id: record.job_id.clone(),
                    prompt,
                }
            })
            .collect();

        let total_storage_bytes: u64 = downloads.records.iter().map(|r| r.size_bytes).sum();
        let total_storage_mb = bytes_to_mb(total_storage_bytes);
        let average_video_size_mb = if downloads.records.is_empty() {
            0.0
        } else {
            round2(total_storage_mb / downloads.records.len() as f64)
        };

        let jobs = batch
            .jobs
            .iter()
            .map(|j| JobDetail {
                job_id: j.job_id.clone(),
                input_ref: j.input_ref.clone(),
                target_stub: j.target_stub.clone(),
                status: j.status,
                remote_status: j.remote_status.clone(),
                latency_seconds: j.latency_seconds(),
                failure_kind: j.failure_kind,
                failure_reason: j.failure_reason.clone(),
                retry_count: j.retry_count,
            })
            .collect();

        BatchReport {
            batch_summary: BatchSummary {
                total,
                succeeded,
                failed,
                cancelled,
                pending,
                elapsed_seconds,
                elapsed_formatted: format_duration(elapsed_seconds),
            },
            performance_metrics: PerformanceMetrics {
                success_rate_percent: success_rate,
                average_task_duration_seconds: round2(average_latency),
                average_task_duration_formatted: format_duration(average_latency),
                latency_samples: latencies.len(),
                total_poll_count: batch.poll_count,
                tasks_per_second,
            },
            download_metrics: DownloadMetrics {
                videos_downloaded: downloads.records.len(),
                newly_downloaded: downloads.stats.downloaded,
                already_existed: downloads.stats.already_existed,
                download_failures: downloads.stats.failed,
                total_storage_bytes,
                total_storage_mb,
                total_storage_gb: (total_storage_mb / 1024.0 * 1000.0).round() / 1000.0,
                average_video_size_mb,
            },
            error_counts,
            detailed_status_counts,
            still_pending: batch.pending_ids(),
            downloaded_videos,
            jobs,
            batch_metadata: ReportMetadata {
                batch_id: batch.batch_id.clone(),
                generated_at,
                generator_version: GENERATOR_VERSION.to_string(),
            },
        }
    }

    /// Emit a human-readable summary through `tracing`
    pub fn log_summary(&self) {
        let s = &self.batch_summary;
        let p = &self.performance_metrics;
        let d = &self.download_metrics;

        tracing::info!(
            batch_id = %self.batch_metadata.batch_id,
            total = s.total,
            succeeded = s.succeeded,
            failed = s.failed,
            cancelled = s.cancelled,
            pending = s.pending,
            elapsed = %s.elapsed_formatted,
            "Batch summary"
        );
        tracing::info!(
            success_rate = p.success_rate_percent,
            avg_duration = %p.average_task_duration_formatted,
            tasks_per_second = p.tasks_per_second,
            poll_count = p.total_poll_count,
            "Performance"
        );
        tracing::info!(
            downloaded = d.videos_downloaded,
            total_mb = d.total_storage_mb,
            avg_mb = d.average_video_size_mb,
            failures = d.download_failures,
            "Downloads"
        );
        for (status, count) in &self.detailed_status_counts {
            tracing::info!(status = %status, count, "Status breakdown");
        }
        if !self.still_pending.is_empty() {
            tracing::warn!(
                count = self.still_pending.len(),
                ids = ?self.still_pending,
                "Jobs still pending; resume to keep polling"
            );
        }
    }
}

/// Report file key for `at`, e.g. `20240617` with the default format
///
/// An unusable format string falls back to `%Y%m%d`.
pub fn report_key(at: DateTime<Utc>, format: &str) -> String {
    let mut key = String::new();
    if write!(key, "{}", at.format(format)).is_err() || key.is_empty() {
        key = at.format("%Y%m%d").to_string();
    }
    key
}

/// Report file path for a key
pub fn report_path(output_dir: &Path, key: &str) -> PathBuf {
    output_dir.join(format!("batch_report_{key}.json"))
}

/// Merge `report` into the report file at `path`
///
/// - missing file: a one-entry list is created
/// - list: the entry with the same batch id is replaced, otherwise appended
/// - single object: wrapped into a list first
/// - unreadable JSON: moved aside to `<name>.corrupt-<timestamp>` and a new list started
pub async fn persist(report: &BatchReport, path: &Path) -> Result<()> {
    let entry = serde_json::to_value(report)?;
    let batch_id = report.batch_metadata.batch_id.as_str();

    let mut entries: Vec<Value> = match tokio::fs::read(path).await {
        Ok(raw) => match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(Value::Object(obj)) => vec![Value::Object(obj)],
            Ok(_) | Err(_) => {
                let aside = corrupt_path(path, report.batch_metadata.generated_at);
                tracing::warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    "Report file is not a JSON list or object, starting a new one"
                );
                tokio::fs::rename(path, &aside).await?;
                Vec::new()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    match entries.iter().position(|e| entry_batch_id(e) == Some(batch_id)) {
        Some(pos) => entries[pos] = entry,
        None => entries.push(entry),
    }

    write_json_atomic(path, &entries).await?;
    tracing::info!(path = %path.display(), entries = entries.len(), "Report written");
    Ok(())
}

fn entry_batch_id(entry: &Value) -> Option<&str> {
    entry
        .get("batch_metadata")
        .and_then(|m| m.get("batch_id"))
        .and_then(Value::as_str)
}

fn corrupt_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".corrupt-{}", at.format("%Y%m%d_%H%M%S")));
    path.with_file_name(name)
}

fn preview(prompt: &str) -> String {
    if prompt.chars().count() > PROMPT_PREVIEW_CHARS {
        let cut: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        prompt.to_string()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DownloadOutcome, DownloadRecord, DownloadStats, Platform, RemoteJob};
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 17, 12, 0, 0).unwrap()
    }

    fn job(id: &str) -> JobRecord {
        JobRecord::submitted(JobId::from(id), format!("{id}.png"), "p", id, start(), 1)
    }

    fn abc_batch() -> BatchRecord {
        let mut batch = BatchRecord::new("20240617_120000", start(), Platform::Ig);

        let mut a = job("a");
        a.observe(
            RemoteJob {
                id: "a".into(),
                status: "SUCCEEDED".into(),
                output: vec!["http://x/a.mp4".into()],
                ..Default::default()
            },
            start() + Duration::seconds(30),
        );

        let mut b = job("b");
        b.observe(
            RemoteJob {
                id: "b".into(),
                status: "FAILED".into(),
                failure_reason: Some("moderation".into()),
                ..Default::default()
            },
            start() + Duration::seconds(10),
        );

        let mut c = job("c");
        c.observe(
            RemoteJob {
                id: "c".into(),
                status: "RUNNING".into(),
                ..Default::default()
            },
            start() + Duration::seconds(5),
        );

        batch.jobs = vec![a, b, c];
        batch.end_time = Some(start() + Duration::seconds(65));
        batch.poll_count = 7;
        batch
    }

    fn downloads() -> DownloadSummary {
        DownloadSummary {
            stats: DownloadStats {
                downloaded: 1,
                already_existed: 0,
                failed: 0,
            },
            records: vec![DownloadRecord {
                job_id: JobId::from("a"),
                local_path: PathBuf::from("out/a.mp4"),
                size_bytes: 2 * 1024 * 1024,
                metadata_path: PathBuf::from("out/a.json"),
                outcome: DownloadOutcome::Downloaded,
            }],
            failures: vec![],
        }
    }

    #[test]
    fn abc_scenario_metrics() {
        let batch = abc_batch();
        let report = BatchReport::compute(&batch, &downloads(), start() + Duration::hours(1));

        let s = &report.batch_summary;
        assert_eq!((s.total, s.succeeded, s.failed, s.cancelled, s.pending), (3, 1, 1, 0, 1));
        assert_eq!(s.elapsed_seconds, 65.0);
        assert_eq!(s.elapsed_formatted, "1m 5.0s");

        let p = &report.performance_metrics;
        assert_eq!(p.success_rate_percent, 33.33);
        // a: 30s, b: 10s
        assert_eq!(p.average_task_duration_seconds, 20.0);
        assert_eq!(p.latency_samples, 2);
        assert_eq!(p.total_poll_count, 7);

        assert_eq!(report.download_metrics.videos_downloaded, 1);
        assert_eq!(report.download_metrics.total_storage_mb, 2.0);
        assert_eq!(report.still_pending, vec![JobId::from("c")]);
        assert_eq!(report.error_counts.remote_failures, 1);
        assert_eq!(report.detailed_status_counts.get("RUNNING"), Some(&1));
        assert_eq!(report.downloaded_videos[0].filename, "a.mp4");
    }

    #[test]
    fn compute_does_not_mutate_inputs() {
        let batch = abc_batch();
        let before = batch.clone();
        let _ = BatchReport::compute(&batch, &downloads(), Utc::now());
        assert_eq!(batch, before);
    }

    #[test]
    fn empty_batch_has_zero_rates() {
        let batch = BatchRecord::new("empty", start(), Platform::Ig);
        let report = BatchReport::compute(&batch, &DownloadSummary::default(), start());
        assert_eq!(report.performance_metrics.success_rate_percent, 0.0);
        assert_eq!(report.performance_metrics.tasks_per_second, 0.0);
        assert_eq!(report.download_metrics.average_video_size_mb, 0.0);
    }

    #[test]
    fn submission_failures_are_excluded_from_latency() {
        let mut batch = BatchRecord::new("x", start(), Platform::Ig);
        batch.jobs.push(JobRecord::submission_failed(
            "a.png", "p", "a", start(), 3, "refused",
        ));
        let report = BatchReport::compute(&batch, &DownloadSummary::default(), start());
        assert_eq!(report.performance_metrics.latency_samples, 0);
        assert_eq!(report.error_counts.submission_failures, 1);
        assert_eq!(report.detailed_status_counts.get("FAILED"), Some(&1));
    }

    #[test]
    fn long_prompts_are_truncated() {
        let long = "x".repeat(150);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 103);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn report_key_uses_format() {
        let at = start();
        assert_eq!(report_key(at, "%Y%m%d"), "20240617");
        assert_eq!(report_key(at, "%Y%m%d_%H%M%S"), "20240617_120000");
        assert_eq!(report_key(at, ""), "20240617");
    }

    fn entry(batch_id: &str) -> BatchReport {
        let batch = BatchRecord::new(batch_id, start(), Platform::Ig);
        BatchReport::compute(&batch, &DownloadSummary::default(), start())
    }

    fn read_list(path: &Path) -> Vec<Value> {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn persist_creates_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = report_path(dir.path(), "20240617");

        persist(&entry("one"), &path).await.unwrap();
        persist(&entry("two"), &path).await.unwrap();

        let list = read_list(&path);
        assert_eq!(list.len(), 2);
        assert_eq!(entry_batch_id(&list[0]), Some("one"));
        assert_eq!(entry_batch_id(&list[1]), Some("two"));
    }

    #[tokio::test]
    async fn persist_replaces_entry_for_same_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = report_path(dir.path(), "k");

        persist(&entry("one"), &path).await.unwrap();
        let mut updated = entry("one");
        updated.performance_metrics.total_poll_count = 42;
        persist(&updated, &path).await.unwrap();

        let list = read_list(&path);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["performance_metrics"]["total_poll_count"], 42);
    }

    #[tokio::test]
    async fn persist_wraps_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = report_path(dir.path(), "k");
        std::fs::write(
            &path,
            r#"{"batch_metadata": {"batch_id": "legacy"}, "batch_summary": {}}"#,
        )
        .unwrap();

        persist(&entry("new"), &path).await.unwrap();

        let list = read_list(&path);
        assert_eq!(list.len(), 2);
        assert_eq!(entry_batch_id(&list[0]), Some("legacy"));
        assert_eq!(entry_batch_id(&list[1]), Some("new"));
    }

    #[tokio::test]
    async fn persist_moves_corrupt_file_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = report_path(dir.path(), "k");
        std::fs::write(&path, "{ not json").unwrap();

        persist(&entry("fresh"), &path).await.unwrap();

        let list = read_list(&path);
        assert_eq!(list.len(), 1);
        let aside = corrupt_path(&path, start());
        assert_eq!(std::fs::read_to_string(aside).unwrap(), "{ not json");
    }
}
