//! Core types for genbatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Opaque identifier issued by the remote service for one job
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new JobId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local view of a job's lifecycle
///
/// Terminal states are [`Succeeded`](JobStatus::Succeeded),
/// [`Failed`](JobStatus::Failed) and [`Cancelled`](JobStatus::Cancelled).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created locally, no status observed yet
    Submitted,
    /// Waiting in the remote queue
    Pending,
    /// Being generated
    Running,
    /// Finished with an artifact
    Succeeded,
    /// Finished without an artifact
    Failed,
    /// Cancelled remotely
    Cancelled,
    /// Remote reported a status we do not recognise
    Unknown,
}

impl JobStatus {
    /// Translate a remote status string into the local enum.
    ///
    /// Matching is case-insensitive. Anything not in the table maps to
    /// [`JobStatus::Unknown`], which is non-terminal.
    pub fn from_remote(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "QUEUED" | "THROTTLED" | "SUBMITTED" => JobStatus::Pending,
            "RUNNING" | "IN_PROGRESS" | "PROCESSING" => JobStatus::Running,
            "SUCCEEDED" | "SUCCESS" | "COMPLETED" => JobStatus::Succeeded,
            "FAILED" | "ERROR" => JobStatus::Failed,
            "CANCELLED" | "CANCELED" | "ABORTED" => JobStatus::Cancelled,
            _ => JobStatus::Unknown,
        }
    }

    /// Whether no further transition can happen from this state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Position along the lifecycle; transitions never move to a lower rank.
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Submitted | JobStatus::Unknown => 0,
            JobStatus::Pending => 1,
            JobStatus::Running => 2,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled => 3,
        }
    }

    /// Lowercase name used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job ended up [`Failed`](JobStatus::Failed)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The create-job call failed; no remote job exists
    Submission,
    /// The remote service reported the job as failed
    Remote,
    /// The remote service reported success but returned no artifact
    SucceededWithoutOutput,
}

/// Target platform tag, embedded in artifact filenames
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Instagram
    #[default]
    Ig,
    /// TikTok
    Tt,
    /// Twitter / X
    Tw,
    /// Facebook
    Fb,
    /// LinkedIn
    Li,
    /// YouTube
    Yt,
}

impl Platform {
    /// Short tag used in filenames
    pub fn tag(&self) -> &'static str {
        match self {
            Platform::Ig => "ig",
            Platform::Tt => "tt",
            Platform::Tw => "tw",
            Platform::Fb => "fb",
            Platform::Li => "li",
            Platform::Yt => "yt",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ig" | "instagram" => Ok(Platform::Ig),
            "tt" | "tiktok" => Ok(Platform::Tt),
            "tw" | "twitter" | "x" => Ok(Platform::Tw),
            "fb" | "facebook" => Ok(Platform::Fb),
            "li" | "linkedin" => Ok(Platform::Li),
            "yt" | "youtube" => Ok(Platform::Yt),
            other => Err(format!(
                "unknown platform '{other}' (expected one of: ig, tt, tw, fb, li, yt)"
            )),
        }
    }
}

/// Reduced copy of a remote job status payload
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteJob {
    /// Remote job id
    pub id: String,
    /// Raw remote status string
    pub status: String,
    /// Artifact locations; only the first is consumed
    #[serde(default)]
    pub output: Vec<String>,
    /// Failure reason as reported by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Machine-readable failure code, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,
    /// Progress in `[0.0, 1.0]`, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Remote creation timestamp, verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl RemoteJob {
    /// First non-empty output URL
    pub fn first_output(&self) -> Option<&str> {
        self.output
            .first()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

/// Result of applying a remote observation to a [`JobRecord`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Observed status equals the current one
    Unchanged,
    /// Moved forward to another non-terminal state
    Advanced {
        /// Previous status
        from: JobStatus,
        /// New status
        to: JobStatus,
    },
    /// Reached a terminal state
    Completed {
        /// Previous status
        from: JobStatus,
        /// Terminal status
        to: JobStatus,
    },
    /// Observation would move the job backwards or out of a terminal state; ignored
    Rejected {
        /// Status kept
        current: JobStatus,
        /// Status that was observed
        observed: JobStatus,
    },
}

/// One submitted unit of remote work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Remote job id; `None` when submission failed
    pub job_id: Option<JobId>,
    /// Source asset (path or URI)
    pub input_ref: String,
    /// Text directive sent to the service
    pub prompt: String,
    /// Deterministic base filename for the artifact and its metadata
    pub target_stub: String,
    /// Current status
    pub status: JobStatus,
    /// When submission was attempted
    pub submitted_at: DateTime<Utc>,
    /// When the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Artifact location (only when succeeded)
    pub result_url: Option<String>,
    /// Failure reason (only when failed or cancelled)
    pub failure_reason: Option<String>,
    /// Number of create-job attempts made
    pub retry_count: u32,
    /// How the job failed, when it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Last raw status string seen from the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_status: Option<String>,
    /// Last status payload seen from the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_payload: Option<RemoteJob>,
}

impl JobRecord {
    /// Record for a job the service accepted
    pub fn submitted(
        job_id: JobId,
        input_ref: impl Into<String>,
        prompt: impl Into<String>,
        target_stub: impl Into<String>,
        submitted_at: DateTime<Utc>,
        retry_count: u32,
    ) -> Self {
        Self {
            job_id: Some(job_id),
            input_ref: input_ref.into(),
            prompt: prompt.into(),
            target_stub: target_stub.into(),
            status: JobStatus::Submitted,
            submitted_at,
            completed_at: None,
            result_url: None,
            failure_reason: None,
            retry_count,
            failure_kind: None,
            remote_status: None,
            remote_payload: None,
        }
    }

    /// Record for an input whose create-job call failed.
    ///
    /// No remote job exists, so `completed_at` stays unset and the record is
    /// excluded from latency statistics.
    pub fn submission_failed(
        input_ref: impl Into<String>,
        prompt: impl Into<String>,
        target_stub: impl Into<String>,
        submitted_at: DateTime<Utc>,
        retry_count: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            job_id: None,
            input_ref: input_ref.into(),
            prompt: prompt.into(),
            target_stub: target_stub.into(),
            status: JobStatus::Failed,
            submitted_at,
            completed_at: None,
            result_url: None,
            failure_reason: Some(reason.into()),
            retry_count,
            failure_kind: Some(FailureKind::Submission),
            remote_status: None,
            remote_payload: None,
        }
    }

    /// Whether the record can no longer change
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the poller should query this record
    pub fn needs_polling(&self) -> bool {
        !self.is_terminal() && self.job_id.is_some()
    }

    /// Seconds between submission and completion, if both are known
    pub fn latency_seconds(&self) -> Option<f64> {
        let completed = self.completed_at?;
        let millis = (completed - self.submitted_at).num_milliseconds();
        Some(millis.max(0) as f64 / 1000.0)
    }

    /// Apply a remote status observation.
    ///
    /// Terminal records never change. Non-terminal records only move forward
    /// (Submitted/Unknown -> Pending -> Running -> terminal). A success without
    /// an output URL becomes a [`FailureKind::SucceededWithoutOutput`] failure.
    pub fn observe(&mut self, remote: RemoteJob, now: DateTime<Utc>) -> Transition {
        let observed = JobStatus::from_remote(&remote.status);
        let current = self.status;

        if current.is_terminal() {
            return Transition::Rejected { current, observed };
        }

        self.remote_status = Some(remote.status.clone());

        let transition = match observed {
            JobStatus::Succeeded => {
                match remote.first_output() {
                    Some(url) => {
                        self.status = JobStatus::Succeeded;
                        self.result_url = Some(url.to_string());
                    }
                    None => {
                        self.status = JobStatus::Failed;
                        self.failure_kind = Some(FailureKind::SucceededWithoutOutput);
                        self.failure_reason = Some("succeeded without output".to_string());
                    }
                }
                self.completed_at = Some(now);
                Transition::Completed {
                    from: current,
                    to: self.status,
                }
            }
            JobStatus::Failed => {
                self.status = JobStatus::Failed;
                self.failure_kind = Some(FailureKind::Remote);
                self.failure_reason = remote.failure_reason.clone();
                self.completed_at = Some(now);
                Transition::Completed {
                    from: current,
                    to: JobStatus::Failed,
                }
            }
            JobStatus::Cancelled => {
                self.status = JobStatus::Cancelled;
                self.failure_reason = remote.failure_reason.clone();
                self.completed_at = Some(now);
                Transition::Completed {
                    from: current,
                    to: JobStatus::Cancelled,
                }
            }
            _ if observed == current => Transition::Unchanged,
            _ if observed.rank() < current.rank() => Transition::Rejected { current, observed },
            _ => {
                self.status = observed;
                Transition::Advanced {
                    from: current,
                    to: observed,
                }
            }
        };

        self.remote_payload = Some(remote);
        transition
    }
}

/// Metadata persisted alongside the queue file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchMeta {
    /// Batch identifier (run timestamp)
    pub batch_id: String,
    /// When the batch started
    pub start_time: DateTime<Utc>,
    /// When polling last stopped
    pub end_time: Option<DateTime<Utc>>,
    /// Number of poll passes performed so far (across resumes)
    pub poll_count: u32,
    /// Platform tag used for stubs
    #[serde(default)]
    pub platform: Platform,
}

/// The set of jobs submitted together in one orchestration run
#[derive(Clone, Debug, PartialEq)]
pub struct BatchRecord {
    /// Batch identifier (run timestamp)
    pub batch_id: String,
    /// Jobs in submission order
    pub jobs: Vec<JobRecord>,
    /// When the batch started
    pub start_time: DateTime<Utc>,
    /// When polling last stopped
    pub end_time: Option<DateTime<Utc>>,
    /// Number of poll passes performed so far
    pub poll_count: u32,
    /// Platform tag used for stubs
    pub platform: Platform,
}

impl BatchRecord {
    /// Empty batch starting now
    pub fn new(batch_id: impl Into<String>, start_time: DateTime<Utc>, platform: Platform) -> Self {
        Self {
            batch_id: batch_id.into(),
            jobs: Vec::new(),
            start_time,
            end_time: None,
            poll_count: 0,
            platform,
        }
    }

    /// Rebuild a batch from its persisted parts
    pub fn from_parts(meta: BatchMeta, jobs: Vec<JobRecord>) -> Self {
        Self {
            batch_id: meta.batch_id,
            jobs,
            start_time: meta.start_time,
            end_time: meta.end_time,
            poll_count: meta.poll_count,
            platform: meta.platform,
        }
    }

    /// Metadata for persistence
    pub fn meta(&self) -> BatchMeta {
        BatchMeta {
            batch_id: self.batch_id.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            poll_count: self.poll_count,
            platform: self.platform,
        }
    }

    /// Whether every job has reached a terminal state
    pub fn all_terminal(&self) -> bool {
        self.jobs.iter().all(JobRecord::is_terminal)
    }

    /// Ids of jobs that are still non-terminal
    pub fn pending_ids(&self) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|j| !j.is_terminal())
            .filter_map(|j| j.job_id.clone())
            .collect()
    }

    /// Number of jobs in a given status
    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    /// Job ids that appear more than once (should always be empty)
    pub fn duplicate_ids(&self) -> Vec<JobId> {
        let mut seen = HashSet::new();
        self.jobs
            .iter()
            .filter_map(|j| j.job_id.as_ref())
            .filter(|id| !seen.insert(*id))
            .cloned()
            .collect()
    }
}

/// How a download record came to exist
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// Streamed during this run
    Downloaded,
    /// Already present at the deterministic path
    AlreadyExisted,
}

/// One artifact on local storage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Job the artifact belongs to
    pub job_id: JobId,
    /// Artifact path
    pub local_path: PathBuf,
    /// Artifact size
    pub size_bytes: u64,
    /// Sidecar metadata path
    pub metadata_path: PathBuf,
    /// Whether it was fetched in this run
    pub outcome: DownloadOutcome,
}

/// Aggregate download counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStats {
    /// Artifacts streamed in this run
    pub downloaded: usize,
    /// Artifacts already on disk
    pub already_existed: usize,
    /// Artifacts that could not be fetched
    pub failed: usize,
}

/// Everything a download pass produced
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DownloadSummary {
    /// Counters
    pub stats: DownloadStats,
    /// Artifacts on disk, in submission order
    pub records: Vec<DownloadRecord>,
    /// Jobs whose download failed, with the reason
    pub failures: Vec<(JobId, String)>,
}

/// How a polling session ended
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Passes performed in this session
    pub passes: u32,
    /// Status requests issued in this session
    pub requests: u32,
    /// Jobs still non-terminal when polling stopped
    pub still_pending: Vec<JobId>,
    /// Whether the global timeout stopped polling
    pub timed_out: bool,
    /// Whether a termination signal stopped polling
    pub interrupted: bool,
}

/// Event emitted during a batch run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was created remotely
    JobSubmitted {
        /// Position in the batch
        index: usize,
        /// Remote job id
        job_id: JobId,
        /// Artifact base name
        target_stub: String,
    },

    /// A create-job call failed
    SubmissionFailed {
        /// Position in the batch
        index: usize,
        /// Input that could not be submitted
        input_ref: String,
        /// Error message
        error: String,
    },

    /// A poll pass started
    PollPass {
        /// Pass number (1-based, across resumes)
        pass: u32,
        /// Jobs queried in this pass
        active: usize,
    },

    /// A job changed status
    StatusChanged {
        /// Remote job id
        job_id: JobId,
        /// Previous status
        from: JobStatus,
        /// New status
        to: JobStatus,
    },

    /// The global timeout stopped polling
    PollTimedOut {
        /// Jobs left non-terminal
        still_pending: Vec<JobId>,
    },

    /// An artifact was written
    ArtifactDownloaded {
        /// Remote job id
        job_id: JobId,
        /// Local path
        path: PathBuf,
        /// Size in bytes
        size_bytes: u64,
    },

    /// An artifact download failed
    DownloadFailed {
        /// Remote job id
        job_id: JobId,
        /// Error message
        error: String,
    },

    /// The batch report was written
    ReportWritten {
        /// Report file path
        path: PathBuf,
    },

    /// The run stopped because of a termination signal
    Interrupted,
}
