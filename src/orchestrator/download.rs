//! Artifact downloads and sidecar metadata.

use crate::error::DownloadError;
use crate::types::{
    BatchRecord, DownloadOutcome, DownloadRecord, DownloadSummary, Event, JobId, JobRecord,
    JobStatus, RemoteJob,
};
use crate::utils::{artifact_extension, bytes_to_mb, write_json_atomic};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::Orchestrator;

/// Size block of the sidecar
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Artifact size
    pub size_bytes: u64,
    /// Artifact size in MB
    pub size_mb: f64,
}

/// Sidecar `{target_stub}.json` written next to each artifact
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Artifact file name
    pub video_file: String,
    /// When the sidecar was written
    pub download_timestamp: DateTime<Utc>,
    /// Source asset
    pub input_path: String,
    /// Prompt the job was created with
    pub prompt: String,
    /// Remote job id
    pub job_id: JobId,
    /// Artifact base name
    pub target_stub: String,
    /// Last remote payload for the job
    pub remote_task: Option<RemoteJob>,
    /// Artifact size
    pub file_info: FileInfo,
}

/// Paths an artifact maps to
struct Target {
    artifact: PathBuf,
    partial: PathBuf,
    metadata: PathBuf,
}

impl Orchestrator {
    /// Download every succeeded artifact that is not already on disk
    ///
    /// Idempotent: an artifact already present at its deterministic path is not
    /// fetched again, and its sidecar is only written if missing. Transfers run
    /// in a bounded pool; records come back in submission order.
    pub async fn download_results(&self, batch: &BatchRecord) -> DownloadSummary {
        let candidates: Vec<(&JobRecord, JobId, &str)> = batch
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Succeeded)
            .filter_map(|j| {
                let id = j.job_id.clone()?;
                let url = j.result_url.as_deref().filter(|u| !u.trim().is_empty())?;
                Some((j, id, url))
            })
            .collect();

        if candidates.is_empty() {
            tracing::info!(batch_id = %batch.batch_id, "No artifacts to download");
            return DownloadSummary::default();
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.config.download.output_dir).await {
            tracing::error!(
                dir = %self.config.download.output_dir.display(),
                error = %e,
                "Cannot create output directory"
            );
        }

        tracing::info!(
            batch_id = %batch.batch_id,
            count = candidates.len(),
            concurrency = self.config.download.max_concurrent_downloads,
            "Downloading artifacts"
        );

        let results: Vec<(JobId, Result<DownloadRecord, DownloadError>)> =
            futures::stream::iter(candidates)
                .map(|(job, id, url)| async move {
                    let result = self.download_one(job, &id, url).await;
                    (id, result)
                })
                .buffered(self.config.download.max_concurrent_downloads.max(1))
                .collect()
                .await;

        let mut summary = DownloadSummary::default();
        for (job_id, result) in results {
            match result {
                Ok(record) => {
                    match record.outcome {
                        DownloadOutcome::Downloaded => summary.stats.downloaded += 1,
                        DownloadOutcome::AlreadyExisted => summary.stats.already_existed += 1,
                    }
                    summary.records.push(record);
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Download failed");
                    self.emit(Event::DownloadFailed {
                        job_id: job_id.clone(),
                        error: e.to_string(),
                    });
                    summary.stats.failed += 1;
                    summary.failures.push((job_id, e.to_string()));
                }
            }
        }

        tracing::info!(
            downloaded = summary.stats.downloaded,
            already_existed = summary.stats.already_existed,
            failed = summary.stats.failed,
            "Downloads complete"
        );
        summary
    }

    /// Artifacts of succeeded jobs already on disk, without fetching anything
    pub async fn existing_artifacts(&self, batch: &BatchRecord) -> DownloadSummary {
        let mut summary = DownloadSummary::default();
        for job in batch.jobs.iter().filter(|j| j.status == JobStatus::Succeeded) {
            let (Some(id), Some(url)) = (job.job_id.clone(), job.result_url.as_deref()) else {
                continue;
            };
            let target = self.target_for(job, url);
            if let Ok(meta) = tokio::fs::metadata(&target.artifact).await
                && meta.is_file()
            {
                summary.stats.already_existed += 1;
                summary.records.push(DownloadRecord {
                    job_id: id,
                    local_path: target.artifact,
                    size_bytes: meta.len(),
                    metadata_path: target.metadata,
                    outcome: DownloadOutcome::AlreadyExisted,
                });
            }
        }
        summary
    }

    fn target_for(&self, job: &JobRecord, url: &str) -> Target {
        let dir = &self.config.download.output_dir;
        let ext = artifact_extension(url, &self.config.download.default_extension);
        let file = format!("{}.{ext}", job.target_stub);
        Target {
            artifact: dir.join(&file),
            partial: dir.join(format!("{file}.part")),
            metadata: dir.join(format!("{}.json", job.target_stub)),
        }
    }

    async fn download_one(
        &self,
        job: &JobRecord,
        job_id: &JobId,
        url: &str,
    ) -> Result<DownloadRecord, DownloadError> {
        let target = self.target_for(job, url);

        if let Ok(existing) = tokio::fs::metadata(&target.artifact).await
            && existing.is_file()
        {
            tracing::info!(
                job_id = %job_id,
                path = %target.artifact.display(),
                "Artifact already exists, skipping download"
            );
            if !tokio::fs::try_exists(&target.metadata).await.unwrap_or(false) {
                self.write_metadata(job, job_id, &target, existing.len()).await;
            }
            return Ok(DownloadRecord {
                job_id: job_id.clone(),
                local_path: target.artifact,
                size_bytes: existing.len(),
                metadata_path: target.metadata,
                outcome: DownloadOutcome::AlreadyExisted,
            });
        }

        let size_bytes = match self.stream_to(url, &target.partial).await {
            Ok(size) => size,
            Err(e) => {
                let _ = tokio::fs::remove_file(&target.partial).await;
                return Err(e);
            }
        };

        if let Err(source) = tokio::fs::rename(&target.partial, &target.artifact).await {
            let _ = tokio::fs::remove_file(&target.partial).await;
            return Err(DownloadError::Io {
                path: target.artifact.clone(),
                source,
            });
        }

        tracing::info!(
            job_id = %job_id,
            path = %target.artifact.display(),
            size_mb = bytes_to_mb(size_bytes),
            "Artifact downloaded"
        );
        self.emit(Event::ArtifactDownloaded {
            job_id: job_id.clone(),
            path: target.artifact.clone(),
            size_bytes,
        });

        self.write_metadata(job, job_id, &target, size_bytes).await;

        Ok(DownloadRecord {
            job_id: job_id.clone(),
            local_path: target.artifact,
            size_bytes,
            metadata_path: target.metadata,
            outcome: DownloadOutcome::Downloaded,
        })
    }

    /// Stream `url` into `path` chunk by chunk, returning the byte count
    async fn stream_to(&self, url: &str, path: &Path) -> Result<u64, DownloadError> {
        let transport = |e: reqwest::Error| DownloadError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let io = |source: std::io::Error| DownloadError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut response = self.http.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut file = tokio::fs::File::create(path).await.map_err(io)?;
        let mut written: u64 = 0;
        loop {
            let chunk = tokio::select! {
                chunk = response.chunk() => chunk.map_err(transport)?,
                _ = self.cancel.cancelled() => {
                    return Err(DownloadError::Transport {
                        url: url.to_string(),
                        reason: "interrupted".to_string(),
                    });
                }
            };
            let Some(chunk) = chunk else { break };
            file.write_all(&chunk).await.map_err(io)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io)?;
        file.sync_all().await.map_err(io)?;

        if written == 0 {
            return Err(DownloadError::EmptyBody {
                url: url.to_string(),
            });
        }
        Ok(written)
    }

    /// A sidecar failure is logged; the artifact itself is still counted.
    async fn write_metadata(&self, job: &JobRecord, job_id: &JobId, target: &Target, size_bytes: u64) {
        let metadata = ArtifactMetadata {
            video_file: target
                .artifact
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            download_timestamp: Utc::now(),
            input_path: job.input_ref.clone(),
            prompt: job.prompt.clone(),
            job_id: job_id.clone(),
            target_stub: job.target_stub.clone(),
            remote_task: job.remote_payload.clone(),
            file_info: FileInfo {
                size_bytes,
                size_mb: bytes_to_mb(size_bytes),
            },
        };

        if let Err(e) = write_json_atomic(&target.metadata, &metadata).await {
            tracing::warn!(
                job_id = %job_id,
                path = %target.metadata.display(),
                error = %e,
                "Failed to write artifact metadata"
            );
        }
    }
}
