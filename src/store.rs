//! On-disk queue of job records
//!
//! Each batch owns two files in the state directory:
//! - `task_queue_{batch_id}.json`: JSON array of every [`JobRecord`] in submission order
//! - `batch_{batch_id}.json`: [`BatchMeta`] (start/end time, poll count)
//!
//! Writes are full snapshots through [`write_json_atomic`], serialized by a
//! mutex so only one snapshot is in flight at a time.

use crate::error::{Error, Result};
use crate::types::{BatchMeta, BatchRecord, JobRecord, Platform};
use crate::utils::{batch_id_from_queue_path, latest_queue_file, write_json_atomic};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Single-writer persistence for batches
#[derive(Debug)]
pub struct QueueStore {
    state_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl QueueStore {
    /// Store rooted at `state_dir`; the directory is created on first save
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Directory holding queue and metadata files
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Queue file for a batch
    pub fn queue_path(&self, batch_id: &str) -> PathBuf {
        self.state_dir.join(format!("task_queue_{batch_id}.json"))
    }

    /// Metadata file for a batch
    pub fn meta_path(&self, batch_id: &str) -> PathBuf {
        self.state_dir.join(format!("batch_{batch_id}.json"))
    }

    /// Persist a full snapshot of the batch
    ///
    /// The queue file is written before the metadata, so a crash in between
    /// leaves a queue that is at least as new as its metadata.
    pub async fn save(&self, batch: &BatchRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        write_json_atomic(&self.queue_path(&batch.batch_id), &batch.jobs).await?;
        write_json_atomic(&self.meta_path(&batch.batch_id), &batch.meta()).await?;

        tracing::debug!(
            batch_id = %batch.batch_id,
            jobs = batch.jobs.len(),
            "Queue snapshot saved"
        );
        Ok(())
    }

    /// Load a batch from its queue file
    ///
    /// A missing metadata file is tolerated: the batch start time falls back
    /// to the earliest submission and the poll count to zero.
    pub async fn load(&self, queue_path: &Path) -> Result<BatchRecord> {
        let unusable = |reason: String| Error::QueueFile {
            path: queue_path.to_path_buf(),
            reason,
        };

        let raw = tokio::fs::read(queue_path)
            .await
            .map_err(|e| unusable(e.to_string()))?;
        let jobs: Vec<JobRecord> =
            serde_json::from_slice(&raw).map_err(|e| unusable(e.to_string()))?;

        let batch_id = batch_id_from_queue_path(queue_path)
            .ok_or_else(|| unusable("file name is not task_queue_<batch_id>.json".to_string()))?;

        let meta_path = queue_path.with_file_name(format!("batch_{batch_id}.json"));
        let meta = match tokio::fs::read(&meta_path).await {
            Ok(raw) => serde_json::from_slice::<BatchMeta>(&raw).map_err(|e| Error::QueueFile {
                path: meta_path.clone(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %meta_path.display(),
                    "Batch metadata missing, reconstructing from queue"
                );
                BatchMeta {
                    batch_id: batch_id.clone(),
                    start_time: jobs
                        .iter()
                        .map(|j| j.submitted_at)
                        .min()
                        .unwrap_or_else(chrono::Utc::now),
                    end_time: None,
                    poll_count: 0,
                    platform: Platform::default(),
                }
            }
            Err(e) => return Err(e.into()),
        };

        let batch = BatchRecord::from_parts(meta, jobs);
        let duplicates = batch.duplicate_ids();
        if !duplicates.is_empty() {
            return Err(unusable(format!(
                "duplicate job ids: {}",
                duplicates
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        tracing::info!(
            batch_id = %batch.batch_id,
            jobs = batch.jobs.len(),
            pending = batch.pending_ids().len(),
            "Loaded queue"
        );
        Ok(batch)
    }

    /// Newest queue file in the state directory
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(latest_queue_file(&self.state_dir)?)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobId, JobStatus};
    use chrono::{TimeZone, Utc};

    fn batch() -> BatchRecord {
        let start = Utc.with_ymd_and_hms(2024, 6, 17, 12, 0, 0).unwrap();
        let mut batch = BatchRecord::new("20240617_120000", start, Platform::Tt);
        batch.jobs.push(JobRecord::submitted(
            JobId::from("a"),
            "a.png",
            "p",
            "a_tt_20240617_120000_000",
            start,
            1,
        ));
        batch.jobs.push(JobRecord::submission_failed(
            "b.png",
            "p",
            "b_tt_20240617_120000_001",
            start,
            3,
            "unreachable",
        ));
        batch.poll_count = 4;
        batch
    }

    #[tokio::test]
    async fn save_then_load_restores_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path().join("state"));
        let original = batch();

        store.save(&original).await.unwrap();
        let loaded = store
            .load(&store.queue_path(&original.batch_id))
            .await
            .unwrap();

        assert_eq!(loaded, original);
        assert_eq!(loaded.jobs[1].status, JobStatus::Failed);
        assert_eq!(loaded.platform, Platform::Tt);
    }

    #[tokio::test]
    async fn queue_file_is_a_plain_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        let original = batch();
        store.save(&original).await.unwrap();

        let raw = std::fs::read_to_string(store.queue_path(&original.batch_id)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_metadata_is_reconstructed() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        let original = batch();
        store.save(&original).await.unwrap();
        std::fs::remove_file(store.meta_path(&original.batch_id)).unwrap();

        let loaded = store
            .load(&store.queue_path(&original.batch_id))
            .await
            .unwrap();

        assert_eq!(loaded.batch_id, original.batch_id);
        assert_eq!(loaded.start_time, original.start_time);
        assert_eq!(loaded.poll_count, 0);
        assert_eq!(loaded.jobs, original.jobs);
    }

    #[tokio::test]
    async fn corrupt_queue_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        let path = store.queue_path("x");
        std::fs::write(&path, "{ truncated").unwrap();

        let err = store.load(&path).await.unwrap_err();
        assert!(matches!(err, Error::QueueFile { .. }));
        assert!(err.is_setup_error());
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        let mut dup = batch();
        dup.jobs.push(dup.jobs[0].clone());
        store.save(&dup).await.unwrap();

        let err = store.load(&store.queue_path(&dup.batch_id)).await.unwrap_err();
        assert!(matches!(err, Error::QueueFile { .. }));
    }

    #[tokio::test]
    async fn latest_finds_saved_queue() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path());
        assert!(store.latest().unwrap().is_none());

        let original = batch();
        store.save(&original).await.unwrap();

        assert_eq!(
            store.latest().unwrap(),
            Some(store.queue_path(&original.batch_id))
        );
    }
}
