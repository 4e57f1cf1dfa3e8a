use super::test_helpers::{
    ScriptedRemote, create_test_orchestrator, create_test_orchestrator_with, failed, remote_job,
    succeeded,
};
use super::*;
use crate::error::{PollError, SubmissionError};
use crate::inputs::CuratedInput;
use crate::types::{
    BatchRecord, DownloadOutcome, FailureKind, JobId, JobRecord, JobStatus, Platform,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

mod submit;

fn inputs(refs: &[&str]) -> Vec<CuratedInput> {
    refs.iter()
        .map(|r| CuratedInput::new(*r, format!("prompt for {r}")))
        .collect()
}

/// Batch with one freshly submitted job per id
fn batch_with(ids: &[&str]) -> BatchRecord {
    let now = Utc::now();
    let mut batch = BatchRecord::new("20240617_120000", now, Platform::Ig);
    for (i, id) in ids.iter().enumerate() {
        batch.jobs.push(JobRecord::submitted(
            JobId::from(*id),
            format!("images/{id}.png"),
            format!("prompt {id}"),
            format!("{id}_ig_20240617_120000_{i:03}"),
            now,
            1,
        ));
    }
    batch
}
