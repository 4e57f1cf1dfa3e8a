use super::*;

#[tokio::test]
async fn every_input_yields_a_record_even_on_failure() {
    let remote = Arc::new(ScriptedRemote::new());
    remote.on_create(
        "b.png",
        vec![Err(SubmissionError::Rejected {
            status: 400,
            message: "bad ratio".into(),
        })],
    );
    let (orch, _dir) = create_test_orchestrator(remote.clone());
    let mut batch = BatchRecord::new("b1", Utc::now(), Platform::Ig);

    orch.submit_all(&mut batch, &inputs(&["a.png", "b.png", "c.png"]))
        .await
        .unwrap();

    assert_eq!(batch.jobs.len(), 3);
    assert_eq!(batch.jobs[0].status, JobStatus::Submitted);
    assert_eq!(batch.jobs[1].status, JobStatus::Failed);
    assert_eq!(batch.jobs[1].failure_kind, Some(FailureKind::Submission));
    assert!(batch.jobs[1].job_id.is_none());
    assert!(
        batch.jobs[1]
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("bad ratio")
    );
    assert_eq!(batch.jobs[2].status, JobStatus::Submitted);

    // Persisted after each submission
    let loaded = orch
        .store()
        .load(&orch.store().queue_path("b1"))
        .await
        .unwrap();
    assert_eq!(loaded.jobs, batch.jobs);
}

#[tokio::test]
async fn stub_is_fixed_before_the_remote_call() {
    let remote = Arc::new(ScriptedRemote::new());
    remote.on_create(
        "images/sunset_beach.png",
        vec![Err(SubmissionError::Auth {
            status: 401,
            message: "nope".into(),
        })],
    );
    let (orch, _dir) = create_test_orchestrator(remote);
    let batch = BatchRecord::new("b1", Utc::now(), Platform::Tt);

    let record = orch
        .submit(&batch, 4, &CuratedInput::new("images/sunset_beach.png", "p"))
        .await;

    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.target_stub.starts_with("sunset_beach_tt_"));
    assert!(record.target_stub.ends_with("_004"));
}

#[tokio::test]
async fn unreachable_service_is_retried() {
    let remote = Arc::new(ScriptedRemote::new());
    remote.on_create(
        "a.png",
        vec![
            Err(SubmissionError::Unreachable("refused".into())),
            Err(SubmissionError::Unreachable("refused".into())),
            Ok(JobId::from("late")),
        ],
    );
    let (orch, _dir) = create_test_orchestrator(remote.clone());
    let batch = BatchRecord::new("b1", Utc::now(), Platform::Ig);

    let record = orch.submit(&batch, 0, &CuratedInput::new("a.png", "p")).await;

    assert_eq!(record.job_id, Some(JobId::from("late")));
    assert_eq!(record.retry_count, 3);
    assert_eq!(remote.creates(), 3);
}

#[tokio::test]
async fn ambiguous_failures_are_not_retried() {
    let remote = Arc::new(ScriptedRemote::new());
    remote.on_create(
        "a.png",
        vec![
            Err(SubmissionError::Transport("timed out after send".into())),
            Ok(JobId::from("would-duplicate")),
        ],
    );
    let (orch, _dir) = create_test_orchestrator(remote.clone());
    let batch = BatchRecord::new("b1", Utc::now(), Platform::Ig);

    let record = orch.submit(&batch, 0, &CuratedInput::new("a.png", "p")).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.retry_count, 1);
    assert_eq!(remote.creates(), 1);
}

#[tokio::test]
async fn exhausted_retries_record_attempts() {
    let remote = Arc::new(ScriptedRemote::new());
    remote.on_create(
        "a.png",
        vec![
            Err(SubmissionError::Unreachable("dns".into())),
            Err(SubmissionError::Unreachable("dns".into())),
            Err(SubmissionError::Unreachable("dns".into())),
            Ok(JobId::from("never")),
        ],
    );
    let (orch, _dir) = create_test_orchestrator(remote.clone());
    let batch = BatchRecord::new("b1", Utc::now(), Platform::Ig);

    let record = orch.submit(&batch, 0, &CuratedInput::new("a.png", "p")).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.retry_count, orch.config().submit_retry.max_attempts);
    assert!(record.completed_at.is_none());
}

#[tokio::test]
async fn duplicate_job_id_is_recorded_as_failure() {
    let remote = Arc::new(ScriptedRemote::new());
    remote.on_create("a.png", vec![Ok(JobId::from("same"))]);
    remote.on_create("b.png", vec![Ok(JobId::from("same"))]);
    let (orch, _dir) = create_test_orchestrator(remote);
    let mut batch = BatchRecord::new("b1", Utc::now(), Platform::Ig);

    orch.submit_all(&mut batch, &inputs(&["a.png", "b.png"]))
        .await
        .unwrap();

    assert_eq!(batch.jobs[0].job_id, Some(JobId::from("same")));
    assert!(batch.jobs[1].job_id.is_none());
    assert_eq!(batch.jobs[1].status, JobStatus::Failed);
    assert!(batch.duplicate_ids().is_empty());
}

#[tokio::test]
async fn cancellation_stops_submission_and_persists() {
    let remote = Arc::new(ScriptedRemote::new());
    let (orch, _dir) = create_test_orchestrator(remote.clone());
    let mut batch = BatchRecord::new("b1", Utc::now(), Platform::Ig);
    orch.shutdown();

    let result = orch
        .submit_all(&mut batch, &inputs(&["a.png", "b.png"]))
        .await;

    assert!(matches!(result, Err(crate::error::Error::Interrupted)));
    assert_eq!(remote.creates(), 0);
    assert!(orch.store().queue_path("b1").exists());
}

#[tokio::test]
async fn submission_emits_events() {
    let remote = Arc::new(ScriptedRemote::new());
    remote.on_create(
        "b.png",
        vec![Err(SubmissionError::MalformedResponse("{}".into()))],
    );
    let (orch, _dir) = create_test_orchestrator(remote);
    let mut events = orch.subscribe();
    let mut batch = BatchRecord::new("b1", Utc::now(), Platform::Ig);

    orch.submit_all(&mut batch, &inputs(&["a.png", "b.png"]))
        .await
        .unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        crate::types::Event::JobSubmitted { index: 0, .. }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        crate::types::Event::SubmissionFailed { index: 1, .. }
    ));
}

#[tokio::test]
async fn submit_delay_paces_submissions() {
    let remote = Arc::new(ScriptedRemote::new());
    let (orch, _dir) = create_test_orchestrator_with(remote, |c| {
        c.generation.submit_delay = Duration::from_millis(50);
    });
    let mut batch = BatchRecord::new("b1", Utc::now(), Platform::Ig);
    let start = std::time::Instant::now();

    orch.submit_all(&mut batch, &inputs(&["a.png", "b.png", "c.png"]))
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(100));
}
