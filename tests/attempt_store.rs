//! Attempt trail integration tests.
//!
//! Tests for the JSONL log format, replay order, and reconstructing a
//! job's workflow state from its trail alone.

use scenesmith::core::AttemptStore;
use scenesmith::domain::artifact::ContentSpec;
use scenesmith::domain::attempt::{Attempt, AttemptOutcome, Stage};
use scenesmith::domain::job::{Job, WorkflowState};
use tempfile::TempDir;
use uuid::Uuid;

#[tokio::test]
async fn test_attempt_serialization_round_trip() {
    let job_id = Uuid::new_v4();
    let attempt = Attempt::new(
        job_id,
        3,
        Stage::Patch,
        AttemptOutcome::Success,
    )
    .with_input("v2-aabbccdd00112233".to_string())
    .with_output("v3-ddccbbaa33221100".to_string())
    .with_escalation(1)
    .with_duration(420);

    let json = serde_json::to_string(&attempt).unwrap();
    let parsed: Attempt = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.job_id, job_id);
    assert_eq!(parsed.sequence_number, 3);
    assert_eq!(parsed.stage, Stage::Patch);
    assert_eq!(parsed.escalation_level, Some(1));
    assert_eq!(parsed.duration_ms, Some(420));
}

#[tokio::test]
async fn test_job_reconstructed_from_full_trail() {
    let temp = TempDir::new().unwrap();
    let job_id = Uuid::new_v4();
    let store = AttemptStore::open_at(temp.path(), job_id).await.unwrap();

    let trail = vec![
        (Stage::Build, AttemptOutcome::Success, Some("v1-ref")),
        (Stage::VerifyLayout, AttemptOutcome::Success, Some("v1-ref")),
        (Stage::CompileLow, AttemptOutcome::Success, Some("media/preview.mp4")),
        (Stage::Evaluate, AttemptOutcome::Success, None),
        (Stage::CompileHigh, AttemptOutcome::Success, Some("media/final.mp4")),
    ];
    for (i, (stage, outcome, output)) in trail.into_iter().enumerate() {
        let mut attempt = Attempt::new(job_id, i as u64, stage, outcome);
        if let Some(output) = output {
            attempt = attempt.with_output(output.to_string());
        }
        store.append(&attempt).await.unwrap();
    }

    let attempts = store.replay().await.unwrap();
    let job = Job::from_attempts("binary search".into(), &attempts).unwrap();

    assert_eq!(job.state, WorkflowState::Completed);
    assert_eq!(job.attempts, 5);
    assert_eq!(job.media_ref.as_deref(), Some("media/final.mp4"));
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn test_partial_trail_lands_in_intermediate_state() {
    let temp = TempDir::new().unwrap();
    let job_id = Uuid::new_v4();
    let store = AttemptStore::open_at(temp.path(), job_id).await.unwrap();

    store
        .append(&Attempt::new(job_id, 0, Stage::Build, AttemptOutcome::Success))
        .await
        .unwrap();
    store
        .append(&Attempt::new(
            job_id,
            1,
            Stage::VerifyLayout,
            AttemptOutcome::Success,
        ))
        .await
        .unwrap();

    let attempts = store.replay().await.unwrap();
    let job = Job::from_attempts("topic".into(), &attempts).unwrap();

    assert_eq!(job.state, WorkflowState::CompilingLow);
    assert!(!job.is_finished());
    assert!(job.completed_at.is_none());
}

#[tokio::test]
async fn test_spec_round_trip() {
    let temp = TempDir::new().unwrap();
    let job_id = Uuid::new_v4();
    let store = AttemptStore::open_at(temp.path(), job_id).await.unwrap();

    assert!(store.load_spec().await.unwrap().is_none());

    let spec = ContentSpec {
        topic: "sorting networks".into(),
        audience: "undergraduate".into(),
        duration_seconds: 45.0,
        source_content: Some("chapter text".into()),
    };
    store.store_spec(&spec).await.unwrap();

    let loaded = store.load_spec().await.unwrap().unwrap();
    assert_eq!(loaded.topic, "sorting networks");
    assert_eq!(loaded.duration_seconds, 45.0);
}

#[tokio::test]
async fn test_trail_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let job_id = Uuid::new_v4();

    {
        let store = AttemptStore::open_at(temp.path(), job_id).await.unwrap();
        store
            .append(&Attempt::new(job_id, 0, Stage::Build, AttemptOutcome::Success))
            .await
            .unwrap();
    }

    let reopened = AttemptStore::open_at(temp.path(), job_id).await.unwrap();
    let attempts = reopened.replay().await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(reopened.next_sequence().await.unwrap(), 1);
}
