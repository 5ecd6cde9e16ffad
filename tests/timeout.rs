//! Stage timeout integration tests.
//!
//! A stage that exceeds its wall-clock budget is recorded as a failed
//! attempt: it consumes budget and hands the workflow to the repair
//! stage like any other failure.

use std::sync::Arc;
use std::time::Duration;

use scenesmith::adapters::ScriptedCollaborator;
use scenesmith::core::{JobBudget, Orchestrator};
use scenesmith::domain::artifact::{Artifact, ContentSpec};
use scenesmith::domain::attempt::{AttemptOutcome, Stage};
use scenesmith::domain::job::WorkflowState;
use scenesmith::domain::timeline::{
    ElementPlacement, Interval, Region, SceneState, Shot, TimelineModel,
};
use scenesmith::layout::LayoutConfig;
use tempfile::TempDir;

fn spec() -> ContentSpec {
    ContentSpec {
        topic: "timeouts".into(),
        audience: "general".into(),
        duration_seconds: 10.0,
        source_content: None,
    }
}

fn clean_artifact() -> Artifact {
    let layout = LayoutConfig::default();
    let timeline = TimelineModel::new(
        10.0,
        vec![Shot {
            id: "shot-1".into(),
            start_time: 0.0,
            end_time: 10.0,
            scene_state: SceneState::Clean,
            elements: vec![ElementPlacement {
                element_id: "title".into(),
                region: Region::Center,
                bounding_box: layout.region_bounds(Region::Center).scaled(0.6),
                visible_interval: Interval::new(0.0, 10.0),
                priority: 8,
            }],
        }],
    );
    Artifact::new(1, timeline, "scene".into())
}

#[tokio::test]
async fn test_slow_compile_times_out_and_consumes_budget() {
    let temp = TempDir::new().unwrap();
    let collab = Arc::new(ScriptedCollaborator::new());
    collab.push_artifact(clean_artifact());
    collab.set_compile_delay(Duration::from_secs(30));

    let budget = JobBudget {
        compile_timeout_seconds: 1,
        max_total_attempts: 6,
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(collab.clone(), collab.clone(), collab.clone())
        .with_budget(budget)
        .with_jobs_root(temp.path());

    let report = orchestrator.run_job(spec()).await.unwrap();

    // The slow compile shows up as a timeout attempt, not a hang
    let timeout_attempt = report
        .attempts
        .iter()
        .find(|a| matches!(a.outcome, AttemptOutcome::Timeout { .. }))
        .expect("expected a timeout attempt");
    assert_eq!(timeout_attempt.stage, Stage::CompileLow);
    assert!(matches!(
        timeout_attempt.outcome,
        AttemptOutcome::Timeout {
            stage_timeout_secs: 1
        }
    ));

    // The workflow moved on to repair instead of retrying in place, and
    // the budget eventually closed the job out
    assert!(report
        .attempts
        .iter()
        .any(|a| a.stage == Stage::Patch));
    assert!(matches!(report.job.state, WorkflowState::Failed { .. }));
    assert!(report.attempts.len() <= 6);
    assert_eq!(report.attempts.last().unwrap().stage, Stage::Finalize);
}

#[tokio::test]
async fn test_generate_timeout_recorded_at_build() {
    let temp = TempDir::new().unwrap();
    let collab = Arc::new(ScriptedCollaborator::new());
    collab.push_artifact(clean_artifact());
    collab.set_generate_delay(Duration::from_secs(30));

    let budget = JobBudget {
        generate_timeout_seconds: 1,
        max_total_attempts: 4,
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(collab.clone(), collab.clone(), collab.clone())
        .with_budget(budget)
        .with_jobs_root(temp.path());

    let report = orchestrator.run_job(spec()).await.unwrap();

    assert_eq!(report.attempts[0].stage, Stage::Build);
    assert!(matches!(
        report.attempts[0].outcome,
        AttemptOutcome::Timeout { .. }
    ));
    assert!(matches!(report.job.state, WorkflowState::Failed { .. }));
}
