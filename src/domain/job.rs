//! Job state and reconstruction from the attempt log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attempt::{Attempt, AttemptOutcome, Stage};

/// The orchestrator's workflow state machine. Exactly one live state per
/// job; transitions are driven only by attempt outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum WorkflowState {
    Building,
    VerifyingLayout,
    CompilingLow,
    Evaluating,
    Patching,
    CompilingHigh,
    Completed,
    Failed { reason: String },
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed { .. })
    }
}

/// A single pipeline execution, derived from its attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,

    pub topic: String,

    pub state: WorkflowState,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Total attempts recorded so far
    pub attempts: u64,

    /// Reference of the newest artifact version
    pub latest_artifact: Option<String>,

    /// Rendered media path once low or high fidelity compile succeeded
    pub media_ref: Option<String>,

    /// Highest escalation rung reached
    pub max_escalation: Option<u32>,
}

impl Job {
    pub fn new(id: Uuid, topic: String) -> Self {
        Self {
            id,
            topic,
            state: WorkflowState::Building,
            started_at: Utc::now(),
            completed_at: None,
            attempts: 0,
            latest_artifact: None,
            media_ref: None,
            max_escalation: None,
        }
    }

    /// Rebuild job state by replaying attempts in order. Returns `None`
    /// for an empty log.
    pub fn from_attempts(topic: String, attempts: &[Attempt]) -> Option<Self> {
        let first = attempts.first()?;
        let mut job = Self::new(first.job_id, topic);
        job.started_at = first.timestamp;
        for attempt in attempts {
            job.apply(attempt);
        }
        Some(job)
    }

    /// Fold one attempt into the derived state.
    pub fn apply(&mut self, attempt: &Attempt) {
        self.attempts = self.attempts.max(attempt.sequence_number + 1);

        if let Some(ref artifact) = attempt.output_artifact {
            self.latest_artifact = Some(artifact.clone());
        }
        if let Some(level) = attempt.escalation_level {
            self.max_escalation = Some(self.max_escalation.map_or(level, |m| m.max(level)));
        }

        self.state = match (&attempt.stage, &attempt.outcome) {
            (Stage::Build, AttemptOutcome::Success) => WorkflowState::VerifyingLayout,
            (Stage::VerifyLayout, AttemptOutcome::Success) => WorkflowState::CompilingLow,
            (Stage::VerifyLayout, _) => WorkflowState::Patching,
            (Stage::Patch, _) => WorkflowState::VerifyingLayout,
            (Stage::CompileLow, AttemptOutcome::Success) => WorkflowState::Evaluating,
            (Stage::CompileLow, _) => WorkflowState::Patching,
            (Stage::Evaluate, AttemptOutcome::Success) => WorkflowState::CompilingHigh,
            (Stage::Evaluate, _) => WorkflowState::Patching,
            (Stage::CompileHigh, _) => WorkflowState::Completed,
            (Stage::Finalize, AttemptOutcome::Success) => WorkflowState::Completed,
            (Stage::Finalize, AttemptOutcome::Cancelled) => WorkflowState::Failed {
                reason: "cancelled".to_string(),
            },
            (Stage::Finalize, AttemptOutcome::BudgetExhausted { detail }) => {
                WorkflowState::Failed {
                    reason: detail.clone(),
                }
            }
            (Stage::Finalize, _) => WorkflowState::Failed {
                reason: "failed".to_string(),
            },
            (Stage::Build, _) => WorkflowState::Patching,
        };

        if self.state.is_terminal() {
            self.completed_at = Some(attempt.timestamp);
        }

        if matches!(attempt.stage, Stage::CompileLow | Stage::CompileHigh)
            && attempt.outcome.is_success()
        {
            if let Some(ref media) = attempt.output_artifact {
                self.media_ref = Some(media.clone());
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}
