//! Attempt records: the immutable, append-only history of a job.
//!
//! Attempts are the source of truth. Job state is derived by replaying a
//! job's attempts in sequence order; nothing in memory determines
//! correctness that the log does not also record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::diagnostics::{ConflictReport, ErrorRecord, Issue};

/// Pipeline stage an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Build,
    VerifyLayout,
    CompileLow,
    Evaluate,
    Patch,
    CompileHigh,
    Finalize,
}

/// How one attempt ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum AttemptOutcome {
    Success,

    /// Layout verification found conflicts
    Conflicts { report: ConflictReport },

    /// External compile/runtime failure, classified
    Error { record: ErrorRecord },

    /// Evaluator rejected the artifact
    Quality { issues: Vec<Issue> },

    /// The stage's external call exceeded its timeout
    Timeout { stage_timeout_secs: u64 },

    /// The job was cancelled at a suspension point
    Cancelled,

    /// Retry budget exhausted; terminal
    BudgetExhausted { detail: String },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

/// A single immutable entry in the attempt log, keyed by
/// `(job_id, sequence_number)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub job_id: Uuid,

    /// Position in the job's log; append order matches causal order
    pub sequence_number: u64,

    pub stage: Stage,

    /// Artifact version consumed by this attempt
    pub input_artifact: Option<String>,

    /// Artifact version produced by this attempt
    pub output_artifact: Option<String>,

    pub outcome: AttemptOutcome,

    /// Escalation rung in effect, for patch attempts
    pub escalation_level: Option<u32>,

    pub timestamp: DateTime<Utc>,

    pub duration_ms: Option<u64>,
}

impl Attempt {
    pub fn new(job_id: Uuid, sequence_number: u64, stage: Stage, outcome: AttemptOutcome) -> Self {
        Self {
            job_id,
            sequence_number,
            stage,
            input_artifact: None,
            output_artifact: None,
            outcome,
            escalation_level: None,
            timestamp: Utc::now(),
            duration_ms: None,
        }
    }

    pub fn with_input(mut self, artifact_ref: impl Into<String>) -> Self {
        self.input_artifact = Some(artifact_ref.into());
        self
    }

    pub fn with_output(mut self, artifact_ref: impl Into<String>) -> Self {
        self.output_artifact = Some(artifact_ref.into());
        self
    }

    pub fn with_escalation(mut self, level: u32) -> Self {
        self.escalation_level = Some(level);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_roundtrip() {
        let attempt = Attempt::new(
            Uuid::new_v4(),
            3,
            Stage::CompileLow,
            AttemptOutcome::Timeout {
                stage_timeout_secs: 60,
            },
        )
        .with_input("v2-abcdef")
        .with_duration(60_000);

        let json = serde_json::to_string(&attempt).unwrap();
        let parsed: Attempt = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.sequence_number, 3);
        assert_eq!(parsed.stage, Stage::CompileLow);
        assert!(matches!(parsed.outcome, AttemptOutcome::Timeout { .. }));
    }
}
