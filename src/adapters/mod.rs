//! Adapter interfaces for the external collaborators.
//!
//! The pipeline consumes three narrow contracts: a content/code generator,
//! a renderer/compiler, and a visual evaluator. Internals of each are out
//! of scope; the orchestrator owns all timeouts and retries, so adapter
//! implementations make exactly one attempt per call.

pub mod mock;
pub mod subprocess;

use async_trait::async_trait;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::artifact::{Artifact, ContentSpec};
use crate::domain::diagnostics::{Conflict, ConflictKind, ConflictReport, Issue};
use crate::repair::RepairAction;

pub use mock::ScriptedCollaborator;
pub use subprocess::{SubprocessEvaluator, SubprocessGenerator, SubprocessRenderer};

/// Render fidelity for the progressive low -> high compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fidelity {
    Low,
    High,
}

impl Fidelity {
    /// Conventional renderer CLI flag for this fidelity.
    pub fn as_flag(&self) -> &'static str {
        match self {
            Fidelity::Low => "-ql",
            Fidelity::High => "-qh",
        }
    }
}

/// Hint attached to a scoped regeneration request: the generator must
/// redo only the named element plus minimal surrounding context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairHint {
    pub element_id: Option<String>,

    /// Full finding context; never truncated by the pipeline
    pub error_context: String,

    /// The ladder action that produced this hint
    pub action: RepairAction,
}

/// Outcome of a compile call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResult {
    pub success: bool,
    pub media_ref: Option<String>,
    pub error_text: Option<String>,
}

impl CompileResult {
    pub fn ok(media_ref: impl Into<String>) -> Self {
        Self {
            success: true,
            media_ref: Some(media_ref.into()),
            error_text: None,
        }
    }

    pub fn failed(error_text: impl Into<String>) -> Self {
        Self {
            success: false,
            media_ref: None,
            error_text: Some(error_text.into()),
        }
    }
}

/// Outcome of an evaluation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
    pub pass: bool,
    pub issues: Vec<Issue>,
}

impl EvalResult {
    pub fn passed() -> Self {
        Self {
            pass: true,
            issues: Vec::new(),
        }
    }

    /// Reduce spatial issues to the conflict-report shape the repair
    /// stage already understands. Non-spatial issues stay qualitative.
    pub fn spatial_conflicts(&self) -> ConflictReport {
        let conflicts: Vec<Conflict> = self
            .issues
            .iter()
            .filter_map(|issue| {
                let interval = issue.interval?;
                let element = issue.element_id.clone()?;
                Some(Conflict::new(ConflictKind::Overlap, vec![element], interval))
            })
            .collect();
        ConflictReport { conflicts }.normalized()
    }
}

/// External content/code generator.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce an artifact; `hint` switches from full to scoped mode.
    async fn generate(&self, spec: &ContentSpec, hint: Option<&RepairHint>) -> Result<Artifact>;
}

/// External renderer/compiler.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn compile(&self, artifact: &Artifact, fidelity: Fidelity) -> Result<CompileResult>;
}

/// External visual quality evaluator.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, media_ref: &str) -> Result<EvalResult>;
}
