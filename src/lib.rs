//! scenesmith - Self-correcting animation pipeline
//!
//! A Rust-based orchestrator that turns a content spec into a rendered
//! animation through a generate, compile, evaluate, patch loop.
//!
//! # Architecture
//!
//! The system is built around an append-only attempt trail:
//! - Every stage transition is recorded as an immutable attempt
//! - Current job state is derived by replaying attempts
//! - Repairs escalate through a fixed ladder, ending at a guaranteed
//!   fallback template
//!
//! # Modules
//!
//! - `adapters`: External collaborators (generator, renderer, evaluator)
//! - `core`: Orchestration logic (AttemptStore, Budget, Orchestrator)
//! - `domain`: Data structures (TimelineModel, Attempt, Job)
//! - `layout`: Frame geometry, conflict verifier, deterministic repair
//! - `repair`: Error classification and the escalation ladder
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Submit a content spec
//! scenesmith submit spec.yaml
//!
//! # Check job status
//! scenesmith status <job-id>
//!
//! # Inspect the attempt trail
//! scenesmith trail <job-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod layout;
pub mod repair;

// Re-export main types at crate root for convenience
pub use core::{AttemptStore, JobBudget, JobReport, Orchestrator};
pub use domain::artifact::{Artifact, ContentSpec};
pub use domain::attempt::{Attempt, AttemptOutcome, Stage};
pub use domain::diagnostics::{ConflictKind, ConflictReport, ErrorKind, Finding};
pub use domain::job::{Job, WorkflowState};
pub use domain::timeline::{BoundingBox, Interval, Region, Shot, TimelineModel};
pub use layout::{verify, LayoutConfig};
pub use repair::{ErrorClassifier, EscalationLadder, RepairAction};
