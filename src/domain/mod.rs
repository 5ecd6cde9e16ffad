//! Domain types for the scenesmith pipeline.
//!
//! This module contains the core data structures:
//! - Timeline: shots, element placements, screen regions
//! - Diagnostics: conflict reports, error records, evaluator issues
//! - Attempt: immutable log entries for every pipeline transition
//! - Job: workflow state derived from the attempt log

pub mod artifact;
pub mod attempt;
pub mod diagnostics;
pub mod job;
pub mod timeline;

// Re-export commonly used types
pub use artifact::{Artifact, ContentSpec};
pub use attempt::{Attempt, AttemptOutcome, Stage};
pub use diagnostics::{
    Conflict, ConflictKind, ConflictReport, ErrorKind, ErrorRecord, Finding, Issue,
};
pub use job::{Job, WorkflowState};
pub use timeline::{
    BoundingBox, ElementPlacement, Interval, Region, SceneState, Shot, TimelineError,
    TimelineModel,
};
