//! Repair machinery: error classification, the escalation ladder, and
//! local patch application.

pub mod classify;
pub mod ladder;
pub mod patch;

pub use classify::ErrorClassifier;
pub use ladder::{select, EscalationLadder, RepairAction};
pub use patch::{apply_local, fallback_artifact};
