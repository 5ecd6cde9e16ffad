//! Core orchestration logic.
//!
//! This module contains:
//! - AttemptStore: Append-only attempt logging
//! - Budget: Attempt and timeout limits
//! - Orchestrator: Main workflow engine

pub mod budget;
pub mod orchestrator;
pub mod store;

// Re-export commonly used types
pub use budget::{BudgetExhausted, BudgetTracker, JobBudget, RateGuard};
pub use orchestrator::{JobReport, Orchestrator};
pub use store::AttemptStore;
