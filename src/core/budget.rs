//! Budget limits and rate guards for job execution.
//!
//! Prevents runaway repair loops through configurable limits on:
//! - Total attempts per job
//! - Attempts per escalation rung
//! - Per-stage wall-clock timeouts
//! - Concurrent calls to each external collaborator

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Budget limits for a single job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobBudget {
    /// Maximum attempt records per job, terminal marker included
    /// (default: 25)
    #[serde(default = "default_max_total_attempts")]
    pub max_total_attempts: u64,

    /// Maximum repair attempts at each escalation rung (default: 3)
    #[serde(default = "default_max_attempts_per_rung")]
    pub max_attempts_per_rung: u32,

    /// Generator call timeout in seconds (default: 300 = 5 min)
    #[serde(default = "default_generate_timeout")]
    pub generate_timeout_seconds: u64,

    /// Renderer call timeout in seconds (default: 600 = 10 min)
    #[serde(default = "default_compile_timeout")]
    pub compile_timeout_seconds: u64,

    /// Evaluator call timeout in seconds (default: 180 = 3 min)
    #[serde(default = "default_evaluate_timeout")]
    pub evaluate_timeout_seconds: u64,

    /// Total job timeout in seconds (default: 3600 = 1 hour)
    #[serde(default = "default_job_timeout")]
    pub job_timeout_seconds: u64,
}

fn default_max_total_attempts() -> u64 {
    25
}
fn default_max_attempts_per_rung() -> u32 {
    3
}
fn default_generate_timeout() -> u64 {
    300
} // 5 min
fn default_compile_timeout() -> u64 {
    600
} // 10 min
fn default_evaluate_timeout() -> u64 {
    180
} // 3 min
fn default_job_timeout() -> u64 {
    3600
} // 1 hour

impl Default for JobBudget {
    fn default() -> Self {
        Self {
            max_total_attempts: default_max_total_attempts(),
            max_attempts_per_rung: default_max_attempts_per_rung(),
            generate_timeout_seconds: default_generate_timeout(),
            compile_timeout_seconds: default_compile_timeout(),
            evaluate_timeout_seconds: default_evaluate_timeout(),
            job_timeout_seconds: default_job_timeout(),
        }
    }
}

impl JobBudget {
    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_seconds)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_seconds)
    }

    pub fn evaluate_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluate_timeout_seconds)
    }

    /// Check tracker state before starting another working attempt.
    ///
    /// One record is reserved for the terminal marker, so the working
    /// budget is `max_total_attempts - 1`.
    pub fn check(&self, tracker: &BudgetTracker) -> Result<(), BudgetExhausted> {
        if tracker.attempts_recorded + 1 >= self.max_total_attempts {
            return Err(BudgetExhausted::TotalAttempts {
                actual: tracker.attempts_recorded,
                limit: self.max_total_attempts,
            });
        }

        let elapsed = tracker.started_at.elapsed().as_secs();
        if elapsed >= self.job_timeout_seconds {
            return Err(BudgetExhausted::JobTimeout {
                elapsed_seconds: elapsed,
                limit_seconds: self.job_timeout_seconds,
            });
        }

        Ok(())
    }
}

/// Tracks attempt spend during a job
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    /// Attempt records appended so far
    pub attempts_recorded: u64,

    /// When the job started
    pub started_at: Instant,
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BudgetTracker {
    pub fn new() -> Self {
        Self {
            attempts_recorded: 0,
            started_at: Instant::now(),
        }
    }

    /// Start counting from an existing log length (resumed jobs).
    pub fn resumed(attempts_recorded: u64) -> Self {
        Self {
            attempts_recorded,
            started_at: Instant::now(),
        }
    }

    pub fn record_attempt(&mut self) {
        self.attempts_recorded += 1;
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Budget exhaustion errors
#[derive(Debug, Clone, Error)]
pub enum BudgetExhausted {
    #[error("Maximum total attempts exceeded: {actual} + terminal marker >= {limit}")]
    TotalAttempts { actual: u64, limit: u64 },

    #[error("Job timeout: {elapsed_seconds}s >= {limit_seconds}s")]
    JobTimeout {
        elapsed_seconds: u64,
        limit_seconds: u64,
    },
}

/// Concurrency guards for the external collaborators. Each service gets
/// its own semaphore so a slow renderer cannot starve evaluation.
pub struct RateGuard {
    generator: Semaphore,
    renderer: Semaphore,
    evaluator: Semaphore,
}

impl RateGuard {
    pub fn new(generator_slots: usize, renderer_slots: usize, evaluator_slots: usize) -> Self {
        Self {
            generator: Semaphore::new(generator_slots),
            renderer: Semaphore::new(renderer_slots),
            evaluator: Semaphore::new(evaluator_slots),
        }
    }

    pub async fn generator(&self) -> SemaphorePermit<'_> {
        // Semaphores are never closed, so acquire cannot fail.
        self.generator
            .acquire()
            .await
            .unwrap_or_else(|_| unreachable!("generator semaphore closed"))
    }

    pub async fn renderer(&self) -> SemaphorePermit<'_> {
        self.renderer
            .acquire()
            .await
            .unwrap_or_else(|_| unreachable!("renderer semaphore closed"))
    }

    pub async fn evaluator(&self) -> SemaphorePermit<'_> {
        self.evaluator
            .acquire()
            .await
            .unwrap_or_else(|_| unreachable!("evaluator semaphore closed"))
    }
}

impl Default for RateGuard {
    fn default() -> Self {
        Self::new(2, 1, 2)
    }
}
