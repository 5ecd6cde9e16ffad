//! Command-line interface for scenesmith.
//!
//! Provides commands for submitting jobs, checking status, listing
//! jobs, and inspecting attempt trails.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use uuid::Uuid;

use crate::adapters::{SubprocessEvaluator, SubprocessGenerator, SubprocessRenderer};
use crate::core::{AttemptStore, Orchestrator};
use crate::domain::artifact::ContentSpec;
use crate::domain::attempt::{Attempt, AttemptOutcome};
use crate::domain::job::{Job, WorkflowState};

/// scenesmith - Self-correcting animation pipeline
#[derive(Parser, Debug)]
#[command(name = "scenesmith")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a content spec and run it to completion
    Submit {
        /// Content spec file (YAML)
        spec: PathBuf,
    },

    /// Check the status of a job
    Status {
        /// Job ID (UUID)
        job_id: String,
    },

    /// List recent jobs
    Jobs {
        /// Maximum number of jobs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the full attempt trail of a job
    Trail {
        /// Job ID (UUID)
        job_id: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Submit { spec } => submit_job(&spec).await,
            Commands::Status { job_id } => show_status(&job_id).await,
            Commands::Jobs { limit } => list_jobs(limit).await,
            Commands::Trail { job_id } => show_trail(&job_id).await,
            Commands::Config => show_config(),
        }
    }
}

/// Submit a spec and run the workflow, cancelling cleanly on Ctrl-C.
async fn submit_job(spec_path: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(spec_path)
        .with_context(|| format!("Failed to read spec file: {}", spec_path.display()))?;
    let spec: ContentSpec =
        serde_yaml::from_str(&content).context("Failed to parse content spec")?;

    let config = crate::config::config()?;
    let orchestrator = Orchestrator::new(
        Arc::new(SubprocessGenerator::new(&config.generator_command)),
        Arc::new(SubprocessRenderer::new(
            &config.renderer_command,
            crate::config::work_dir()?,
        )),
        Arc::new(SubprocessEvaluator::new(&config.evaluator_command)),
    )
    .with_budget(config.budget.clone())
    .with_layout(config.layout.clone());

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let report = orchestrator.run_job_with_cancel(spec, cancel_rx).await?;

    match &report.job.state {
        WorkflowState::Completed => {
            if let Some(media) = &report.media_ref {
                println!("{}", media);
            }
            eprintln!(
                "\n[Job {} completed after {} attempts]",
                report.job.id,
                report.attempts.len()
            );
        }
        WorkflowState::Failed { reason } => {
            eprintln!("\n[Job {} failed: {}]", report.job.id, reason);
            std::process::exit(1);
        }
        state => {
            eprintln!("\n[Job {} in state: {:?}]", report.job.id, state);
        }
    }

    Ok(())
}

/// Show the status of a job
async fn show_status(job_id_str: &str) -> Result<()> {
    let (job, _attempts) = load_job(job_id_str).await?;

    println!("Job ID: {}", job.id);
    println!("Topic: {}", job.topic);
    println!("State: {:?}", job.state);
    println!("Started: {}", job.started_at);
    if let Some(completed) = job.completed_at {
        println!("Completed: {}", completed);
    }
    println!("Attempts: {}", job.attempts);
    if let Some(level) = job.max_escalation {
        println!("Max escalation: {}", level);
    }
    if let Some(artifact) = &job.latest_artifact {
        println!("Latest output: {}", artifact);
    }
    if let Some(media) = &job.media_ref {
        println!("Media: {}", media);
    }

    Ok(())
}

/// List recent jobs
async fn list_jobs(limit: usize) -> Result<()> {
    let job_ids = AttemptStore::list_jobs().await?;

    let mut jobs = Vec::new();
    for job_id in job_ids {
        if let Ok((job, _)) = load_job(&job_id.to_string()).await {
            jobs.push(job);
        }
    }

    jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    jobs.truncate(limit);

    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{}  {:<12}  {:>3} attempts  {}",
            job.id,
            state_label(&job.state),
            job.attempts,
            job.topic
        );
    }

    Ok(())
}

/// Show the full attempt trail of a job
async fn show_trail(job_id_str: &str) -> Result<()> {
    let (job, attempts) = load_job(job_id_str).await?;

    println!("Job {} ({:?})", job.id, job.state);
    for attempt in &attempts {
        let level = attempt
            .escalation_level
            .map(|l| format!(" rung {}", l))
            .unwrap_or_default();
        let duration = attempt
            .duration_ms
            .map(|d| format!(" {}ms", d))
            .unwrap_or_default();
        println!(
            "  #{:<3} {:?}: {}{}{}",
            attempt.sequence_number,
            attempt.stage,
            outcome_label(&attempt.outcome),
            level,
            duration
        );
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let config = crate::config::config()?;

    println!("Home: {}", config.home.display());
    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none, using defaults)"),
    }
    println!("Generator: {}", config.generator_command);
    println!("Renderer: {}", config.renderer_command);
    println!("Evaluator: {}", config.evaluator_command);
    println!(
        "Frame: {}x{} units, {:.0}% margin",
        config.layout.frame_width,
        config.layout.frame_height,
        config.layout.safe_margin_fraction * 100.0
    );
    println!(
        "Budget: {} attempts, {} per rung",
        config.budget.max_total_attempts, config.budget.max_attempts_per_rung
    );

    Ok(())
}

/// Replay a job's trail and reconstruct its state.
async fn load_job(job_id_str: &str) -> Result<(Job, Vec<Attempt>)> {
    let job_id = Uuid::parse_str(job_id_str)
        .with_context(|| format!("Invalid job ID: {}", job_id_str))?;

    let store = AttemptStore::open(job_id).await?;
    let attempts = store.replay().await?;
    if attempts.is_empty() {
        anyhow::bail!("No attempts found for job {}", job_id);
    }

    let topic = store
        .load_spec()
        .await?
        .map(|s| s.topic)
        .unwrap_or_default();
    let job = Job::from_attempts(topic, &attempts)
        .context("Failed to reconstruct job state")?;

    Ok((job, attempts))
}

fn state_label(state: &WorkflowState) -> &'static str {
    match state {
        WorkflowState::Building => "building",
        WorkflowState::VerifyingLayout => "verifying",
        WorkflowState::Patching => "patching",
        WorkflowState::CompilingLow => "compiling",
        WorkflowState::Evaluating => "evaluating",
        WorkflowState::CompilingHigh => "finishing",
        WorkflowState::Completed => "completed",
        WorkflowState::Failed { .. } => "failed",
    }
}

fn outcome_label(outcome: &AttemptOutcome) -> String {
    match outcome {
        AttemptOutcome::Success => "ok".to_string(),
        AttemptOutcome::Conflicts { report } => {
            format!("{} layout conflicts", report.len())
        }
        AttemptOutcome::Error { record } => format!("error [{}]", record.signature),
        AttemptOutcome::Quality { issues } => format!("{} quality issues", issues.len()),
        AttemptOutcome::Timeout { stage_timeout_secs } => {
            format!("timeout after {}s", stage_timeout_secs)
        }
        AttemptOutcome::Cancelled => "cancelled".to_string(),
        AttemptOutcome::BudgetExhausted { detail } => format!("budget exhausted: {}", detail),
    }
}
