//! Main orchestrator for the generate/compile/evaluate/patch workflow.
//!
//! Coordinates stage execution, attempt logging, repair escalation,
//! and budget enforcement. Every stage transition is appended to the
//! attempt store before the next stage runs, so a job trail can always
//! be replayed into the state it died in.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{Evaluator, Fidelity, Generator, RepairHint, Renderer};
use crate::domain::artifact::{Artifact, ContentSpec};
use crate::domain::attempt::{Attempt, AttemptOutcome, Stage};
use crate::domain::diagnostics::Finding;
use crate::domain::job::{Job, WorkflowState};
use crate::layout::repair::{propose_fix, RepairOutcome};
use crate::layout::{verify, LayoutConfig};
use crate::repair::{apply_local, select, ErrorClassifier, EscalationLadder, RepairAction};

use super::budget::{BudgetTracker, JobBudget, RateGuard};
use super::store::AttemptStore;

/// Result of one guarded external call.
enum CallOutcome<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

/// Everything a finished job leaves behind.
#[derive(Debug)]
pub struct JobReport {
    pub job: Job,
    pub final_artifact: Option<Artifact>,
    pub media_ref: Option<String>,
    pub attempts: Vec<Attempt>,
}

/// Workflow orchestrator wiring the three external collaborators to the
/// layout verifier and repair ladder.
pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    renderer: Arc<dyn Renderer>,
    evaluator: Arc<dyn Evaluator>,
    budget: JobBudget,
    layout: LayoutConfig,
    rate: RateGuard,
    jobs_root: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        renderer: Arc<dyn Renderer>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            generator,
            renderer,
            evaluator,
            budget: JobBudget::default(),
            layout: LayoutConfig::default(),
            rate: RateGuard::default(),
            jobs_root: None,
        }
    }

    pub fn with_budget(mut self, budget: JobBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    /// Override the jobs directory; used by tests to stay out of the
    /// configured home.
    pub fn with_jobs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.jobs_root = Some(root.into());
        self
    }

    /// Run a job to a terminal state without external cancellation.
    pub async fn run_job(&self, spec: ContentSpec) -> Result<JobReport> {
        let (_tx, rx) = watch::channel(false);
        self.run_job_with_cancel(spec, rx).await
    }

    /// Run a job to a terminal state. Flipping `cancel` to true stops
    /// the job at the next suspension point with a `Cancelled` marker.
    #[instrument(skip(self, spec, cancel), fields(topic = %spec.topic))]
    pub async fn run_job_with_cancel(
        &self,
        spec: ContentSpec,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<JobReport> {
        let job_id = Uuid::new_v4();
        info!(%job_id, "Starting job");

        let store = match &self.jobs_root {
            Some(root) => AttemptStore::open_at(root, job_id).await?,
            None => AttemptStore::open(job_id).await?,
        };
        store.store_spec(&spec).await?;

        let classifier = ErrorClassifier::new();
        let mut job = Job::new(job_id, spec.topic.clone());
        let mut tracker = BudgetTracker::new();
        let mut ladder = EscalationLadder::new();
        let mut sequence: u64 = 0;

        let mut current: Option<Artifact> = None;
        let mut low_media: Option<String> = None;
        let mut high_media: Option<String> = None;
        let mut pending: Option<Finding> = None;

        while !job.state.is_terminal() {
            if *cancel.borrow() {
                self.finalize(
                    &store,
                    &mut job,
                    &mut sequence,
                    AttemptOutcome::Cancelled,
                )
                .await?;
                break;
            }

            if let Err(exhausted) = self.budget.check(&tracker) {
                warn!(%job_id, %exhausted, "Budget exhausted");
                self.finalize(
                    &store,
                    &mut job,
                    &mut sequence,
                    AttemptOutcome::BudgetExhausted {
                        detail: exhausted.to_string(),
                    },
                )
                .await?;
                break;
            }

            if job.state == WorkflowState::Patching
                && ladder.fallback_exhausted(self.budget.max_attempts_per_rung)
            {
                warn!(%job_id, "Fallback rung spent with findings still open");
                self.finalize(
                    &store,
                    &mut job,
                    &mut sequence,
                    AttemptOutcome::BudgetExhausted {
                        detail: "fallback template attempts exhausted".to_string(),
                    },
                )
                .await?;
                break;
            }

            let started = Instant::now();
            let attempt = match job.state.clone() {
                WorkflowState::Building => {
                    self.build_stage(
                        &spec,
                        &store,
                        &classifier,
                        &mut pending,
                        &mut current,
                        &mut cancel,
                    )
                    .await
                    .map(|outcome| stamp(job_id, sequence, Stage::Build, outcome))
                }
                WorkflowState::VerifyingLayout => self
                    .verify_stage(&classifier, &current, &mut pending)
                    .map(|outcome| stamp(job_id, sequence, Stage::VerifyLayout, outcome)),
                WorkflowState::Patching => {
                    self.patch_stage(
                        &spec,
                        &store,
                        &classifier,
                        &mut ladder,
                        &mut pending,
                        &mut current,
                        &mut cancel,
                    )
                    .await
                    .map(|(outcome, level)| {
                        let attempt = stamp(job_id, sequence, Stage::Patch, outcome);
                        match level {
                            Some(level) => attempt.with_escalation(level),
                            None => attempt,
                        }
                    })
                }
                WorkflowState::CompilingLow => self
                    .compile_stage(
                        &classifier,
                        &current,
                        Fidelity::Low,
                        &mut pending,
                        &mut low_media,
                        &mut cancel,
                    )
                    .await
                    .map(|outcome| stamp(job_id, sequence, Stage::CompileLow, outcome)),
                WorkflowState::Evaluating => self
                    .evaluate_stage(&classifier, &low_media, &mut pending, &mut cancel)
                    .await
                    .map(|outcome| stamp(job_id, sequence, Stage::Evaluate, outcome)),
                WorkflowState::CompilingHigh => self
                    .compile_stage(
                        &classifier,
                        &current,
                        Fidelity::High,
                        &mut pending,
                        &mut high_media,
                        &mut cancel,
                    )
                    .await
                    .map(|outcome| stamp(job_id, sequence, Stage::CompileHigh, outcome)),
                WorkflowState::Completed | WorkflowState::Failed { .. } => break,
            }?;

            if matches!(attempt.outcome, AttemptOutcome::Cancelled) {
                self.finalize(&store, &mut job, &mut sequence, AttemptOutcome::Cancelled)
                    .await?;
                break;
            }
            let attempt = attempt.with_duration(started.elapsed().as_millis() as u64);

            // Successful stages carry the artifact they produced or
            // validated; compiles carry the media reference instead.
            let output_ref = if attempt.outcome.is_success() {
                match attempt.stage {
                    Stage::CompileLow => low_media.clone(),
                    Stage::CompileHigh => high_media.clone(),
                    _ => current.as_ref().map(|a| a.reference()),
                }
            } else {
                None
            };
            let attempt = match output_ref {
                Some(reference) => attempt.with_output(reference),
                None => attempt,
            };

            debug!(stage = ?attempt.stage, outcome = ?attempt.outcome, "Stage finished");
            store.append(&attempt).await?;
            job.apply(&attempt);
            tracker.record_attempt();
            sequence += 1;
        }

        let attempts = store.replay().await?;
        // High fidelity media when the final compile made it, otherwise
        // the preview that already passed evaluation.
        let media_ref = high_media.or_else(|| job.media_ref.clone()).or(low_media);
        info!(%job_id, state = ?job.state, attempts = attempts.len(), "Job finished");

        Ok(JobReport {
            job,
            final_artifact: current,
            media_ref,
            attempts,
        })
    }

    /// Append the terminal marker and drive the job into its final state.
    async fn finalize(
        &self,
        store: &AttemptStore,
        job: &mut Job,
        sequence: &mut u64,
        outcome: AttemptOutcome,
    ) -> Result<()> {
        let attempt = stamp(job.id, *sequence, Stage::Finalize, outcome);
        store.append(&attempt).await?;
        job.apply(&attempt);
        *sequence += 1;
        Ok(())
    }

    async fn build_stage(
        &self,
        spec: &ContentSpec,
        store: &AttemptStore,
        classifier: &ErrorClassifier,
        pending: &mut Option<Finding>,
        current: &mut Option<Artifact>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<AttemptOutcome> {
        let _permit = self.rate.generator().await;
        let call = guarded(
            self.generator.generate(spec, None),
            self.budget.generate_timeout(),
            cancel,
        )
        .await;

        Ok(match call {
            CallOutcome::Done(Ok(artifact)) => {
                store.store_artifact(&artifact).await?;
                *current = Some(artifact);
                AttemptOutcome::Success
            }
            CallOutcome::Done(Err(error)) => {
                let record = classifier.classify(&format!("{:#}", error));
                *pending = Some(Finding::Error(record.clone()));
                AttemptOutcome::Error { record }
            }
            CallOutcome::TimedOut => {
                self.note_timeout(classifier, pending, "generate", self.budget.generate_timeout())
            }
            CallOutcome::Cancelled => AttemptOutcome::Cancelled,
        })
    }

    fn verify_stage(
        &self,
        classifier: &ErrorClassifier,
        current: &Option<Artifact>,
        pending: &mut Option<Finding>,
    ) -> Result<AttemptOutcome> {
        // Generation can fail repeatedly without ever producing an
        // artifact; surface that as a finding so repair regenerates.
        let Some(artifact) = current.as_ref() else {
            let record = classifier.classify("MissingArtifact: generation has not produced an artifact yet");
            *pending = Some(Finding::Error(record.clone()));
            return Ok(AttemptOutcome::Error { record });
        };

        if let Err(error) = artifact.timeline.validate(self.layout.max_coverage_gap) {
            let record = classifier.classify(&error.to_string());
            *pending = Some(Finding::Error(record.clone()));
            return Ok(AttemptOutcome::Error { record });
        }

        let report = verify(&artifact.timeline, &self.layout);
        if report.is_empty() {
            Ok(AttemptOutcome::Success)
        } else {
            *pending = Some(Finding::Conflicts(report.clone()));
            Ok(AttemptOutcome::Conflicts { report })
        }
    }

    /// One repair attempt. Geometric conflicts get a deterministic fix
    /// pass first; everything else climbs the escalation ladder.
    async fn patch_stage(
        &self,
        spec: &ContentSpec,
        store: &AttemptStore,
        classifier: &ErrorClassifier,
        ladder: &mut EscalationLadder,
        pending: &mut Option<Finding>,
        current: &mut Option<Artifact>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(AttemptOutcome, Option<u32>)> {
        let finding = pending
            .take()
            .context("Patch stage reached without a finding")?;

        // No artifact yet means generation itself failed; repair is a
        // fresh generation carrying the failure as context.
        let Some(artifact) = current.clone() else {
            let hint = RepairHint {
                element_id: None,
                error_context: finding_context(&finding),
                action: RepairAction::ScopedRegeneration {
                    element_id: None,
                    error_context: finding_context(&finding),
                },
            };
            let outcome = self
                .regenerate(spec, &hint, store, classifier, pending, current, cancel)
                .await?;
            return Ok((outcome, None));
        };

        if let Finding::Conflicts(report) = &finding {
            match propose_fix(&artifact.timeline, report, &self.layout) {
                RepairOutcome::Patched { model, applied } => {
                    debug!(fixes = applied.len(), "Deterministic layout fix applied");
                    let patched = artifact.patched(model, artifact.source.clone());
                    store.store_artifact(&patched).await?;
                    *current = Some(patched);
                    return Ok((AttemptOutcome::Success, None));
                }
                RepairOutcome::Unresolved { remaining, .. } => {
                    debug!(remaining = remaining.len(), "Layout fix deferred to ladder");
                }
            }
        }

        let signature = finding.signature();
        let floor = EscalationLadder::floor_for(&finding);
        let level = ladder.escalate(&signature, floor, self.budget.max_attempts_per_rung);
        let action = select(level, &finding);
        debug!(%signature, level, ?action, "Escalating repair");

        if action.needs_generator() {
            let hint = RepairHint {
                element_id: finding.offending_element(),
                error_context: finding_context(&finding),
                action,
            };
            let outcome = self
                .regenerate(spec, &hint, store, classifier, pending, current, cancel)
                .await?;
            return Ok((outcome, Some(level)));
        }

        match apply_local(&action, &artifact, spec, &self.layout) {
            Some(patched) => {
                store.store_artifact(&patched).await?;
                *current = Some(patched);
                Ok((AttemptOutcome::Success, Some(level)))
            }
            None => {
                // Action had nothing to change; surface it so the next
                // recurrence climbs a rung.
                let record = classifier.classify(&format!(
                    "RepairIneffective: {:?} produced no change for {}",
                    action, signature
                ));
                *pending = Some(Finding::Error(record.clone()));
                Ok((AttemptOutcome::Error { record }, Some(level)))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn regenerate(
        &self,
        spec: &ContentSpec,
        hint: &RepairHint,
        store: &AttemptStore,
        classifier: &ErrorClassifier,
        pending: &mut Option<Finding>,
        current: &mut Option<Artifact>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<AttemptOutcome> {
        let _permit = self.rate.generator().await;
        let call = guarded(
            self.generator.generate(spec, Some(hint)),
            self.budget.generate_timeout(),
            cancel,
        )
        .await;

        Ok(match call {
            CallOutcome::Done(Ok(artifact)) => {
                // Versions must keep moving forward even when the
                // generator restarts from scratch.
                let version = current.as_ref().map(|a| a.version + 1).unwrap_or(1);
                let artifact = Artifact::new(version.max(artifact.version), artifact.timeline, artifact.source);
                store.store_artifact(&artifact).await?;
                *current = Some(artifact);
                AttemptOutcome::Success
            }
            CallOutcome::Done(Err(error)) => {
                let record = classifier.classify(&format!("{:#}", error));
                *pending = Some(Finding::Error(record.clone()));
                AttemptOutcome::Error { record }
            }
            CallOutcome::TimedOut => {
                self.note_timeout(classifier, pending, "generate", self.budget.generate_timeout())
            }
            CallOutcome::Cancelled => AttemptOutcome::Cancelled,
        })
    }

    async fn compile_stage(
        &self,
        classifier: &ErrorClassifier,
        current: &Option<Artifact>,
        fidelity: Fidelity,
        pending: &mut Option<Finding>,
        media_out: &mut Option<String>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<AttemptOutcome> {
        let artifact = current
            .as_ref()
            .context("Compile stage reached without an artifact")?;

        let _permit = self.rate.renderer().await;
        let call = guarded(
            self.renderer.compile(artifact, fidelity),
            self.budget.compile_timeout(),
            cancel,
        )
        .await;

        Ok(match call {
            CallOutcome::Done(Ok(result)) if result.success => {
                *media_out = result.media_ref.clone();
                AttemptOutcome::Success
            }
            CallOutcome::Done(Ok(result)) => {
                let raw = result.error_text.unwrap_or_else(|| "compile failed".into());
                let record = classifier.classify(&raw);
                *pending = Some(Finding::Error(record.clone()));
                AttemptOutcome::Error { record }
            }
            CallOutcome::Done(Err(error)) => {
                let record = classifier.classify(&format!("{:#}", error));
                *pending = Some(Finding::Error(record.clone()));
                AttemptOutcome::Error { record }
            }
            CallOutcome::TimedOut => {
                self.note_timeout(classifier, pending, "compile", self.budget.compile_timeout())
            }
            CallOutcome::Cancelled => AttemptOutcome::Cancelled,
        })
    }

    async fn evaluate_stage(
        &self,
        classifier: &ErrorClassifier,
        low_media: &Option<String>,
        pending: &mut Option<Finding>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<AttemptOutcome> {
        let media = low_media
            .as_ref()
            .context("Evaluate stage reached without compiled media")?;

        let _permit = self.rate.evaluator().await;
        let call = guarded(
            self.evaluator.evaluate(media),
            self.budget.evaluate_timeout(),
            cancel,
        )
        .await;

        Ok(match call {
            CallOutcome::Done(Ok(verdict)) if verdict.pass => AttemptOutcome::Success,
            CallOutcome::Done(Ok(verdict)) => {
                let conflicts = verdict.spatial_conflicts();
                if conflicts.is_empty() {
                    *pending = Some(Finding::Quality(verdict.issues.clone()));
                    AttemptOutcome::Quality {
                        issues: verdict.issues,
                    }
                } else {
                    *pending = Some(Finding::Conflicts(conflicts.clone()));
                    AttemptOutcome::Conflicts { report: conflicts }
                }
            }
            CallOutcome::Done(Err(error)) => {
                let record = classifier.classify(&format!("{:#}", error));
                *pending = Some(Finding::Error(record.clone()));
                AttemptOutcome::Error { record }
            }
            CallOutcome::TimedOut => self.note_timeout(
                classifier,
                pending,
                "evaluate",
                self.budget.evaluate_timeout(),
            ),
            CallOutcome::Cancelled => AttemptOutcome::Cancelled,
        })
    }

    /// A timeout is a failed attempt: it consumes budget and leaves an
    /// error finding for the repair stage.
    fn note_timeout(
        &self,
        classifier: &ErrorClassifier,
        pending: &mut Option<Finding>,
        stage: &str,
        timeout: Duration,
    ) -> AttemptOutcome {
        let record = classifier.classify(&format!(
            "StageTimeout: {} exceeded {}s",
            stage,
            timeout.as_secs()
        ));
        *pending = Some(Finding::Error(record));
        AttemptOutcome::Timeout {
            stage_timeout_secs: timeout.as_secs(),
        }
    }
}

/// Attempt skeleton for the current stage.
fn stamp(job_id: Uuid, sequence: u64, stage: Stage, outcome: AttemptOutcome) -> Attempt {
    Attempt::new(job_id, sequence, stage, outcome)
}

/// Full finding text handed to scoped regeneration; never truncated.
fn finding_context(finding: &Finding) -> String {
    match finding {
        Finding::Error(record) => record.raw_text.clone(),
        Finding::Conflicts(report) => {
            let lines: Vec<String> = report
                .conflicts
                .iter()
                .map(|c| {
                    format!(
                        "{:?} involving [{}] over [{:.2}, {:.2})",
                        c.kind,
                        c.involved.join(", "),
                        c.interval.start,
                        c.interval.end
                    )
                })
                .collect();
            lines.join("\n")
        }
        Finding::Quality(issues) => {
            let lines: Vec<String> = issues
                .iter()
                .map(|i| format!("{}: {}", i.category, i.description))
                .collect();
            lines.join("\n")
        }
    }
}

/// Run one external call under a stage timeout, aborting early on
/// cancellation.
async fn guarded<T>(
    fut: impl std::future::Future<Output = T>,
    timeout: Duration,
    cancel: &mut watch::Receiver<bool>,
) -> CallOutcome<T> {
    let timed = tokio::time::timeout(timeout, fut);
    tokio::pin!(timed);

    loop {
        tokio::select! {
            result = &mut timed => {
                return match result {
                    Ok(value) => CallOutcome::Done(value),
                    Err(_) => CallOutcome::TimedOut,
                };
            }
            changed = cancel.changed() => {
                if changed.is_ok() && *cancel.borrow() {
                    return CallOutcome::Cancelled;
                }
                if changed.is_err() {
                    // Sender dropped; keep running without cancellation.
                    return match timed.await {
                        Ok(value) => CallOutcome::Done(value),
                        Err(_) => CallOutcome::TimedOut,
                    };
                }
            }
        }
    }
}
