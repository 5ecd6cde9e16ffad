//! Scripted in-process collaborator for pipeline tests.
//!
//! One instance implements all three adapter traits. Responses are popped
//! from per-trait queues in FIFO order; optional per-trait delays let
//! timeout behaviour be exercised without a real subprocess.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::artifact::{Artifact, ContentSpec};

use super::{CompileResult, EvalResult, Fidelity, Generator, RepairHint, Renderer, Evaluator};

#[derive(Default)]
pub struct ScriptedCollaborator {
    generate_queue: Mutex<VecDeque<Result<Artifact, String>>>,
    compile_queue: Mutex<VecDeque<CompileResult>>,
    eval_queue: Mutex<VecDeque<EvalResult>>,

    generate_delay: Mutex<Option<Duration>>,
    compile_delay: Mutex<Option<Duration>>,

    generate_calls: AtomicU32,
    compile_calls: AtomicU32,
    eval_calls: AtomicU32,

    seen_hints: Mutex<Vec<RepairHint>>,
}

impl ScriptedCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_artifact(&self, artifact: Artifact) {
        self.generate_queue
            .lock()
            .unwrap()
            .push_back(Ok(artifact));
    }

    pub fn push_generate_error(&self, message: impl Into<String>) {
        self.generate_queue
            .lock()
            .unwrap()
            .push_back(Err(message.into()));
    }

    pub fn push_compile(&self, result: CompileResult) {
        self.compile_queue.lock().unwrap().push_back(result);
    }

    pub fn push_eval(&self, result: EvalResult) {
        self.eval_queue.lock().unwrap().push_back(result);
    }

    /// Delay every subsequent generate call; used to provoke stage
    /// timeouts in tests.
    pub fn set_generate_delay(&self, delay: Duration) {
        *self.generate_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_compile_delay(&self, delay: Duration) {
        *self.compile_delay.lock().unwrap() = Some(delay);
    }

    pub fn generate_calls(&self) -> u32 {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn compile_calls(&self) -> u32 {
        self.compile_calls.load(Ordering::SeqCst)
    }

    pub fn eval_calls(&self) -> u32 {
        self.eval_calls.load(Ordering::SeqCst)
    }

    /// Hints received through scoped regeneration calls, in order.
    pub fn seen_hints(&self) -> Vec<RepairHint> {
        self.seen_hints.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedCollaborator {
    async fn generate(&self, _spec: &ContentSpec, hint: Option<&RepairHint>) -> Result<Artifact> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hint) = hint {
            self.seen_hints.lock().unwrap().push(hint.clone());
        }
        let delay = *self.generate_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.generate_queue.lock().unwrap().pop_front();
        match next {
            Some(Ok(artifact)) => Ok(artifact),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("scripted generate queue is exhausted")),
        }
    }
}

#[async_trait]
impl Renderer for ScriptedCollaborator {
    async fn compile(&self, artifact: &Artifact, fidelity: Fidelity) -> Result<CompileResult> {
        self.compile_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.compile_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.compile_queue.lock().unwrap().pop_front();
        match next {
            Some(result) => Ok(result),
            // Unscripted compiles succeed; keeps happy-path tests short.
            None => Ok(CompileResult::ok(format!(
                "media/{}{}.mp4",
                artifact.reference(),
                fidelity.as_flag()
            ))),
        }
    }
}

#[async_trait]
impl Evaluator for ScriptedCollaborator {
    async fn evaluate(&self, _media_ref: &str) -> Result<EvalResult> {
        self.eval_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.eval_queue.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(EvalResult::passed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timeline::TimelineModel;

    fn artifact() -> Artifact {
        Artifact::new(1, TimelineModel::new(10.0, vec![]), "scene".into())
    }

    fn spec() -> ContentSpec {
        ContentSpec {
            topic: "test".into(),
            audience: "general".into(),
            duration_seconds: 10.0,
            source_content: None,
        }
    }

    #[tokio::test]
    async fn test_responses_pop_in_order() {
        let mock = ScriptedCollaborator::new();
        mock.push_compile(CompileResult::failed("boom"));
        mock.push_compile(CompileResult::ok("media/out.mp4"));

        let a = artifact();
        let first = mock.compile(&a, Fidelity::Low).await.unwrap();
        let second = mock.compile(&a, Fidelity::Low).await.unwrap();

        assert!(!first.success);
        assert!(second.success);
        assert_eq!(mock.compile_calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_generate_queue_errors() {
        let mock = ScriptedCollaborator::new();
        mock.push_artifact(artifact());

        assert!(mock.generate(&spec(), None).await.is_ok());
        assert!(mock.generate(&spec(), None).await.is_err());
    }

    #[tokio::test]
    async fn test_unscripted_evaluate_passes() {
        let mock = ScriptedCollaborator::new();
        let verdict = mock.evaluate("media/out.mp4").await.unwrap();
        assert!(verdict.pass);
    }
}
