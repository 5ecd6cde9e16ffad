//! Subprocess-backed collaborator implementations.
//!
//! Each adapter spawns a configured binary, pipes its input over stdin,
//! and reads the result from stdout. A non-zero compile exit is a compile
//! *result*, not a transport error: the stderr text is what the error
//! classifier consumes. Timeouts are applied by the orchestrator, never
//! here.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::domain::artifact::{Artifact, ContentSpec};

use super::{CompileResult, EvalResult, Fidelity, Generator, RepairHint, Renderer, Evaluator};

/// Request body piped to the generator binary.
#[derive(serde::Serialize)]
struct GenerateRequest<'a> {
    spec: &'a ContentSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a RepairHint>,
}

/// Generator calling an external command that reads a JSON request on
/// stdin and writes an artifact as JSON on stdout.
pub struct SubprocessGenerator {
    binary_path: String,
}

impl SubprocessGenerator {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

#[async_trait]
impl Generator for SubprocessGenerator {
    async fn generate(&self, spec: &ContentSpec, hint: Option<&RepairHint>) -> Result<Artifact> {
        let request = serde_json::to_vec(&GenerateRequest { spec, hint })
            .context("Failed to serialize generate request")?;

        let mut child = Command::new(&self.binary_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn generator '{}'", self.binary_path))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&request)
                .await
                .context("Failed to write to generator stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for generator")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Generator exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        serde_json::from_slice(&output.stdout).context("Generator output is not a valid artifact")
    }
}

/// Renderer invoking an external compiler binary on a source file.
pub struct SubprocessRenderer {
    binary_path: String,
    work_dir: PathBuf,
}

impl SubprocessRenderer {
    pub fn new(binary_path: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl Renderer for SubprocessRenderer {
    async fn compile(&self, artifact: &Artifact, fidelity: Fidelity) -> Result<CompileResult> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .with_context(|| format!("Failed to create work dir {}", self.work_dir.display()))?;

        let source_path = self
            .work_dir
            .join(format!("scene_{}.py", artifact.reference()));
        tokio::fs::write(&source_path, &artifact.source)
            .await
            .with_context(|| format!("Failed to write source {}", source_path.display()))?;

        debug!(path = %source_path.display(), flag = fidelity.as_flag(), "compiling artifact");

        let output = Command::new(&self.binary_path)
            .arg(fidelity.as_flag())
            .arg(&source_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run renderer '{}'", self.binary_path))?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let media_ref = stdout
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or_default()
                .trim()
                .to_string();
            Ok(CompileResult::ok(media_ref))
        } else {
            // Full stderr preserved for classification, never truncated.
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            Ok(CompileResult::failed(stderr))
        }
    }
}

/// Evaluator invoking an external binary that prints an `EvalResult` as
/// JSON.
pub struct SubprocessEvaluator {
    binary_path: String,
}

impl SubprocessEvaluator {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }
}

#[async_trait]
impl Evaluator for SubprocessEvaluator {
    async fn evaluate(&self, media_ref: &str) -> Result<EvalResult> {
        let output = Command::new(&self.binary_path)
            .arg(media_ref)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run evaluator '{}'", self.binary_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "Evaluator exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        serde_json::from_slice(&output.stdout).context("Evaluator output is not a valid verdict")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fidelity_flags() {
        assert_eq!(Fidelity::Low.as_flag(), "-ql");
        assert_eq!(Fidelity::High.as_flag(), "-qh");
    }

    #[tokio::test]
    async fn test_missing_generator_binary_is_an_error() {
        let generator = SubprocessGenerator::new("/nonexistent/generator");
        let spec = ContentSpec {
            topic: "test".into(),
            audience: "general".into(),
            duration_seconds: 10.0,
            source_content: None,
        };

        assert!(generator.generate(&spec, None).await.is_err());
    }
}
