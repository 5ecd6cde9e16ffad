//! Append-only attempt store with file-based persistence.
//!
//! Attempts are stored as newline-delimited JSON (JSONL) for simplicity
//! and easy debugging/inspection. Artifacts are written alongside the
//! log, keyed by their version-hash reference.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::artifact::Artifact;
use crate::domain::attempt::Attempt;

/// File-based attempt store using JSONL format
pub struct AttemptStore {
    /// Directory containing the job
    job_dir: PathBuf,

    /// Path to the attempts.jsonl file
    attempts_path: PathBuf,

    /// Path to artifacts directory
    artifacts_dir: PathBuf,
}

impl AttemptStore {
    /// Create or open an attempt store for a job under the configured
    /// jobs directory.
    pub async fn open(job_id: Uuid) -> Result<Self> {
        let base_dir = Self::base_directory()?;
        Self::open_at(&base_dir, job_id).await
    }

    /// Create or open an attempt store rooted at an explicit directory.
    pub async fn open_at(base_dir: &Path, job_id: Uuid) -> Result<Self> {
        let job_dir = base_dir.join(job_id.to_string());
        let artifacts_dir = job_dir.join("artifacts");

        fs::create_dir_all(&artifacts_dir).await.with_context(|| {
            format!(
                "Failed to create artifacts directory: {}",
                artifacts_dir.display()
            )
        })?;

        let attempts_path = job_dir.join("attempts.jsonl");

        Ok(Self {
            job_dir,
            attempts_path,
            artifacts_dir,
        })
    }

    /// Base directory for all jobs (~/.scenesmith/jobs or $SCENESMITH_HOME/jobs)
    pub fn base_directory() -> Result<PathBuf> {
        crate::config::jobs_dir()
    }

    pub fn attempts_path(&self) -> &Path {
        &self.attempts_path
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Persist the submitted content spec next to the attempt log.
    pub async fn store_spec(&self, spec: &crate::domain::artifact::ContentSpec) -> Result<()> {
        let spec_path = self.job_dir.join("spec.yaml");
        let yaml = serde_yaml::to_string(spec).context("Failed to serialize spec")?;
        fs::write(&spec_path, yaml)
            .await
            .with_context(|| format!("Failed to write spec: {}", spec_path.display()))?;
        Ok(())
    }

    /// Load the submitted content spec, if present.
    pub async fn load_spec(&self) -> Result<Option<crate::domain::artifact::ContentSpec>> {
        let spec_path = self.job_dir.join("spec.yaml");
        if !spec_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&spec_path)
            .await
            .with_context(|| format!("Failed to read spec: {}", spec_path.display()))?;
        let spec = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse spec: {}", spec_path.display()))?;
        Ok(Some(spec))
    }

    /// Persist an artifact, keyed by its reference string.
    pub async fn store_artifact(&self, artifact: &Artifact) -> Result<PathBuf> {
        let artifact_path = self
            .artifacts_dir
            .join(format!("{}.json", artifact.reference()));

        let json =
            serde_json::to_string_pretty(artifact).context("Failed to serialize artifact")?;
        fs::write(&artifact_path, json)
            .await
            .with_context(|| format!("Failed to write artifact: {}", artifact_path.display()))?;

        Ok(artifact_path)
    }

    /// Load an artifact by its reference string.
    pub async fn load_artifact(&self, reference: &str) -> Result<Option<Artifact>> {
        let artifact_path = self.artifacts_dir.join(format!("{}.json", reference));

        if !artifact_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&artifact_path)
            .await
            .with_context(|| format!("Failed to read artifact: {}", artifact_path.display()))?;

        let artifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact: {}", artifact_path.display()))?;

        Ok(Some(artifact))
    }

    /// List stored artifact references for this job.
    pub async fn list_artifacts(&self) -> Result<Vec<String>> {
        let mut artifacts = Vec::new();

        if !self.artifacts_dir.exists() {
            return Ok(artifacts);
        }

        let mut entries = fs::read_dir(&self.artifacts_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(".json") {
                    artifacts.push(name.trim_end_matches(".json").to_string());
                }
            }
        }

        artifacts.sort();
        Ok(artifacts)
    }

    /// Append an attempt to the log
    pub async fn append(&self, attempt: &Attempt) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.attempts_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open attempts file: {}",
                    self.attempts_path.display()
                )
            })?;

        let json = serde_json::to_string(attempt).context("Failed to serialize attempt")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write attempt")?;
        file.flush().await.context("Failed to flush attempt")?;

        Ok(())
    }

    /// Replay all attempts in append order
    pub async fn replay(&self) -> Result<Vec<Attempt>> {
        if !self.attempts_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.attempts_path).await.with_context(|| {
            format!(
                "Failed to open attempts file: {}",
                self.attempts_path.display()
            )
        })?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut attempts = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let attempt: Attempt = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse attempt: {}", line))?;
            attempts.push(attempt);
        }

        Ok(attempts)
    }

    /// Sequence number the next appended attempt should carry.
    pub async fn next_sequence(&self) -> Result<u64> {
        let attempts = self.replay().await?;
        Ok(attempts.last().map(|a| a.sequence_number + 1).unwrap_or(0))
    }

    /// List all job IDs under an explicit base directory.
    pub async fn list_jobs_at(base_dir: &Path) -> Result<Vec<Uuid>> {
        if !base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut jobs = Vec::new();
        let mut entries = fs::read_dir(base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        jobs.push(uuid);
                    }
                }
            }
        }

        Ok(jobs)
    }

    /// List all job IDs in the configured base directory.
    pub async fn list_jobs() -> Result<Vec<Uuid>> {
        Self::list_jobs_at(&Self::base_directory()?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attempt::{AttemptOutcome, Stage};
    use crate::domain::timeline::TimelineModel;
    use tempfile::TempDir;

    async fn create_test_store() -> (AttemptStore, Uuid, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let job_id = Uuid::new_v4();
        let store = AttemptStore::open_at(temp_dir.path(), job_id).await.unwrap();
        (store, job_id, temp_dir)
    }

    #[tokio::test]
    async fn test_attempt_append_and_replay() {
        let (store, job_id, _temp) = create_test_store().await;

        let first = Attempt::new(job_id, 0, Stage::Build, AttemptOutcome::Success);
        let second = Attempt::new(job_id, 1, Stage::VerifyLayout, AttemptOutcome::Success);

        store.append(&first).await.unwrap();
        store.append(&second).await.unwrap();

        let attempts = store.replay().await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].stage, Stage::Build);
        assert_eq!(attempts[1].stage, Stage::VerifyLayout);
    }

    #[tokio::test]
    async fn test_replay_preserves_append_order() {
        let (store, job_id, _temp) = create_test_store().await;

        for i in 0..5 {
            let attempt = Attempt::new(job_id, i, Stage::Patch, AttemptOutcome::Success)
                .with_escalation(i as u32);
            store.append(&attempt).await.unwrap();
        }

        let attempts = store.replay().await.unwrap();
        assert_eq!(attempts.len(), 5);
        for (i, attempt) in attempts.iter().enumerate() {
            assert_eq!(attempt.sequence_number, i as u64);
        }
    }

    #[tokio::test]
    async fn test_next_sequence_after_replay() {
        let (store, job_id, _temp) = create_test_store().await;
        assert_eq!(store.next_sequence().await.unwrap(), 0);

        let attempt = Attempt::new(job_id, 0, Stage::Build, AttemptOutcome::Success);
        store.append(&attempt).await.unwrap();

        assert_eq!(store.next_sequence().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_artifact_round_trip() {
        let (store, _job_id, _temp) = create_test_store().await;

        let artifact = Artifact::new(1, TimelineModel::new(10.0, vec![]), "scene source".into());
        store.store_artifact(&artifact).await.unwrap();

        let loaded = store
            .load_artifact(&artifact.reference())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.version, artifact.version);
        assert_eq!(loaded.source, artifact.source);

        assert!(store
            .load_artifact("v9-ffffffffffffffff")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_jobs_ignores_foreign_directories() {
        let temp_dir = TempDir::new().unwrap();
        let job_id = Uuid::new_v4();
        let _store = AttemptStore::open_at(temp_dir.path(), job_id).await.unwrap();
        std::fs::create_dir(temp_dir.path().join("not-a-job")).unwrap();

        let jobs = AttemptStore::list_jobs_at(temp_dir.path()).await.unwrap();
        assert_eq!(jobs, vec![job_id]);
    }
}
