//! Artifacts: a timeline model paired with its renderable source text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::timeline::TimelineModel;

/// What a job is asked to animate. Content generation itself is external;
/// this is only the submission surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSpec {
    pub topic: String,

    #[serde(default = "default_audience")]
    pub audience: String,

    #[serde(default = "default_duration")]
    pub duration_seconds: f64,

    /// Optional source text the generator should draw from
    #[serde(default)]
    pub source_content: Option<String>,
}

fn default_audience() -> String {
    "general".to_string()
}

fn default_duration() -> f64 {
    60.0
}

/// One immutable generated version: the timeline plus renderable source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Version number; each repair cycle produces the next version
    pub version: u32,

    pub timeline: TimelineModel,

    /// Renderable program text handed to the external compiler
    pub source: String,

    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(version: u32, timeline: TimelineModel, source: String) -> Self {
        Self {
            version,
            timeline,
            source,
            created_at: Utc::now(),
        }
    }

    /// Successor artifact with a patched timeline and/or source.
    pub fn patched(&self, timeline: TimelineModel, source: String) -> Self {
        Self::new(self.version + 1, timeline, source)
    }

    /// Short content fingerprint (first 8 bytes of SHA-256, hex).
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update(self.version.to_le_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }

    /// Reference string used in attempt records and artifact filenames.
    pub fn reference(&self) -> String {
        format!("v{}-{}", self.version, self.content_hash())
    }
}
