//! Structured findings that flow through the repair loop: layout conflicts,
//! classified compile errors, and evaluator-reported quality issues.

use serde::{Deserialize, Serialize};

use super::timeline::{Interval, Region};

/// Category of a layout conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Buffered bounding boxes intersect during a shared sub-interval
    Overlap,

    /// Bounding box escapes the safe-area rectangle
    Margin,

    /// A region holds more simultaneously active elements than it may
    Capacity,
}

/// A single conflict over a time interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,

    /// Sorted element ids involved in the conflict
    pub involved: Vec<String>,

    pub interval: Interval,
}

impl Conflict {
    pub fn new(kind: ConflictKind, mut involved: Vec<String>, interval: Interval) -> Self {
        involved.sort();
        involved.dedup();
        Self {
            kind,
            involved,
            interval,
        }
    }

    /// Dedup key: `(kind, involved, interval)` quantized against float noise.
    fn dedup_key(&self) -> (ConflictKind, Vec<String>, i64, i64) {
        (
            self.kind,
            self.involved.clone(),
            (self.interval.start * 1e6).round() as i64,
            (self.interval.end * 1e6).round() as i64,
        )
    }
}

/// The verifier's output: an empty report means the layout is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    /// Sort deterministically and drop duplicates.
    pub fn normalized(mut self) -> Self {
        self.conflicts.sort_by(|a, b| {
            a.dedup_key()
                .partial_cmp(&b.dedup_key())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.conflicts.dedup_by(|a, b| a.dedup_key() == b.dedup_key());
        self
    }

    /// Stable fingerprint used to detect a recurring layout problem.
    pub fn signature(&self) -> String {
        let parts: Vec<String> = self
            .conflicts
            .iter()
            .map(|c| format!("{:?}:{}", c.kind, c.involved.join("+")))
            .collect();
        format!("layout:{}", parts.join("|"))
    }
}

/// Typed taxonomy for raw compiler/runtime failure text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParameterError,
    DeprecatedApiError,
    SyntaxError,
    MissingDependencyError,
    RuntimeRenderError,
    UnclassifiedError,
}

/// A classified failure. The raw text is always preserved in full; the
/// signature is a normalized, path-stripped fingerprint for dedup and
/// recurrence detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub raw_text: String,
    pub kind: ErrorKind,
    pub signature: String,
}

/// A quality issue reported by the external visual evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub category: String,
    pub description: String,

    /// Set when the issue is spatial and maps to a screen region
    pub region: Option<Region>,

    /// Set when the issue is bounded in time
    pub interval: Option<Interval>,

    /// Element the evaluator attributes the issue to, when known
    pub element_id: Option<String>,
}

/// What the repair stage is reacting to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Finding {
    Conflicts(ConflictReport),
    Error(ErrorRecord),
    Quality(Vec<Issue>),
}

impl Finding {
    /// Fingerprint driving the escalation ladder's monotonicity.
    pub fn signature(&self) -> String {
        match self {
            Finding::Conflicts(report) => report.signature(),
            Finding::Error(record) => record.signature.clone(),
            Finding::Quality(issues) => {
                let parts: Vec<&str> = issues.iter().map(|i| i.category.as_str()).collect();
                format!("quality:{}", parts.join("|"))
            }
        }
    }

    /// Element the finding points at, if any, used to scope repairs.
    pub fn offending_element(&self) -> Option<String> {
        match self {
            Finding::Conflicts(report) => report
                .conflicts
                .first()
                .and_then(|c| c.involved.first().cloned()),
            Finding::Error(_) => None,
            Finding::Quality(issues) => issues.iter().find_map(|i| i.element_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_normalization_dedups() {
        let c = Conflict::new(
            ConflictKind::Overlap,
            vec!["b".into(), "a".into()],
            Interval::new(2.0, 5.0),
        );
        let report = ConflictReport {
            conflicts: vec![c.clone(), c],
        }
        .normalized();

        assert_eq!(report.len(), 1);
        assert_eq!(report.conflicts[0].involved, vec!["a", "b"]);
    }

    #[test]
    fn test_finding_signature_stable() {
        let report = ConflictReport {
            conflicts: vec![Conflict::new(
                ConflictKind::Capacity,
                vec!["x".into(), "y".into()],
                Interval::new(0.0, 1.0),
            )],
        };

        let a = Finding::Conflicts(report.clone()).signature();
        let b = Finding::Conflicts(report).signature();
        assert_eq!(a, b);
        assert!(a.starts_with("layout:"));
    }
}
