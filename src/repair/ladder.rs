//! The escalation ladder: repair strategies in strictly increasing
//! invasiveness, selected per failure signature.
//!
//! Rungs, in order: table-driven parameter correction, API-modernization
//! substitution, object simplification, scoped regeneration, and a
//! known-good fallback template. The rung for a given signature never
//! decreases within one job, and a recurring signature jumps straight to
//! the next rung so a non-fixable rung is never repeated.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::diagnostics::{ErrorKind, Finding};

/// Deprecated call -> current equivalent. Applied as a plain text sweep
/// over the artifact source.
pub const API_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("ShowCreation", "Create"),
    ("DrawBorderThenFill", "Create"),
    ("ShowIncreasingSubsets", "Create"),
    ("TextMobject", "Text"),
    ("TexMobject", "MathTex"),
    (".get_graph(", ".plot("),
];

/// Known fix database keyed by parameter name: `Some` renames the
/// parameter, `None` removes it outright.
pub const PARAMETER_FIXES: &[(&str, Option<&str>)] = &[
    ("size", Some("font_size")),
    ("scale_factor", Some("scale")),
    ("alignment", Some("align")),
    ("stroke_width_factor", None),
    ("lag_ratio_factor", None),
];

/// A concrete repair to apply before the next verification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum RepairAction {
    /// Rename or remove a known-bad parameter
    ParameterFix {
        parameter: String,
        replacement: Option<String>,
    },

    /// Replace deprecated calls using the static mapping
    ApiSubstitution,

    /// Remove the offending optional element, preserving the rest
    SimplifyObject { element_id: Option<String> },

    /// Ask the external generator to redo only the failing element plus
    /// minimal surrounding context
    ScopedRegeneration {
        element_id: Option<String>,
        error_context: String,
    },

    /// Swap in the known-good minimal template; terminal rung
    FallbackTemplate,
}

impl RepairAction {
    /// Whether applying this action requires an external generator call.
    pub fn needs_generator(&self) -> bool {
        matches!(self, RepairAction::ScopedRegeneration { .. })
    }
}

/// Per-job escalation state. Rung indices run 0..=4.
#[derive(Debug, Default)]
pub struct EscalationLadder {
    rung_by_signature: HashMap<String, u32>,
    attempts_per_rung: [u32; Self::RUNGS],
}

impl EscalationLadder {
    pub const RUNGS: usize = 5;
    pub const FALLBACK_RUNG: u32 = 4;

    pub fn new() -> Self {
        Self::default()
    }

    /// Rung to use for this occurrence of `signature`. First sighting
    /// starts at `floor`; a recurrence advances one rung. Rungs whose
    /// per-rung attempt budget is spent are skipped upward.
    pub fn escalate(&mut self, signature: &str, floor: u32, max_per_rung: u32) -> u32 {
        let mut rung = match self.rung_by_signature.get(signature) {
            Some(&prev) => (prev + 1).min(Self::FALLBACK_RUNG),
            None => floor.min(Self::FALLBACK_RUNG),
        };

        while rung < Self::FALLBACK_RUNG && self.attempts_per_rung[rung as usize] >= max_per_rung {
            rung += 1;
        }

        self.rung_by_signature.insert(signature.to_string(), rung);
        self.attempts_per_rung[rung as usize] += 1;
        rung
    }

    /// True once even the fallback rung has used up its attempts.
    pub fn fallback_exhausted(&self, max_per_rung: u32) -> bool {
        self.attempts_per_rung[Self::FALLBACK_RUNG as usize] >= max_per_rung
    }

    /// Starting rung for a finding: layout conflicts and quality issues
    /// have no parameter/API rung to try, so they enter at simplification.
    pub fn floor_for(finding: &Finding) -> u32 {
        match finding {
            Finding::Error(_) => 0,
            Finding::Conflicts(_) | Finding::Quality(_) => 2,
        }
    }
}

/// Choose the repair action for a rung and finding. Pure; the ladder
/// state decides the rung, this maps it to an action.
pub fn select(level: u32, finding: &Finding) -> RepairAction {
    match level {
        0 => match finding {
            Finding::Error(record) if record.kind == ErrorKind::DeprecatedApiError => {
                RepairAction::ApiSubstitution
            }
            Finding::Error(record) => {
                let parameter = extract_parameter_name(&record.raw_text)
                    .unwrap_or_else(|| "unknown".to_string());
                let replacement = PARAMETER_FIXES
                    .iter()
                    .find(|(name, _)| *name == parameter)
                    .and_then(|(_, fix)| fix.map(str::to_string));
                RepairAction::ParameterFix {
                    parameter,
                    replacement,
                }
            }
            _ => RepairAction::SimplifyObject {
                element_id: finding.offending_element(),
            },
        },
        1 => RepairAction::ApiSubstitution,
        2 => RepairAction::SimplifyObject {
            element_id: finding.offending_element(),
        },
        3 => RepairAction::ScopedRegeneration {
            element_id: finding.offending_element(),
            error_context: error_context(finding),
        },
        _ => RepairAction::FallbackTemplate,
    }
}

/// Pull the offending parameter name out of a TypeError message.
fn extract_parameter_name(raw_text: &str) -> Option<String> {
    let pattern = Regex::new(r"unexpected keyword argument '(\w+)'").ok()?;
    pattern
        .captures(raw_text)
        .map(|caps| caps[1].to_string())
}

/// Context forwarded with a scoped regeneration request. Findings are
/// never truncated below the minimum the repair stage needs.
fn error_context(finding: &Finding) -> String {
    match finding {
        Finding::Error(record) => record.raw_text.clone(),
        Finding::Conflicts(report) => {
            serde_json::to_string(report).unwrap_or_else(|_| report.signature())
        }
        Finding::Quality(issues) => {
            serde_json::to_string(issues).unwrap_or_default()
        }
    }
}
