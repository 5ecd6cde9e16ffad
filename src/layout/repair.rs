//! Deterministic repair proposals for layout conflicts.
//!
//! Strategies are tried in fixed priority order: shrink-to-fit, displace
//! to an adjacent free region, stagger in time, and as a last resort drop
//! the lowest-priority element. Capacity conflicts skip the shrink step
//! since region occupancy is independent of geometry.

use tracing::debug;

use crate::domain::diagnostics::{Conflict, ConflictKind, ConflictReport};
use crate::domain::timeline::{
    BoundingBox, ElementPlacement, Interval, TimelineModel, TIME_EPSILON,
};

use super::{verify, LayoutConfig};

/// Result of a repair pass.
#[derive(Debug, Clone)]
pub enum RepairOutcome {
    /// All conflicts resolved; `model` is the next artifact version
    Patched {
        model: TimelineModel,
        applied: Vec<String>,
    },

    /// The strategy ladder could not clear the report within the iteration
    /// budget; the orchestrator escalates from here
    Unresolved {
        remaining: ConflictReport,
        applied: Vec<String>,
    },
}

/// Produce a patched model clearing `report`, or defer to escalation.
pub fn propose_fix(
    model: &TimelineModel,
    report: &ConflictReport,
    config: &LayoutConfig,
) -> RepairOutcome {
    if report.is_empty() {
        return RepairOutcome::Patched {
            model: model.next_version(),
            applied: Vec::new(),
        };
    }

    let mut current = model.clone();
    let mut applied = Vec::new();

    for _ in 0..config.max_fix_iterations {
        let current_report = verify(&current, config);
        if current_report.is_empty() {
            let mut patched = current;
            patched.version = model.version + 1;
            return RepairOutcome::Patched {
                model: patched,
                applied,
            };
        }

        let conflict = &current_report.conflicts[0];
        match try_strategies(&current, &current_report, conflict, config) {
            Some((next, description)) => {
                debug!(strategy = %description, "applied layout repair");
                applied.push(description);
                current = next;
            }
            None => {
                return RepairOutcome::Unresolved {
                    remaining: current_report,
                    applied,
                };
            }
        }
    }

    RepairOutcome::Unresolved {
        remaining: verify(&current, config),
        applied,
    }
}

/// Try each strategy in order; accept the first candidate that reduces the
/// total conflict count.
fn try_strategies(
    model: &TimelineModel,
    report: &ConflictReport,
    conflict: &Conflict,
    config: &LayoutConfig,
) -> Option<(TimelineModel, String)> {
    let victim_id = pick_victim(model, conflict)?;

    let candidates: Vec<(Option<TimelineModel>, String)> = match conflict.kind {
        ConflictKind::Margin => vec![(
            clamp_into_safe_area(model, &victim_id, config),
            format!("clamp '{}' into safe area", victim_id),
        )],
        ConflictKind::Overlap => vec![
            (
                shrink(model, &victim_id, config),
                format!("shrink '{}'", victim_id),
            ),
            (
                displace(model, &victim_id, conflict, config),
                format!("displace '{}'", victim_id),
            ),
            (
                stagger(model, &victim_id, conflict),
                format!("stagger '{}'", victim_id),
            ),
            (drop_element(model, &victim_id), format!("drop '{}'", victim_id)),
        ],
        ConflictKind::Capacity => vec![
            (
                displace(model, &victim_id, conflict, config),
                format!("displace '{}'", victim_id),
            ),
            (
                stagger(model, &victim_id, conflict),
                format!("stagger '{}'", victim_id),
            ),
            (drop_element(model, &victim_id), format!("drop '{}'", victim_id)),
        ],
    };

    for (candidate, description) in candidates {
        if let Some(candidate) = candidate {
            if verify(&candidate, config).len() < report.len() {
                return Some((candidate, description));
            }
        }
    }
    None
}

/// The element that yields: lowest priority, then latest appearance, then
/// greatest id. Deterministic by construction.
fn pick_victim(model: &TimelineModel, conflict: &Conflict) -> Option<String> {
    conflict
        .involved
        .iter()
        .filter_map(|id| model.find_element(id))
        .min_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(
                    b.visible_interval
                        .start
                        .partial_cmp(&a.visible_interval.start)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(b.element_id.cmp(&a.element_id))
        })
        .map(|p| p.element_id.clone())
}

/// Apply `f` to the named element, producing a new model version.
fn rewrite_element(
    model: &TimelineModel,
    element_id: &str,
    f: impl Fn(&mut ElementPlacement),
) -> Option<TimelineModel> {
    let mut next = model.next_version();
    let mut touched = false;
    for shot in &mut next.shots {
        for element in &mut shot.elements {
            if element.element_id == element_id {
                f(element);
                touched = true;
            }
        }
    }
    touched.then_some(next)
}

/// Scale the bounding box down about its center, preserving aspect ratio.
fn shrink(model: &TimelineModel, element_id: &str, config: &LayoutConfig) -> Option<TimelineModel> {
    let placement = model.find_element(element_id)?;
    let scaled = placement.bounding_box.scaled(0.8);
    if scaled.width < config.min_element_side || scaled.height < config.min_element_side {
        return None;
    }
    rewrite_element(model, element_id, |e| {
        e.bounding_box = e.bounding_box.scaled(0.8);
    })
}

/// Move the element to the first alternative region with free capacity
/// during its visible interval.
fn displace(
    model: &TimelineModel,
    element_id: &str,
    _conflict: &Conflict,
    config: &LayoutConfig,
) -> Option<TimelineModel> {
    let placement = model.find_element(element_id)?;
    let interval = placement.visible_interval;

    for alt in placement.region.alternatives() {
        let occupants = model
            .placements()
            .filter(|p| {
                p.element_id != element_id
                    && p.region == alt
                    && p.visible_interval.overlaps(&interval)
            })
            .count();
        if occupants >= config.region_capacity {
            continue;
        }

        let target = config.region_bounds(alt);
        let mut bbox = placement.bounding_box;
        // Shrink to fit the destination cell when necessary.
        let fit = (target.width / bbox.width)
            .min(target.height / bbox.height)
            .min(1.0);
        if fit < 1.0 {
            bbox = bbox.scaled(fit * 0.95);
        }
        if bbox.width < config.min_element_side || bbox.height < config.min_element_side {
            continue;
        }
        let moved: BoundingBox = bbox.centered_in(&target);

        return rewrite_element(model, element_id, |e| {
            e.region = alt;
            e.bounding_box = moved;
        });
    }
    None
}

/// Shift the element's visible interval to start when the other party
/// leaves, keeping the duration, clamped to the containing shot.
fn stagger(model: &TimelineModel, element_id: &str, conflict: &Conflict) -> Option<TimelineModel> {
    let placement = model.find_element(element_id)?;
    let other_end = conflict
        .involved
        .iter()
        .filter(|id| id.as_str() != element_id)
        .filter_map(|id| model.find_element(id))
        .map(|p| p.visible_interval.end)
        .fold(f64::NEG_INFINITY, f64::max);
    if !other_end.is_finite() {
        return None;
    }

    let duration = placement.visible_interval.end - placement.visible_interval.start;
    let shot_end = model
        .shots
        .iter()
        .find(|s| s.elements.iter().any(|e| e.element_id == element_id))
        .map(|s| s.end_time)?;

    if other_end + duration > shot_end + TIME_EPSILON {
        return None;
    }

    let shifted = Interval::new(other_end, other_end + duration);
    rewrite_element(model, element_id, |e| {
        e.visible_interval = shifted;
    })
}

/// Remove the element entirely. Last resort.
fn drop_element(model: &TimelineModel, element_id: &str) -> Option<TimelineModel> {
    let mut next = model.next_version();
    let before: usize = next.shots.iter().map(|s| s.elements.len()).sum();
    for shot in &mut next.shots {
        shot.elements.retain(|e| e.element_id != element_id);
    }
    let after: usize = next.shots.iter().map(|s| s.elements.len()).sum();
    (after < before).then_some(next)
}

/// Pull a margin-violating box back inside the safe area, shrinking first
/// when it is larger than the safe area itself.
fn clamp_into_safe_area(
    model: &TimelineModel,
    element_id: &str,
    config: &LayoutConfig,
) -> Option<TimelineModel> {
    let safe = config.safe_area();
    rewrite_element(model, element_id, |e| {
        let mut bbox = e.bounding_box;
        let fit = (safe.width / bbox.width)
            .min(safe.height / bbox.height)
            .min(1.0);
        if fit < 1.0 {
            bbox = bbox.scaled(fit * 0.95);
        }
        bbox.x = bbox.x.clamp(safe.x, safe.x_max() - bbox.width);
        bbox.y = bbox.y.clamp(safe.y, safe.y_max() - bbox.height);
        e.bounding_box = bbox;
    })
}
