//! The layout safety verifier.
//!
//! Pure function over a timeline snapshot: boundary-samples the union of
//! all visible-interval endpoints, applies the cheap per-region capacity
//! check first, then precise buffered box intersection, then safe-area
//! containment over each element's full visible interval.

use std::collections::BTreeMap;

use crate::domain::diagnostics::{Conflict, ConflictKind, ConflictReport};
use crate::domain::timeline::{ElementPlacement, Interval, Region, TimelineModel, TIME_EPSILON};

use super::LayoutConfig;

/// Check a model for margin, overlap, and capacity violations.
pub fn verify(model: &TimelineModel, config: &LayoutConfig) -> ConflictReport {
    let placements: Vec<&ElementPlacement> = model.placements().collect();
    let mut conflicts = Vec::new();

    // Margin containment covers the whole visible interval, so it does not
    // need sub-interval sampling.
    let safe = config.safe_area();
    for placement in &placements {
        if !placement.bounding_box.contained_in(&safe) {
            conflicts.push(Conflict::new(
                ConflictKind::Margin,
                vec![placement.element_id.clone()],
                placement.visible_interval,
            ));
        }
    }

    let min_gap = config.min_gap();
    for window in sample_windows(&placements) {
        let mid = (window.start + window.end) / 2.0;
        let active: Vec<&ElementPlacement> = placements
            .iter()
            .copied()
            .filter(|p| p.visible_interval.contains(mid))
            .collect();

        // Region capacity: coarse proxy check, applied before geometry.
        let mut by_region: BTreeMap<Region, Vec<&ElementPlacement>> = BTreeMap::new();
        for placement in &active {
            by_region.entry(placement.region).or_default().push(placement);
        }
        for (_, occupants) in &by_region {
            if occupants.len() > config.region_capacity {
                conflicts.push(Conflict::new(
                    ConflictKind::Capacity,
                    occupants.iter().map(|p| p.element_id.clone()).collect(),
                    window,
                ));
            }
        }

        // Precise check: buffered AABB intersection for pairs in the same
        // or adjacent regions.
        for (i, a) in active.iter().enumerate() {
            for b in active.iter().skip(i + 1) {
                if a.element_id == b.element_id {
                    continue;
                }
                if !a.region.is_adjacent(b.region) {
                    continue;
                }
                if a.bounding_box.expand(min_gap).intersects(&b.bounding_box) {
                    conflicts.push(Conflict::new(
                        ConflictKind::Overlap,
                        vec![a.element_id.clone(), b.element_id.clone()],
                        window,
                    ));
                }
            }
        }
    }

    let coalesced = coalesce(conflicts);
    ConflictReport {
        conflicts: coalesced,
    }
    .normalized()
}

/// Sub-intervals between consecutive visible-interval endpoints.
fn sample_windows(placements: &[&ElementPlacement]) -> Vec<Interval> {
    let mut boundaries: Vec<f64> = placements
        .iter()
        .flat_map(|p| [p.visible_interval.start, p.visible_interval.end])
        .collect();
    boundaries.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    boundaries.dedup_by(|a, b| (*a - *b).abs() < TIME_EPSILON);

    boundaries
        .windows(2)
        .map(|w| Interval::new(w[0], w[1]))
        .filter(|i| !i.is_empty())
        .collect()
}

/// Merge conflicts with identical kind and participants whose intervals
/// are contiguous, so a fault spanning several sample windows reports one
/// interval.
fn coalesce(mut conflicts: Vec<Conflict>) -> Vec<Conflict> {
    conflicts.sort_by(|a, b| {
        (a.kind, &a.involved)
            .cmp(&(b.kind, &b.involved))
            .then(
                a.interval
                    .start
                    .partial_cmp(&b.interval.start)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    let mut merged: Vec<Conflict> = Vec::new();
    for conflict in conflicts {
        match merged.last_mut() {
            Some(last)
                if last.kind == conflict.kind
                    && last.involved == conflict.involved
                    && (conflict.interval.start - last.interval.end).abs() < TIME_EPSILON =>
            {
                last.interval.end = conflict.interval.end;
            }
            _ => merged.push(conflict),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timeline::{BoundingBox, SceneState, Shot};

    fn model_with(elements: Vec<ElementPlacement>) -> TimelineModel {
        TimelineModel::new(
            10.0,
            vec![Shot {
                id: "s1".into(),
                start_time: 0.0,
                end_time: 10.0,
                scene_state: SceneState::Clean,
                elements,
            }],
        )
    }

    fn placement(
        id: &str,
        region: Region,
        bbox: BoundingBox,
        t0: f64,
        t1: f64,
    ) -> ElementPlacement {
        ElementPlacement {
            element_id: id.to_string(),
            region,
            bounding_box: bbox,
            visible_interval: Interval::new(t0, t1),
            priority: 0,
        }
    }

    #[test]
    fn test_separated_elements_pass() {
        let config = LayoutConfig::default();
        let model = model_with(vec![
            placement(
                "title",
                Region::Top,
                BoundingBox::new(-1.5, 1.8, 3.0, 0.8),
                0.0,
                10.0,
            ),
            placement(
                "body",
                Region::Bottom,
                BoundingBox::new(-1.5, -2.6, 3.0, 0.8),
                0.0,
                10.0,
            ),
        ]);

        assert!(verify(&model, &config).is_empty());
    }

    #[test]
    fn test_margin_violation_detected() {
        let config = LayoutConfig::default();
        let model = model_with(vec![placement(
            "wide",
            Region::Center,
            BoundingBox::new(-7.0, -0.5, 14.0, 1.0),
            0.0,
            10.0,
        )]);

        let report = verify(&model, &config);
        assert_eq!(report.len(), 1);
        assert_eq!(report.conflicts[0].kind, ConflictKind::Margin);
    }

    #[test]
    fn test_capacity_and_overlap_over_shared_subinterval() {
        let config = LayoutConfig::default();
        let model = model_with(vec![
            placement(
                "first",
                Region::Center,
                BoundingBox::new(-1.5, -1.0, 3.0, 2.0),
                0.0,
                5.0,
            ),
            placement(
                "second",
                Region::Center,
                BoundingBox::new(-1.0, -0.8, 3.0, 2.0),
                2.0,
                7.0,
            ),
        ]);

        let report = verify(&model, &config);

        let capacity: Vec<&Conflict> = report
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::Capacity)
            .collect();
        let overlap: Vec<&Conflict> = report
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::Overlap)
            .collect();

        assert_eq!(capacity.len(), 1);
        assert_eq!(overlap.len(), 1);
        for conflict in capacity.iter().chain(overlap.iter()) {
            assert_eq!(conflict.involved, vec!["first", "second"]);
            assert!((conflict.interval.start - 2.0).abs() < 1e-9);
            assert!((conflict.interval.end - 5.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_disjoint_intervals_do_not_conflict() {
        let config = LayoutConfig::default();
        let model = model_with(vec![
            placement(
                "first",
                Region::Center,
                BoundingBox::new(-1.5, -1.0, 3.0, 2.0),
                0.0,
                5.0,
            ),
            placement(
                "second",
                Region::Center,
                BoundingBox::new(-1.5, -1.0, 3.0, 2.0),
                5.0,
                10.0,
            ),
        ]);

        assert!(verify(&model, &config).is_empty());
    }

    #[test]
    fn test_buffer_gap_counts_as_overlap() {
        let config = LayoutConfig::default();
        // Boxes 0.1 units apart: closer than the 0.2 minimum gap.
        let model = model_with(vec![
            placement(
                "a",
                Region::Center,
                BoundingBox::new(-2.0, -0.5, 1.9, 1.0),
                0.0,
                10.0,
            ),
            placement(
                "b",
                Region::Right,
                BoundingBox::new(0.0, -0.5, 1.9, 1.0),
                0.0,
                10.0,
            ),
        ]);

        let report = verify(&model, &config);
        assert!(report
            .conflicts
            .iter()
            .any(|c| c.kind == ConflictKind::Overlap));
    }

    #[test]
    fn test_verify_is_pure() {
        let config = LayoutConfig::default();
        let model = model_with(vec![
            placement(
                "first",
                Region::Center,
                BoundingBox::new(-1.5, -1.0, 3.0, 2.0),
                0.0,
                5.0,
            ),
            placement(
                "second",
                Region::Center,
                BoundingBox::new(-1.0, -0.8, 3.0, 2.0),
                2.0,
                7.0,
            ),
        ]);

        let a = serde_json::to_string(&verify(&model, &config)).unwrap();
        let b = serde_json::to_string(&verify(&model, &config)).unwrap();
        assert_eq!(a, b);
    }
}
