//! Timeline model: a scene as an ordered sequence of time-bounded shots.
//!
//! Every repair cycle produces a new immutable model version; models are
//! never mutated in place. Element identity across shots is explicit via
//! `element_id` rather than shared object graphs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance used when comparing shot boundaries and interval endpoints.
pub const TIME_EPSILON: f64 = 1e-6;

/// A versioned timeline: ordered shots covering `[0, total_duration)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineModel {
    /// Monotonically increasing artifact version this model belongs to
    pub version: u32,

    /// Total scene duration in seconds
    pub total_duration: f64,

    /// Ordered, non-overlapping shots
    pub shots: Vec<Shot>,
}

impl TimelineModel {
    /// Create a model for the first artifact version.
    pub fn new(total_duration: f64, shots: Vec<Shot>) -> Self {
        Self {
            version: 1,
            total_duration,
            shots,
        }
    }

    /// Return a copy with the next version number.
    pub fn next_version(&self) -> Self {
        let mut model = self.clone();
        model.version += 1;
        model
    }

    /// All element placements across all shots, in shot order.
    pub fn placements(&self) -> impl Iterator<Item = &ElementPlacement> {
        self.shots.iter().flat_map(|s| s.elements.iter())
    }

    /// Look up a placement by element id.
    pub fn find_element(&self, element_id: &str) -> Option<&ElementPlacement> {
        self.placements().find(|p| p.element_id == element_id)
    }

    /// Check structural invariants: shot ordering, coverage, and clean-shot
    /// element references.
    pub fn validate(&self, max_gap: f64) -> Result<(), TimelineError> {
        let mut prior_ids: Vec<&str> = Vec::new();
        let mut cursor = 0.0_f64;

        for shot in &self.shots {
            if shot.end_time - shot.start_time <= TIME_EPSILON {
                return Err(TimelineError::EmptyShot {
                    shot: shot.id.clone(),
                });
            }
            if shot.start_time + TIME_EPSILON < cursor {
                return Err(TimelineError::OverlappingShots {
                    shot: shot.id.clone(),
                });
            }
            if shot.start_time - cursor > max_gap + TIME_EPSILON {
                return Err(TimelineError::CoverageGap {
                    at: cursor,
                    gap: shot.start_time - cursor,
                });
            }

            if shot.scene_state == SceneState::Clean {
                for element in &shot.elements {
                    if prior_ids.contains(&element.element_id.as_str()) {
                        return Err(TimelineError::CleanShotReference {
                            shot: shot.id.clone(),
                            element: element.element_id.clone(),
                        });
                    }
                }
                prior_ids.clear();
            }
            prior_ids.extend(shot.elements.iter().map(|e| e.element_id.as_str()));

            cursor = shot.end_time;
        }

        if self.total_duration - cursor > max_gap + TIME_EPSILON {
            return Err(TimelineError::CoverageGap {
                at: cursor,
                gap: self.total_duration - cursor,
            });
        }

        Ok(())
    }
}

/// A time-bounded unit of a scene with a defined set of visible elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shot {
    pub id: String,
    pub start_time: f64,
    pub end_time: f64,

    /// Whether the shot starts from an empty frame or continues the prior one
    #[serde(default)]
    pub scene_state: SceneState,

    pub elements: Vec<ElementPlacement>,
}

/// Frame handoff between consecutive shots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneState {
    /// Frame is cleared; no element from a prior shot may be referenced
    #[default]
    Clean,

    /// Elements from the prior shot carry over
    Continue,
}

/// A positioned element with bounding geometry and a visibility window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementPlacement {
    pub element_id: String,

    /// Coarse screen zone used for cheap capacity checks
    pub region: Region,

    pub bounding_box: BoundingBox,

    /// Half-open interval `[t0, t1)` during which the element is on screen
    pub visible_interval: Interval,

    /// Higher values survive longer when conflicts force an element drop
    #[serde(default)]
    pub priority: u32,
}

/// Named coarse screen zones, a 3x3 partition of the safe area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Center,
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Region {
    pub const ALL: [Region; 9] = [
        Region::Center,
        Region::Top,
        Region::Bottom,
        Region::Left,
        Region::Right,
        Region::TopLeft,
        Region::TopRight,
        Region::BottomLeft,
        Region::BottomRight,
    ];

    /// Grid coordinates (column, row) with (0, 0) at top-left.
    fn grid(self) -> (i8, i8) {
        match self {
            Region::TopLeft => (0, 0),
            Region::Top => (1, 0),
            Region::TopRight => (2, 0),
            Region::Left => (0, 1),
            Region::Center => (1, 1),
            Region::Right => (2, 1),
            Region::BottomLeft => (0, 2),
            Region::Bottom => (1, 2),
            Region::BottomRight => (2, 2),
        }
    }

    /// Two regions are adjacent when they share an edge or a corner in the
    /// 3x3 grid. Same region counts as adjacent for collision purposes.
    pub fn is_adjacent(self, other: Region) -> bool {
        let (c1, r1) = self.grid();
        let (c2, r2) = other.grid();
        (c1 - c2).abs() <= 1 && (r1 - r2).abs() <= 1
    }

    /// Alternative regions in displacement priority order: vertical
    /// neighbors first, then horizontal, then remaining zones.
    pub fn alternatives(self) -> Vec<Region> {
        let preferred: &[Region] = match self {
            Region::Center => &[Region::Top, Region::Bottom, Region::Left, Region::Right],
            Region::Top => &[Region::TopLeft, Region::TopRight, Region::Center],
            Region::Bottom => &[Region::BottomLeft, Region::BottomRight, Region::Center],
            Region::Left => &[Region::TopLeft, Region::BottomLeft, Region::Center],
            Region::Right => &[Region::TopRight, Region::BottomRight, Region::Center],
            Region::TopLeft => &[Region::Top, Region::Left, Region::BottomLeft],
            Region::TopRight => &[Region::Top, Region::Right, Region::BottomRight],
            Region::BottomLeft => &[Region::Bottom, Region::Left, Region::TopLeft],
            Region::BottomRight => &[Region::Bottom, Region::Right, Region::TopRight],
        };

        let mut out: Vec<Region> = preferred.to_vec();
        for region in Region::ALL {
            if region != self && !out.contains(&region) {
                out.push(region);
            }
        }
        out
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Center => "center",
            Region::Top => "top",
            Region::Bottom => "bottom",
            Region::Left => "left",
            Region::Right => "right",
            Region::TopLeft => "top_left",
            Region::TopRight => "top_right",
            Region::BottomLeft => "bottom_left",
            Region::BottomRight => "bottom_right",
        }
    }
}

/// Axis-aligned bounding box; `x`, `y` is the bottom-left corner in frame
/// units (frame origin at the center of the screen).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn x_max(&self) -> f64 {
        self.x + self.width
    }

    pub fn y_max(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Grow the box by `buffer` on every side.
    pub fn expand(&self, buffer: f64) -> Self {
        Self {
            x: self.x - buffer,
            y: self.y - buffer,
            width: self.width + 2.0 * buffer,
            height: self.height + 2.0 * buffer,
        }
    }

    /// Positive-area intersection test (touching edges do not count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.x < other.x_max()
            && other.x < self.x_max()
            && self.y < other.y_max()
            && other.y < self.y_max()
    }

    /// True when `self` lies entirely inside `outer`.
    pub fn contained_in(&self, outer: &BoundingBox) -> bool {
        self.x >= outer.x - TIME_EPSILON
            && self.y >= outer.y - TIME_EPSILON
            && self.x_max() <= outer.x_max() + TIME_EPSILON
            && self.y_max() <= outer.y_max() + TIME_EPSILON
    }

    /// Scale about the center, preserving aspect ratio.
    pub fn scaled(&self, factor: f64) -> Self {
        let (cx, cy) = self.center();
        let width = self.width * factor;
        let height = self.height * factor;
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    /// Move the box so its center lands on the center of `target`.
    pub fn centered_in(&self, target: &BoundingBox) -> Self {
        let (cx, cy) = target.center();
        Self {
            x: cx - self.width / 2.0,
            y: cy - self.height / 2.0,
            width: self.width,
            height: self.height,
        }
    }
}

/// Half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end - self.start <= TIME_EPSILON
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start - TIME_EPSILON && t < self.end - TIME_EPSILON
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end - TIME_EPSILON && other.start < self.end - TIME_EPSILON
    }

    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end - start > TIME_EPSILON {
            Some(Interval { start, end })
        } else {
            None
        }
    }
}

/// Structural timeline violations found by [`TimelineModel::validate`].
#[derive(Debug, Clone, Error)]
pub enum TimelineError {
    #[error("shot '{shot}' has non-positive duration")]
    EmptyShot { shot: String },

    #[error("shot '{shot}' overlaps the preceding shot in time")]
    OverlappingShots { shot: String },

    #[error("timeline coverage gap of {gap:.3}s at t={at:.3}s")]
    CoverageGap { at: f64, gap: f64 },

    #[error("clean shot '{shot}' references element '{element}' from a prior shot")]
    CleanShotReference { shot: String, element: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(id: &str, region: Region, t0: f64, t1: f64) -> ElementPlacement {
        ElementPlacement {
            element_id: id.to_string(),
            region,
            bounding_box: BoundingBox::new(-1.0, -0.5, 2.0, 1.0),
            visible_interval: Interval::new(t0, t1),
            priority: 0,
        }
    }

    #[test]
    fn test_valid_timeline_passes() {
        let model = TimelineModel::new(
            10.0,
            vec![
                Shot {
                    id: "s1".into(),
                    start_time: 0.0,
                    end_time: 5.0,
                    scene_state: SceneState::Clean,
                    elements: vec![placement("title", Region::Top, 0.0, 5.0)],
                },
                Shot {
                    id: "s2".into(),
                    start_time: 5.0,
                    end_time: 10.0,
                    scene_state: SceneState::Clean,
                    elements: vec![placement("body", Region::Center, 5.0, 10.0)],
                },
            ],
        );

        assert!(model.validate(0.1).is_ok());
    }

    #[test]
    fn test_coverage_gap_detected() {
        let model = TimelineModel::new(
            10.0,
            vec![Shot {
                id: "s1".into(),
                start_time: 0.0,
                end_time: 4.0,
                scene_state: SceneState::Clean,
                elements: vec![],
            }],
        );

        let err = model.validate(0.1).unwrap_err();
        assert!(matches!(err, TimelineError::CoverageGap { .. }));
    }

    #[test]
    fn test_clean_shot_cannot_reference_prior_element() {
        let model = TimelineModel::new(
            10.0,
            vec![
                Shot {
                    id: "s1".into(),
                    start_time: 0.0,
                    end_time: 5.0,
                    scene_state: SceneState::Clean,
                    elements: vec![placement("title", Region::Top, 0.0, 5.0)],
                },
                Shot {
                    id: "s2".into(),
                    start_time: 5.0,
                    end_time: 10.0,
                    scene_state: SceneState::Clean,
                    elements: vec![placement("title", Region::Top, 5.0, 10.0)],
                },
            ],
        );

        let err = model.validate(0.1).unwrap_err();
        assert!(matches!(err, TimelineError::CleanShotReference { .. }));
    }

    #[test]
    fn test_region_adjacency() {
        assert!(Region::Center.is_adjacent(Region::Top));
        assert!(Region::Center.is_adjacent(Region::TopLeft));
        assert!(Region::TopLeft.is_adjacent(Region::Top));
        assert!(!Region::TopLeft.is_adjacent(Region::BottomRight));
        assert!(!Region::Left.is_adjacent(Region::Right));
    }

    #[test]
    fn test_bounding_box_buffered_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let b = BoundingBox::new(1.1, 0.0, 1.0, 1.0);

        assert!(!a.intersects(&b));
        assert!(a.expand(0.2).intersects(&b));
    }

    #[test]
    fn test_interval_intersection() {
        let a = Interval::new(0.0, 5.0);
        let b = Interval::new(2.0, 7.0);

        let i = a.intersection(&b).unwrap();
        assert_eq!(i.start, 2.0);
        assert_eq!(i.end, 5.0);
        assert!(a.intersection(&Interval::new(5.0, 7.0)).is_none());
    }
}
