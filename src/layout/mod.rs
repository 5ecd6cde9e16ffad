//! Layout safety: frame geometry, the conflict verifier, and deterministic
//! repair proposals.
//!
//! The verifier is a pure function over a timeline snapshot; the repair
//! proposer produces a new model version and never mutates its input.

pub mod repair;
pub mod verify;

use serde::{Deserialize, Serialize};

use crate::domain::timeline::{BoundingBox, Region};

pub use repair::{propose_fix, RepairOutcome};
pub use verify::verify;

/// Geometry and safety constants. The concrete fractions are product
/// choices, so everything here is configuration rather than law.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Frame width in scene units
    #[serde(default = "default_frame_width")]
    pub frame_width: f64,

    /// Frame height in scene units
    #[serde(default = "default_frame_height")]
    pub frame_height: f64,

    /// Margin on every side, as a fraction of the frame dimension
    #[serde(default = "default_safe_margin")]
    pub safe_margin_fraction: f64,

    /// Minimum gap between elements, as a fraction of frame height
    #[serde(default = "default_min_gap")]
    pub min_gap_fraction: f64,

    /// Simultaneously active elements a region may hold
    #[serde(default = "default_region_capacity")]
    pub region_capacity: usize,

    /// Internal iterations `propose_fix` may spend before reporting
    /// unresolved
    #[serde(default = "default_max_fix_iterations")]
    pub max_fix_iterations: u32,

    /// Smallest bounding-box side a shrink repair may produce
    #[serde(default = "default_min_element_side")]
    pub min_element_side: f64,

    /// Largest tolerated coverage gap between shots, in seconds
    #[serde(default = "default_max_coverage_gap")]
    pub max_coverage_gap: f64,
}

fn default_frame_width() -> f64 {
    14.0
}
fn default_frame_height() -> f64 {
    8.0
}
fn default_safe_margin() -> f64 {
    0.06
}
fn default_min_gap() -> f64 {
    0.025
}
fn default_region_capacity() -> usize {
    1
}
fn default_max_fix_iterations() -> u32 {
    8
}
fn default_min_element_side() -> f64 {
    0.3
}
fn default_max_coverage_gap() -> f64 {
    0.5
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            safe_margin_fraction: default_safe_margin(),
            min_gap_fraction: default_min_gap(),
            region_capacity: default_region_capacity(),
            max_fix_iterations: default_max_fix_iterations(),
            min_element_side: default_min_element_side(),
            max_coverage_gap: default_max_coverage_gap(),
        }
    }
}

impl LayoutConfig {
    /// Minimum gap between buffered bounding boxes, in scene units.
    pub fn min_gap(&self) -> f64 {
        self.min_gap_fraction * self.frame_height
    }

    /// The frame inset by the safe margins; all visible elements must stay
    /// inside it.
    pub fn safe_area(&self) -> BoundingBox {
        let margin_x = self.frame_width * self.safe_margin_fraction;
        let margin_y = self.frame_height * self.safe_margin_fraction;
        BoundingBox::new(
            -self.frame_width / 2.0 + margin_x,
            -self.frame_height / 2.0 + margin_y,
            self.frame_width - 2.0 * margin_x,
            self.frame_height - 2.0 * margin_y,
        )
    }

    /// Bounds of one region: the safe area partitioned into a 3x3 grid.
    pub fn region_bounds(&self, region: Region) -> BoundingBox {
        let safe = self.safe_area();
        let cell_w = safe.width / 3.0;
        let cell_h = safe.height / 3.0;

        let (col, row): (f64, f64) = match region {
            Region::TopLeft => (0.0, 2.0),
            Region::Top => (1.0, 2.0),
            Region::TopRight => (2.0, 2.0),
            Region::Left => (0.0, 1.0),
            Region::Center => (1.0, 1.0),
            Region::Right => (2.0, 1.0),
            Region::BottomLeft => (0.0, 0.0),
            Region::Bottom => (1.0, 0.0),
            Region::BottomRight => (2.0, 0.0),
        };

        BoundingBox::new(safe.x + col * cell_w, safe.y + row * cell_h, cell_w, cell_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_area_insets_frame() {
        let config = LayoutConfig::default();
        let safe = config.safe_area();

        assert!((safe.x - (-7.0 + 0.84)).abs() < 1e-9);
        assert!((safe.width - (14.0 - 1.68)).abs() < 1e-9);
        assert!(safe.contained_in(&BoundingBox::new(-7.0, -4.0, 14.0, 8.0)));
    }

    #[test]
    fn test_region_grid_tiles_safe_area() {
        let config = LayoutConfig::default();
        let safe = config.safe_area();

        let mut area = 0.0;
        for region in Region::ALL {
            let bounds = config.region_bounds(region);
            assert!(bounds.contained_in(&safe));
            area += bounds.area();
        }
        assert!((area - safe.area()).abs() < 1e-6);
    }

    #[test]
    fn test_min_gap_default_matches_frame_units() {
        let config = LayoutConfig::default();
        assert!((config.min_gap() - 0.2).abs() < 1e-9);
    }
}
