//! Raw detector output.

use crate::geometry::{Coord, Polygon};
use serde::{Deserialize, Serialize};

/// Box geometry in tile-local (or absolute) pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoxGeometry {
    /// Axis-aligned box from top-left `(x1, y1)` to bottom-right `(x2, y2)`.
    Axis {
        /// Left edge.
        x1: f64,
        /// Top edge.
        y1: f64,
        /// Right edge.
        x2: f64,
        /// Bottom edge.
        y2: f64,
    },
    /// Rotated box given by its four corners in ring order.
    Oriented {
        /// Corner points.
        corners: [Coord; 4],
    },
}

impl BoxGeometry {
    /// Oriented box from centre, size and rotation (radians, clockwise in
    /// image coordinates since y points down).
    #[must_use]
    pub fn rotated(cx: f64, cy: f64, w: f64, h: f64, angle: f64) -> Self {
        let (sin_a, cos_a) = angle.sin_cos();
        let (dx, dy) = (w / 2.0, h / 2.0);
        let corner = |sx: f64, sy: f64| {
            Coord::new(
                cx + sx * dx * cos_a - sy * dy * sin_a,
                cy + sx * dx * sin_a + sy * dy * cos_a,
            )
        };
        Self::Oriented {
            corners: [
                corner(-1.0, -1.0),
                corner(1.0, -1.0),
                corner(1.0, 1.0),
                corner(-1.0, 1.0),
            ],
        }
    }

    /// The four corners in ring order; axis-aligned boxes become
    /// degenerate oriented boxes.
    #[must_use]
    pub fn corners(&self) -> [Coord; 4] {
        match *self {
            Self::Axis { x1, y1, x2, y2 } => [
                Coord::new(x1, y1),
                Coord::new(x2, y1),
                Coord::new(x2, y2),
                Coord::new(x1, y2),
            ],
            Self::Oriented { corners } => corners,
        }
    }

    /// Same shape shifted by `(dx, dy)`.
    #[must_use]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        match *self {
            Self::Axis { x1, y1, x2, y2 } => Self::Axis {
                x1: x1 + dx,
                y1: y1 + dy,
                x2: x2 + dx,
                y2: y2 + dy,
            },
            Self::Oriented { corners } => Self::Oriented {
                corners: corners.map(|c| Coord::new(c.x + dx, c.y + dy)),
            },
        }
    }

    /// Axis-aligned hull as `(min_x, min_y, max_x, max_y)`.
    #[must_use]
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.corners().iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(a, b, c, d), p| (a.min(p.x), b.min(p.y), c.max(p.x), d.max(p.y)),
        )
    }

    /// Closed polygon of the corners.
    #[must_use]
    pub fn to_polygon(&self) -> Option<Polygon> {
        Polygon::new(self.corners().to_vec()).ok()
    }
}

/// A detection as produced by a model for one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Class name from the model's label set.
    pub class_label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// Tile-local geometry.
    pub geometry: BoxGeometry,
}

/// Keep detections whose confidence is at least `threshold` (inclusive).
#[must_use]
pub fn filter_by_confidence(detections: Vec<RawDetection>, threshold: f32) -> Vec<RawDetection> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= threshold)
        .collect()
}
