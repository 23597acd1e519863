//! Closed polygons and exact intersection predicates.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A planar coordinate (pixel or CRS units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    /// Horizontal component (column, easting or longitude).
    pub x: f64,
    /// Vertical component (row, northing or latitude).
    pub y: f64,
}

impl Coord {
    /// Create a coordinate.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A simple polygon stored as a closed ring (first vertex repeated last).
///
/// Holes are not modelled; footprints and rule regions are exterior rings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coord>", into = "Vec<Coord>")]
pub struct Polygon {
    ring: Vec<Coord>,
}

impl Polygon {
    /// Build a polygon from its vertices, closing the ring if needed.
    pub fn new(mut vertices: Vec<Coord>) -> Result<Self> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(Error::InvalidGeometry {
                message: format!("polygon needs at least 3 vertices, got {}", vertices.len()),
            });
        }
        if vertices.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(Error::InvalidGeometry {
                message: "polygon has non-finite coordinates".to_string(),
            });
        }
        let first = vertices[0];
        vertices.push(first);
        Ok(Self { ring: vertices })
    }

    /// Axis-aligned rectangle with corners in ring order.
    #[must_use]
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let a = Coord::new(min_x, min_y);
        Self {
            ring: vec![
                a,
                Coord::new(max_x, min_y),
                Coord::new(max_x, max_y),
                Coord::new(min_x, max_y),
                a,
            ],
        }
    }

    /// The closed ring, first vertex repeated at the end.
    #[must_use]
    pub fn ring(&self) -> &[Coord] {
        &self.ring
    }

    /// Distinct vertices (ring without the closing vertex).
    #[must_use]
    pub fn vertices(&self) -> &[Coord] {
        &self.ring[..self.ring.len() - 1]
    }

    /// Apply a fallible mapping to every vertex.
    pub fn try_map<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(Coord) -> Result<Coord>,
    {
        let vertices = self
            .vertices()
            .iter()
            .map(|&c| f(c))
            .collect::<Result<Vec<_>>>()?;
        Self::new(vertices)
    }

    /// Bounding box as `(min_x, min_y, max_x, max_y)`.
    #[must_use]
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.vertices().iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), c| {
                (min_x.min(c.x), min_y.min(c.y), max_x.max(c.x), max_y.max(c.y))
            },
        )
    }

    /// Whether `point` lies inside the polygon or on its boundary.
    #[must_use]
    pub fn contains_point(&self, point: Coord) -> bool {
        let mut inside = false;
        for edge in self.ring.windows(2) {
            let (a, b) = (edge[0], edge[1]);
            if on_segment(a, b, point) {
                return true;
            }
            if (a.y > point.y) != (b.y > point.y) {
                let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Exact intersection test: true when the polygons share any point,
    /// including touching boundaries and full containment.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        let (a_min_x, a_min_y, a_max_x, a_max_y) = self.bounds();
        let (b_min_x, b_min_y, b_max_x, b_max_y) = other.bounds();
        if a_max_x < b_min_x || b_max_x < a_min_x || a_max_y < b_min_y || b_max_y < a_min_y {
            return false;
        }

        for e in self.ring.windows(2) {
            for f in other.ring.windows(2) {
                if segments_intersect(e[0], e[1], f[0], f[1]) {
                    return true;
                }
            }
        }

        self.contains_point(other.ring[0]) || other.contains_point(self.ring[0])
    }
}

impl TryFrom<Vec<Coord>> for Polygon {
    type Error = Error;

    fn try_from(vertices: Vec<Coord>) -> Result<Self> {
        Self::new(vertices)
    }
}

impl From<Polygon> for Vec<Coord> {
    fn from(polygon: Polygon) -> Self {
        polygon.ring
    }
}

/// One or more polygons treated as a single area, as in a GeoJSON
/// `MultiPolygon`. Intersection holds when any part intersects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Polygon>", into = "Vec<Polygon>")]
pub struct Area {
    parts: Vec<Polygon>,
}

impl Area {
    /// Build an area from at least one part.
    pub fn new(parts: Vec<Polygon>) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::InvalidGeometry {
                message: "area needs at least one polygon".to_string(),
            });
        }
        Ok(Self { parts })
    }

    /// The member polygons.
    #[must_use]
    pub fn parts(&self) -> &[Polygon] {
        &self.parts
    }

    /// Whether any part shares a point with `polygon`.
    #[must_use]
    pub fn intersects(&self, polygon: &Polygon) -> bool {
        self.parts.iter().any(|part| part.intersects(polygon))
    }

    /// Apply a fallible mapping to every vertex of every part.
    pub fn try_map<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(Coord) -> Result<Coord>,
    {
        let parts = self
            .parts
            .iter()
            .map(|part| part.try_map(&mut f))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { parts })
    }
}

impl From<Polygon> for Area {
    fn from(polygon: Polygon) -> Self {
        Self {
            parts: vec![polygon],
        }
    }
}

impl TryFrom<Vec<Polygon>> for Area {
    type Error = Error;

    fn try_from(parts: Vec<Polygon>) -> Result<Self> {
        Self::new(parts)
    }
}

impl From<Area> for Vec<Polygon> {
    fn from(area: Area) -> Self {
        area.parts
    }
}

fn orientation(a: Coord, b: Coord, c: Coord) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn within_span(a: Coord, b: Coord, p: Coord) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

fn on_segment(a: Coord, b: Coord, p: Coord) -> bool {
    orientation(a, b, p) == 0.0 && within_span(a, b, p)
}

fn segments_intersect(p1: Coord, p2: Coord, q1: Coord, q2: Coord) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && within_span(q1, q2, p1))
        || (d2 == 0.0 && within_span(q1, q2, p2))
        || (d3 == 0.0 && within_span(p1, p2, q1))
        || (d4 == 0.0 && within_span(p1, p2, q2))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn diamond(cx: f64, cy: f64, r: f64) -> Polygon {
        Polygon::new(vec![
            Coord::new(cx, cy - r),
            Coord::new(cx + r, cy),
            Coord::new(cx, cy + r),
            Coord::new(cx - r, cy),
        ])
        .unwrap()
    }

    #[test]
    fn test_new_closes_ring() {
        let p = Polygon::new(vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(1.0, 1.0),
        ])
        .unwrap();
        assert_eq!(p.ring().len(), 4);
        assert_eq!(p.ring().first(), p.ring().last());
        assert_eq!(p.vertices().len(), 3);
    }

    #[test]
    fn test_new_accepts_already_closed_ring() {
        let p = Polygon::new(vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(1.0, 1.0),
            Coord::new(0.0, 0.0),
        ])
        .unwrap();
        assert_eq!(p.vertices().len(), 3);
    }

    #[test]
    fn test_new_rejects_too_few_vertices() {
        let result = Polygon::new(vec![Coord::new(0.0, 0.0), Coord::new(1.0, 1.0)]);
        assert!(matches!(result, Err(Error::InvalidGeometry { .. })));
    }

    #[test]
    fn test_new_rejects_nan() {
        let result = Polygon::new(vec![
            Coord::new(0.0, 0.0),
            Coord::new(f64::NAN, 0.0),
            Coord::new(1.0, 1.0),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_identical_polygons_intersect() {
        let a = Polygon::rectangle(10.0, 10.0, 20.0, 20.0);
        assert!(a.intersects(&a.clone()));
    }

    #[test]
    fn test_disjoint_polygons_do_not_intersect() {
        let a = Polygon::rectangle(0.0, 0.0, 1.0, 1.0);
        let b = Polygon::rectangle(5.0, 5.0, 6.0, 6.0);
        assert!(!a.intersects(&b));
        assert!(!b.intersects(&a));
    }

    #[test]
    fn test_contained_polygon_intersects() {
        let outer = Polygon::rectangle(0.0, 0.0, 100.0, 100.0);
        let inner = Polygon::rectangle(40.0, 40.0, 60.0, 60.0);
        assert!(outer.intersects(&inner));
        assert!(inner.intersects(&outer));
    }

    #[test]
    fn test_touching_edges_intersect() {
        let a = Polygon::rectangle(0.0, 0.0, 1.0, 1.0);
        let b = Polygon::rectangle(1.0, 0.0, 2.0, 1.0);
        assert!(a.intersects(&b));
    }

    #[test]
    fn test_bounding_boxes_overlap_but_shapes_do_not() {
        // The diamond's bounding box covers the square's corner region,
        // but the diamond itself stays clear of it.
        let d = diamond(0.0, 0.0, 1.0);
        let corner = Polygon::rectangle(0.8, 0.8, 1.0, 1.0);
        assert!(!d.intersects(&corner));
    }

    #[test]
    fn test_rotated_box_crossing_region() {
        let d = diamond(5.0, 5.0, 3.0);
        let strip = Polygon::rectangle(0.0, 4.5, 10.0, 5.5);
        assert!(d.intersects(&strip));
    }

    #[test]
    fn test_contains_point_boundary_inclusive() {
        let p = Polygon::rectangle(0.0, 0.0, 2.0, 2.0);
        assert!(p.contains_point(Coord::new(1.0, 1.0)));
        assert!(p.contains_point(Coord::new(0.0, 1.0)));
        assert!(p.contains_point(Coord::new(2.0, 2.0)));
        assert!(!p.contains_point(Coord::new(2.5, 1.0)));
    }

    #[test]
    fn test_bounds() {
        let d = diamond(1.0, 2.0, 1.0);
        assert_eq!(d.bounds(), (0.0, 1.0, 2.0, 3.0));
    }

    #[test]
    fn test_serde_roundtrip_keeps_ring_closed() {
        let p = Polygon::rectangle(0.0, 0.0, 1.0, 1.0);
        let json = serde_json::to_string(&p).unwrap();
        let back: Polygon = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn test_area_intersects_when_any_part_does() {
        let area = Area::new(vec![
            Polygon::rectangle(0.0, 0.0, 1.0, 1.0),
            Polygon::rectangle(10.0, 10.0, 11.0, 11.0),
        ])
        .unwrap();
        assert!(area.intersects(&Polygon::rectangle(10.5, 10.5, 12.0, 12.0)));
        assert!(area.intersects(&Polygon::rectangle(0.5, 0.5, 0.6, 0.6)));
        // the gap between the parts is not covered
        assert!(!area.intersects(&Polygon::rectangle(4.0, 4.0, 6.0, 6.0)));
    }

    #[test]
    fn test_empty_area_is_rejected() {
        assert!(matches!(Area::new(Vec::new()), Err(Error::InvalidGeometry { .. })));
        assert!(serde_json::from_str::<Area>("[]").is_err());
    }
}
