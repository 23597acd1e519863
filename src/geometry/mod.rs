//! Planar geometry primitives and CRS handling.

mod polygon;
pub mod projection;

pub use polygon::{Area, Coord, Polygon};
pub use projection::{Crs, Reprojector};
