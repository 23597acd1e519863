//! Mapping tile-local detections to absolute pixel and geographic space.
//!
//! Every function here is pure.

use crate::error::Result;
use crate::geometry::{Polygon, Reprojector};
use crate::inference::BoxGeometry;
use crate::raster::{GeoTransform, Window};

/// Shift a tile-local geometry by the tile's pixel offset.
#[must_use]
pub fn to_absolute_pixels(tile: Window, geometry: &BoxGeometry) -> BoxGeometry {
    geometry.translated(f64::from(tile.col_offset), f64::from(tile.row_offset))
}

/// Map all four corners of an absolute-pixel box through `transform` and
/// close the ring. The result is in the raster's CRS.
pub fn to_geographic(transform: &GeoTransform, absolute: &BoxGeometry) -> Result<Polygon> {
    let corners = absolute.corners().map(|c| transform.apply(c.x, c.y));
    Polygon::new(corners.to_vec())
}

/// Closed polygon of the four raster corners in the raster's CRS.
pub fn image_footprint(width: u32, height: u32, transform: &GeoTransform) -> Result<Polygon> {
    let pixels = BoxGeometry::Axis {
        x1: 0.0,
        y1: 0.0,
        x2: f64::from(width),
        y2: f64::from(height),
    };
    to_geographic(transform, &pixels)
}

/// Full reconstruction of one tile-local detection into the store CRS.
pub fn reconstruct(
    tile: Window,
    geometry: &BoxGeometry,
    transform: &GeoTransform,
    reprojector: &Reprojector,
) -> Result<(BoxGeometry, Polygon)> {
    let absolute = to_absolute_pixels(tile, geometry);
    let native = to_geographic(transform, &absolute)?;
    let footprint = reprojector.polygon(&native)?;
    Ok((absolute, footprint))
}
