//! Affine pixel-to-geo transforms.

use crate::error::{Error, Result};
use crate::geometry::Coord;
use serde::{Deserialize, Serialize};

/// Affine mapping from pixel `(col, row)` to CRS coordinates.
///
/// Coefficients follow the GDAL ordering:
/// `x = a0 + col * a1 + row * a2`, `y = b0 + col * b1 + row * b2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X of the top-left corner of pixel (0, 0).
    pub a0: f64,
    /// X change per column.
    pub a1: f64,
    /// X change per row (rotation term).
    pub a2: f64,
    /// Y of the top-left corner of pixel (0, 0).
    pub b0: f64,
    /// Y change per column (rotation term).
    pub b1: f64,
    /// Y change per row (negative for north-up rasters).
    pub b2: f64,
}

impl GeoTransform {
    /// Pixel coordinates map onto themselves.
    pub const IDENTITY: Self = Self {
        a0: 0.0,
        a1: 1.0,
        a2: 0.0,
        b0: 0.0,
        b1: 0.0,
        b2: 1.0,
    };

    /// North-up transform with square-ish pixels and no rotation.
    #[must_use]
    pub const fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            a0: origin_x,
            a1: pixel_width,
            a2: 0.0,
            b0: origin_y,
            b1: 0.0,
            b2: -pixel_height,
        }
    }

    /// Build from a GDAL-style `[a0, a1, a2, b0, b1, b2]` array.
    #[must_use]
    pub const fn from_gdal(c: [f64; 6]) -> Self {
        Self {
            a0: c[0],
            a1: c[1],
            a2: c[2],
            b0: c[3],
            b1: c[4],
            b2: c[5],
        }
    }

    /// Map a pixel coordinate to CRS coordinates.
    #[must_use]
    pub fn apply(&self, col: f64, row: f64) -> Coord {
        Coord::new(
            self.a0 + col * self.a1 + row * self.a2,
            self.b0 + col * self.b1 + row * self.b2,
        )
    }

    /// Transform of a sub-window whose top-left pixel is `(col_offset, row_offset)`.
    ///
    /// Only the origin moves; `sub.apply(c, r) == self.apply(c + col_offset, r + row_offset)`.
    #[must_use]
    pub fn translated(&self, col_offset: u32, row_offset: u32) -> Self {
        let origin = self.apply(f64::from(col_offset), f64::from(row_offset));
        Self {
            a0: origin.x,
            b0: origin.y,
            ..*self
        }
    }

    /// Determinant of the linear part.
    #[must_use]
    pub fn determinant(&self) -> f64 {
        self.a1 * self.b2 - self.a2 * self.b1
    }

    /// Inverse mapping (CRS coordinates to pixel).
    pub fn inverse(&self) -> Result<Self> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(Error::InvalidGeometry {
                message: "geotransform is not invertible".to_string(),
            });
        }
        let a1 = self.b2 / det;
        let a2 = -self.a2 / det;
        let b1 = -self.b1 / det;
        let b2 = self.a1 / det;
        Ok(Self {
            a0: -(a1 * self.a0 + a2 * self.b0),
            a1,
            a2,
            b0: -(b1 * self.a0 + b2 * self.b0),
            b1,
            b2,
        })
    }

    /// Shift the origin by half a pixel so that integer pixel coordinates
    /// address pixel corners when the source tags pixel centres.
    #[must_use]
    pub fn pixel_is_point_to_area(&self) -> Self {
        let corner = self.apply(-0.5, -0.5);
        Self {
            a0: corner.x,
            b0: corner.y,
            ..*self
        }
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
