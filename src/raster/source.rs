//! Raster source abstraction.

use super::{GeoTransform, PixelBuffer};
use crate::error::Result;
use crate::geometry::Crs;

/// Pixel rectangle inside a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    /// Column of the top-left pixel.
    pub col_offset: u32,
    /// Row of the top-left pixel.
    pub row_offset: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Window {
    /// Create a window.
    #[must_use]
    pub const fn new(col_offset: u32, row_offset: u32, width: u32, height: u32) -> Self {
        Self {
            col_offset,
            row_offset,
            width,
            height,
        }
    }

    /// Whether the window lies fully inside a `width` x `height` raster.
    #[must_use]
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && u64::from(self.col_offset) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.row_offset) + u64::from(self.height) <= u64::from(height)
    }
}

/// An opened, georeferenced raster.
///
/// Metadata is immutable once opened. Reads take `&mut self` because
/// decoders keep cursor and cache state.
pub trait RasterSource: Send {
    /// Reference the raster was opened from.
    fn source_ref(&self) -> &str;

    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// CRS of the geotransform output.
    fn crs(&self) -> Crs;

    /// Pixel-to-CRS transform of the full raster.
    fn transform(&self) -> GeoTransform;

    /// Decode the samples inside `window`.
    fn read_window(&mut self, window: Window) -> Result<PixelBuffer>;
}

/// Opens raster sources from image references.
pub trait RasterOpener: Send + Sync {
    /// Open `source_ref`, failing with `SourceUnreadable`.
    fn open(&self, source_ref: &str) -> Result<Box<dyn RasterSource>>;
}
