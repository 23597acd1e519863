//! Raster sources and tiling.

mod buffer;
pub mod geotiff;
mod memory;
mod source;
pub mod tiler;
mod transform;

pub use buffer::PixelBuffer;
pub use geotiff::{GeoTiffOpener, GeoTiffRaster};
pub use memory::{MemoryOpener, MemoryRaster};
pub use source::{RasterOpener, RasterSource, Window};
pub use tiler::{Tile, TileGrid, TileIter, tiles};
pub use transform::GeoTransform;
