//! Splitting rasters into tiles.
//!
//! Tiles are produced lazily in row-major order. Edge tiles are clipped to
//! the raster, never padded.

use super::{GeoTransform, PixelBuffer, RasterSource, Window};
use crate::error::{Error, Result};

/// The window layout of a raster for a given tile size and overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    cols: Vec<(u32, u32)>,
    rows: Vec<(u32, u32)>,
}

impl TileGrid {
    /// Compute the grid. `overlap` must be smaller than `tile_size`.
    pub fn new(width: u32, height: u32, tile_size: u32, overlap: u32) -> Result<Self> {
        if tile_size == 0 {
            return Err(Error::ConfigValidation {
                message: "tile size must be greater than 0".to_string(),
            });
        }
        if overlap >= tile_size {
            return Err(Error::ConfigValidation {
                message: format!("overlap ({overlap}) must be smaller than tile size ({tile_size})"),
            });
        }
        Ok(Self {
            cols: axis_spans(width, tile_size, overlap),
            rows: axis_spans(height, tile_size, overlap),
        })
    }

    /// Number of tiles in the grid.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cols.len() * self.rows.len()
    }

    /// Whether the grid has no tiles (zero-sized raster).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Window of the tile at row-major position `index`.
    #[must_use]
    pub fn window(&self, index: usize) -> Option<Window> {
        if self.cols.is_empty() || index >= self.len() {
            return None;
        }
        let (col_offset, width) = self.cols[index % self.cols.len()];
        let (row_offset, height) = self.rows[index / self.cols.len()];
        Some(Window::new(col_offset, row_offset, width, height))
    }

    /// All windows in row-major order.
    pub fn windows(&self) -> impl Iterator<Item = Window> + '_ {
        (0..self.len()).filter_map(|i| self.window(i))
    }
}

/// `(offset, length)` spans along one axis.
fn axis_spans(dim: u32, tile_size: u32, overlap: u32) -> Vec<(u32, u32)> {
    let mut spans = Vec::new();
    if dim == 0 {
        return spans;
    }
    let step = tile_size - overlap;
    let mut start = 0u32;
    loop {
        let len = tile_size.min(dim - start);
        spans.push((start, len));
        if u64::from(start) + u64::from(tile_size) >= u64::from(dim) {
            break;
        }
        start += step;
    }
    spans
}

/// A decoded tile, consumed right after inference.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Row-major position in the grid.
    pub index: usize,
    /// Pixel window inside the source raster.
    pub window: Window,
    /// Decoded samples.
    pub buffer: PixelBuffer,
    /// Transform of the tile's own pixel grid.
    pub transform: GeoTransform,
}

impl Tile {
    /// Column of the tile's top-left pixel in the source raster.
    #[must_use]
    pub fn col_offset(&self) -> u32 {
        self.window.col_offset
    }

    /// Row of the tile's top-left pixel in the source raster.
    #[must_use]
    pub fn row_offset(&self) -> u32 {
        self.window.row_offset
    }
}

/// Lazy, finite, non-restartable sequence of tiles.
///
/// Owns the raster source; the source is dropped with the iterator.
/// A window that fails to decode yields `Err(Error::TileRead)` and
/// iteration continues with the next window.
pub struct TileIter {
    source: Box<dyn RasterSource>,
    grid: TileGrid,
    base: GeoTransform,
    next: usize,
}

impl TileIter {
    /// Number of tiles the iterator yields in total.
    #[must_use]
    pub fn total(&self) -> usize {
        self.grid.len()
    }

    /// The grid being traversed.
    #[must_use]
    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Window and tile transform of the next tile, without decoding it.
    #[must_use]
    pub fn peek_window(&self) -> Option<(Window, GeoTransform)> {
        let window = self.grid.window(self.next)?;
        Some((window, self.base.translated(window.col_offset, window.row_offset)))
    }

    /// Step over the next tile without decoding it; returns its index.
    pub fn skip_tile(&mut self) -> Option<usize> {
        self.grid.window(self.next)?;
        let index = self.next;
        self.next += 1;
        Some(index)
    }
}

impl Iterator for TileIter {
    type Item = Result<Tile>;

    fn next(&mut self) -> Option<Self::Item> {
        let window = self.grid.window(self.next)?;
        let index = self.next;
        self.next += 1;

        let tile = self.source.read_window(window).map(|buffer| Tile {
            index,
            window,
            buffer,
            transform: self.base.translated(window.col_offset, window.row_offset),
        });
        Some(tile.map_err(|e| match e {
            Error::TileRead { .. } => e,
            other => Error::TileRead {
                col: window.col_offset,
                row: window.row_offset,
                reason: other.to_string(),
            },
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

/// Start tiling `source`.
pub fn tiles(source: Box<dyn RasterSource>, tile_size: u32, overlap: u32) -> Result<TileIter> {
    let grid = TileGrid::new(source.width(), source.height(), tile_size, overlap)?;
    let base = source.transform();
    Ok(TileIter {
        source,
        grid,
        base,
        next: 0,
    })
}
