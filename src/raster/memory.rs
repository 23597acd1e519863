//! In-memory raster backend.

use super::{GeoTransform, PixelBuffer, RasterOpener, RasterSource, Window};
use crate::error::{Error, Result};
use crate::geometry::Crs;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A raster held entirely in memory, for embedding callers and tests.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    source_ref: String,
    width: u32,
    height: u32,
    channels: usize,
    data: Arc<Vec<f32>>,
    max_value: f32,
    crs: Crs,
    transform: GeoTransform,
}

impl MemoryRaster {
    /// Wrap interleaved samples.
    pub fn new(
        source_ref: impl Into<String>,
        width: u32,
        height: u32,
        channels: usize,
        data: Vec<f32>,
        crs: Crs,
        transform: GeoTransform,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * channels;
        if width == 0 || height == 0 || channels == 0 || data.len() != expected {
            return Err(Error::SourceUnreadable {
                source_ref: source_ref.into(),
                reason: format!("expected {expected} samples for {width}x{height}x{channels}, got {}", data.len()),
            });
        }
        Ok(Self {
            source_ref: source_ref.into(),
            width,
            height,
            channels,
            data: Arc::new(data),
            max_value: 255.0,
            crs,
            transform,
        })
    }

    /// Uniform single-band raster filled with `value`.
    pub fn filled(
        source_ref: impl Into<String>,
        width: u32,
        height: u32,
        value: f32,
        crs: Crs,
        transform: GeoTransform,
    ) -> Result<Self> {
        let data = vec![value; width as usize * height as usize];
        Self::new(source_ref, width, height, 1, data, crs, transform)
    }

    /// Override the nominal maximum sample value (defaults to 255).
    #[must_use]
    pub fn with_max_value(mut self, max_value: f32) -> Self {
        self.max_value = max_value;
        self
    }
}

impl RasterSource for MemoryRaster {
    fn source_ref(&self) -> &str {
        &self.source_ref
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn crs(&self) -> Crs {
        self.crs
    }

    fn transform(&self) -> GeoTransform {
        self.transform
    }

    fn read_window(&mut self, window: Window) -> Result<PixelBuffer> {
        if !window.fits(self.width, self.height) {
            return Err(Error::TileRead {
                col: window.col_offset,
                row: window.row_offset,
                reason: format!("window {}x{} exceeds raster bounds", window.width, window.height),
            });
        }

        let row_len = window.width as usize * self.channels;
        let mut out = Vec::with_capacity(row_len * window.height as usize);
        for row in window.row_offset..window.row_offset + window.height {
            let start = (row as usize * self.width as usize + window.col_offset as usize) * self.channels;
            out.extend_from_slice(&self.data[start..start + row_len]);
        }
        PixelBuffer::new(window.width, window.height, self.channels, out, self.max_value)
    }
}

/// Opener over a fixed set of named in-memory rasters.
#[derive(Debug, Default)]
pub struct MemoryOpener {
    rasters: Mutex<HashMap<String, MemoryRaster>>,
}

impl MemoryOpener {
    /// Create an empty opener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raster under its own source reference.
    pub fn insert(&self, raster: MemoryRaster) {
        if let Ok(mut rasters) = self.rasters.lock() {
            rasters.insert(raster.source_ref.clone(), raster);
        }
    }
}

impl RasterOpener for MemoryOpener {
    fn open(&self, source_ref: &str) -> Result<Box<dyn RasterSource>> {
        let rasters = self.rasters.lock().map_err(|_| Error::Internal {
            message: "raster registry lock poisoned".to_string(),
        })?;
        rasters
            .get(source_ref)
            .cloned()
            .map(|r| Box::new(r) as Box<dyn RasterSource>)
            .ok_or_else(|| Error::SourceUnreadable {
                source_ref: source_ref.to_string(),
                reason: "no such raster".to_string(),
            })
    }
}
