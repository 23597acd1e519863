//! GeoTIFF raster backend.
//!
//! Georeferencing comes from `ModelTransformationTag`, or from
//! `ModelPixelScaleTag` + `ModelTiepointTag`. The CRS is read from the
//! GeoKey directory. Windows are assembled from decoded strips or tiles,
//! which are kept in a byte-bounded LRU so that row-major traversal decodes
//! each chunk about once.

use super::{GeoTransform, PixelBuffer, RasterOpener, RasterSource, Window};
use crate::constants::geotiff as tags;
use crate::error::{Error, Result};
use crate::geometry::Crs;
use lru::LruCache;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::{debug, warn};

struct Chunk {
    width: u32,
    height: u32,
    data: Arc<Vec<f32>>,
}

struct ChunkCache {
    current_bytes: usize,
    capacity_bytes: usize,
    entries: LruCache<u32, Chunk>,
}

impl ChunkCache {
    fn new(capacity_bytes: usize) -> Self {
        Self {
            current_bytes: 0,
            capacity_bytes,
            entries: LruCache::unbounded(),
        }
    }

    fn get(&mut self, index: u32) -> Option<(u32, u32, Arc<Vec<f32>>)> {
        self.entries
            .get(&index)
            .map(|c| (c.width, c.height, Arc::clone(&c.data)))
    }

    fn insert(&mut self, index: u32, chunk: Chunk) {
        let size_bytes = chunk.data.len() * std::mem::size_of::<f32>();
        if size_bytes > self.capacity_bytes {
            return;
        }
        while self.current_bytes + size_bytes > self.capacity_bytes {
            match self.entries.pop_lru() {
                Some((_, old)) => {
                    self.current_bytes = self
                        .current_bytes
                        .saturating_sub(old.data.len() * std::mem::size_of::<f32>());
                }
                None => break,
            }
        }
        self.current_bytes = self.current_bytes.saturating_add(size_bytes);
        self.entries.put(index, chunk);
    }
}

/// A GeoTIFF file opened for windowed reads.
pub struct GeoTiffRaster {
    source_ref: String,
    decoder: Decoder<BufReader<File>>,
    width: u32,
    height: u32,
    channels: usize,
    max_value: f32,
    crs: Crs,
    transform: GeoTransform,
    chunk_width: u32,
    chunk_height: u32,
    chunks_across: u32,
    cache: ChunkCache,
}

impl std::fmt::Debug for GeoTiffRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffRaster")
            .field("source_ref", &self.source_ref)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("crs", &self.crs)
            .finish_non_exhaustive()
    }
}

impl GeoTiffRaster {
    /// Open a GeoTIFF file and read its georeferencing.
    pub fn open(path: &Path) -> Result<Self> {
        let source_ref = path.display().to_string();
        let unreadable = |reason: String| Error::SourceUnreadable {
            source_ref: source_ref.clone(),
            reason,
        };

        let file = File::open(path).map_err(|e| unreadable(e.to_string()))?;
        let mut decoder =
            Decoder::new(BufReader::new(file)).map_err(|e| unreadable(e.to_string()))?;

        let (width, height) = decoder.dimensions().map_err(|e| unreadable(e.to_string()))?;
        let colortype = decoder.colortype().map_err(|e| unreadable(e.to_string()))?;
        let (channels, bit_depth) = channel_layout(colortype).map_err(unreadable)?;
        let max_value = nominal_max(&mut decoder, bit_depth);

        let crs = read_crs(&mut decoder);
        let transform = match read_transform(&mut decoder).map_err(unreadable)? {
            Some(t) if is_pixel_is_point(&mut decoder) => t.pixel_is_point_to_area(),
            Some(t) => t,
            None => {
                warn!(source = %source_ref, "no georeferencing tags, using pixel coordinates");
                GeoTransform::IDENTITY
            }
        };

        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        if chunk_width == 0 || chunk_height == 0 {
            return Err(unreadable("zero-sized strips or tiles".to_string()));
        }
        let chunks_across = width.div_ceil(chunk_width);

        debug!(
            source = %source_ref,
            width,
            height,
            channels,
            %crs,
            chunk_width,
            chunk_height,
            "opened GeoTIFF"
        );

        Ok(Self {
            source_ref,
            decoder,
            width,
            height,
            channels,
            max_value,
            crs,
            transform,
            chunk_width,
            chunk_height,
            chunks_across,
            cache: ChunkCache::new(tags::CHUNK_CACHE_BYTES),
        })
    }

    fn chunk(&mut self, index: u32) -> Result<(u32, u32, Arc<Vec<f32>>)> {
        if let Some(hit) = self.cache.get(index) {
            return Ok(hit);
        }
        let (width, height) = self.decoder.chunk_data_dimensions(index);
        let decoded = self
            .decoder
            .read_chunk(index)
            .map_err(|e| Error::TileRead {
                col: (index % self.chunks_across) * self.chunk_width,
                row: (index / self.chunks_across) * self.chunk_height,
                reason: e.to_string(),
            })?;
        let data = Arc::new(widen(decoded));
        self.cache.insert(
            index,
            Chunk {
                width,
                height,
                data: Arc::clone(&data),
            },
        );
        Ok((width, height, data))
    }
}

impl RasterSource for GeoTiffRaster {
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

        let ch = self.channels;
        let out_stride = window.width as usize * ch;
        let mut out = vec![0.0f32; out_stride * window.height as usize];

        let col_end = window.col_offset + window.width;
        let row_end = window.row_offset + window.height;
        let first_cx = window.col_offset / self.chunk_width;
        let last_cx = (col_end - 1) / self.chunk_width;
        let first_cy = window.row_offset / self.chunk_height;
        let last_cy = (row_end - 1) / self.chunk_height;

        for cy in first_cy..=last_cy {
            for cx in first_cx..=last_cx {
                let index = cy * self.chunks_across + cx;
                let (cw, chh, data) = self.chunk(index)?;
                let x0 = cx * self.chunk_width;
                let y0 = cy * self.chunk_height;

                let xs = window.col_offset.max(x0);
                let xe = col_end.min(x0 + cw);
                let ys = window.row_offset.max(y0);
                let ye = row_end.min(y0 + chh);
                if xs >= xe || ys >= ye {
                    continue;
                }
                let span = (xe - xs) as usize * ch;

                for y in ys..ye {
                    let src = ((y - y0) as usize * cw as usize + (xs - x0) as usize) * ch;
                    let dst = (y - window.row_offset) as usize * out_stride
                        + (xs - window.col_offset) as usize * ch;
                    let Some(row) = data.get(src..src + span) else {
                        return Err(Error::TileRead {
                            col: window.col_offset,
                            row: window.row_offset,
                            reason: format!("chunk {index} is shorter than its declared size"),
                        });
                    };
                    out[dst..dst + span].copy_from_slice(row);
                }
            }
        }

        PixelBuffer::new(window.width, window.height, ch, out, self.max_value)
    }
}

/// Opens file paths as GeoTIFF rasters.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeoTiffOpener;

impl RasterOpener for GeoTiffOpener {
    fn open(&self, source_ref: &str) -> Result<Box<dyn RasterSource>> {
        let path = PathBuf::from(source_ref);
        Ok(Box::new(GeoTiffRaster::open(&path)?))
    }
}

fn channel_layout(colortype: ColorType) -> std::result::Result<(usize, u8), String> {
    #[allow(unreachable_patterns)]
    match colortype {
        ColorType::Gray(bits) | ColorType::Palette(bits) => Ok((1, bits)),
        ColorType::GrayA(bits) => Ok((2, bits)),
        ColorType::RGB(bits) | ColorType::YCbCr(bits) => Ok((3, bits)),
        ColorType::RGBA(bits) | ColorType::CMYK(bits) => Ok((4, bits)),
        ColorType::Multiband {
            bit_depth,
            num_samples,
        } => Ok((usize::from(num_samples), bit_depth)),
        other => Err(format!("unsupported color type {other:?}")),
    }
}

fn nominal_max(decoder: &mut Decoder<BufReader<File>>, bit_depth: u8) -> f32 {
    let format = decoder
        .find_tag(Tag::SampleFormat)
        .ok()
        .flatten()
        .and_then(|v| v.into_u16_vec().ok())
        .and_then(|v| v.first().copied())
        .unwrap_or(1);
    match format {
        3 => 1.0,
        2 => ((1u64 << bit_depth.saturating_sub(1).min(63)) - 1) as f32,
        _ => ((1u128 << bit_depth.min(64)) - 1) as f32,
    }
}

fn f64_tag(decoder: &mut Decoder<BufReader<File>>, code: u16) -> Option<Vec<f64>> {
    decoder
        .find_tag(Tag::Unknown(code))
        .ok()
        .flatten()
        .and_then(|v| v.into_f64_vec().ok())
}

fn read_transform(
    decoder: &mut Decoder<BufReader<File>>,
) -> std::result::Result<Option<GeoTransform>, String> {
    if let Some(m) = f64_tag(decoder, tags::MODEL_TRANSFORMATION) {
        if m.len() < 16 {
            return Err(format!("ModelTransformationTag has {} values, expected 16", m.len()));
        }
        return Ok(Some(GeoTransform {
            a0: m[3],
            a1: m[0],
            a2: m[1],
            b0: m[7],
            b1: m[4],
            b2: m[5],
        }));
    }

    let scale = f64_tag(decoder, tags::MODEL_PIXEL_SCALE);
    let tiepoint = f64_tag(decoder, tags::MODEL_TIEPOINT);
    match (scale, tiepoint) {
        (Some(s), Some(tp)) if s.len() >= 2 && tp.len() >= 6 => {
            let (i, j, x, y) = (tp[0], tp[1], tp[3], tp[4]);
            let (sx, sy) = (s[0], s[1]);
            Ok(Some(GeoTransform {
                a0: x - i * sx,
                a1: sx,
                a2: 0.0,
                b0: y + j * sy,
                b1: 0.0,
                b2: -sy,
            }))
        }
        (None, None) => Ok(None),
        _ => Err("incomplete ModelPixelScale/ModelTiepoint georeferencing".to_string()),
    }
}

fn geo_key(decoder: &mut Decoder<BufReader<File>>, key: u16) -> Option<u16> {
    let dir = decoder
        .find_tag(Tag::Unknown(tags::GEO_KEY_DIRECTORY))
        .ok()
        .flatten()
        .and_then(|v| v.into_u16_vec().ok())?;
    let count = usize::from(*dir.get(3)?);
    dir.get(4..4 + count * 4)?
        .chunks_exact(4)
        .find(|entry| entry[0] == key && entry[1] == 0)
        .map(|entry| entry[3])
}

fn read_crs(decoder: &mut Decoder<BufReader<File>>) -> Crs {
    [tags::KEY_PROJECTED_TYPE, tags::KEY_GEOGRAPHIC_TYPE]
        .into_iter()
        .filter_map(|key| geo_key(decoder, key))
        .find(|&code| code != 0 && code != tags::USER_DEFINED)
        .map_or(Crs::Unknown, Crs::Epsg)
}

fn is_pixel_is_point(decoder: &mut Decoder<BufReader<File>>) -> bool {
    geo_key(decoder, tags::KEY_RASTER_TYPE) == Some(tags::RASTER_PIXEL_IS_POINT)
}

#[allow(unreachable_patterns)]
fn widen(decoded: DecodingResult) -> Vec<f32> {
    match decoded {
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|s| s as f32).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_layout() {
        assert_eq!(channel_layout(ColorType::Gray(8)).unwrap(), (1, 8));
        assert_eq!(channel_layout(ColorType::RGB(16)).unwrap(), (3, 16));
        assert_eq!(channel_layout(ColorType::RGBA(8)).unwrap(), (4, 8));
        assert_eq!(
            channel_layout(ColorType::Multiband {
                bit_depth: 32,
                num_samples: 6
            })
            .unwrap(),
            (6, 32)
        );
    }

    #[test]
    fn test_widen_u8() {
        assert_eq!(widen(DecodingResult::U8(vec![0, 128, 255])), vec![0.0, 128.0, 255.0]);
    }

    #[test]
    fn test_chunk_cache_evicts_by_bytes() {
        let mut cache = ChunkCache::new(64);
        let chunk = || Chunk {
            width: 2,
            height: 2,
            data: Arc::new(vec![0.0; 8]),
        };
        cache.insert(0, chunk());
        cache.insert(1, chunk());
        cache.insert(2, chunk());
        assert!(cache.get(0).is_none());
        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_some());
    }

    #[test]
    fn test_open_missing_file_is_unreadable() {
        let err = GeoTiffRaster::open(Path::new("/nonexistent/scene.tif")).unwrap_err();
        assert_eq!(err.reason_code(), "source_unreadable");
    }
}
