//! Decoded pixel windows.

use crate::error::{Error, Result};

/// Interleaved (HWC) `f32` samples of a raster window.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<f32>,
    max_value: f32,
}

impl PixelBuffer {
    /// Wrap decoded samples. `max_value` is the nominal maximum of the
    /// source sample format (255 for 8-bit, 1.0 for float data).
    pub fn new(width: u32, height: u32, channels: usize, data: Vec<f32>, max_value: f32) -> Result<Self> {
        let expected = width as usize * height as usize * channels;
        if channels == 0 || data.len() != expected {
            return Err(Error::Internal {
                message: format!(
                    "pixel buffer {width}x{height}x{channels} needs {expected} samples, got {}",
                    data.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
            max_value: if max_value > 0.0 { max_value } else { 1.0 },
        })
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Samples per pixel.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Nominal maximum sample value.
    #[must_use]
    pub fn max_value(&self) -> f32 {
        self.max_value
    }

    /// Raw interleaved samples.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Sample at `(x, y, channel)`.
    #[must_use]
    pub fn sample(&self, x: u32, y: u32, channel: usize) -> Option<f32> {
        if x >= self.width || y >= self.height || channel >= self.channels {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * self.channels + channel;
        self.data.get(idx).copied()
    }

    /// Convert to an 8-bit RGB image.
    ///
    /// Grayscale is replicated into all three channels; alpha and any bands
    /// beyond the third are ignored.
    #[must_use]
    pub fn to_rgb_image(&self) -> image::RgbImage {
        let scale = 255.0 / self.max_value;
        let channels = self.channels;
        image::RgbImage::from_fn(self.width, self.height, |x, y| {
            let base = (y as usize * self.width as usize + x as usize) * channels;
            let px = &self.data[base..base + channels];
            let to_u8 = |v: f32| (v * scale).clamp(0.0, 255.0).round() as u8;
            if channels >= 3 {
                image::Rgb([to_u8(px[0]), to_u8(px[1]), to_u8(px[2])])
            } else {
                let g = to_u8(px[0]);
                image::Rgb([g, g, g])
            }
        })
    }
}
