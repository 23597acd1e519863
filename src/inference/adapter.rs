//! Uniform interface over detection models.

use super::RawDetection;
use crate::error::Result;
use crate::raster::PixelBuffer;

/// A loaded detection model.
///
/// `infer` is synchronous and may be slow; callers run it on a blocking
/// thread. Implementations must discard detections strictly below
/// `threshold` and keep those exactly at it.
pub trait InferenceAdapter: Send + Sync {
    /// Model reference this adapter was loaded for.
    fn name(&self) -> &str;

    /// Class names the model can emit.
    fn labels(&self) -> &[String];

    /// Run detection on one tile.
    fn infer(&self, buffer: &PixelBuffer, threshold: f32) -> Result<Vec<RawDetection>>;

    /// Most `infer` calls that make progress at once; `None` for no limit.
    ///
    /// Pipelines queue extra calls before a tile's deadline starts, so time
    /// spent waiting for the model is not charged to the tile.
    fn max_concurrency(&self) -> Option<usize> {
        None
    }
}
