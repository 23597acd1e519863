//! Output writer trait definition.

use crate::error::Result;
use crate::store::Detection;

/// Trait for writing persisted detections.
pub trait OutputWriter {
    /// Write the file header (if applicable).
    fn write_header(&mut self) -> Result<()>;

    /// Write a single detection.
    fn write_detection(&mut self, detection: &Detection) -> Result<()>;

    /// Finalize the output (flush, close, etc.).
    fn finalize(&mut self) -> Result<()>;
}
