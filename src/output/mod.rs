//! Output writers and progress display.

mod geojson;
pub mod progress;
mod writer;

pub use geojson::GeoJsonWriter;
pub use writer::OutputWriter;

use crate::error::Result;
use crate::store::Detection;

/// Write every detection through `writer`, header and footer included.
pub fn write_all(writer: &mut dyn OutputWriter, detections: &[Detection]) -> Result<()> {
    writer.write_header()?;
    for detection in detections {
        writer.write_detection(detection)?;
    }
    writer.finalize()
}
