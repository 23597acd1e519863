//! GeoJSON detections writer.

use crate::error::{Error, Result};
use crate::geometry::Polygon;
use crate::output::OutputWriter;
use crate::store::Detection;
use serde_json::{Value, json};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Streams detections as a GeoJSON `FeatureCollection`.
///
/// Each feature carries the geographic footprint as its geometry and the
/// detection's id, report, class, confidence and pixel geometry as
/// properties.
pub struct GeoJsonWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl GeoJsonWriter {
    /// Create a new GeoJSON writer.
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    /// Number of features written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }
}

fn polygon_geometry(polygon: &Polygon) -> Value {
    let ring: Vec<[f64; 2]> = polygon.ring().iter().map(|c| [c.x, c.y]).collect();
    json!({ "type": "Polygon", "coordinates": [ring] })
}

fn feature(detection: &Detection) -> Value {
    json!({
        "type": "Feature",
        "id": detection.id,
        "geometry": polygon_geometry(&detection.footprint),
        "properties": {
            "report_id": detection.report_id,
            "class_label": detection.class_label,
            "confidence": detection.confidence,
            "pixel_geometry": detection.pixel_geometry,
            "created_at": detection.created_at,
        },
    })
}

impl OutputWriter for GeoJsonWriter {
    fn write_header(&mut self) -> Result<()> {
        write!(self.writer, "{{\"type\":\"FeatureCollection\",\"features\":[")?;
        Ok(())
    }

    fn write_detection(&mut self, detection: &Detection) -> Result<()> {
        if self.written > 0 {
            write!(self.writer, ",")?;
        }
        writeln!(self.writer)?;
        serde_json::to_writer(&mut self.writer, &feature(detection)).map_err(|e| {
            Error::JsonWrite {
                path: self.path.clone(),
                source: e,
            }
        })?;
        self.written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        writeln!(self.writer, "\n]}}")?;
        self.writer.flush()?;
        Ok(())
    }
}
