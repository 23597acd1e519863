//! ONNX Runtime YOLO detectors.

use super::nms::non_max_suppression;
use super::{BoxGeometry, InferenceAdapter, RawDetection, filter_by_confidence};
use crate::config::{ModelConfig, ModelType, validate_model_config};
use crate::constants::detector::{DEFAULT_INPUT_SIZE, DEFAULT_IOU_THRESHOLD, PAD_VALUE};
use crate::error::{Error, Result};
use crate::raster::PixelBuffer;
use image::imageops::{self, FilterType};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// A YOLO detect or OBB model served by ONNX Runtime.
///
/// Inference is serialized on the session; run several tile workers to
/// overlap preprocessing with inference.
pub struct OnnxDetector {
    name: String,
    session: Mutex<Session>,
    labels: Vec<String>,
    model_type: ModelType,
    input_size: u32,
    iou_threshold: f32,
}

impl std::fmt::Debug for OnnxDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxDetector")
            .field("name", &self.name)
            .field("model_type", &self.model_type)
            .field("input_size", &self.input_size)
            .field("classes", &self.labels.len())
            .finish_non_exhaustive()
    }
}

impl OnnxDetector {
    /// Load a model and its labels.
    pub fn load(name: &str, config: &ModelConfig) -> Result<Self> {
        validate_model_config(name, config)?;
        let labels = read_labels(&config.labels)?;

        let unavailable = |reason: String| Error::ModelUnavailable {
            name: name.to_string(),
            reason,
        };
        let session = Session::builder()
            .map_err(|e| unavailable(e.to_string()))?
            .commit_from_file(&config.path)
            .map_err(|e| unavailable(e.to_string()))?;

        let detector = Self {
            name: name.to_string(),
            session: Mutex::new(session),
            labels,
            model_type: config.model_type,
            input_size: config.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            iou_threshold: config.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
        };

        info!(
            "Loaded model: {}, type: {}, input: {}px, classes: {}",
            detector.name,
            detector.model_type,
            detector.input_size,
            detector.labels.len()
        );

        Ok(detector)
    }
}

impl InferenceAdapter for OnnxDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    // one session, one run at a time
    fn max_concurrency(&self) -> Option<usize> {
        Some(1)
    }

    fn infer(&self, buffer: &PixelBuffer, threshold: f32) -> Result<Vec<RawDetection>> {
        let letterbox = Letterbox::new(buffer.width(), buffer.height(), self.input_size);
        let input = letterbox.tensor_data(buffer);
        let side = self.input_size as usize;

        let tensor = Tensor::from_array(([1usize, 3, side, side], input)).map_err(ort_error)?;

        let mut session = self.session.lock().map_err(|_| Error::Inference {
            reason: "session lock poisoned".to_string(),
        })?;
        let outputs = session.run(ort::inputs![tensor]).map_err(ort_error)?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(ort_error)?;
        let dims: Vec<i64> = shape.iter().copied().collect();

        let mut detections = decode_output(
            &dims,
            data,
            &self.labels,
            self.model_type,
            threshold,
            &letterbox,
        )?;
        let candidates = detections.len();
        non_max_suppression(&mut detections, self.iou_threshold);

        debug!(
            model = %self.name,
            candidates,
            kept = detections.len(),
            "tile inference complete"
        );

        Ok(filter_by_confidence(detections, threshold))
    }
}

fn ort_error(e: ort::Error) -> Error {
    Error::Inference {
        reason: e.to_string(),
    }
}

/// Read one label per line, ignoring blank lines.
pub fn read_labels(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|_| Error::LabelsFileNotFound {
        path: path.to_path_buf(),
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToString::to_string)
        .collect())
}

/// Top-left aligned letterbox into a square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Model input edge in pixels.
    pub side: u32,
    /// Resize factor from tile to model pixels.
    pub scale: f64,
    /// Resized tile width.
    pub width: u32,
    /// Resized tile height.
    pub height: u32,
    tile_width: u32,
    tile_height: u32,
}

impl Letterbox {
    /// Fit a `tile_width` x `tile_height` tile into `side` x `side`.
    #[must_use]
    pub fn new(tile_width: u32, tile_height: u32, side: u32) -> Self {
        let scale = (f64::from(side) / f64::from(tile_width.max(1)))
            .min(f64::from(side) / f64::from(tile_height.max(1)));
        let width = ((f64::from(tile_width) * scale).round() as u32).clamp(1, side);
        let height = ((f64::from(tile_height) * scale).round() as u32).clamp(1, side);
        Self {
            side,
            scale,
            width,
            height,
            tile_width,
            tile_height,
        }
    }

    /// NCHW `f32` input with pixels in `[0, 1]` and padded with grey.
    #[must_use]
    pub fn tensor_data(&self, buffer: &PixelBuffer) -> Vec<f32> {
        let rgb = buffer.to_rgb_image();
        let resized = if (self.width, self.height) == rgb.dimensions() {
            rgb
        } else {
            imageops::resize(&rgb, self.width, self.height, FilterType::Triangle)
        };

        let plane = self.side as usize * self.side as usize;
        let mut data = vec![PAD_VALUE; 3 * plane];
        for (x, y, px) in resized.enumerate_pixels() {
            let offset = y as usize * self.side as usize + x as usize;
            for (c, value) in px.0.iter().enumerate() {
                data[c * plane + offset] = f32::from(*value) / 255.0;
            }
        }
        data
    }

    /// Map a model-space coordinate back to tile pixels.
    #[must_use]
    pub fn unscale(&self, v: f64) -> f64 {
        v / self.scale
    }

    fn clamp_x(&self, x: f64) -> f64 {
        x.clamp(0.0, f64::from(self.tile_width))
    }

    fn clamp_y(&self, y: f64) -> f64 {
        y.clamp(0.0, f64::from(self.tile_height))
    }
}

/// Decode a `[1, features, anchors]` or `[1, anchors, features]` head.
///
/// Features are `cx, cy, w, h`, one score per class and, for OBB heads,
/// a trailing angle in radians.
pub fn decode_output(
    shape: &[i64],
    data: &[f32],
    labels: &[String],
    model_type: ModelType,
    threshold: f32,
    letterbox: &Letterbox,
) -> Result<Vec<RawDetection>> {
    let classes = labels.len();
    let features = 4 + classes + usize::from(model_type == ModelType::YoloObb);

    let dims: Vec<usize> = shape.iter().map(|&d| usize::try_from(d).unwrap_or(0)).collect();
    let (anchors, transposed) = match dims.as_slice() {
        [1, f, a] if *f == features => (*a, true),
        [1, a, f] if *f == features => (*a, false),
        _ => {
            return Err(Error::Inference {
                reason: format!(
                    "unexpected output shape {shape:?} for {classes} classes ({model_type})"
                ),
            });
        }
    };
    if data.len() < anchors * features {
        return Err(Error::Inference {
            reason: format!("output has {} values, expected {}", data.len(), anchors * features),
        });
    }

    let at = |anchor: usize, feature: usize| {
        if transposed {
            data[feature * anchors + anchor]
        } else {
            data[anchor * features + feature]
        }
    };

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let Some((class, score)) = (0..classes)
            .map(|c| (c, at(anchor, 4 + c)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        if score < threshold {
            continue;
        }

        let cx = letterbox.unscale(f64::from(at(anchor, 0)));
        let cy = letterbox.unscale(f64::from(at(anchor, 1)));
        let w = letterbox.unscale(f64::from(at(anchor, 2)));
        let h = letterbox.unscale(f64::from(at(anchor, 3)));

        let geometry = match model_type {
            ModelType::Yolo => BoxGeometry::Axis {
                x1: letterbox.clamp_x(cx - w / 2.0),
                y1: letterbox.clamp_y(cy - h / 2.0),
                x2: letterbox.clamp_x(cx + w / 2.0),
                y2: letterbox.clamp_y(cy + h / 2.0),
            },
            ModelType::YoloObb => {
                let angle = f64::from(at(anchor, 4 + classes));
                BoxGeometry::rotated(cx, cy, w, h, angle)
            }
        };

        detections.push(RawDetection {
            class_label: labels[class].clone(),
            confidence: score.clamp(0.0, 1.0),
            geometry,
        });
    }
    Ok(detections)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn labels() -> Vec<String> {
        vec!["car".to_string(), "truck".to_string()]
    }

    #[test]
    fn test_letterbox_scales_long_side() {
        let lb = Letterbox::new(1024, 512, 640);
        assert!((lb.scale - 0.625).abs() < 1e-12);
        assert_eq!((lb.width, lb.height), (640, 320));
        assert!((lb.unscale(320.0) - 512.0).abs() < 1e-9);
    }

    #[test]
    fn test_tensor_data_pads_outside_image() {
        let buf = PixelBuffer::new(2, 1, 1, vec![255.0, 0.0], 255.0).unwrap();
        let lb = Letterbox::new(2, 1, 4);
        let data = lb.tensor_data(&buf);
        assert_eq!(data.len(), 3 * 16);
        // bottom-right lies in the padding
        assert!((data[15] - PAD_VALUE).abs() < 1e-6);
    }

    #[test]
    fn test_decode_detect_head_transposed() {
        // [1, 6, 2]: features-major, two anchors
        let data = vec![
            10.0, 40.0, // cx
            10.0, 40.0, // cy
            4.0, 8.0, // w
            4.0, 8.0, // h
            0.9, 0.1, // car
            0.05, 0.3, // truck
        ];
        let lb = Letterbox::new(64, 64, 64);
        let dets = decode_output(&[1, 6, 2], &data, &labels(), ModelType::Yolo, 0.25, &lb).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_label, "car");
        assert_eq!(
            dets[0].geometry,
            BoxGeometry::Axis {
                x1: 8.0,
                y1: 8.0,
                x2: 12.0,
                y2: 12.0
            }
        );
        assert_eq!(dets[1].class_label, "truck");
    }

    #[test]
    fn test_decode_drops_below_threshold_keeps_equal() {
        let data = vec![
            10.0, 10.0, 2.0, 2.0, 0.5, 0.0, // anchor 0
            20.0, 20.0, 2.0, 2.0, 0.49, 0.0, // anchor 1
        ];
        let lb = Letterbox::new(64, 64, 64);
        let dets = decode_output(&[1, 2, 6], &data, &labels(), ModelType::Yolo, 0.5, &lb).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].confidence, 0.5);
    }

    #[test]
    fn test_decode_obb_head() {
        let data = vec![32.0, 32.0, 10.0, 4.0, 0.8, 0.1, 0.0];
        let lb = Letterbox::new(64, 64, 64);
        let dets = decode_output(&[1, 1, 7], &data, &labels(), ModelType::YoloObb, 0.25, &lb).unwrap();
        assert_eq!(dets.len(), 1);
        assert!(matches!(dets[0].geometry, BoxGeometry::Oriented { .. }));
        assert_eq!(dets[0].geometry.bounds(), (27.0, 30.0, 37.0, 34.0));
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let lb = Letterbox::new(64, 64, 64);
        let err = decode_output(&[1, 9, 2], &[0.0; 18], &labels(), ModelType::Yolo, 0.1, &lb);
        assert!(matches!(err, Err(Error::Inference { .. })));
    }

    #[test]
    fn test_read_labels_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "car\n\ntruck\n").unwrap();
        assert_eq!(read_labels(file.path()).unwrap(), labels());
    }
}
