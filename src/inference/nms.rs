//! Class-agnostic non-maximum suppression.

use super::{BoxGeometry, RawDetection};

/// Intersection over union of the axis-aligned hulls of two boxes.
///
/// Oriented boxes are compared through their hulls, which over-estimates
/// overlap for strongly rotated neighbours.
#[must_use]
pub fn hull_iou(a: &BoxGeometry, b: &BoxGeometry) -> f64 {
    let (ax1, ay1, ax2, ay2) = a.bounds();
    let (bx1, by1, bx2, by2) = b.bounds();

    let iw = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
    let ih = (ay2.min(by2) - ay1.max(by1)).max(0.0);
    let inter = iw * ih;
    let union = (ax2 - ax1) * (ay2 - ay1) + (bx2 - bx1) * (by2 - by1) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Keep the highest-confidence box of every cluster whose IoU exceeds
/// `iou_threshold`. Survivors are returned in descending confidence.
pub fn non_max_suppression(detections: &mut Vec<RawDetection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let threshold = f64::from(iou_threshold);
    let mut kept = 0;
    for index in 0..detections.len() {
        let suppressed = (0..kept)
            .any(|prev| hull_iou(&detections[prev].geometry, &detections[index].geometry) > threshold);
        if !suppressed {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f32) -> RawDetection {
        RawDetection {
            class_label: "vehicle".to_string(),
            confidence,
            geometry: BoxGeometry::Axis { x1, y1, x2, y2 },
        }
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = BoxGeometry::Axis {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
        };
        let b = BoxGeometry::Axis {
            x1: 20.0,
            y1: 20.0,
            x2: 30.0,
            y2: 30.0,
        };
        assert!((hull_iou(&a, &a) - 1.0).abs() < 1e-12);
        assert_eq!(hull_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_suppresses_overlapping_lower_score() {
        let mut dets = vec![
            boxed(0.0, 0.0, 10.0, 10.0, 0.6),
            boxed(1.0, 1.0, 11.0, 11.0, 0.9),
            boxed(50.0, 50.0, 60.0, 60.0, 0.3),
        ];
        non_max_suppression(&mut dets, 0.45);
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].confidence, 0.9);
        assert_eq!(dets[1].confidence, 0.3);
    }

    #[test]
    fn test_keeps_low_overlap() {
        let mut dets = vec![
            boxed(0.0, 0.0, 10.0, 10.0, 0.8),
            boxed(8.0, 0.0, 18.0, 10.0, 0.7),
        ];
        non_max_suppression(&mut dets, 0.45);
        assert_eq!(dets.len(), 2);
    }
}
