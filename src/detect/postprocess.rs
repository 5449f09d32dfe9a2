//! YOLO output decoding shared by model backends.

use anyhow::{anyhow, Result};

use crate::detect::result::{Detection, DetectionSet, ObjectClass};
use crate::geometry::BoundingBox;

/// IoU above which a lower-scoring box is suppressed.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Decode a YOLOv8/v11 detection head laid out as `[1, 4 + classes, anchors]`.
///
/// Boxes are scaled from the square `model_size` input back to the
/// `image_width` x `image_height` source and clamped to it. Scores below
/// `score_floor` are dropped; the cascade applies its own threshold later.
pub fn decode_yolo(
    output: &[f32],
    shape: &[usize],
    class: ObjectClass,
    score_floor: f32,
    model_size: u32,
    image_width: u32,
    image_height: u32,
) -> Result<Vec<Detection>> {
    let &[batch, rows, anchors] = shape else {
        return Err(anyhow!("expected 3D YOLO output, got shape {:?}", shape));
    };
    if batch != 1 || rows < 5 {
        return Err(anyhow!("unsupported YOLO output shape {:?}", shape));
    }
    if output.len() != rows * anchors {
        return Err(anyhow!(
            "YOLO output length {} does not match shape {:?}",
            output.len(),
            shape
        ));
    }

    let at = |row: usize, anchor: usize| output[row * anchors + anchor];
    let scale_x = image_width as f32 / model_size as f32;
    let scale_y = image_height as f32 / model_size as f32;
    let max_x = image_width as f32;
    let max_y = image_height as f32;

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let score = (4..rows)
            .map(|row| at(row, anchor))
            .fold(f32::NEG_INFINITY, f32::max);
        if !score.is_finite() || score < score_floor {
            continue;
        }
        let raw = BoundingBox::from_center(
            at(0, anchor),
            at(1, anchor),
            at(2, anchor),
            at(3, anchor),
        );
        let bbox = BoundingBox::new(
            (raw.x1 * scale_x).clamp(0.0, max_x),
            (raw.y1 * scale_y).clamp(0.0, max_y),
            (raw.x2 * scale_x).clamp(0.0, max_x),
            (raw.y2 * scale_y).clamp(0.0, max_y),
        );
        detections.push(Detection::new(bbox, score.min(1.0), class));
    }
    Ok(detections)
}

/// Greedy non-maximum suppression, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> DetectionSet {
    detections.sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let overlaps = kept
            .iter()
            .any(|k| k.bbox().iou(candidate.bbox()) > iou_threshold);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept.into()
}
