use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::{BoundingBox, LabelTable, RawDetection};
use crate::frame::Frame;

/// Tract-based backend for YOLOv8-style ONNX exports.
///
/// Expects a single `[1, 3, S, S]` f32 input and a `[1, 4 + classes, anchors]` output
/// where the first four rows are `cx, cy, w, h` in input pixels.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    labels: LabelTable,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, labels: LabelTable, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            labels,
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        })
    }

    /// Override the default confidence and NMS IoU thresholds.
    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = frame.to_image()?;
        let resized = imageops::resize(&image, self.input_size, self.input_size, FilterType::Triangle);
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<RawDetection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        let view = view
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("YOLO output is not rank 3")?;
        let classes = shape[1] - 4;
        let anchors = shape[2];
        if classes != self.labels.len() {
            log::warn!(
                "model reports {} classes but label table has {}",
                classes,
                self.labels.len()
            );
        }

        let sx = frame.width as f32 / self.input_size as f32;
        let sy = frame.height as f32 / self.input_size as f32;

        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, score) = (0..classes)
                .map(|c| (c, view[[0, 4 + c, anchor]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
            if !score.is_finite() || score < self.confidence_threshold {
                continue;
            }
            let bbox = BoundingBox::from_center(
                view[[0, 0, anchor]],
                view[[0, 1, anchor]],
                view[[0, 2, anchor]],
                view[[0, 3, anchor]],
            )
            .scale(sx, sy);
            candidates.push(RawDetection::new(class_id, score.min(1.0), bbox));
        }

        Ok(non_max_suppression(
            candidates,
            self.iou_threshold,
            self.max_detections,
        ))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.input_size, self.input_size, [114, 114, 114])?;
        self.detect(&blank).map(|_| ())
    }
}

/// Class-aware greedy NMS, highest score first.
fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<RawDetection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_keeps_best_per_overlapping_class() {
        let a = RawDetection::new(0, 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let b = RawDetection::new(0, 0.8, BoundingBox::new(1.0, 1.0, 11.0, 11.0));
        let c = RawDetection::new(1, 0.7, BoundingBox::new(1.0, 1.0, 11.0, 11.0));
        let kept = non_max_suppression(vec![b, c.clone(), a.clone()], 0.45, 10);
        assert_eq!(kept, vec![a, c]);
    }
}
