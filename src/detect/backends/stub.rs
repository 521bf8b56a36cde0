use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::{BoundingBox, LabelTable, RawDetection};
use crate::frame::Frame;

/// Upper bound on detections the stub emits per frame.
const MAX_STUB_DETECTIONS: usize = 3;

/// Stub backend for demos and tests. Derives detections from a hash of the pixels.
///
/// Identical frames always yield identical detections, so runs are reproducible
/// without a model artifact.
pub struct StubBackend {
    labels: LabelTable,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::with_labels(LabelTable::ppe_default())
    }

    pub fn with_labels(labels: LabelTable) -> Self {
        Self { labels }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        if self.labels.is_empty() {
            return Ok(Vec::new());
        }
        let digest: [u8; 32] = Sha256::digest(frame.pixels()).into();

        let count = digest[0] as usize % (MAX_STUB_DETECTIONS + 1);
        let width = frame.width as f32;
        let height = frame.height as f32;

        let detections = digest[1..]
            .chunks_exact(6)
            .take(count)
            .map(|chunk| {
                let class_id = chunk[0] as usize % self.labels.len();
                let confidence = 0.25 + (chunk[1] as f32 / 255.0) * 0.74;
                let x1 = chunk[2] as f32 / 255.0 * width * 0.75;
                let y1 = chunk[3] as f32 / 255.0 * height * 0.75;
                let w = (0.05 + chunk[4] as f32 / 255.0 * 0.2) * width;
                let h = (0.05 + chunk[5] as f32 / 255.0 * 0.2) * height;
                RawDetection::new(
                    class_id,
                    confidence,
                    BoundingBox::new(x1, y1, (x1 + w).min(width), (y1 + h).min(height)),
                )
            })
            .collect();
        Ok(detections)
    }
}
