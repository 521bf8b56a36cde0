//! Detection adapter: one model call per frame, label resolution, violation
//! classification, logging, overlay.

use anyhow::Result;

use crate::detect::{Detection, DetectorBackend, ViolationRule};
use crate::frame::Frame;
use crate::violation_log::{ViolationLogStore, ViolationRecord};

/// Result of processing one frame.
#[derive(Clone, Debug)]
pub struct FrameOutcome {
    /// Copy of the input with detection boxes burned in.
    pub annotated: Frame,
    pub detections: Vec<Detection>,
    /// Violations found on this frame only.
    pub violation_count: usize,
}

type ViolationObserver = Box<dyn FnMut(&ViolationRecord) + Send>;

/// Owns the detector backend and the violation log for one frame loop.
pub struct DetectionAdapter<S> {
    backend: Box<dyn DetectorBackend>,
    rule: ViolationRule,
    store: S,
    observer: Option<ViolationObserver>,
}

impl<S: ViolationLogStore> DetectionAdapter<S> {
    pub fn new(backend: Box<dyn DetectorBackend>, rule: ViolationRule, store: S) -> Self {
        Self {
            backend,
            rule,
            store,
            observer: None,
        }
    }

    /// Called once per logged violation, after the record has been appended.
    pub fn with_observer(
        mut self,
        observer: impl FnMut(&ViolationRecord) + Send + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn backend(&self) -> &dyn DetectorBackend {
        self.backend.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run the detector once, log every violation, and return the annotated frame.
    ///
    /// Inference failures and log write failures propagate; nothing is retried.
    /// Violations found before a failing append stay logged.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameOutcome> {
        let raw = self.backend.detect(frame)?;

        let mut detections = Vec::with_capacity(raw.len());
        let mut violation_count = 0;
        for det in raw {
            let class_name = self.backend.labels().resolve(det.class_id).into_owned();
            let is_violation = self.rule.is_violation(&class_name);
            if is_violation {
                let record = ViolationRecord::now(class_name.as_str(), f64::from(det.confidence));
                self.store.append(&record)?;
                log::warn!(
                    "violation detected: type={} confidence={} time={}",
                    record.violation_type,
                    record.confidence_field(),
                    record.timestamp_field()
                );
                if let Some(observer) = self.observer.as_mut() {
                    observer(&record);
                }
                violation_count += 1;
            }
            detections.push(Detection {
                class_id: det.class_id,
                class_name,
                confidence: det.confidence,
                bbox: det.bbox,
                is_violation,
            });
        }

        let annotated = frame.annotate(&detections)?;
        Ok(FrameOutcome {
            annotated,
            detections,
            violation_count,
        })
    }
}
