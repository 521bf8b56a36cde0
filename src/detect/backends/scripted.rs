use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::{BoundingBox, LabelTable, RawDetection};
use crate::frame::Frame;

enum Step {
    Detections(Vec<RawDetection>),
    Failure(String),
}

/// Backend that replays a fixed script, one step per `detect` call.
///
/// Once the script is exhausted every frame yields no detections.
pub struct ScriptedBackend {
    labels: LabelTable,
    steps: VecDeque<Step>,
}

impl ScriptedBackend {
    pub fn new(labels: LabelTable) -> Self {
        Self {
            labels,
            steps: VecDeque::new(),
        }
    }

    /// Queue the detections for the next frame.
    pub fn then_detect(mut self, detections: Vec<RawDetection>) -> Self {
        self.steps.push_back(Step::Detections(detections));
        self
    }

    /// Queue detections given as `(class name, confidence)`; boxes are placeholders.
    ///
    /// Panics if a name is not in the label table.
    pub fn then_detect_named(self, named: &[(&str, f32)]) -> Self {
        let detections = named
            .iter()
            .map(|(name, confidence)| {
                let class_id = self
                    .labels
                    .names()
                    .position(|label| label == *name)
                    .unwrap_or_else(|| panic!("label {name} not in table"));
                RawDetection::new(class_id, *confidence, BoundingBox::new(0.0, 0.0, 1.0, 1.0))
            })
            .collect();
        self.then_detect(detections)
    }

    /// Queue an inference failure for the next frame.
    pub fn then_fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push_back(Step::Failure(message.into()));
        self
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
        match self.steps.pop_front() {
            Some(Step::Detections(detections)) => Ok(detections),
            Some(Step::Failure(message)) => Err(anyhow!(message)),
            None => Ok(Vec::new()),
        }
    }
}
