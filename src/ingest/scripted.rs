//! Scripted frame source for tests: replays frames, read failures, health
//! changes, and end of stream.

use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

enum Step {
    Frame(Frame),
    Failure(String),
    /// Applied when reached; does not consume a read.
    Health(bool),
}

/// Replays a fixed script. Ends the stream once the script is exhausted.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    frames_captured: u64,
    reads: u64,
    healthy: bool,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            frames_captured: 0,
            reads: 0,
            healthy: true,
        }
    }

    pub fn then_frame(mut self, frame: Frame) -> Self {
        self.steps.push_back(Step::Frame(frame));
        self
    }

    /// Queue `count` copies of `frame`.
    pub fn then_frames(mut self, frame: &Frame, count: usize) -> Self {
        for _ in 0..count {
            self.steps.push_back(Step::Frame(frame.clone()));
        }
        self
    }

    /// Queue `count` consecutive read failures.
    pub fn then_failures(mut self, count: usize) -> Self {
        for i in 0..count {
            self.steps
                .push_back(Step::Failure(format!("scripted read failure {}", i + 1)));
        }
        self
    }

    /// Report unhealthy from the next read on.
    pub fn then_unhealthy(mut self) -> Self {
        self.steps.push_back(Step::Health(false));
        self
    }

    pub fn then_healthy(mut self) -> Self {
        self.steps.push_back(Step::Health(true));
        self
    }

    /// Total `next_frame` calls, successful or not.
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for ScriptedSource {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.reads += 1;
        loop {
            match self.steps.pop_front() {
                Some(Step::Frame(frame)) => {
                    self.frames_captured += 1;
                    return Ok(Some(frame));
                }
                Some(Step::Failure(message)) => return Err(anyhow!(message)),
                Some(Step::Health(healthy)) => self.healthy = healthy,
                None => return Ok(None),
            }
        }
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            origin: "scripted".to_string(),
        }
    }
}
