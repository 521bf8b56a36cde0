//! Synthetic frame source (`stub://`).
//!
//! Produces a slowly changing gradient scene forever. Used for demos, smoke tests,
//! and running the monitor without a camera.

use anyhow::Result;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Frames between scene changes.
const SCENE_PERIOD: u64 = 50;

pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    frame_count: u64,
    /// Simulated scene state; bumps every `SCENE_PERIOD` frames.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.width as usize) * (self.height as usize) * 3;

        if self.frame_count % SCENE_PERIOD == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    /// Synthetic sources are always "connected".
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to stub://{} ({}x{})",
            self.name,
            self.width,
            self.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::from_rgb(pixels, self.width, self.height).map(Some)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            origin: format!("stub://{}", self.name),
        }
    }
}
