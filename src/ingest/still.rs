//! Still-image source: one decoded frame, then end of stream.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub struct StillImageSource {
    path: PathBuf,
    pending: Option<Frame>,
    frames_captured: u64,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: None,
            frames_captured: 0,
        }
    }

    /// Source over an already decoded frame (e.g. an uploaded snapshot).
    pub fn from_frame(frame: Frame) -> Self {
        Self {
            path: PathBuf::from("<memory>"),
            pending: Some(frame),
            frames_captured: 0,
        }
    }
}

impl FrameSource for StillImageSource {
    /// Decodes the image up front, so an unreadable file fails here rather than
    /// as a read failure inside the frame loop.
    fn connect(&mut self) -> Result<()> {
        if self.pending.is_some() || self.frames_captured > 0 {
            return Ok(());
        }
        if !self.path.exists() {
            return Err(anyhow!("image not found at {}", self.path.display()));
        }
        let image = image::open(&self.path)
            .with_context(|| format!("failed to decode image {}", self.path.display()))?;
        self.pending = Some(Frame::from_image(image.into_rgb8())?);
        log::info!("StillImageSource: loaded {}", self.path.display());
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.pending.take();
        if frame.is_some() {
            self.frames_captured += 1;
        }
        Ok(frame)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            origin: self.path.display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_one_frame_then_ends() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("gate.png");
        Frame::filled(12, 10, [200, 10, 10])?.save(&path)?;

        let mut source = StillImageSource::new(&path);
        source.connect()?;
        let frame = source.next_frame()?.expect("image frame");
        assert_eq!((frame.width, frame.height), (12, 10));
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn missing_or_corrupt_image_fails_on_connect() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(StillImageSource::new(dir.path().join("nope.jpg"))
            .connect()
            .is_err());

        let bad = dir.path().join("bad.jpg");
        std::fs::write(&bad, b"not a jpeg")?;
        assert!(StillImageSource::new(&bad).connect().is_err());
        Ok(())
    }

    #[test]
    fn in_memory_frame_is_served_once() -> Result<()> {
        let mut source = StillImageSource::from_frame(Frame::filled(4, 4, [1, 2, 3])?);
        source.connect()?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }
}
