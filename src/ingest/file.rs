//! Local video file source.
//!
//! Decoding is delegated to FFmpeg (feature: ingest-file-ffmpeg). Without the
//! feature, opening a video file fails with a clear error; still images and
//! synthetic sources remain available.

use std::path::PathBuf;

use anyhow::{anyhow, Result};

use super::FrameSource;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g., "clips/shift_a.mp4").
    pub path: PathBuf,
    /// Expected frame rate; used to size stall timeouts.
    pub target_fps: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            target_fps: 30,
        }
    }
}

/// Open a local video file for decoding.
pub fn open_video_file(config: FileConfig) -> Result<Box<dyn FrameSource>> {
    if config.path.as_os_str().is_empty() {
        return Err(anyhow!("video file path must not be empty"));
    }
    if !config.path.is_file() {
        return Err(anyhow!("video file not found at {}", config.path.display()));
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        Ok(Box::new(super::file_ffmpeg::FfmpegFileSource::new(config)?))
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        Err(anyhow!(
            "decoding {} requires the ingest-file-ffmpeg feature",
            config.path.display()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_video_file_is_rejected() {
        let result = open_video_file(FileConfig {
            path: PathBuf::from("/nonexistent/shift.mp4"),
            ..FileConfig::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(open_video_file(FileConfig::default()).is_err());
    }
}
