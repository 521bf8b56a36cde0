//! Frame sources.
//!
//! Every input the monitor accepts is normalized to the same contract: a sequence of
//! decoded RGB frames that may end.
//!
//! - Still images (jpg/png): one frame, then end of stream
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Local camera devices (feature: ingest-v4l2)
//! - Network streams, `rtsp://` and `http(s)://` (feature: rtsp-gstreamer)
//! - Synthetic `stub://` source (always available)
//!
//! `next_frame` returns `Ok(None)` at end of stream. An `Err` is a read failure the
//! caller may tolerate a bounded number of times in a row.

use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::config::SourceSettings;
use crate::frame::Frame;

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod scripted;
pub mod still;
pub mod stream;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use still::StillImageSource;
pub use scripted::ScriptedSource;
pub use synthetic::SyntheticSource;

/// A pull-based sequence of frames.
pub trait FrameSource {
    /// Open the underlying device, file, or stream.
    fn connect(&mut self) -> Result<()>;

    /// Next decoded frame, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    /// Path, device, or URL the source reads from.
    pub origin: String,
}

/// Where frames come from, parsed from a single operator-supplied string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    Image(PathBuf),
    VideoFile(PathBuf),
    /// Local camera device node, e.g. `/dev/video0`.
    Camera(String),
    /// Network stream URL (`rtsp://`, `rtsps://`, `http://`, `https://`).
    Stream(String),
    /// Synthetic frames, `stub://<name>`.
    Synthetic(String),
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const STREAM_SCHEMES: &[&str] = &["rtsp://", "rtsps://", "http://", "https://"];

impl SourceSpec {
    /// Parse a source string.
    ///
    /// - `stub://name` -> synthetic
    /// - `rtsp://...`, `http(s)://...` -> network stream
    /// - `0`, `1`, ... -> camera `/dev/video<N>`; `/dev/video*` -> camera
    /// - `*.jpg`, `*.jpeg`, `*.png` -> still image
    /// - any other local path -> video file
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(anyhow!("frame source must not be empty"));
        }
        if let Some(name) = value.strip_prefix("stub://") {
            return Ok(SourceSpec::Synthetic(name.to_string()));
        }
        let lower = value.to_ascii_lowercase();
        if STREAM_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            return Ok(SourceSpec::Stream(value.to_string()));
        }
        if value.contains("://") {
            return Err(anyhow!("unsupported frame source scheme in '{}'", value));
        }
        if value.chars().all(|c| c.is_ascii_digit()) {
            let index: u32 = value
                .parse()
                .map_err(|_| anyhow!("invalid camera index '{}'", value))?;
            return Ok(SourceSpec::Camera(format!("/dev/video{}", index)));
        }
        if value.starts_with("/dev/video") {
            return Ok(SourceSpec::Camera(value.to_string()));
        }
        let path = PathBuf::from(value);
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            Ok(SourceSpec::Image(path))
        } else {
            Ok(SourceSpec::VideoFile(path))
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Image(path) => write!(f, "image {}", path.display()),
            SourceSpec::VideoFile(path) => write!(f, "video file {}", path.display()),
            SourceSpec::Camera(device) => write!(f, "camera {}", device),
            SourceSpec::Stream(url) => write!(f, "stream {}", url),
            SourceSpec::Synthetic(name) => write!(f, "synthetic stub://{}", name),
        }
    }
}

/// Build and connect the source described by `spec`.
///
/// Failures here (missing file, unsupported input, unreachable stream) halt only
/// the run that asked for the source.
pub fn open_source(spec: &SourceSpec, settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    let mut source: Box<dyn FrameSource> = match spec {
        SourceSpec::Synthetic(name) => Box::new(SyntheticSource::new(
            name.clone(),
            settings.width,
            settings.height,
        )),
        SourceSpec::Image(path) => Box::new(StillImageSource::new(path.clone())),
        SourceSpec::VideoFile(path) => file::open_video_file(file::FileConfig {
            path: path.clone(),
            target_fps: settings.target_fps,
        })?,
        SourceSpec::Stream(url) => stream::open_stream(stream::StreamConfig {
            url: url.clone(),
            target_fps: settings.target_fps,
        })?,
        SourceSpec::Camera(device) => open_camera(device, settings)?,
    };
    source.connect()?;
    Ok(source)
}

#[cfg(feature = "ingest-v4l2")]
fn open_camera(device: &str, settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(v4l2::V4l2Source::new(v4l2::V4l2Config {
        device: device.to_string(),
        target_fps: settings.target_fps,
        width: settings.width,
        height: settings.height,
    })))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_camera(device: &str, _settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "camera {} requires the ingest-v4l2 feature (local cameras only work when running on the device host)",
        device
    ))
}
