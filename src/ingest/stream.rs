//! Network stream source (RTSP, HTTP).
//!
//! Decoded through a GStreamer pipeline ending in an RGB appsink
//! (feature: rtsp-gstreamer). End of stream on the bus ends the sequence; a pull
//! that times out is a read failure.

use anyhow::{anyhow, Result};
#[cfg(feature = "rtsp-gstreamer")]
use anyhow::Context;
#[cfg(feature = "rtsp-gstreamer")]
use std::time::{Duration, Instant};

use super::FrameSource;
#[cfg(feature = "rtsp-gstreamer")]
use super::SourceStats;
#[cfg(feature = "rtsp-gstreamer")]
use crate::frame::Frame;

/// Configuration for a network stream source.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Stream URL (e.g., "rtsp://192.168.1.100:554/stream").
    pub url: String,
    /// Expected frame rate; used to size pull timeouts.
    pub target_fps: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "rtsp://localhost:554/stream".to_string(),
            target_fps: 10,
        }
    }
}

/// Build the decode pipeline description for `url`.
pub fn pipeline_description(url: &str) -> Result<String> {
    let lower = url.to_ascii_lowercase();
    let head = if lower.starts_with("rtsp://") || lower.starts_with("rtsps://") {
        format!("rtspsrc location={} latency=0 ! decodebin", url)
    } else if lower.starts_with("http://") || lower.starts_with("https://") {
        format!("uridecodebin uri={}", url)
    } else {
        return Err(anyhow!("unsupported stream URL '{}'", url));
    };
    Ok(format!(
        "{} ! videoconvert ! video/x-raw,format=RGB ! \
         appsink name=appsink sync=false max-buffers=1 drop=true",
        head
    ))
}

/// Open a network stream.
pub fn open_stream(config: StreamConfig) -> Result<Box<dyn FrameSource>> {
    #[cfg(feature = "rtsp-gstreamer")]
    {
        let description = pipeline_description(&config.url)?;
        Ok(Box::new(GstreamerStreamSource::new(config, &description)?))
    }
    #[cfg(not(feature = "rtsp-gstreamer"))]
    {
        pipeline_description(&config.url)?;
        Err(anyhow!(
            "stream {} requires the rtsp-gstreamer feature",
            config.url
        ))
    }
}

#[cfg(feature = "rtsp-gstreamer")]
struct GstreamerStreamSource {
    config: StreamConfig,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    ended: bool,
    last_error: Option<String>,
}

#[cfg(feature = "rtsp-gstreamer")]
impl GstreamerStreamSource {
    fn new(config: StreamConfig, description: &str) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let pipeline = gstreamer::parse::launch(description)
            .context("build stream pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("stream pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        Ok(Self {
            config,
            pipeline,
            appsink,
            frame_count: 0,
            last_frame_at: None,
            connected_at: None,
            ended: false,
            last_error: None,
        })
    }

    fn frame_timeout(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            500
        } else {
            (1000 / self.config.target_fps).saturating_mul(4)
        };
        Duration::from_millis(base_ms.max(500) as u64)
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }

    fn poll_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    self.last_error = Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => {
                    self.ended = true;
                }
                _ => {}
            }
        }
    }
}

#[cfg(feature = "rtsp-gstreamer")]
impl FrameSource for GstreamerStreamSource {
    fn connect(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .context("set stream pipeline to Playing")?;
        self.connected_at = Some(Instant::now());
        log::info!("StreamSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.poll_bus();
        if let Some(err) = self.last_error.take() {
            return Err(anyhow!(err));
        }

        let timeout = gstreamer::ClockTime::from_mseconds(self.frame_timeout().as_millis() as u64);
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            if self.ended || self.appsink.is_eos() {
                log::info!("StreamSource: {} reached end of stream", self.config.url);
                return Ok(None);
            }
            return Err(anyhow!("stream {} stalled", self.config.url));
        };

        let frame = sample_to_frame(&sample)?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.ended {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            origin: self.config.url.clone(),
        }
    }
}

#[cfg(feature = "rtsp-gstreamer")]
impl Drop for GstreamerStreamSource {
    fn drop(&mut self) {
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("StreamSource: failed to stop pipeline: {}", err);
        }
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn sample_to_frame(sample: &gstreamer::Sample) -> Result<Frame> {
    let buffer = sample.buffer().context("stream sample missing buffer")?;
    let caps = sample.caps().context("stream sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse stream caps as video info")?;

    let width = info.width();
    let height = info.height();
    let stride = usize::try_from(info.stride()[0]).context("negative stream row stride")?;

    let map = buffer.map_readable().context("map stream buffer")?;
    Frame::from_strided_rgb(map.as_slice(), width, height, stride).context("unpack stream sample")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtsp_urls_use_rtspsrc() -> Result<()> {
        let description = pipeline_description("rtsp://10.0.0.5:554/stream1")?;
        assert!(description.starts_with("rtspsrc location=rtsp://10.0.0.5:554/stream1 latency=0"));
        assert!(description.contains("format=RGB"));
        Ok(())
    }

    #[test]
    fn http_urls_use_uridecodebin() -> Result<()> {
        let description = pipeline_description("https://cam.local/live.m3u8")?;
        assert!(description.starts_with("uridecodebin uri=https://cam.local/live.m3u8"));
        Ok(())
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(pipeline_description("ftp://cam/feed").is_err());
    }

    #[cfg(not(feature = "rtsp-gstreamer"))]
    #[test]
    fn streams_require_gstreamer_feature() {
        let err = open_stream(StreamConfig::default()).err().expect("feature error");
        assert!(err.to_string().contains("rtsp-gstreamer"));
    }

    #[cfg(not(feature = "rtsp-gstreamer"))]
    #[test]
    fn bad_stream_url_is_reported_before_feature() {
        let config = StreamConfig {
            url: "ftp://cam/feed".to_string(),
            ..StreamConfig::default()
        };
        let err = open_stream(config).err().expect("url error");
        assert!(err.to_string().contains("unsupported stream URL"));
    }
}
