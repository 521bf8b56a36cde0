//! Local file frame source using FFmpeg.
//!
//! Frames are decoded in-memory and scaled to RGB24. Reaching the end of the
//! container yields end of stream after the decoder has been drained.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::{Duration, Instant};

use super::file::FileConfig;
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub(crate) struct FfmpegFileSource {
    config: FileConfig,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    eof_sent: bool,
    last_error: Option<String>,
}

impl FfmpegFileSource {
    pub(crate) fn new(config: FileConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&config.path).with_context(|| {
            format!(
                "failed to open file input '{}' with ffmpeg",
                config.path.display()
            )
        })?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            config,
            input,
            stream_index,
            decoder,
            scaler,
            frame_count: 0,
            last_frame_at: None,
            connected_at: None,
            eof_sent: false,
            last_error: None,
        })
    }

    fn receive_decoded(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let frame = decoded_to_frame(&rgb_frame)?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(Some(frame))
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

impl FrameSource for FfmpegFileSource {
    fn connect(&mut self) -> Result<()> {
        self.connected_at = Some(Instant::now());
        log::info!(
            "FileSource: connected to {} (ffmpeg)",
            self.config.path.display()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.receive_decoded()? {
            return Ok(Some(frame));
        }
        if self.eof_sent {
            return Ok(None);
        }

        loop {
            let Some((stream, packet)) = self.input.packets().next() else {
                self.decoder
                    .send_eof()
                    .context("flush ffmpeg decoder")?;
                self.eof_sent = true;
                return self.receive_decoded();
            };
            if stream.index() != self.stream_index {
                continue;
            }
            if let Err(err) = self.decoder.send_packet(&packet) {
                self.last_error = Some(err.to_string());
                return Err(anyhow::Error::new(err).context("send packet to ffmpeg decoder"));
            }
            if let Some(frame) = self.receive_decoded()? {
                self.last_error = None;
                return Ok(Some(frame));
            }
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
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
            origin: self.config.path.display().to_string(),
        }
    }
}

fn decoded_to_frame(frame: &ffmpeg::frame::Video) -> Result<Frame> {
    Frame::from_strided_rgb(frame.data(0), frame.width(), frame.height(), frame.stride(0))
        .context("unpack decoded ffmpeg frame")
}
