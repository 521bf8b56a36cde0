//! Decoded frames and detection overlays.
//!
//! - `Frame`: one decoded RGB24 raster handed from a source to the detection adapter.
//! - Overlay rendering: bounding boxes burned into a copy of the frame.
//!
//! Frames are never persisted by the pipeline. The only path to disk is
//! `Frame::save`, used by the daemon to write the latest annotated snapshot.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use std::path::Path;

use crate::detect::{BoundingBox, Detection};

/// Overlay color for detections classified as violations.
pub const VIOLATION_COLOR: [u8; 3] = [220, 38, 38];

/// Overlay color for compliant detections.
pub const COMPLIANT_COLOR: [u8; 3] = [34, 197, 94];

/// One decoded RGB24 frame (row-major, 3 bytes per pixel, no padding).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap tightly packed RGB24 pixels. Fails when the buffer length does not match
    /// the dimensions or when either dimension is zero.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero ({}x{})", width, height));
        }
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Copy a frame out of a decoder buffer whose RGB rows are `stride` bytes
    /// apart. Bytes past the last row are ignored.
    pub fn from_strided_rgb(data: &[u8], width: u32, height: u32, stride: usize) -> Result<Self> {
        let row_bytes = (width as usize) * 3;
        if stride < row_bytes {
            return Err(anyhow!(
                "row stride {} is shorter than a {}-pixel row",
                stride,
                width
            ));
        }
        let mut pixels = Vec::with_capacity(rgb_len(width, height)?);
        for row in 0..height as usize {
            let start = row * stride;
            let line = data
                .get(start..start + row_bytes)
                .with_context(|| format!("buffer ends before row {} of {}", row, height))?;
            pixels.extend_from_slice(line);
        }
        Self::from_rgb(pixels, width, height)
    }

    /// Solid-color frame. Used by synthetic sources and tests.
    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Result<Self> {
        let len = rgb_len(width, height)?;
        let data = color.iter().copied().cycle().take(len).collect();
        Self::from_rgb(data, width, height)
    }

    pub fn from_image(image: RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::from_rgb(image.into_raw(), width, height)
    }

    /// Decode an encoded image (JPEG/PNG) into a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode image")?;
        Self::from_image(image.into_rgb8())
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", self.width, self.height))
    }

    /// Return a copy of this frame with one box drawn per detection.
    ///
    /// Violations are outlined in `VIOLATION_COLOR`, everything else in `COMPLIANT_COLOR`.
    pub fn annotate(&self, detections: &[Detection]) -> Result<Frame> {
        let mut canvas = self.to_image()?;
        let thickness = self.stroke_width();
        for detection in detections {
            let color = if detection.is_violation {
                VIOLATION_COLOR
            } else {
                COMPLIANT_COLOR
            };
            draw_box(&mut canvas, &detection.bbox, Rgb(color), thickness);
        }
        Frame::from_image(canvas)
    }

    /// Encode and write the frame. Format follows the path extension.
    pub fn save(&self, path: &Path) -> Result<()> {
        image::save_buffer(
            path,
            &self.data,
            self.width,
            self.height,
            image::ExtendedColorType::Rgb8,
        )
        .with_context(|| format!("failed to write frame to {}", path.display()))
    }

    fn stroke_width(&self) -> u32 {
        (self.width.min(self.height) / 200).max(2)
    }
}

fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

/// Draw a hollow rectangle clipped to the canvas.
fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    let (width, height) = canvas.dimensions();
    let Some(clipped) = bbox.clip_to(width, height) else {
        return;
    };
    let x1 = clipped.x1 as u32;
    let y1 = clipped.y1 as u32;
    let x2 = (clipped.x2 as u32).min(width - 1);
    let y2 = (clipped.y2 as u32).min(height - 1);

    for t in 0..thickness {
        let top = y1.saturating_add(t).min(y2);
        let bottom = y2.saturating_sub(t).max(y1);
        let left = x1.saturating_add(t).min(x2);
        let right = x2.saturating_sub(t).max(x1);
        for x in x1..=x2 {
            canvas.put_pixel(x, top, color);
            canvas.put_pixel(x, bottom, color);
        }
        for y in y1..=y2 {
            canvas.put_pixel(left, y, color);
            canvas.put_pixel(right, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(bbox: BoundingBox, is_violation: bool) -> Detection {
        Detection {
            class_id: 0,
            class_name: if is_violation { "NO-Hardhat" } else { "Hardhat" }.to_string(),
            confidence: 0.9,
            bbox,
            is_violation,
        }
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let idx = ((y * frame.width + x) * 3) as usize;
        let px = frame.pixels();
        [px[idx], px[idx + 1], px[idx + 2]]
    }

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2).is_ok());
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2).is_err());
        assert!(Frame::from_rgb(Vec::new(), 0, 0).is_err());
    }

    #[test]
    fn strided_rows_are_packed() -> Result<()> {
        // 1x2 frame, rows padded to 4 bytes.
        let frame = Frame::from_strided_rgb(&[1, 2, 3, 0, 4, 5, 6, 0], 1, 2, 4)?;
        assert_eq!(frame.pixels(), &[1, 2, 3, 4, 5, 6]);

        let tight: Vec<u8> = (0..20).collect();
        let frame = Frame::from_strided_rgb(&tight, 2, 3, 6)?;
        assert_eq!(frame.pixels(), &tight[..18]);
        Ok(())
    }

    #[test]
    fn short_decoder_buffers_are_errors() {
        assert!(Frame::from_strided_rgb(&[0; 10], 2, 2, 6).is_err());
        assert!(Frame::from_strided_rgb(&[0; 7], 1, 2, 4).is_err());
        assert!(Frame::from_strided_rgb(&[0; 64], 4, 2, 6).is_err());
    }

    #[test]
    fn annotate_draws_violation_and_compliant_colors() -> Result<()> {
        let frame = Frame::filled(100, 100, [0, 0, 0])?;
        let detections = vec![
            detection(BoundingBox::new(10.0, 10.0, 40.0, 40.0), true),
            detection(BoundingBox::new(60.0, 60.0, 90.0, 90.0), false),
        ];

        let annotated = frame.annotate(&detections)?;

        assert_eq!(pixel(&annotated, 10, 10), VIOLATION_COLOR);
        assert_eq!(pixel(&annotated, 25, 40), VIOLATION_COLOR);
        assert_eq!(pixel(&annotated, 60, 75), COMPLIANT_COLOR);
        // interior untouched
        assert_eq!(pixel(&annotated, 25, 25), [0, 0, 0]);
        // source frame untouched
        assert_eq!(pixel(&frame, 10, 10), [0, 0, 0]);
        Ok(())
    }

    #[test]
    fn annotate_clips_boxes_outside_frame() -> Result<()> {
        let frame = Frame::filled(20, 20, [5, 5, 5])?;
        let detections = vec![
            detection(BoundingBox::new(-10.0, -10.0, 50.0, 50.0), true),
            detection(BoundingBox::new(30.0, 30.0, 40.0, 40.0), false),
        ];

        let annotated = frame.annotate(&detections)?;
        assert_eq!(pixel(&annotated, 0, 0), VIOLATION_COLOR);
        assert_eq!(pixel(&annotated, 19, 19), VIOLATION_COLOR);
        Ok(())
    }

    #[test]
    fn save_then_decode_keeps_dimensions() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snapshot.png");
        let frame = Frame::filled(8, 6, [10, 20, 30])?;
        frame.save(&path)?;

        let decoded = Frame::decode(&std::fs::read(&path)?)?;
        assert_eq!((decoded.width, decoded.height), (8, 6));
        assert_eq!(pixel(&decoded, 3, 3), [10, 20, 30]);
        Ok(())
    }
}
