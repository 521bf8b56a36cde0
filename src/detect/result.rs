/// Axis-aligned box in frame pixel coordinates (top-left, bottom-right).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from a center point and size, the layout YOLO heads emit.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union. Zero when either box is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Clip to the pixel grid of a `width` x `height` frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        if width == 0 || height == 0 {
            return None;
        }
        let x1 = self.x1.max(0.0);
        let y1 = self.y1.max(0.0);
        let x2 = self.x2.min(width as f32 - 1.0);
        let y2 = self.y2.min(height as f32 - 1.0);
        if x1 <= x2 && y1 <= y2 {
            Some(BoundingBox { x1, y1, x2, y2 })
        } else {
            None
        }
    }

    /// Map a box from model input space back to frame space.
    #[cfg(feature = "backend-tract")]
    pub(crate) fn scale(&self, sx: f32, sy: f32) -> BoundingBox {
        BoundingBox {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }
}

/// Detector output before label resolution: class index, score, box.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(class_id: usize, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }
}

/// One normalized finding on a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    /// Score in [0, 1].
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub is_violation: bool,
}
