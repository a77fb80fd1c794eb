use crate::error::{Error, Result};

/// Axis-aligned box in image pixel space, format (x1, y1, x2, y2).
///
/// Always satisfies `0 <= x1 < x2 <= width` and `0 <= y1 < y2 <= height` for
/// the image it was built against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl BoundingBox {
    /// Build a box, rejecting anything that is inverted, empty or outside
    /// a `width` x `height` image.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, width: u32, height: u32) -> Result<Self> {
        let (w, h) = (width as f32, height as f32);
        let finite = [x1, y1, x2, y2].iter().all(|v| v.is_finite());
        let ordered = x1 < x2 && y1 < y2;
        let inside = x1 >= 0.0 && y1 >= 0.0 && x2 <= w && y2 <= h;

        if finite && ordered && inside {
            Ok(Self { x1, y1, x2, y2 })
        } else {
            Err(Error::InvalidBox {
                x1,
                y1,
                x2,
                y2,
                width,
                height,
            })
        }
    }

    /// Build a box from a top-left corner plus extent.
    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32, width: u32, height: u32) -> Result<Self> {
        Self::new(x, y, x + w, y + h, width, height)
    }

    /// Clamp raw model coordinates into the image, returning `None` when
    /// nothing of the box survives.
    pub fn clamped(x1: f32, y1: f32, x2: f32, y2: f32, width: u32, height: u32) -> Option<Self> {
        let (w, h) = (width as f32, height as f32);
        Self::new(
            x1.clamp(0.0, w),
            y1.clamp(0.0, h),
            x2.clamp(0.0, w),
            y2.clamp(0.0, h),
            width,
            height,
        )
        .ok()
    }

    pub fn x1(&self) -> f32 {
        self.x1
    }

    pub fn y1(&self) -> f32 {
        self.y1
    }

    pub fn x2(&self) -> f32 {
        self.x2
    }

    pub fn y2(&self) -> f32 {
        self.y2
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Whether the box is still valid for an image of the given size.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.x2 <= width as f32 && self.y2 <= height as f32
    }

    /// Corners mapped into another coordinate space by per-axis scale factors.
    pub fn scaled(&self, scale_x: f32, scale_y: f32) -> [f32; 4] {
        [
            self.x1 * scale_x,
            self.y1 * scale_y,
            self.x2 * scale_x,
            self.y2 * scale_y,
        ]
    }
}
