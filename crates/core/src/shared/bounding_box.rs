/// Axis-aligned face box in frame pixel coordinates, `(x0, y0)` top-left and
/// `(x1, y1)` bottom-right.
///
/// Detectors may report boxes that extend past the frame edge; coordinates
/// are kept unclamped so the metadata log records what the detector saw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BoundingBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Face extent used for dominance and minimum-size checks.
    pub fn size(&self) -> f64 {
        self.width().max(self.height())
    }

    /// Integer corners, truncated toward zero.
    pub fn corners(&self) -> [i32; 4] {
        [
            self.x0 as i32,
            self.y0 as i32,
            self.x1 as i32,
            self.y1 as i32,
        ]
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x0.max(other.x0);
        let y1 = self.y0.max(other.y0);
        let x2 = self.x1.min(other.x1);
        let y2 = self.y1.min(other.y1);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let area_a = self.width() * self.height();
        let area_b = other.width() * other.height();
        inter / (area_a + area_b - inter)
    }

    /// Clamps the box to a `width` x `height` frame, returning integer pixel
    /// bounds `(x0, y0, x1, y1)` or `None` if nothing is left.
    pub fn clamped(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x0.max(0.0).min(width as f64) as u32;
        let y0 = self.y0.max(0.0).min(height as f64) as u32;
        let x1 = self.x1.max(0.0).min(width as f64) as u32;
        let y1 = self.y1.max(0.0).min(height as f64) as u32;
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1, y1))
    }
}
