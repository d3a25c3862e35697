use serde::{Deserialize, Serialize};

pub const DEFAULT_IOU_THRESHOLD: f64 = 0.3;

/// Axis-aligned rectangle in upright-image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_corners(corners: [f64; 4]) -> Self {
        Self::new(
            corners[0],
            corners[1],
            corners[2] - corners[0],
            corners[3] - corners[1],
        )
    }

    /// `[x1, y1, x2, y2]`.
    pub fn corners(&self) -> [f64; 4] {
        [self.x, self.y, self.right(), self.bottom()]
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn short_side(&self) -> f64 {
        self.width.min(self.height)
    }

    pub fn iou(&self, other: &Rect) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Same center, each side scaled by `factor`.
    pub fn expanded(&self, factor: f64) -> Rect {
        let (cx, cy) = self.center();
        let w = self.width * factor;
        let h = self.height * factor;
        Rect::new(cx - w / 2.0, cy - h / 2.0, w, h)
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Intersection with `[0, width) × [0, height)`, `None` when empty.
    pub fn clamped(&self, width: f64, height: f64) -> Option<Rect> {
        let x1 = self.x.max(0.0);
        let y1 = self.y.max(0.0);
        let x2 = self.right().min(width);
        let y2 = self.bottom().min(height);
        (x2 > x1 && y2 > y1).then(|| Rect::from_corners([x1, y1, x2, y2]))
    }
}
