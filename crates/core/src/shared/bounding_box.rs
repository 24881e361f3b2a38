/// An axis-aligned detection rectangle in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Detections for one frame, in a deterministic order.
pub type DetectionSet = Vec<BoundingBox>;

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Whether two boxes describe the same object: every edge lies within
    /// `eps` times the mean of the smaller sides.
    pub fn is_similar(&self, other: &BoundingBox, eps: f64) -> bool {
        let delta = eps
            * (self.width.min(other.width) as f64 + self.height.min(other.height) as f64)
            * 0.5;
        ((self.x - other.x).abs() as f64) <= delta
            && ((self.y - other.y).abs() as f64) <= delta
            && ((self.right() - other.right()).abs() as f64) <= delta
            && ((self.bottom() - other.bottom()).abs() as f64) <= delta
    }

    /// Whether `self` fits inside `outer` grown by `dx`/`dy` on each side.
    pub fn is_inside(&self, outer: &BoundingBox, dx: i32, dy: i32) -> bool {
        self.x >= outer.x - dx
            && self.y >= outer.y - dy
            && self.right() <= outer.right() + dx
            && self.bottom() <= outer.bottom() + dy
    }
}
