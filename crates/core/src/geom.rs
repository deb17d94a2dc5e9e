//! Geometric primitives: integer device rectangles and affine transforms.
//!
//! Rectangles are axis-aligned, in device pixel units, with the y axis
//! pointing down. A rectangle with non-positive width or height is
//! degenerate and carries no visible content.

/// A 6-element affine transformation matrix (a, b, c, d, e, f).
/// Transforms point (x, y) to (ax + cy + e, bx + dy + f).
pub type Matrix = (f64, f64, f64, f64, f64, f64);

/// Identity transformation matrix.
pub const MATRIX_IDENTITY: Matrix = (1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

/// Applies a matrix to a point.
#[inline]
pub fn apply_matrix_pt(m: Matrix, x: f64, y: f64) -> (f64, f64) {
    let (a, b, c, d, e, f) = m;
    (a * x + c * y + e, b * x + d * y + f)
}

/// Applies a matrix to a displacement, ignoring translation.
#[inline]
pub fn apply_matrix_delta(m: Matrix, dx: f64, dy: f64) -> (f64, f64) {
    let (a, b, c, d, _, _) = m;
    (a * dx + c * dy, b * dx + d * dy)
}

/// Axis-aligned integer rectangle in device pixels, y down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when the rectangle covers no pixels.
    pub const fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Covered area in square pixels.
    pub const fn surface(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Intersection of two rectangles, or `None` when they are disjoint
    /// on either axis (computed width or height <= 0).
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        if right > x && bottom > y {
            Some(Self::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }

    /// Grows the rectangle minimally so it covers `contained` as well.
    ///
    /// A degenerate accumulator absorbs the operand's bounds outright; a
    /// degenerate operand leaves the accumulator unchanged.
    pub fn enlarge_to_contain(&mut self, contained: &Self) {
        if self.is_degenerate() {
            *self = *contained;
        } else if !contained.is_degenerate() {
            let cur_right = self.x + self.width;
            let cur_bottom = self.y + self.height;

            if self.x > contained.x {
                self.width += self.x - contained.x;
                self.x = contained.x;
            }
            if self.y > contained.y {
                self.height += self.y - contained.y;
                self.y = contained.y;
            }

            let below = contained.y + contained.height - cur_bottom;
            if below > 0 {
                self.height += below;
            }
            let beyond = contained.x + contained.width - cur_right;
            if beyond > 0 {
                self.width += beyond;
            }
        }
    }
}
