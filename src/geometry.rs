//! Integer rectangles in pixel coordinates.

use serde::Serialize;

/// An axis-aligned pixel rectangle.
///
/// `x`/`y` may be negative: mosaic acquisitions place tiles relative to a
/// stage origin that is not necessarily the top-left tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct IntRect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl IntRect {
    pub const fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Exclusive right edge.
    #[inline]
    pub fn right(&self) -> i64 {
        self.x as i64 + self.w as i64
    }

    /// Exclusive bottom edge.
    #[inline]
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.h as i64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Number of pixels covered.
    #[inline]
    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    /// True if the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &IntRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && (self.x as i64) < other.right()
            && (other.x as i64) < self.right()
            && (self.y as i64) < other.bottom()
            && (other.y as i64) < self.bottom()
    }

    /// The shared area, or `None` if the rectangles are disjoint.
    pub fn intersection(&self, other: &IntRect) -> Option<IntRect> {
        if !self.intersects(other) {
            return None;
        }

        let x0 = (self.x as i64).max(other.x as i64);
        let y0 = (self.y as i64).max(other.y as i64);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());

        Some(IntRect::new(
            x0 as i32,
            y0 as i32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        ))
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &IntRect) -> IntRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }

        let x0 = (self.x as i64).min(other.x as i64);
        let y0 = (self.y as i64).min(other.y as i64);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());

        IntRect::new(x0 as i32, y0 as i32, (x1 - x0) as u32, (y1 - y0) as u32)
    }

    /// Map a rectangle given at full resolution onto a level with the given
    /// downsample, rounding outward so every touched pixel is covered.
    pub fn downscaled(&self, downsample: f64) -> IntRect {
        if downsample <= 1.0 {
            return *self;
        }

        let x0 = (self.x as f64 / downsample).floor();
        let y0 = (self.y as f64 / downsample).floor();
        let x1 = (self.right() as f64 / downsample).ceil();
        let y1 = (self.bottom() as f64 / downsample).ceil();

        IntRect::new(
            x0 as i32,
            y0 as i32,
            (x1 - x0).max(0.0) as u32,
            (y1 - y0).max(0.0) as u32,
        )
    }
}

impl std::fmt::Display for IntRect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},{}x{})", self.x, self.y, self.w, self.h)
    }
}

impl std::str::FromStr for IntRect {
    type Err = String;

    /// Parse `x,y,w,h`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!("expected x,y,w,h but got '{}'", s));
        }

        let x = parts[0].parse::<i32>().map_err(|e| e.to_string())?;
        let y = parts[1].parse::<i32>().map_err(|e| e.to_string())?;
        let w = parts[2].parse::<u32>().map_err(|e| e.to_string())?;
        let h = parts[3].parse::<u32>().map_err(|e| e.to_string())?;

        Ok(IntRect::new(x, y, w, h))
    }
}
