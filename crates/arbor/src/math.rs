//! Math types and glam re-exports.
//!
//! Positions and sizes are [`Vec2`] in window pixels, origin top-left, y
//! pointing down. [`Rect`] is the axis-aligned box used by colliders, sprite
//! source regions and draw destinations alike.

pub use glam::{Mat4, Vec2};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle given by its min and max corners.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub const ZERO: Self = Self {
        min: Vec2::ZERO,
        max: Vec2::ZERO,
    };

    /// Build from a top-left corner and a size.
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            min: Vec2::new(x, y),
            max: Vec2::new(x + w, y + h),
        }
    }

    pub fn from_min_size(min: Vec2, size: Vec2) -> Self {
        Self { min, max: min + size }
    }

    /// Smallest rectangle enclosing every point. `None` for an empty slice.
    pub fn bounding(points: &[Vec2]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut r = Self {
            min: *first,
            max: *first,
        };
        for p in rest {
            r.min = r.min.min(*p);
            r.max = r.max.max(*p);
        }
        Some(r)
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    pub fn translated(&self, by: Vec2) -> Self {
        Self {
            min: self.min + by,
            max: self.max + by,
        }
    }

    /// Strict overlap: rectangles that only share an edge do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }

    /// Overlapping region, if any.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Rect {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        })
    }

    /// The four corners, clockwise on screen starting at the top-left.
    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }
}

/// Linear RGBA color, 0.0–1.0 per channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// From 8-bit channels.
    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::rgba(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    /// Quantized 8-bit channels, used as a cache key.
    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_edges_do_not_overlap() {
        let a = Rect::new(0.0, 0.0, 1.0, 1.0);
        let b = Rect::new(1.0, 0.0, 1.0, 1.0);
        assert!(!a.overlaps(&b));
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn intersection_is_the_shared_region() {
        let a = Rect::new(0.0, 0.0, 2.0, 2.0);
        let b = Rect::new(1.0, 1.0, 2.0, 2.0);
        assert_eq!(a.intersection(&b), Some(Rect::new(1.0, 1.0, 1.0, 1.0)));
    }

    #[test]
    fn bounding_box_of_points() {
        let pts = [Vec2::new(1.0, 3.0), Vec2::new(-2.0, 0.5), Vec2::new(4.0, 1.0)];
        let r = Rect::bounding(&pts).unwrap();
        assert_eq!(r.min, Vec2::new(-2.0, 0.5));
        assert_eq!(r.max, Vec2::new(4.0, 3.0));
        assert!(Rect::bounding(&[]).is_none());
    }

    #[test]
    fn color_quantizes_to_bytes() {
        assert_eq!(Color::rgba(1.0, 0.5, 0.0, 2.0).to_rgba8(), [255, 128, 0, 255]);
        assert_eq!(Color::from_rgba8(255, 0, 0, 255), Color::rgb(1.0, 0.0, 0.0));
    }
}
