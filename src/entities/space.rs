//! Coordinate space conversions for the curve graph.
//!
//! ## Coordinate Spaces
//!
//! - **Domain space**: (frame, value) as stored on the curve keys. +Y up.
//! - **Screen space**: graph pixels, +Y down. Pan and zoom of the hosting
//!   view are applied outside (view transform), so the mapping here is
//!   linear and origin-preserving.
//!
//! Because the mapping is linear it converts lengths as well as positions:
//! a tangent handle vector can go through `convert_*`/`invert_*` just like a
//! key position, and offsets between keys survive the round trip exactly.
//!
//! ```text
//! (frame, value)
//!     |  convert_x / convert_y
//!     v
//! (x, y) screen, +Y down
//!     |  invert_x / invert_y
//!     v
//! (frame, value)
//! ```

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Domain <-> screen conversion supplied by the hosting graph.
///
/// Implementations must be injective and invertible per axis.
pub trait CoordinateSpace: Send + Sync {
    /// Frame -> screen x.
    fn convert_x(&self, frame: f32) -> f32;
    /// Value -> screen y.
    fn convert_y(&self, value: f32) -> f32;
    /// Screen x -> frame.
    fn invert_x(&self, x: f32) -> f32;
    /// Screen y -> value.
    fn invert_y(&self, y: f32) -> f32;

    /// (frame, value) -> screen point.
    fn to_screen(&self, frame: f32, value: f32) -> Vec2 {
        Vec2::new(self.convert_x(frame), self.convert_y(value))
    }

    /// Screen point -> (frame, value).
    fn to_domain(&self, p: Vec2) -> (f32, f32) {
        (self.invert_x(p.x), self.invert_y(p.y))
    }
}

/// Linear graph mapping: fixed pixels per frame and per value unit, Y flipped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearSpace {
    pub pixels_per_frame: f32,
    pub pixels_per_unit: f32,
}

impl LinearSpace {
    /// Create a mapping. Non-positive or non-finite factors fall back to 1.0
    /// so the mapping stays invertible.
    pub fn new(pixels_per_frame: f32, pixels_per_unit: f32) -> Self {
        Self {
            pixels_per_frame: sanitize_factor(pixels_per_frame),
            pixels_per_unit: sanitize_factor(pixels_per_unit),
        }
    }
}

impl Default for LinearSpace {
    fn default() -> Self {
        Self::new(10.0, 10.0)
    }
}

fn sanitize_factor(v: f32) -> f32 {
    if v.is_finite() && v > f32::EPSILON { v } else { 1.0 }
}

impl CoordinateSpace for LinearSpace {
    fn convert_x(&self, frame: f32) -> f32 {
        frame * self.pixels_per_frame
    }

    fn convert_y(&self, value: f32) -> f32 {
        // Screen +Y is down
        -value * self.pixels_per_unit
    }

    fn invert_x(&self, x: f32) -> f32 {
        x / self.pixels_per_frame
    }

    fn invert_y(&self, y: f32) -> f32 {
        -y / self.pixels_per_unit
    }
}

/// Axis-aligned screen rectangle (selection marquee, key icon bounds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl ScreenRect {
    /// Build from two arbitrary corners (drag start / drag current).
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Square centered on `center` with the given half extent.
    pub fn from_center_half_size(center: Vec2, half: f32) -> Self {
        let half = Vec2::splat(half.abs());
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Overlap test. Touching edges count as overlapping.
    pub fn intersects(&self, other: &ScreenRect) -> bool {
        !(other.max.x < self.min.x
            || other.min.x > self.max.x
            || other.max.y < self.min.y
            || other.min.y > self.max.y)
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}
