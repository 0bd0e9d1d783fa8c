//! Entities module - curve data and the graph coordinate space

pub mod curve;
pub mod space;

pub use curve::{AnimationCurve, Curve, CurveHandle, CurveId, CurveKey};
pub use space::{CoordinateSpace, LinearSpace, ScreenRect};
