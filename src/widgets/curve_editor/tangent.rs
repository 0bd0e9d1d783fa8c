//! Tangent handle vectors: derivation from curve control points and
//! renormalized dragging.
//!
//! Handle vectors live in screen space. Their lengths at derivation time are
//! kept as fixed radii: every drag re-projects the handle onto that radius,
//! so the slope follows the pointer's direction, not its distance.

use glam::Vec2;
use log::trace;

use crate::entities::curve::Curve;
use crate::entities::space::CoordinateSpace;

/// Below this, a vector or a domain frame span counts as zero.
const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TangentSide {
    In,
    Out,
}

/// Cached tangent vectors of one key point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TangentHandles {
    pub in_vec: Vec2,
    pub out_vec: Vec2,
    pub stored_length_in: f32,
    pub stored_length_out: f32,
}

impl TangentHandles {
    /// Derive handles for `key_id` from the curve's current control points.
    ///
    /// Spans are a third of the distance to the neighbor key; a missing
    /// neighbor counts as frame 0. The in-vector points backwards.
    /// Returns `None` for an unknown key.
    pub fn derive(curve: &dyn Curve, key_id: usize, space: &dyn CoordinateSpace) -> Option<Self> {
        let keys = curve.keys();
        let current = keys.get(key_id)?.frame;
        let prev = key_id
            .checked_sub(1)
            .and_then(|i| keys.get(i))
            .map(|k| k.frame)
            .unwrap_or(0.0);
        let next = keys.get(key_id + 1).map(|k| k.frame).unwrap_or(0.0);

        let in_frame_length = (current - prev) / 3.0;
        let out_frame_length = (next - current) / 3.0;

        let in_cp = curve.get_in_control_point(key_id, in_frame_length);
        let out_cp = curve.get_out_control_point(key_id, out_frame_length);

        let in_vec = Vec2::new(space.convert_x(-in_frame_length), space.convert_y(-in_cp));
        let out_vec = Vec2::new(space.convert_x(out_frame_length), space.convert_y(out_cp));

        Some(Self {
            in_vec,
            out_vec,
            stored_length_in: in_vec.length(),
            stored_length_out: out_vec.length(),
        })
    }

    pub fn vector(&self, side: TangentSide) -> Vec2 {
        match side {
            TangentSide::In => self.in_vec,
            TangentSide::Out => self.out_vec,
        }
    }

    pub fn stored_length(&self, side: TangentSide) -> f32 {
        match side {
            TangentSide::In => self.stored_length_in,
            TangentSide::Out => self.stored_length_out,
        }
    }

    /// Add a screen-space delta to one handle, renormalize it to its stored
    /// length and return the resulting domain slope.
    ///
    /// A delta that would collapse the handle to zero is ignored. `None`
    /// means "no slope change" (degenerate handle or zero frame span).
    pub fn drag(&mut self, side: TangentSide, delta: Vec2, space: &dyn CoordinateSpace) -> Option<f32> {
        let stored = self.stored_length(side);
        let vec = match side {
            TangentSide::In => &mut self.in_vec,
            TangentSide::Out => &mut self.out_vec,
        };

        let moved = *vec + delta;
        if moved.length() < EPSILON {
            return None;
        }
        *vec = moved.normalize() * stored;
        trace!("tangent {:?} -> {:?} (radius {})", side, *vec, stored);

        slope_from_vector(*vec, space)
    }

    /// Handle endpoint relative to the key, at a fixed rendered length.
    pub fn endpoint(&self, side: TangentSide, rendered_length: f32) -> Vec2 {
        self.vector(side).normalize_or_zero() * rendered_length
    }
}

/// Domain slope of a screen-space vector: `invert_y(v.y) / invert_x(v.x)`.
pub fn slope_from_vector(vec: Vec2, space: &dyn CoordinateSpace) -> Option<f32> {
    let frame = space.invert_x(vec.x);
    let value = space.invert_y(vec.y);
    if !frame.is_finite() || frame.abs() < EPSILON {
        return None;
    }
    let slope = value / frame;
    slope.is_finite().then_some(slope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::curve::{AnimationCurve, CurveKey};
    use crate::entities::space::LinearSpace;

    fn curve() -> AnimationCurve {
        AnimationCurve::new(vec![
            CurveKey::new(0.0, 0.0).with_tangents(0.0, 1.0),
            CurveKey::new(30.0, 10.0).with_tangents(0.5, -2.0),
            CurveKey::new(60.0, 0.0),
        ])
    }

    #[test]
    fn test_derive_middle_key() {
        let space = LinearSpace::new(2.0, 4.0);
        let handles = TangentHandles::derive(&curve(), 1, &space).unwrap();

        // 10 frames each side, in-handle points back
        assert_eq!(handles.out_vec, Vec2::new(20.0, 80.0));
        assert_eq!(handles.in_vec, Vec2::new(-20.0, 20.0));
        assert!((handles.stored_length_out - handles.out_vec.length()).abs() < 1e-5);

        // Slopes recover the curve tangents
        assert!((slope_from_vector(handles.out_vec, &space).unwrap() + 2.0).abs() < 1e-5);
        assert!((slope_from_vector(handles.in_vec, &space).unwrap() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_derive_first_key_has_degenerate_in_handle() {
        let space = LinearSpace::default();
        let handles = TangentHandles::derive(&curve(), 0, &space).unwrap();
        assert_eq!(handles.stored_length_in, 0.0);
        assert!(handles.stored_length_out > 0.0);
        assert!(TangentHandles::derive(&curve(), 7, &space).is_none());
    }

    #[test]
    fn test_drag_keeps_stored_length() {
        let space = LinearSpace::new(2.0, 4.0);
        let mut handles = TangentHandles::derive(&curve(), 1, &space).unwrap();
        let radius = handles.stored_length_out;

        for delta in [Vec2::new(500.0, -3.0), Vec2::new(-0.1, 0.2), Vec2::new(0.0, 1e4)] {
            handles.drag(TangentSide::Out, delta, &space);
            assert!((handles.out_vec.length() - radius).abs() < 1e-3 * radius.max(1.0));
        }
    }

    #[test]
    fn test_drag_slope_follows_direction() {
        let space = LinearSpace::new(1.0, 1.0);
        let mut handles = TangentHandles {
            in_vec: Vec2::new(-10.0, 0.0),
            out_vec: Vec2::new(10.0, 0.0),
            stored_length_in: 10.0,
            stored_length_out: 10.0,
        };
        // Pointer up by 10 px (screen -y) => value rises, slope +1
        let slope = handles.drag(TangentSide::Out, Vec2::new(0.0, -10.0), &space).unwrap();
        assert!((slope - 1.0).abs() < 1e-5);
        assert_eq!(handles.in_vec, Vec2::new(-10.0, 0.0));
    }

    #[test]
    fn test_vertical_handle_gives_no_slope() {
        let space = LinearSpace::new(1.0, 1.0);
        let mut handles = TangentHandles {
            in_vec: Vec2::new(-1.0, 0.0),
            out_vec: Vec2::new(1.0, 0.0),
            stored_length_in: 1.0,
            stored_length_out: 1.0,
        };
        assert_eq!(handles.drag(TangentSide::Out, Vec2::new(-1.0, 5.0), &space), None);
        // Collapsing delta is ignored
        let before = handles.in_vec;
        assert_eq!(handles.drag(TangentSide::In, Vec2::new(1.0, 0.0), &space), None);
        assert_eq!(handles.in_vec, before);
    }

    #[test]
    fn test_endpoint_uses_rendered_length() {
        let handles = TangentHandles {
            in_vec: Vec2::new(-3.0, 4.0),
            out_vec: Vec2::ZERO,
            stored_length_in: 5.0,
            stored_length_out: 0.0,
        };
        let end = handles.endpoint(TangentSide::In, 100.0);
        assert!((end.x + 60.0).abs() < 1e-3);
        assert!((end.y - 80.0).abs() < 1e-3);
        assert!((end.length() - 100.0).abs() < 1e-3);
        assert_eq!(handles.endpoint(TangentSide::Out, 100.0), Vec2::ZERO);
    }
}
