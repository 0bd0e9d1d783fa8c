//! Animation curve collaborator.
//!
//! Key points never own curve data. They read the ordered key list and the
//! tangent control points through [`Curve`], and push tangent edits back
//! through the same trait. Frame/value edits go through the callbacks the
//! host hands to each key point, which usually end up in
//! [`Curve::set_key_frame`] / [`Curve::set_key_value`].
//!
//! Control points are relative: `get_out_control_point(k, d)` is the value
//! delta of the outgoing tangent line `d` frames after key `k`,
//! `get_in_control_point(k, d)` the delta of the incoming line `d` frames
//! before it (measured in the same forward direction). A slope pushed back
//! with `update_*_tangent_from_control_point` therefore becomes the tangent
//! as-is.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One key on a curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveKey {
    pub frame: f32,
    pub value: f32,
    #[serde(default)]
    pub in_tangent: f32,
    #[serde(default)]
    pub out_tangent: f32,
}

impl CurveKey {
    pub fn new(frame: f32, value: f32) -> Self {
        Self {
            frame,
            value,
            in_tangent: 0.0,
            out_tangent: 0.0,
        }
    }

    pub fn with_tangents(mut self, in_tangent: f32, out_tangent: f32) -> Self {
        self.in_tangent = in_tangent;
        self.out_tangent = out_tangent;
        self
    }
}

/// Curve accessors consumed by key points.
pub trait Curve: Send + Sync {
    /// Ordered key list.
    fn keys(&self) -> &[CurveKey];

    /// Incoming tangent sample `offset` frames before `key_id`.
    fn get_in_control_point(&self, key_id: usize, offset: f32) -> f32;

    /// Outgoing tangent sample `offset` frames after `key_id`.
    fn get_out_control_point(&self, key_id: usize, offset: f32) -> f32;

    fn update_in_tangent_from_control_point(&mut self, key_id: usize, slope: f32);

    fn update_out_tangent_from_control_point(&mut self, key_id: usize, slope: f32);

    /// Persist a new frame for `key_id`. Out of range ids are ignored.
    fn set_key_frame(&mut self, key_id: usize, frame: f32);

    /// Persist a new value for `key_id`. Out of range ids are ignored.
    fn set_key_value(&mut self, key_id: usize, value: f32);
}

/// Plain in-memory curve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationCurve {
    pub keys: Vec<CurveKey>,
}

impl AnimationCurve {
    pub fn new(keys: Vec<CurveKey>) -> Self {
        Self { keys }
    }

    /// Build from (frame, value) pairs with flat tangents.
    pub fn from_points(points: &[(f32, f32)]) -> Self {
        Self::new(points.iter().map(|&(f, v)| CurveKey::new(f, v)).collect())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Curve for AnimationCurve {
    fn keys(&self) -> &[CurveKey] {
        &self.keys
    }

    fn get_in_control_point(&self, key_id: usize, offset: f32) -> f32 {
        self.keys.get(key_id).map(|k| k.in_tangent * offset).unwrap_or(0.0)
    }

    fn get_out_control_point(&self, key_id: usize, offset: f32) -> f32 {
        self.keys.get(key_id).map(|k| k.out_tangent * offset).unwrap_or(0.0)
    }

    fn update_in_tangent_from_control_point(&mut self, key_id: usize, slope: f32) {
        if let Some(key) = self.keys.get_mut(key_id) {
            key.in_tangent = slope;
        }
    }

    fn update_out_tangent_from_control_point(&mut self, key_id: usize, slope: f32) {
        if let Some(key) = self.keys.get_mut(key_id) {
            key.out_tangent = slope;
        }
    }

    fn set_key_frame(&mut self, key_id: usize, frame: f32) {
        if let Some(key) = self.keys.get_mut(key_id) {
            key.frame = frame;
        }
    }

    fn set_key_value(&mut self, key_id: usize, value: f32) {
        if let Some(key) = self.keys.get_mut(key_id) {
            key.value = value;
        }
    }
}

/// Curve identity. Compared instead of curve references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurveId(pub Uuid);

impl CurveId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CurveId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CurveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared, identity-carrying reference to a curve.
#[derive(Clone)]
pub struct CurveHandle {
    id: CurveId,
    inner: Arc<RwLock<dyn Curve>>,
}

impl fmt::Debug for CurveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurveHandle")
            .field("id", &self.id)
            .field("keys", &self.read().keys().len())
            .finish()
    }
}

impl CurveHandle {
    pub fn new<C: Curve + 'static>(curve: C) -> Self {
        Self::with_id(CurveId::new(), curve)
    }

    pub fn with_id<C: Curve + 'static>(id: CurveId, curve: C) -> Self {
        let inner: Arc<RwLock<dyn Curve>> = Arc::new(RwLock::new(curve));
        Self { id, inner }
    }

    pub fn id(&self) -> CurveId {
        self.id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, dyn Curve + 'static> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, dyn Curve + 'static> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the key list.
    pub fn snapshot(&self) -> Vec<CurveKey> {
        self.read().keys().to_vec()
    }

    pub fn key_count(&self) -> usize {
        self.read().keys().len()
    }

    pub fn key(&self, key_id: usize) -> Option<CurveKey> {
        self.read().keys().get(key_id).copied()
    }
}

impl PartialEq for CurveHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CurveHandle {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_points_are_relative() {
        let curve = AnimationCurve::new(vec![
            CurveKey::new(0.0, 1.0).with_tangents(0.5, 2.0),
            CurveKey::new(30.0, 4.0),
        ]);
        assert_eq!(curve.get_out_control_point(0, 10.0), 20.0);
        assert_eq!(curve.get_in_control_point(0, 10.0), 5.0);
        // Unknown key samples as flat
        assert_eq!(curve.get_out_control_point(9, 10.0), 0.0);
    }

    #[test]
    fn test_handle_write_through() {
        let handle = CurveHandle::new(AnimationCurve::from_points(&[(0.0, 0.0), (10.0, 1.0)]));
        handle.write().update_out_tangent_from_control_point(0, 3.0);
        handle.write().set_key_frame(1, 12.0);
        handle.write().set_key_value(1, -2.0);
        handle.write().set_key_value(7, 99.0);

        let keys = handle.snapshot();
        assert_eq!(keys[0].out_tangent, 3.0);
        assert_eq!(keys[1].frame, 12.0);
        assert_eq!(keys[1].value, -2.0);
        assert_eq!(handle.key_count(), 2);
    }

    #[test]
    fn test_handle_identity() {
        let a = CurveHandle::new(AnimationCurve::default());
        let b = CurveHandle::new(AnimationCurve::default());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_curve_serde() {
        let json = r#"{"keys":[{"frame":0.0,"value":1.0},{"frame":5.0,"value":2.0,"out_tangent":1.5}]}"#;
        let curve: AnimationCurve = serde_json::from_str(json).unwrap();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve.keys[0].in_tangent, 0.0);
        assert_eq!(curve.keys[1].out_tangent, 1.5);
    }
}
