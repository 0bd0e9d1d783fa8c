//! Interaction context events.
//!
//! One event type per channel. Key points subscribe to all of them at
//! construction; the hosting panel usually listens to [`FrameSetEvent`] and
//! [`ValueSetEvent`] to keep its numeric fields in sync, and publishes
//! [`FrameManuallyEnteredEvent`] / [`ValueManuallyEnteredEvent`] when the user
//! types a number.
//!
//! Frame/value payloads are domain values, except
//! [`ActiveKeyFrameChangedEvent`] which carries the dragged key's screen x.

use crate::entities::curve::CurveId;
use crate::entities::space::ScreenRect;

/// Marquee rectangle moved (screen space).
#[derive(Clone, Copy, Debug)]
pub struct SelectionRectangleMovedEvent(pub ScreenRect);

/// The active key point set changed.
#[derive(Clone, Copy, Debug)]
pub struct ActiveKeyPointChangedEvent;

/// A main key point was designated for multi-point drag.
#[derive(Clone, Copy, Debug)]
pub struct MainKeyPointSetEvent;

/// The main key point finished moving (deferred phase).
#[derive(Clone, Copy, Debug)]
pub struct MainKeyPointMovedEvent;

/// Frame of the active key point, for external displays.
#[derive(Clone, Copy, Debug)]
pub struct FrameSetEvent(pub f32);

/// Value of the active key point, for external displays.
#[derive(Clone, Copy, Debug)]
pub struct ValueSetEvent(pub f32);

/// Frame typed in by the user.
#[derive(Clone, Copy, Debug)]
pub struct FrameManuallyEnteredEvent(pub f32);

/// Value typed in by the user.
#[derive(Clone, Copy, Debug)]
pub struct ValueManuallyEnteredEvent(pub f32);

/// A single selected key moved horizontally; siblings without a main follow.
/// Payload is screen x.
#[derive(Clone, Copy, Debug)]
pub struct ActiveKeyFrameChangedEvent(pub f32);

/// Curve control points changed outside of a tangent drag.
///
/// Key points on the named curve (or all of them when `curve` is `None`)
/// drop their cached tangent vectors and re-derive them on next query.
#[derive(Clone, Copy, Debug)]
pub struct TangentCacheInvalidatedEvent {
    pub curve: Option<CurveId>,
}

impl TangentCacheInvalidatedEvent {
    pub fn all() -> Self { Self { curve: None } }
    pub fn curve(curve: CurveId) -> Self { Self { curve: Some(curve) } }
}
