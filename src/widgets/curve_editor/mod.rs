//! Curve editor widget - interactive key points of animation curves
//!
//! Key points communicate only through the shared interaction context

pub mod controls;
mod key_point;
mod session;
pub mod tangent;

pub use controls::{ControlMode, HitTarget, PointerDown, SelectionState};
pub use key_point::{BoundFn, ChangeCallback, KeyPoint, KeyPointProps, KeyPointVisual};
pub use session::GraphSession;
pub use tangent::{TangentHandles, TangentSide};
