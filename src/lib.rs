//! CURVEKEYS - interactive key points for animation curve editors
//!
//! Re-exports all modules for use by binary targets.

// Core (event bus, interaction context)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;
pub mod paths;
pub mod script;
pub mod widgets;

// Re-export commonly used types from core
pub use core::context::{InteractionContext, KeyPointId};
pub use core::event_bus::{BoxedEvent, EventBus};

// Re-export entities and the editor
pub use entities::{AnimationCurve, Curve, CurveHandle, CurveId, CurveKey, LinearSpace};
pub use widgets::curve_editor::{GraphSession, KeyPoint, KeyPointProps};
