//! Core modules - event bus and interaction context
//!
//! These modules carry no curve math and know nothing about rendering.

pub mod context;
pub mod context_events;
pub mod event_bus;

// Re-exports for convenience
pub use context::{InteractionContext, KeyPointId, KeyPointRecord, SelectOutcome};
pub use event_bus::{BoxedEvent, Event, EventBus, SubscriptionId};
