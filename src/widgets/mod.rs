//! UI Widgets - interaction components
//!
//! Each widget is self-contained and communicates via EventBus

pub mod curve_editor;
