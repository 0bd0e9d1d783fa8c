//! Key point selection states, drag control modes and pointer input.
//!
//! The renderer decides which part of a key point was hit and passes it in
//! as a [`HitTarget`]; the state machine never looks at visuals.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Selection state of one key point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionState {
    #[default]
    None,
    /// Member of the active set.
    Selected,
    /// Not active, but a key with the same id is active on another curve.
    Siblings,
}

/// What a pointer drag currently manipulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    #[default]
    None,
    Key,
    TangentLeft,
    TangentRight,
}

/// Part of a key point under the pointer at pointer-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitTarget {
    #[default]
    Key,
    TangentLeft,
    TangentRight,
}

impl From<HitTarget> for ControlMode {
    fn from(target: HitTarget) -> Self {
        match target {
            HitTarget::Key => ControlMode::Key,
            HitTarget::TangentLeft => ControlMode::TangentLeft,
            HitTarget::TangentRight => ControlMode::TangentRight,
        }
    }
}

/// Pointer-down input (screen space).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerDown {
    pub position: Vec2,
    /// Multi-select modifier (Ctrl) held.
    pub multi_select: bool,
    pub target: HitTarget,
}

impl PointerDown {
    pub fn key(position: Vec2) -> Self {
        Self { position, multi_select: false, target: HitTarget::Key }
    }

    pub fn multi(mut self, multi_select: bool) -> Self {
        self.multi_select = multi_select;
        self
    }

    pub fn target(mut self, target: HitTarget) -> Self {
        self.target = target;
        self
    }
}
