//! Interaction context shared by all key points of one editing session.
//!
//! Holds:
//! - the active key point set (insertion order = selection order)
//! - the optional main key point used as anchor for multi-point drags
//! - a registry of per-point records (key id, curve, last committed position)
//! - the event bus carrying the context channels
//!
//! Key points are referenced by [`KeyPointId`] only. The registry is what
//! lets a point look at the main point's position or at the other active
//! points' key ids without touching their state.
//!
//! Invariant (checked after every mutation in debug builds):
//! `main.is_some()` implies `active.len() > 1` and `main ∈ active`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use glam::Vec2;
use indexmap::{IndexMap, IndexSet};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event_bus::{Event, EventBus, SubscriptionId};
use crate::entities::curve::CurveId;

/// Stable opaque key point identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyPointId(pub Uuid);

impl KeyPointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for KeyPointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for KeyPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the context knows about a registered key point.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPointRecord {
    pub key_id: usize,
    pub curve: CurveId,
    pub channel: String,
    /// Last committed screen position.
    pub position: Vec2,
}

/// Result of [`InteractionContext::select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectOutcome {
    /// The point is a member of the active set afterwards.
    pub active: bool,
    /// The point became main; `MainKeyPointSetEvent` must be fired.
    pub main_set: bool,
}

#[derive(Default)]
struct ContextState {
    active: IndexSet<KeyPointId>,
    main: Option<KeyPointId>,
    records: IndexMap<KeyPointId, KeyPointRecord>,
}

impl ContextState {
    /// Drop `main` when it no longer satisfies the invariant.
    fn normalize_main(&mut self) {
        if let Some(main) = self.main {
            if self.active.len() < 2 || !self.active.contains(&main) {
                self.main = None;
            }
        }
    }

    fn check_invariants(&self) {
        if let Some(main) = self.main {
            debug_assert!(self.active.len() > 1, "main key point set with <2 active points");
            debug_assert!(self.active.contains(&main), "main key point not in active set");
        }
    }
}

/// Session-scoped interaction context.
///
/// Created once per editing session and passed by `Arc` to every key point.
pub struct InteractionContext {
    state: Mutex<ContextState>,
    bus: EventBus,
}

impl Default for InteractionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InteractionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("InteractionContext")
            .field("active", &state.active.len())
            .field("main", &state.main)
            .field("registered", &state.records.len())
            .field("bus", &self.bus)
            .finish()
    }
}

impl InteractionContext {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ContextState::default()),
            bus: EventBus::new(),
        }
    }

    /// Convenience: new context already wrapped for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========== Channels ==========

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe<E, F>(&self, callback: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.bus.subscribe::<E, F>(callback)
    }

    /// Idempotent; unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.bus.unsubscribe(id);
    }

    pub fn emit<E: Event>(&self, event: E) {
        self.bus.emit(event);
    }

    /// Second phase of a drag update: deliver everything queued with
    /// `defer`. Call once per input batch, after all positions are updated.
    pub fn flush_deferred(&self) -> usize {
        self.bus.flush_deferred()
    }

    // ========== Registry ==========

    pub(crate) fn register(&self, id: KeyPointId, record: KeyPointRecord) {
        self.lock().records.insert(id, record);
    }

    /// Forget a point. Returns true if it was in the active set.
    pub(crate) fn unregister(&self, id: KeyPointId) -> bool {
        let mut state = self.lock();
        state.records.shift_remove(&id);
        let was_active = state.active.shift_remove(&id);
        state.normalize_main();
        state.check_invariants();
        was_active
    }

    pub(crate) fn update_position(&self, id: KeyPointId, position: Vec2) {
        if let Some(record) = self.lock().records.get_mut(&id) {
            record.position = position;
        }
    }

    pub fn record(&self, id: KeyPointId) -> Option<KeyPointRecord> {
        self.lock().records.get(&id).cloned()
    }

    pub fn position_of(&self, id: KeyPointId) -> Option<Vec2> {
        self.lock().records.get(&id).map(|r| r.position)
    }

    pub fn registered_len(&self) -> usize {
        self.lock().records.len()
    }

    // ========== Selection queries ==========

    /// Active key points in selection order.
    pub fn active_key_points(&self) -> Vec<KeyPointId> {
        self.lock().active.iter().copied().collect()
    }

    pub fn active_len(&self) -> usize {
        self.lock().active.len()
    }

    pub fn is_active(&self, id: KeyPointId) -> bool {
        self.lock().active.contains(&id)
    }

    pub fn main_key_point(&self) -> Option<KeyPointId> {
        self.lock().main
    }

    /// Main key point together with its committed position.
    pub fn main_position(&self) -> Option<(KeyPointId, Vec2)> {
        let state = self.lock();
        let main = state.main?;
        state.records.get(&main).map(|r| (main, r.position))
    }

    /// True if an active point other than `id` shares its key id on a
    /// different curve.
    pub fn has_active_sibling(&self, id: KeyPointId, key_id: usize, curve: CurveId) -> bool {
        let state = self.lock();
        state.active.iter().any(|other| {
            *other != id
                && state
                    .records
                    .get(other)
                    .is_some_and(|r| r.key_id == key_id && r.curve != curve)
        })
    }

    // ========== Selection mutations ==========

    /// Pointer-down selection.
    ///
    /// - inactive point: exclusive select unless `multi`, then append; with
    ///   more than one active point it becomes main.
    /// - active point: `multi` toggles it off; otherwise it becomes main when
    ///   more than one point is active.
    pub fn select(&self, id: KeyPointId, multi: bool) -> SelectOutcome {
        let mut state = self.lock();
        let mut main_set = false;

        if !state.active.contains(&id) {
            if !multi {
                state.active.clear();
            }
            state.active.insert(id);
            if state.active.len() > 1 {
                state.main = Some(id);
                main_set = true;
            } else {
                state.main = None;
            }
        } else if multi {
            state.active.shift_remove(&id);
            state.main = None;
        } else if state.active.len() > 1 {
            state.main = Some(id);
            main_set = true;
        } else {
            state.main = None;
        }

        state.check_invariants();
        let active = state.active.contains(&id);
        debug!(
            "select {} (multi={}): active={} main_set={} total={}",
            id, multi, active, main_set, state.active.len()
        );
        SelectOutcome { active, main_set }
    }

    /// Marquee add. Returns true if membership changed.
    pub fn activate(&self, id: KeyPointId) -> bool {
        let mut state = self.lock();
        let inserted = state.active.insert(id);
        state.check_invariants();
        inserted
    }

    /// Marquee remove. Returns true if membership changed.
    pub fn deactivate(&self, id: KeyPointId) -> bool {
        let mut state = self.lock();
        let removed = state.active.shift_remove(&id);
        state.normalize_main();
        state.check_invariants();
        removed
    }

    /// Empty the active set. Returns true if anything was active.
    pub fn clear_selection(&self) -> bool {
        let mut state = self.lock();
        let had_any = !state.active.is_empty();
        state.active.clear();
        state.main = None;
        had_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(ctx: &InteractionContext, key_id: usize, curve: CurveId) -> KeyPointId {
        let id = KeyPointId::new();
        ctx.register(
            id,
            KeyPointRecord {
                key_id,
                curve,
                channel: "x".into(),
                position: Vec2::ZERO,
            },
        );
        id
    }

    fn assert_main_invariant(ctx: &InteractionContext) {
        if let Some(main) = ctx.main_key_point() {
            assert!(ctx.active_len() > 1);
            assert!(ctx.is_active(main));
        }
    }

    #[test]
    fn test_exclusive_select_clears_others() {
        let ctx = InteractionContext::new();
        let curve = CurveId::new();
        let (a, b, c) = (register(&ctx, 0, curve), register(&ctx, 1, curve), register(&ctx, 2, curve));

        ctx.select(a, false);
        ctx.select(b, true);
        assert_eq!(ctx.active_key_points(), vec![a, b]);

        let outcome = ctx.select(c, false);
        assert_eq!(ctx.active_key_points(), vec![c]);
        assert!(!outcome.main_set);
        assert_eq!(ctx.main_key_point(), None);
    }

    #[test]
    fn test_modifier_select_sets_main() {
        let ctx = InteractionContext::new();
        let curve = CurveId::new();
        let (a, b) = (register(&ctx, 0, curve), register(&ctx, 1, curve));

        ctx.select(a, false);
        let outcome = ctx.select(b, true);
        assert!(outcome.main_set);
        assert_eq!(ctx.active_key_points(), vec![a, b]);
        assert_eq!(ctx.main_key_point(), Some(b));
        assert_main_invariant(&ctx);
    }

    #[test]
    fn test_modifier_on_active_toggles_off() {
        let ctx = InteractionContext::new();
        let curve = CurveId::new();
        let (a, b) = (register(&ctx, 0, curve), register(&ctx, 1, curve));

        ctx.select(a, false);
        ctx.select(b, true);
        let outcome = ctx.select(b, true);
        assert!(!outcome.active);
        assert_eq!(ctx.active_key_points(), vec![a]);
        assert_eq!(ctx.main_key_point(), None);
    }

    #[test]
    fn test_plain_click_on_active_makes_main() {
        let ctx = InteractionContext::new();
        let curve = CurveId::new();
        let (a, b) = (register(&ctx, 0, curve), register(&ctx, 1, curve));

        ctx.select(a, false);
        ctx.select(b, true);
        let outcome = ctx.select(a, false);
        assert!(outcome.main_set);
        assert_eq!(ctx.main_key_point(), Some(a));
        // Selection kept
        assert_eq!(ctx.active_len(), 2);
    }

    #[test]
    fn test_deactivate_main_clears_it() {
        let ctx = InteractionContext::new();
        let curve = CurveId::new();
        let (a, b, c) = (register(&ctx, 0, curve), register(&ctx, 1, curve), register(&ctx, 2, curve));

        ctx.select(a, false);
        ctx.select(b, true);
        ctx.select(c, true);
        assert_eq!(ctx.main_key_point(), Some(c));

        assert!(ctx.deactivate(c));
        assert_eq!(ctx.main_key_point(), None);
        assert!(!ctx.deactivate(c));
        assert_main_invariant(&ctx);
    }

    #[test]
    fn test_deactivate_down_to_one_clears_main() {
        let ctx = InteractionContext::new();
        let curve = CurveId::new();
        let (a, b) = (register(&ctx, 0, curve), register(&ctx, 1, curve));

        ctx.select(a, false);
        ctx.select(b, true);
        assert!(ctx.deactivate(a));
        assert_eq!(ctx.main_key_point(), None);
        assert_main_invariant(&ctx);
    }

    #[test]
    fn test_sibling_lookup() {
        let ctx = InteractionContext::new();
        let (c1, c2) = (CurveId::new(), CurveId::new());
        let a = register(&ctx, 1, c1);
        let b = register(&ctx, 1, c2);
        let same_curve = register(&ctx, 1, c1);
        let other_key = register(&ctx, 2, c2);

        ctx.select(a, false);
        assert!(ctx.has_active_sibling(b, 1, c2));
        assert!(!ctx.has_active_sibling(same_curve, 1, c1));
        assert!(!ctx.has_active_sibling(other_key, 2, c2));
        // A point is never its own sibling
        assert!(!ctx.has_active_sibling(a, 1, c1));
    }

    #[test]
    fn test_unregister_removes_everywhere() {
        let ctx = InteractionContext::new();
        let curve = CurveId::new();
        let (a, b) = (register(&ctx, 0, curve), register(&ctx, 1, curve));

        ctx.select(a, false);
        ctx.select(b, true);
        assert!(ctx.unregister(b));
        assert_eq!(ctx.active_key_points(), vec![a]);
        assert_eq!(ctx.main_key_point(), None);
        assert!(ctx.record(b).is_none());
        assert_eq!(ctx.registered_len(), 1);
    }

    #[test]
    fn test_main_position_tracks_updates() {
        let ctx = InteractionContext::new();
        let curve = CurveId::new();
        let (a, b) = (register(&ctx, 0, curve), register(&ctx, 1, curve));

        ctx.select(a, false);
        ctx.select(b, true);
        ctx.update_position(b, Vec2::new(3.0, 4.0));
        assert_eq!(ctx.main_position(), Some((b, Vec2::new(3.0, 4.0))));
    }
}
