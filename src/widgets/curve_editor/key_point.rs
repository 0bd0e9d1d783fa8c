//! Key point interaction state machine.
//!
//! One [`KeyPoint`] per rendered key of a curve. Points never talk to each
//! other directly: they publish on the shared [`InteractionContext`] and
//! react to what the other points publish there.
//!
//! Handlers follow one pattern: lock the point state, compute the new state
//! plus a list of [`Effect`]s, commit the position to the context registry,
//! unlock, then apply the effects (host callbacks, curve writes, emits).
//! Nothing is locked while other subscribers run.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use glam::Vec2;
use log::{debug, trace};

use super::controls::{ControlMode, HitTarget, PointerDown, SelectionState};
use super::tangent::{TangentHandles, TangentSide};
use crate::config::EditorSettings;
use crate::core::context::{InteractionContext, KeyPointId, KeyPointRecord};
use crate::core::context_events::{
    ActiveKeyFrameChangedEvent, ActiveKeyPointChangedEvent, FrameManuallyEnteredEvent,
    FrameSetEvent, MainKeyPointMovedEvent, MainKeyPointSetEvent, SelectionRectangleMovedEvent,
    TangentCacheInvalidatedEvent, ValueManuallyEnteredEvent, ValueSetEvent,
};
use crate::core::event_bus::{BoxedEvent, Event, SubscriptionId};
use crate::entities::curve::{CurveHandle, CurveId};
use crate::entities::space::{CoordinateSpace, ScreenRect};

/// Host callback receiving a domain frame or value.
pub type ChangeCallback = Box<dyn Fn(f32) + Send + Sync>;

/// Neighbor bound in screen x, read fresh on every use.
pub type BoundFn = Box<dyn Fn() -> Option<f32> + Send + Sync>;

/// Construction inputs of a key point.
pub struct KeyPointProps {
    /// Initial screen position.
    pub position: Vec2,
    pub key_id: usize,
    pub channel: String,
    pub curve: CurveHandle,
    pub space: Arc<dyn CoordinateSpace>,
    /// View scale: multiplies pointer deltas and rendered sizes.
    pub scale: f32,
    pub key_half_size: f32,
    pub handle_length: f32,
    pub handle_radius: f32,
    pub previous_x: BoundFn,
    pub next_x: BoundFn,
    pub on_frame_value_changed: ChangeCallback,
    pub on_key_value_changed: ChangeCallback,
}

impl KeyPointProps {
    /// Props for key `key_id` of `curve`: position from the stored key,
    /// bounds from the adjacent keys, no-op callbacks.
    pub fn for_key(
        curve: CurveHandle,
        key_id: usize,
        channel: impl Into<String>,
        space: Arc<dyn CoordinateSpace>,
    ) -> Self {
        let position = curve
            .key(key_id)
            .map(|k| space.to_screen(k.frame, k.value))
            .unwrap_or(Vec2::ZERO);

        let previous_x: BoundFn = {
            let curve = curve.clone();
            let space = Arc::clone(&space);
            Box::new(move || {
                let prev = key_id.checked_sub(1)?;
                curve.key(prev).map(|k| space.convert_x(k.frame))
            })
        };
        let next_x: BoundFn = {
            let curve = curve.clone();
            let space = Arc::clone(&space);
            Box::new(move || curve.key(key_id + 1).map(|k| space.convert_x(k.frame)))
        };

        let defaults = EditorSettings::default();
        Self {
            position,
            key_id,
            channel: channel.into(),
            curve,
            space,
            scale: defaults.view_scale,
            key_half_size: defaults.key_half_size,
            handle_length: defaults.handle_length,
            handle_radius: defaults.handle_radius,
            previous_x,
            next_x,
            on_frame_value_changed: Box::new(|_| {}),
            on_key_value_changed: Box::new(|_| {}),
        }
    }

    /// Take sizes and view scale from editor settings.
    pub fn with_settings(mut self, settings: &EditorSettings) -> Self {
        self.scale = settings.view_scale;
        self.key_half_size = settings.key_half_size;
        self.handle_length = settings.handle_length;
        self.handle_radius = settings.handle_radius;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn on_frame_value_changed(mut self, callback: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.on_frame_value_changed = Box::new(callback);
        self
    }

    pub fn on_key_value_changed(mut self, callback: impl Fn(f32) + Send + Sync + 'static) -> Self {
        self.on_key_value_changed = Box::new(callback);
        self
    }
}

/// Everything a renderer needs to draw one key point.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPointVisual {
    pub id: KeyPointId,
    pub key_id: usize,
    pub position: Vec2,
    pub selected_state: SelectionState,
    /// Key icon square.
    pub bounds: ScreenRect,
    /// Absolute tangent handle ends; only present while selected.
    pub in_handle: Option<Vec2>,
    pub out_handle: Option<Vec2>,
    /// Scaled hit radius of the handle ends.
    pub handle_radius: f32,
}

impl KeyPointVisual {
    /// Classify a pointer position. Handle ends sit on top of the key icon.
    pub fn hit_test(&self, pointer: Vec2) -> Option<HitTarget> {
        self.handle_hit(pointer)
            .or_else(|| self.bounds.contains(pointer).then_some(HitTarget::Key))
    }

    /// Tangent handle end under `pointer`, if any.
    pub fn handle_hit(&self, pointer: Vec2) -> Option<HitTarget> {
        let within = |end: Option<Vec2>| end.is_some_and(|e| e.distance(pointer) <= self.handle_radius);
        if within(self.out_handle) {
            Some(HitTarget::TangentRight)
        } else if within(self.in_handle) {
            Some(HitTarget::TangentLeft)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DragState {
    pointer_down: bool,
    captured: bool,
    last_pointer: Vec2,
    mode: ControlMode,
}

#[derive(Debug)]
struct PointState {
    position: Vec2,
    scale: f32,
    selected_state: SelectionState,
    tangents: Option<TangentHandles>,
    drag: DragState,
    offset_to_main: Vec2,
}

/// Deferred side effect of a handler, applied after the state lock is released.
enum Effect {
    FrameChanged(f32),
    ValueChanged(f32),
    Tangent(TangentSide, f32),
    Emit(BoxedEvent),
    Defer(BoxedEvent),
}

/// Point data shared between the [`KeyPoint`] handle and its bus subscriptions.
struct Shared {
    id: KeyPointId,
    key_id: usize,
    channel: String,
    curve: CurveHandle,
    space: Arc<dyn CoordinateSpace>,
    key_half_size: f32,
    handle_length: f32,
    handle_radius: f32,
    previous_x: BoundFn,
    next_x: BoundFn,
    on_frame_value_changed: ChangeCallback,
    on_key_value_changed: ChangeCallback,
    state: Mutex<PointState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PointState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Clamp a screen x between the neighbor keys.
    fn clamp_x(&self, x: f32) -> f32 {
        let mut x = x;
        if let Some(prev) = (self.previous_x)() {
            x = x.max(prev);
        }
        if let Some(next) = (self.next_x)() {
            x = x.min(next);
        }
        x
    }

    fn bounds(&self, state: &PointState) -> ScreenRect {
        ScreenRect::from_center_half_size(state.position, self.key_half_size * state.scale)
    }

    fn ensure_tangents<'a>(&self, state: &'a mut PointState) -> Option<&'a mut TangentHandles> {
        if state.tangents.is_none() {
            state.tangents = TangentHandles::derive(&*self.curve.read(), self.key_id, &*self.space);
            trace!("{} derived tangents {:?}", self.id, state.tangents);
        }
        state.tangents.as_mut()
    }

    fn apply(&self, ctx: &InteractionContext, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::FrameChanged(frame) => (self.on_frame_value_changed)(frame),
                Effect::ValueChanged(value) => (self.on_key_value_changed)(value),
                Effect::Tangent(side, slope) => {
                    let mut curve = self.curve.write();
                    match side {
                        TangentSide::In => curve.update_in_tangent_from_control_point(self.key_id, slope),
                        TangentSide::Out => curve.update_out_tangent_from_control_point(self.key_id, slope),
                    }
                }
                Effect::Emit(event) => ctx.bus().emit_boxed(event),
                Effect::Defer(event) => ctx.bus().defer_boxed(event),
            }
        }
    }

    // ========== Context channel handlers ==========

    fn on_selection_rectangle_moved(&self, ctx: &InteractionContext, e: &SelectionRectangleMovedEvent) {
        let overlaps = {
            let state = self.lock();
            self.bounds(&state).intersects(&e.0)
        };
        let changed = if overlaps {
            ctx.activate(self.id)
        } else {
            ctx.deactivate(self.id)
        };
        if changed {
            debug!("{} marquee {}", self.id, if overlaps { "added" } else { "removed" });
            ctx.emit(ActiveKeyPointChangedEvent);
        }
    }

    fn on_active_key_point_changed(&self, ctx: &InteractionContext, _: &ActiveKeyPointChangedEvent) {
        let is_active = ctx.is_active(self.id);
        let sibling = !is_active && ctx.has_active_sibling(self.id, self.key_id, self.curve.id());

        let mut effects = Vec::new();
        {
            let mut state = self.lock();
            state.selected_state = if is_active {
                SelectionState::Selected
            } else if sibling {
                SelectionState::Siblings
            } else {
                SelectionState::None
            };
            if is_active {
                let (frame, value) = self.space.to_domain(state.position);
                effects.push(Effect::Emit(Box::new(FrameSetEvent(frame))));
                effects.push(Effect::Emit(Box::new(ValueSetEvent(value))));
            }
        }
        self.apply(ctx, effects);
    }

    fn on_main_key_point_set(&self, ctx: &InteractionContext, _: &MainKeyPointSetEvent) {
        let Some((main, main_position)) = ctx.main_position() else {
            return;
        };
        if main == self.id {
            return;
        }
        let mut state = self.lock();
        state.offset_to_main = state.position - main_position;
        trace!("{} offset to main {:?}", self.id, state.offset_to_main);
    }

    fn on_main_key_point_moved(&self, ctx: &InteractionContext, _: &MainKeyPointMovedEvent) {
        let Some((main, main_position)) = ctx.main_position() else {
            return;
        };
        if main == self.id {
            return;
        }

        let mut effects = Vec::new();
        {
            let mut state = self.lock();
            if state.selected_state != SelectionState::None && self.key_id != 0 {
                let x = self.clamp_x(main_position.x + state.offset_to_main.x);
                state.position.x = x;
                effects.push(Effect::FrameChanged(self.space.invert_x(x)));
            }
            if state.selected_state == SelectionState::Selected {
                let y = main_position.y + state.offset_to_main.y;
                state.position.y = y;
                effects.push(Effect::ValueChanged(self.space.invert_y(y)));
            }
            ctx.update_position(self.id, state.position);
        }
        self.apply(ctx, effects);
    }

    fn on_active_key_frame_changed(&self, ctx: &InteractionContext, e: &ActiveKeyFrameChangedEvent) {
        if ctx.main_key_point().is_some() {
            return;
        }

        let mut effects = Vec::new();
        {
            let mut state = self.lock();
            if state.selected_state != SelectionState::Siblings || self.key_id == 0 {
                return;
            }
            let x = self.clamp_x(e.0);
            state.position.x = x;
            ctx.update_position(self.id, state.position);
            effects.push(Effect::FrameChanged(self.space.invert_x(x)));
        }
        self.apply(ctx, effects);
    }

    fn on_frame_manually_entered(&self, ctx: &InteractionContext, e: &FrameManuallyEnteredEvent) {
        if self.key_id == 0 {
            return;
        }

        let mut effects = Vec::new();
        {
            let mut state = self.lock();
            if state.selected_state == SelectionState::None {
                return;
            }
            let x = self.clamp_x(self.space.convert_x(e.0));
            state.position.x = x;
            ctx.update_position(self.id, state.position);
            effects.push(Effect::FrameChanged(self.space.invert_x(x)));
        }
        self.apply(ctx, effects);
    }

    fn on_value_manually_entered(&self, ctx: &InteractionContext, e: &ValueManuallyEnteredEvent) {
        {
            let mut state = self.lock();
            if state.selected_state != SelectionState::Selected {
                return;
            }
            state.position.y = self.space.convert_y(e.0);
            ctx.update_position(self.id, state.position);
        }
        self.apply(ctx, vec![Effect::ValueChanged(e.0)]);
    }

    fn on_tangent_cache_invalidated(&self, _: &InteractionContext, e: &TangentCacheInvalidatedEvent) {
        if e.curve.is_none_or(|curve| curve == self.curve.id()) {
            self.lock().tangents = None;
        }
    }

    // ========== Pointer ==========

    fn pointer_down(&self, ctx: &InteractionContext, down: PointerDown) {
        let outcome = ctx.select(self.id, down.multi_select);
        if outcome.main_set {
            ctx.emit(MainKeyPointSetEvent);
        }
        ctx.emit(ActiveKeyPointChangedEvent);

        let mut state = self.lock();
        state.drag = DragState {
            pointer_down: true,
            captured: true,
            last_pointer: down.position,
            mode: down.target.into(),
        };
        debug!("{} pointer down, mode {:?}", self.id, state.drag.mode);
    }

    fn pointer_move(&self, ctx: &InteractionContext, pointer: Vec2) -> bool {
        let mut effects = Vec::new();
        {
            let mut state = self.lock();
            if !state.drag.pointer_down || state.selected_state != SelectionState::Selected {
                return false;
            }
            let delta = (pointer - state.drag.last_pointer) * state.scale;
            state.drag.last_pointer = pointer;

            match state.drag.mode {
                ControlMode::TangentLeft | ControlMode::TangentRight => {
                    let side = if state.drag.mode == ControlMode::TangentLeft {
                        TangentSide::In
                    } else {
                        TangentSide::Out
                    };
                    if let Some(tangents) = self.ensure_tangents(&mut state) {
                        if let Some(slope) = tangents.drag(side, delta, &*self.space) {
                            effects.push(Effect::Tangent(side, slope));
                        }
                    }
                }
                ControlMode::Key => self.drag_key(ctx, &mut state, delta, &mut effects),
                ControlMode::None => {}
            }
        }
        self.apply(ctx, effects);
        true
    }

    fn drag_key(&self, ctx: &InteractionContext, state: &mut PointState, delta: Vec2, effects: &mut Vec<Effect>) {
        let old_x = state.position.x;
        let x = if self.key_id == 0 {
            old_x
        } else {
            self.clamp_x(old_x + delta.x)
        };
        let y = state.position.y + delta.y;

        if x != old_x {
            let frame = self.space.invert_x(x);
            effects.push(Effect::FrameChanged(frame));
            effects.push(Effect::Emit(Box::new(FrameSetEvent(frame))));
            effects.push(Effect::Emit(Box::new(ActiveKeyFrameChangedEvent(x))));
        }
        let value = self.space.invert_y(y);
        effects.push(Effect::ValueChanged(value));
        effects.push(Effect::Emit(Box::new(ValueSetEvent(value))));

        state.position = Vec2::new(x, y);
        ctx.update_position(self.id, state.position);
        trace!("{} key drag -> {:?}", self.id, state.position);

        if ctx.active_len() > 1 {
            effects.push(Effect::Defer(Box::new(MainKeyPointMovedEvent)));
        }
    }

    fn release(&self, reason: &str) {
        let mut state = self.lock();
        if state.drag.pointer_down || state.drag.captured {
            debug!("{} drag end ({})", self.id, reason);
        }
        state.drag = DragState {
            last_pointer: state.drag.last_pointer,
            ..DragState::default()
        };
    }
}

/// Subscribe one handler, holding the context weakly so a point never keeps
/// its own context alive.
fn subscribe_handler<E: Event>(
    ctx: &Arc<InteractionContext>,
    shared: &Arc<Shared>,
    handler: fn(&Shared, &InteractionContext, &E),
) -> SubscriptionId {
    let weak_ctx = Arc::downgrade(ctx);
    let shared = Arc::clone(shared);
    ctx.subscribe::<E, _>(move |event| {
        if let Some(ctx) = weak_ctx.upgrade() {
            handler(&shared, &ctx, event);
        }
    })
}

/// One interactive key of a curve.
///
/// Registers with the context on construction and subscribes to every
/// context channel. [`KeyPoint::detach`] (also run on drop) undoes both.
pub struct KeyPoint {
    shared: Arc<Shared>,
    context: Arc<InteractionContext>,
    subscriptions: Vec<SubscriptionId>,
}

impl fmt::Debug for KeyPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("KeyPoint")
            .field("id", &self.shared.id)
            .field("key_id", &self.shared.key_id)
            .field("channel", &self.shared.channel)
            .field("position", &state.position)
            .field("selected_state", &state.selected_state)
            .field("mode", &state.drag.mode)
            .finish()
    }
}

impl KeyPoint {
    pub fn new(props: KeyPointProps, context: &Arc<InteractionContext>) -> Self {
        let id = KeyPointId::new();
        let scale = if props.scale.is_finite() && props.scale > 0.0 { props.scale } else { 1.0 };

        let shared = Arc::new(Shared {
            id,
            key_id: props.key_id,
            channel: props.channel,
            curve: props.curve,
            space: props.space,
            key_half_size: props.key_half_size,
            handle_length: props.handle_length,
            handle_radius: props.handle_radius,
            previous_x: props.previous_x,
            next_x: props.next_x,
            on_frame_value_changed: props.on_frame_value_changed,
            on_key_value_changed: props.on_key_value_changed,
            state: Mutex::new(PointState {
                position: props.position,
                scale,
                selected_state: SelectionState::None,
                tangents: None,
                drag: DragState::default(),
                offset_to_main: Vec2::ZERO,
            }),
        });

        context.register(
            id,
            KeyPointRecord {
                key_id: shared.key_id,
                curve: shared.curve.id(),
                channel: shared.channel.clone(),
                position: props.position,
            },
        );

        let subscriptions = vec![
            subscribe_handler(context, &shared, Shared::on_selection_rectangle_moved),
            subscribe_handler(context, &shared, Shared::on_active_key_point_changed),
            subscribe_handler(context, &shared, Shared::on_main_key_point_set),
            subscribe_handler(context, &shared, Shared::on_main_key_point_moved),
            subscribe_handler(context, &shared, Shared::on_active_key_frame_changed),
            subscribe_handler(context, &shared, Shared::on_frame_manually_entered),
            subscribe_handler(context, &shared, Shared::on_value_manually_entered),
            subscribe_handler(context, &shared, Shared::on_tangent_cache_invalidated),
        ];
        debug!("key point {} created for {}[{}]", id, shared.channel, shared.key_id);

        Self {
            shared,
            context: Arc::clone(context),
            subscriptions,
        }
    }

    pub fn id(&self) -> KeyPointId {
        self.shared.id
    }

    pub fn key_id(&self) -> usize {
        self.shared.key_id
    }

    pub fn channel(&self) -> &str {
        &self.shared.channel
    }

    pub fn curve_id(&self) -> CurveId {
        self.shared.curve.id()
    }

    pub fn position(&self) -> Vec2 {
        self.shared.lock().position
    }

    pub fn selected_state(&self) -> SelectionState {
        self.shared.lock().selected_state
    }

    pub fn control_mode(&self) -> ControlMode {
        self.shared.lock().drag.mode
    }

    pub fn is_captured(&self) -> bool {
        self.shared.lock().drag.captured
    }

    pub fn offset_to_main(&self) -> Vec2 {
        self.shared.lock().offset_to_main
    }

    /// Cached tangent handles, without deriving them.
    pub fn tangents(&self) -> Option<TangentHandles> {
        self.shared.lock().tangents
    }

    pub fn scale(&self) -> f32 {
        self.shared.lock().scale
    }

    /// Non-positive or non-finite scales are ignored.
    pub fn set_scale(&self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.shared.lock().scale = scale;
        }
    }

    /// Adopt a position from the host (e.g. after the view was re-laid out).
    pub fn sync_position(&self, position: Vec2) {
        let mut state = self.shared.lock();
        state.position = position;
        self.context.update_position(self.shared.id, position);
    }

    /// Render state. Derives tangent handles on first call.
    pub fn visual_state(&self) -> KeyPointVisual {
        let shared = &self.shared;
        let mut state = shared.lock();
        let scale = state.scale;
        let position = state.position;
        let selected_state = state.selected_state;
        let bounds = shared.bounds(&state);
        let rendered_length = shared.handle_length * scale;

        let handles = shared
            .ensure_tangents(&mut state)
            .map(|t| {
                (
                    position + t.endpoint(TangentSide::In, rendered_length),
                    position + t.endpoint(TangentSide::Out, rendered_length),
                )
            })
            .filter(|_| selected_state == SelectionState::Selected);

        KeyPointVisual {
            id: shared.id,
            key_id: shared.key_id,
            position,
            selected_state,
            bounds,
            in_handle: handles.map(|h| h.0),
            out_handle: handles.map(|h| h.1),
            handle_radius: shared.handle_radius * scale,
        }
    }

    // ========== Pointer entry points ==========

    pub fn on_pointer_down(&self, down: PointerDown) {
        self.shared.pointer_down(&self.context, down);
    }

    /// Returns true if the move was consumed by a drag.
    ///
    /// Group followers are only updated once the host runs
    /// [`InteractionContext::flush_deferred`].
    pub fn on_pointer_move(&self, pointer: Vec2) -> bool {
        self.shared.pointer_move(&self.context, pointer)
    }

    pub fn on_pointer_up(&self, _pointer: Vec2) {
        self.shared.release("pointer up");
    }

    pub fn on_pointer_capture_lost(&self) {
        self.shared.release("capture lost");
    }

    /// Unsubscribe from every channel and leave the context. Idempotent.
    pub fn detach(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        for id in self.subscriptions.drain(..) {
            self.context.unsubscribe(id);
        }
        let was_active = self.context.unregister(self.shared.id);
        debug!("key point {} detached (was active: {})", self.shared.id, was_active);
        if was_active {
            self.context.emit(ActiveKeyPointChangedEvent);
        }
    }
}

impl Drop for KeyPoint {
    fn drop(&mut self) {
        self.detach();
    }
}
