//! Graph session: hosts the key points of a set of curves drawn in one
//! coordinate space.
//!
//! The session owns the interaction context, builds one [`KeyPoint`] per
//! curve key with callbacks that persist into the curve, routes pointer
//! input to the captured point and runs the deferred phase after each move.

use std::sync::Arc;

use glam::Vec2;
use indexmap::IndexMap;
use log::{debug, info};

use super::controls::{ControlMode, HitTarget, PointerDown};
use super::key_point::{KeyPoint, KeyPointProps, KeyPointVisual};
use crate::config::EditorSettings;
use crate::core::context::{InteractionContext, KeyPointId};
use crate::core::context_events::{
    ActiveKeyPointChangedEvent, FrameManuallyEnteredEvent, SelectionRectangleMovedEvent,
    TangentCacheInvalidatedEvent, ValueManuallyEnteredEvent,
};
use crate::entities::curve::{Curve, CurveHandle, CurveId};
use crate::entities::space::{CoordinateSpace, ScreenRect};

struct CurveEntry {
    channel: String,
    handle: CurveHandle,
    points: Vec<KeyPointId>,
}

pub struct GraphSession {
    settings: EditorSettings,
    space: Arc<dyn CoordinateSpace>,
    context: Arc<InteractionContext>,
    curves: IndexMap<CurveId, CurveEntry>,
    points: IndexMap<KeyPointId, KeyPoint>,
    captured: Option<KeyPointId>,
}

impl GraphSession {
    /// Session using the linear mapping described by `settings`.
    pub fn new(settings: EditorSettings) -> Self {
        let space = Arc::new(settings.space());
        Self::with_space(settings, space)
    }

    pub fn with_space(settings: EditorSettings, space: Arc<dyn CoordinateSpace>) -> Self {
        Self {
            settings,
            space,
            context: InteractionContext::shared(),
            curves: IndexMap::new(),
            points: IndexMap::new(),
            captured: None,
        }
    }

    pub fn context(&self) -> &Arc<InteractionContext> {
        &self.context
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn space(&self) -> &Arc<dyn CoordinateSpace> {
        &self.space
    }

    // ========== Curves ==========

    pub fn add_curve<C: Curve + 'static>(&mut self, channel: impl Into<String>, curve: C) -> CurveId {
        self.add_curve_handle(channel, CurveHandle::new(curve))
    }

    /// Add a shared curve and create its key points.
    pub fn add_curve_handle(&mut self, channel: impl Into<String>, handle: CurveHandle) -> CurveId {
        let channel = channel.into();
        let id = handle.id();
        let mut ids = Vec::with_capacity(handle.key_count());

        for key_id in 0..handle.key_count() {
            let frame_curve = handle.clone();
            let value_curve = handle.clone();
            let props = KeyPointProps::for_key(handle.clone(), key_id, channel.clone(), Arc::clone(&self.space))
                .with_settings(&self.settings)
                .on_frame_value_changed(move |frame| frame_curve.write().set_key_frame(key_id, frame))
                .on_key_value_changed(move |value| value_curve.write().set_key_value(key_id, value));
            let point = KeyPoint::new(props, &self.context);
            ids.push(point.id());
            self.points.insert(point.id(), point);
        }

        info!("Added curve {} '{}' with {} keys", id, channel, ids.len());
        self.curves.insert(
            id,
            CurveEntry {
                channel,
                handle,
                points: ids,
            },
        );
        id
    }

    /// Remove a curve; its key points leave the context.
    pub fn remove_curve(&mut self, id: CurveId) -> Option<CurveHandle> {
        let entry = self.curves.shift_remove(&id)?;
        for point_id in &entry.points {
            if self.captured == Some(*point_id) {
                self.captured = None;
            }
            // Drop detaches
            self.points.shift_remove(point_id);
        }
        info!("Removed curve {} '{}'", id, entry.channel);
        Some(entry.handle)
    }

    pub fn curve(&self, id: CurveId) -> Option<&CurveHandle> {
        self.curves.get(&id).map(|e| &e.handle)
    }

    /// First curve registered under `channel`.
    pub fn curve_by_channel(&self, channel: &str) -> Option<&CurveHandle> {
        self.curves.values().find(|e| e.channel == channel).map(|e| &e.handle)
    }

    /// Curves in insertion order with their channel names.
    pub fn curves(&self) -> impl Iterator<Item = (&str, &CurveHandle)> {
        self.curves.values().map(|e| (e.channel.as_str(), &e.handle))
    }

    // ========== Key points ==========

    pub fn point(&self, id: KeyPointId) -> Option<&KeyPoint> {
        self.points.get(&id)
    }

    pub fn point_for(&self, curve: CurveId, key_id: usize) -> Option<&KeyPoint> {
        let entry = self.curves.get(&curve)?;
        entry.points.get(key_id).and_then(|id| self.points.get(id))
    }

    pub fn points(&self) -> impl Iterator<Item = &KeyPoint> {
        self.points.values()
    }

    pub fn visuals(&self) -> Vec<KeyPointVisual> {
        self.points.values().map(|p| p.visual_state()).collect()
    }

    /// Topmost key point part under `pointer`. Handle ends of every point
    /// sit above all key icons; within a layer later points draw on top.
    pub fn hit_test(&self, pointer: Vec2) -> Option<(KeyPointId, HitTarget)> {
        let visuals: Vec<_> = self.points.values().rev().map(|p| p.visual_state()).collect();
        let handle_hit = visuals
            .iter()
            .find_map(|v| v.handle_hit(pointer).map(|target| (v.id, target)));
        handle_hit.or_else(|| {
            visuals
                .iter()
                .find(|v| v.bounds.contains(pointer))
                .map(|v| (v.id, HitTarget::Key))
        })
    }

    /// Re-read key positions from the curves (after edits made elsewhere).
    pub fn sync_from_curves(&self) {
        for entry in self.curves.values() {
            for (key_id, point_id) in entry.points.iter().enumerate() {
                if let (Some(key), Some(point)) = (entry.handle.key(key_id), self.points.get(point_id)) {
                    point.sync_position(self.space.to_screen(key.frame, key.value));
                }
            }
        }
        self.invalidate_tangents(None);
    }

    pub fn set_scale(&mut self, scale: f32) {
        if !(scale.is_finite() && scale > 0.0) {
            return;
        }
        self.settings.view_scale = scale;
        for point in self.points.values() {
            point.set_scale(scale);
        }
    }

    // ========== Pointer routing ==========

    /// Press on a known point. Returns false for unknown ids.
    pub fn pointer_down(&mut self, id: KeyPointId, down: PointerDown) -> bool {
        if !self.points.contains_key(&id) {
            return false;
        }
        // Only one point holds the pointer
        if let Some(previous) = self.captured.filter(|prev| *prev != id) {
            if let Some(point) = self.points.get(&previous) {
                point.on_pointer_capture_lost();
            }
        }
        if let Some(point) = self.points.get(&id) {
            point.on_pointer_down(down);
        }
        self.captured = Some(id);
        true
    }

    /// Press at a screen position. Empty space without the modifier clears
    /// the selection.
    pub fn pointer_down_at(&mut self, position: Vec2, multi_select: bool) -> Option<KeyPointId> {
        match self.hit_test(position) {
            Some((id, target)) => {
                self.pointer_down(id, PointerDown::key(position).multi(multi_select).target(target));
                Some(id)
            }
            None => {
                if !multi_select {
                    self.clear_selection();
                }
                None
            }
        }
    }

    /// Route a move to the captured point, then run the deferred phase.
    pub fn pointer_move(&self, position: Vec2) -> bool {
        let Some(point) = self.captured.and_then(|id| self.points.get(&id)) else {
            return false;
        };
        let handled = point.on_pointer_move(position);
        let flushed = self.context.flush_deferred();
        if flushed > 0 {
            debug!("deferred phase delivered {} events", flushed);
        }
        handled
    }

    /// Release the captured point. A finished key drag changes frame spans,
    /// so cached tangent handles are dropped.
    pub fn pointer_up(&mut self, position: Vec2) {
        let Some(point) = self.captured.take().and_then(|id| self.points.get(&id)) else {
            return;
        };
        let was_key_drag = point.control_mode() == ControlMode::Key;
        point.on_pointer_up(position);
        if was_key_drag {
            self.invalidate_tangents(None);
        }
    }

    pub fn capture_lost(&mut self) {
        if let Some(point) = self.captured.take().and_then(|id| self.points.get(&id)) {
            point.on_pointer_capture_lost();
        }
    }

    pub fn captured(&self) -> Option<KeyPointId> {
        self.captured
    }

    // ========== Context publishers ==========

    pub fn move_selection_rectangle(&self, a: Vec2, b: Vec2) {
        self.context.emit(SelectionRectangleMovedEvent(ScreenRect::from_corners(a, b)));
    }

    pub fn clear_selection(&self) {
        if self.context.clear_selection() {
            self.context.emit(ActiveKeyPointChangedEvent);
        }
    }

    pub fn enter_frame(&self, frame: f32) {
        self.context.emit(FrameManuallyEnteredEvent(frame));
    }

    pub fn enter_value(&self, value: f32) {
        self.context.emit(ValueManuallyEnteredEvent(value));
    }

    pub fn invalidate_tangents(&self, curve: Option<CurveId>) {
        self.context.emit(TangentCacheInvalidatedEvent { curve });
    }
}
