//! Replay scripts.
//!
//! A script is a JSON document with a set of curves and a list of
//! interaction steps. [`Script::replay`] runs the steps through a
//! [`GraphSession`] and reports the resulting curves and selection.
//!
//! ```json
//! {
//!   "curves": [
//!     { "channel": "pos.x", "keys": [{ "frame": 0, "value": 0 }, { "frame": 10, "value": 2 }] }
//!   ],
//!   "steps": [
//!     { "op": "press", "channel": "pos.x", "key": 1 },
//!     { "op": "move", "dx": 20, "dy": -10 },
//!     { "op": "release" }
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow, bail};
use glam::Vec2;
use indexmap::IndexMap;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::config::EditorSettings;
use crate::core::context::KeyPointId;
use crate::core::context_events::{FrameSetEvent, ValueSetEvent};
use crate::entities::curve::{AnimationCurve, CurveId, CurveKey};
use crate::widgets::curve_editor::{GraphSession, HitTarget, PointerDown};

/// Named curve in a script or report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptCurve {
    pub channel: String,
    pub keys: Vec<CurveKey>,
}

/// One interaction step. Positions are screen pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Press on a key. Tangent targets press on the handle end when visible.
    Press {
        channel: String,
        key: usize,
        #[serde(default)]
        multi: bool,
        #[serde(default)]
        target: HitTarget,
    },
    /// Press at a position, hit-testing the key points.
    PressAt {
        x: f32,
        y: f32,
        #[serde(default)]
        multi: bool,
    },
    /// Move the pointer by a delta.
    Move { dx: f32, dy: f32 },
    Release,
    CaptureLost,
    Marquee { from: [f32; 2], to: [f32; 2] },
    ClearSelection,
    EnterFrame { frame: f32 },
    EnterValue { value: f32 },
    SetScale { scale: f32 },
    InvalidateTangents {
        #[serde(default)]
        channel: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Overrides the settings file when present.
    #[serde(default)]
    pub settings: Option<EditorSettings>,
    pub curves: Vec<ScriptCurve>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Key reference in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyRef {
    pub channel: String,
    pub key: usize,
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub curves: Vec<ScriptCurve>,
    pub selection: Vec<KeyRef>,
    pub main: Option<KeyRef>,
    /// Last frame/value published for display.
    pub displayed_frame: Option<f32>,
    pub displayed_value: Option<f32>,
    pub steps: usize,
}

#[derive(Debug, Default)]
struct Display {
    frame: Option<f32>,
    value: Option<f32>,
}

impl Script {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse replay script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {}", path.display()))?;
        let script = Self::from_json(&text).with_context(|| format!("Invalid script: {}", path.display()))?;
        info!(
            "Loaded script {}: {} curves, {} steps",
            path.display(),
            script.curves.len(),
            script.steps.len()
        );
        Ok(script)
    }

    /// Run all steps in a fresh session.
    pub fn replay(&self, settings: EditorSettings) -> Result<ReplayReport> {
        let mut replay = Replay::new(settings);
        for curve in &self.curves {
            replay.add_curve(curve)?;
        }

        for (index, step) in self.steps.iter().enumerate() {
            replay
                .step(step)
                .with_context(|| format!("Step {} ({:?}) failed", index + 1, step))?;
        }

        Ok(replay.report(self.steps.len()))
    }
}

struct Replay {
    session: GraphSession,
    channels: IndexMap<String, CurveId>,
    pointer: Vec2,
    display: Arc<Mutex<Display>>,
}

impl Replay {
    fn new(settings: EditorSettings) -> Self {
        let session = GraphSession::new(settings);
        let display = Arc::new(Mutex::new(Display::default()));

        let d = Arc::clone(&display);
        session.context().subscribe::<FrameSetEvent, _>(move |e| {
            d.lock().unwrap_or_else(|e| e.into_inner()).frame = Some(e.0);
        });
        let d = Arc::clone(&display);
        session.context().subscribe::<ValueSetEvent, _>(move |e| {
            d.lock().unwrap_or_else(|e| e.into_inner()).value = Some(e.0);
        });

        Self {
            session,
            channels: IndexMap::new(),
            pointer: Vec2::ZERO,
            display,
        }
    }

    fn add_curve(&mut self, curve: &ScriptCurve) -> Result<()> {
        if self.channels.contains_key(&curve.channel) {
            bail!("Duplicate channel '{}'", curve.channel);
        }
        let id = self
            .session
            .add_curve(curve.channel.clone(), AnimationCurve::new(curve.keys.clone()));
        self.channels.insert(curve.channel.clone(), id);
        Ok(())
    }

    fn curve_id(&self, channel: &str) -> Result<CurveId> {
        self.channels
            .get(channel)
            .copied()
            .ok_or_else(|| anyhow!("Unknown channel '{}'", channel))
    }

    fn resolve(&self, channel: &str, key: usize) -> Result<KeyPointId> {
        let curve = self.curve_id(channel)?;
        self.session
            .point_for(curve, key)
            .map(|p| p.id())
            .ok_or_else(|| anyhow!("Channel '{}' has no key {}", channel, key))
    }

    fn step(&mut self, step: &Step) -> Result<()> {
        trace!("replay step {:?}", step);
        match step {
            Step::Press { channel, key, multi, target } => {
                let id = self.resolve(channel, *key)?;
                let position = self
                    .session
                    .point(id)
                    .map(|p| {
                        let visual = p.visual_state();
                        match target {
                            HitTarget::Key => visual.position,
                            HitTarget::TangentLeft => visual.in_handle.unwrap_or(visual.position),
                            HitTarget::TangentRight => visual.out_handle.unwrap_or(visual.position),
                        }
                    })
                    .unwrap_or(self.pointer);
                self.pointer = position;
                self.session
                    .pointer_down(id, PointerDown::key(position).multi(*multi).target(*target));
            }
            Step::PressAt { x, y, multi } => {
                self.pointer = Vec2::new(*x, *y);
                let hit = self.session.pointer_down_at(self.pointer, *multi);
                debug!("press at {:?} hit {:?}", self.pointer, hit);
            }
            Step::Move { dx, dy } => {
                self.pointer += Vec2::new(*dx, *dy);
                self.session.pointer_move(self.pointer);
            }
            Step::Release => self.session.pointer_up(self.pointer),
            Step::CaptureLost => self.session.capture_lost(),
            Step::Marquee { from, to } => {
                self.session
                    .move_selection_rectangle(Vec2::from_array(*from), Vec2::from_array(*to));
            }
            Step::ClearSelection => self.session.clear_selection(),
            Step::EnterFrame { frame } => self.session.enter_frame(*frame),
            Step::EnterValue { value } => self.session.enter_value(*value),
            Step::SetScale { scale } => {
                if !(scale.is_finite() && *scale > 0.0) {
                    bail!("Invalid scale {}", scale);
                }
                self.session.set_scale(*scale);
            }
            Step::InvalidateTangents { channel } => {
                let curve = channel.as_deref().map(|c| self.curve_id(c)).transpose()?;
                self.session.invalidate_tangents(curve);
            }
        }
        Ok(())
    }

    fn key_ref(&self, id: KeyPointId) -> Option<KeyRef> {
        self.session.context().record(id).map(|r| KeyRef {
            channel: r.channel,
            key: r.key_id,
        })
    }

    fn report(&self, steps: usize) -> ReplayReport {
        let ctx = self.session.context();
        let display = self.display.lock().unwrap_or_else(|e| e.into_inner());
        ReplayReport {
            curves: self
                .session
                .curves()
                .map(|(channel, handle)| ScriptCurve {
                    channel: channel.to_string(),
                    keys: handle.snapshot(),
                })
                .collect(),
            selection: ctx
                .active_key_points()
                .into_iter()
                .filter_map(|id| self.key_ref(id))
                .collect(),
            main: ctx.main_key_point().and_then(|id| self.key_ref(id)),
            displayed_frame: display.frame,
            displayed_value: display.value,
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    const SCRIPT: &str = r#"{
        "curves": [
            { "channel": "pos.x", "keys": [{ "frame": 0, "value": 0 }, { "frame": 10, "value": 2 }, { "frame": 20, "value": 0 }] },
            { "channel": "pos.y", "keys": [{ "frame": 0, "value": 1 }, { "frame": 10, "value": 1 }, { "frame": 30, "value": 1 }] }
        ],
        "steps": [
            { "op": "press", "channel": "pos.x", "key": 1 },
            { "op": "move", "dx": 20, "dy": -10 },
            { "op": "release" }
        ]
    }"#;

    #[test]
    fn test_replay_drag_with_sibling() {
        let script = Script::from_json(SCRIPT).unwrap();
        let report = script.replay(EditorSettings::default()).unwrap();

        assert_eq!(report.steps, 3);
        let x = &report.curves[0].keys[1];
        assert!((x.frame - 12.0).abs() < EPS);
        assert!((x.value - 3.0).abs() < EPS);
        // Sibling followed the frame only
        let y = &report.curves[1].keys[1];
        assert!((y.frame - 12.0).abs() < EPS);
        assert_eq!(y.value, 1.0);

        assert_eq!(report.selection, vec![KeyRef { channel: "pos.x".into(), key: 1 }]);
        assert_eq!(report.main, None);
        assert!((report.displayed_frame.unwrap() - 12.0).abs() < EPS);
        assert!((report.displayed_value.unwrap() - 3.0).abs() < EPS);
    }

    #[test]
    fn test_replay_group_and_manual_entry() {
        let mut script = Script::from_json(SCRIPT).unwrap();
        script.steps = vec![
            Step::Marquee { from: [95.0, -25.0], to: [105.0, -5.0] },
            Step::Press { channel: "pos.y".into(), key: 1, multi: false, target: HitTarget::Key },
            Step::Move { dx: 0.0, dy: -10.0 },
            Step::Release,
            Step::EnterValue { value: 7.5 },
        ];
        let report = script.replay(EditorSettings::default()).unwrap();

        assert_eq!(report.selection.len(), 2);
        assert_eq!(report.main, Some(KeyRef { channel: "pos.y".into(), key: 1 }));
        assert_eq!(report.curves[0].keys[1].value, 7.5);
        assert_eq!(report.curves[1].keys[1].value, 7.5);
    }

    #[test]
    fn test_tangent_step() {
        let script = Script::from_json(
            r#"{
                "curves": [{ "channel": "c", "keys": [{ "frame": 0, "value": 0 }, { "frame": 30, "value": 0 }, { "frame": 60, "value": 0 }] }],
                "steps": [
                    { "op": "press", "channel": "c", "key": 1 },
                    { "op": "release" },
                    { "op": "press", "channel": "c", "key": 1, "target": "tangent_right" },
                    { "op": "move", "dx": 0, "dy": -100 },
                    { "op": "release" }
                ]
            }"#,
        )
        .unwrap();
        let report = script.replay(EditorSettings::default()).unwrap();
        let key = &report.curves[0].keys[1];
        assert!((key.out_tangent - 1.0).abs() < EPS);
        assert_eq!(key.frame, 30.0);
    }

    #[test]
    fn test_script_errors() {
        let mut script = Script::from_json(SCRIPT).unwrap();
        script.steps = vec![Step::Press { channel: "nope".into(), key: 0, multi: false, target: HitTarget::Key }];
        let err = script.replay(EditorSettings::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("Unknown channel 'nope'"));

        script.steps = vec![Step::Press { channel: "pos.x".into(), key: 9, multi: false, target: HitTarget::Key }];
        assert!(script.replay(EditorSettings::default()).is_err());

        let mut dup = Script::from_json(SCRIPT).unwrap();
        dup.curves.push(dup.curves[0].clone());
        assert!(dup.replay(EditorSettings::default()).is_err());

        assert!(Script::from_json(r#"{ "steps": [] }"#).is_err());
    }

    #[test]
    fn test_step_json_shape() {
        let step: Step = serde_json::from_str(r#"{ "op": "press_at", "x": 1, "y": 2 }"#).unwrap();
        assert_eq!(step, Step::PressAt { x: 1.0, y: 2.0, multi: false });
        let step: Step = serde_json::from_str(r#"{ "op": "invalidate_tangents" }"#).unwrap();
        assert_eq!(step, Step::InvalidateTangents { channel: None });
    }
}
