//! The simulation session: owns the editor, the settings and the frame loop.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::camera::Camera;
use crate::config::SimSettings;
use crate::constraints;
use crate::contacts;
use crate::diagnostics::{Diagnostics, FreeBodyReadout};
use crate::editor::{Editor, Tool};
use crate::em::{self, ForceBreakdown};
use crate::error::{ConfigError, SceneError};
use crate::interaction::{Interaction, Measurement, PointerEvent};
use crate::library::{Lab, ScenePayload};
use crate::meta::BodyId;
use crate::physics::MAX_STEP_MS;
use crate::scene::{Scene, SceneSnapshot};
use crate::selection::{SelectedEntity, Selection};
use crate::units;

/// Most engine steps run for one frame; time beyond them is dropped.
pub const MAX_SUBSTEPS: u8 = 8;

/// What a renderer needs for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView<'a> {
    pub scene: SceneSnapshot,
    #[serde(skip)]
    pub interaction: &'a Interaction,
    pub interaction_name: &'static str,
    pub selection: &'a Selection,
    pub measurement: Option<&'a Measurement>,
    pub readout: Option<&'a FreeBodyReadout>,
    pub camera: Camera,
    pub tool: Tool,
    pub running: bool,
    pub frame: u64,
}

#[derive(Debug)]
pub struct Session {
    pub editor: Editor,
    settings: SimSettings,
    running: bool,
    step_requested: bool,
    pending: VecDeque<PointerEvent>,
    forces: HashMap<BodyId, ForceBreakdown>,
    diagnostics: Diagnostics,
    sim_time_ms: f64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SimSettings::default())
    }
}

impl Session {
    pub fn new(settings: SimSettings) -> Self {
        let scene = Scene::with_gravity(settings.gravity_vector());
        Self {
            editor: Editor::new(scene),
            settings,
            running: false,
            step_requested: false,
            pending: VecDeque::new(),
            forces: HashMap::new(),
            diagnostics: Diagnostics::default(),
            sim_time_ms: 0.0,
        }
    }

    pub fn from_settings_json(json: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(SimSettings::from_json(json)?))
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    /// Validates and applies new settings; gravity takes effect immediately.
    pub fn apply_settings(&mut self, settings: SimSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        self.editor.scene_mut().world.set_gravity(settings.gravity_vector());
        self.settings = settings;
        tracing::debug!("[session] settings applied");
        Ok(())
    }

    pub fn scene(&self) -> &Scene {
        self.editor.scene()
    }

    // ------------------------------------------------------------------
    // Run control
    // ------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn play(&mut self) {
        self.running = true;
    }

    /// Halts stepping; editing keeps working.
    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn toggle_running(&mut self) {
        self.running = !self.running;
    }

    /// Steps once on the next frame while paused.
    pub fn request_step(&mut self) {
        self.step_requested = true;
    }

    /// Simulated time so far, in milliseconds.
    pub fn sim_time_ms(&self) -> f64 {
        self.sim_time_ms
    }

    // ------------------------------------------------------------------
    // Frame loop
    // ------------------------------------------------------------------

    /// Buffers a pointer event for the next frame.
    pub fn queue_pointer(&mut self, event: PointerEvent) {
        self.pending.push_back(event);
    }

    /// One display frame: physics step, buffered pointer events, readout.
    pub fn frame(&mut self, frame_ms: f32) {
        let frame_ms = if frame_ms.is_finite() { frame_ms.max(0.0) } else { 0.0 };

        if self.running || self.step_requested {
            // A single step while paused advances one nominal frame.
            let base = if self.running { frame_ms } else { units::BASE_DELTA_MS };
            self.step_physics(base * self.settings.time_scale);
            self.step_requested = false;
        }

        while let Some(event) = self.pending.pop_front() {
            self.editor.handle_pointer(&event, &self.settings);
        }

        let selected = match self.editor.selected() {
            SelectedEntity::Body(id) => Some(id),
            _ => None,
        };
        self.diagnostics
            .update(frame_ms, self.editor.scene(), selected, &self.forces, &self.settings);
    }

    /// Advances `delta_ms` of simulated time in engine steps no longer than
    /// [`MAX_STEP_MS`]. Zero, negative or non-finite deltas do nothing.
    pub fn step_physics(&mut self, delta_ms: f32) {
        if !delta_ms.is_finite() || delta_ms <= 0.0 {
            return;
        }
        let budget_ms = MAX_STEP_MS * f32::from(MAX_SUBSTEPS);
        if delta_ms > budget_ms {
            tracing::debug!(
                "[session] dropping {:.1} ms beyond the {budget_ms} ms frame budget",
                delta_ms - budget_ms
            );
        }
        let delta_ms = delta_ms.min(budget_ms);
        let steps = (delta_ms / MAX_STEP_MS).ceil().clamp(1.0, f32::from(MAX_SUBSTEPS));
        let step_ms = delta_ms / steps;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = steps as u8;
        for _ in 0..steps {
            self.substep(step_ms);
        }
    }

    /// Runs the extensions around one engine step.
    fn substep(&mut self, delta_ms: f32) {
        let scene = self.editor.scene_mut();
        self.forces = em::apply_em_forces(scene, &self.settings.em);
        constraints::apply_constraint_behaviors(scene);
        scene.world.step(delta_ms);
        contacts::apply_contact_behaviors(scene);
        self.sim_time_ms += f64::from(scene.world.last_delta_ms());
        // A held drag must not drift between pointer events.
        self.editor.hold_gesture();
    }

    /// EM forces applied in the last step, in newtons.
    pub fn forces(&self) -> &HashMap<BodyId, ForceBreakdown> {
        &self.forces
    }

    pub fn readout(&self) -> Option<&FreeBodyReadout> {
        self.diagnostics.readout()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn view(&self) -> SessionView<'_> {
        let interaction = self.editor.interaction();
        SessionView {
            scene: self.scene().snapshot(),
            interaction,
            interaction_name: interaction.name(),
            selection: self.editor.selection(),
            measurement: self.editor.measurement(),
            readout: self.readout(),
            camera: self.editor.camera,
            tool: self.editor.tool,
            running: self.running,
            frame: self.scene().world.current_frame(),
        }
    }

    // ------------------------------------------------------------------
    // Scene lifecycle
    // ------------------------------------------------------------------

    /// Empties the scene, aborting any gesture and clearing history.
    pub fn reset(&mut self) {
        self.editor.reset(&self.settings);
        self.pending.clear();
        self.forces.clear();
        self.diagnostics.clear();
        self.step_requested = false;
        self.sim_time_ms = 0.0;
    }

    /// Imports a payload as one undoable edit and adopts its recommended
    /// settings.
    pub fn load_payload(&mut self, payload: &ScenePayload) -> Result<(), SceneError> {
        if let Some(settings) = &payload.recommended_settings {
            settings.validate()?;
        }
        self.editor.cancel_gesture();
        let forward = payload.remap(self.editor.scene_mut())?;
        tracing::info!(
            "[session] loading {} bodies, {} constraints, {} fields",
            forward.bodies.len(),
            forward.constraints.len(),
            forward.fields.len()
        );
        self.editor.commit_creation(
            "load scene",
            forward.bodies,
            forward.constraints,
            forward.fields,
            Selection::default(),
        );
        if let Some(settings) = payload.recommended_settings.clone() {
            self.apply_settings(settings)?;
        }
        Ok(())
    }

    /// Replaces the scene with a built-in lab.
    pub fn load_lab(&mut self, lab: Lab) -> Result<(), SceneError> {
        self.reset();
        self.apply_settings(SimSettings {
            grid: self.settings.grid,
            ..SimSettings::default()
        })?;
        tracing::info!("[session] lab {}", lab.title());
        self.load_payload(&lab.payload())
    }

    pub fn export_payload(&self) -> ScenePayload {
        ScenePayload {
            recommended_settings: Some(self.settings.clone()),
            ..ScenePayload::from_scene(self.scene())
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::scene::tests::ball_snapshot;

    const FRAME_MS: f32 = 1000.0 / 60.0;

    fn session_with_ball() -> (Session, BodyId) {
        let mut session = Session::default();
        let ball = ball_snapshot(session.editor.scene_mut(), Vec2::new(100.0, 100.0), 10.0);
        let id = ball.id;
        session
            .editor
            .commit_creation("add", vec![ball], Vec::new(), Vec::new(), Selection::default());
        (session, id)
    }

    #[test]
    fn test_paused_session_does_not_step() {
        let (mut session, id) = session_with_ball();
        for _ in 0..10 {
            session.frame(FRAME_MS);
        }
        assert_eq!(session.scene().body_position(id), Some(Vec2::new(100.0, 100.0)));
        assert_eq!(session.scene().world.current_frame(), 0);

        session.request_step();
        session.frame(FRAME_MS);
        session.frame(FRAME_MS);
        assert_eq!(session.scene().world.current_frame(), 1);
    }

    #[test]
    fn test_running_session_falls_under_gravity() {
        let (mut session, id) = session_with_ball();
        session.play();
        for _ in 0..30 {
            session.frame(FRAME_MS);
        }
        let y = session.scene().body_position(id).unwrap().y;
        assert!(y > 110.0, "ball should fall, y = {y}");
        assert!((session.sim_time_ms() - 500.0).abs() < 1.0);
    }

    #[test]
    fn test_pointer_events_apply_after_step() {
        let mut session = Session::default();
        session.editor.set_tool(Tool::Circle);
        session.queue_pointer(PointerEvent::down(1, Vec2::new(100.0, 100.0)));
        session.queue_pointer(PointerEvent::moved(1, Vec2::new(130.0, 100.0)));
        session.queue_pointer(PointerEvent::up(1, Vec2::new(130.0, 100.0)));
        session.play();
        session.frame(FRAME_MS);

        // Created after this frame's step, so it has not moved yet.
        let id = session.scene().body_ids()[0];
        assert_eq!(session.scene().body_position(id), Some(Vec2::new(100.0, 100.0)));
        assert_eq!(session.view().interaction_name, "none");
    }

    #[test]
    fn test_held_drag_does_not_fall_while_running() {
        let (mut session, id) = session_with_ball();
        session.play();
        session.queue_pointer(PointerEvent::down(1, Vec2::new(100.0, 100.0)));
        session.queue_pointer(PointerEvent::moved(1, Vec2::new(120.0, 100.0)));
        session.frame(FRAME_MS);
        let held = session.scene().body_position(id).unwrap();
        assert!((held.x - 120.0).abs() < 1e-3);
        assert!((held.y - 100.0).abs() < 1.0);

        // Pointer holds still for half a second.
        for _ in 0..30 {
            session.frame(FRAME_MS);
            assert!(session.scene().body_position(id).unwrap().distance(held) < 1e-3);
        }
        session.queue_pointer(PointerEvent::up(1, Vec2::new(120.0, 100.0)));
        session.frame(FRAME_MS);
        assert!(session.editor.interaction().is_none());
        assert_eq!(session.editor.history.undo_len(), 2);

        // The committed pose is the held one.
        assert!(session.editor.undo());
        assert!(session.editor.redo());
        assert!(session.scene().body_position(id).unwrap().distance(held) < 1e-3);
    }

    #[test]
    fn test_zero_length_frame_does_not_step() {
        let (mut session, id) = session_with_ball();
        session.play();
        session.frame(0.0);
        assert_eq!(session.scene().world.current_frame(), 0);
        assert_eq!(session.sim_time_ms(), 0.0);
        assert_eq!(session.scene().body_position(id), Some(Vec2::new(100.0, 100.0)));
    }

    #[test]
    fn test_long_scaled_frame_is_substepped() {
        let mut session = Session::default();
        session
            .apply_settings(SimSettings {
                time_scale: 4.0,
                ..SimSettings::default()
            })
            .unwrap();
        session.play();
        session.frame(50.0);
        assert_eq!(session.scene().world.current_frame(), 4);
        assert!((session.sim_time_ms() - 200.0).abs() < 1e-3);

        // Beyond the frame budget the remainder is dropped.
        session.frame(1000.0);
        assert_eq!(session.scene().world.current_frame(), 4 + u64::from(MAX_SUBSTEPS));
        let budget = f64::from(MAX_STEP_MS) * f64::from(MAX_SUBSTEPS);
        assert!((session.sim_time_ms() - 200.0 - budget).abs() < 1e-3);
    }

    #[test]
    fn test_reset_aborts_gesture_and_clears_history() {
        let (mut session, _) = session_with_ball();
        session.editor.set_tool(Tool::Rectangle);
        session.queue_pointer(PointerEvent::down(1, Vec2::new(0.0, 0.0)));
        session.frame(FRAME_MS);
        assert_eq!(session.view().interaction_name, "draw");

        session.reset();
        assert!(session.editor.interaction().is_none());
        assert!(!session.editor.history.can_undo());
        assert!(session.scene().body_ids().is_empty());

        // The released pointer no longer finishes anything.
        session.queue_pointer(PointerEvent::up(1, Vec2::new(80.0, 80.0)));
        session.frame(FRAME_MS);
        assert!(session.scene().body_ids().is_empty());
    }

    #[test]
    fn test_load_payload_is_one_undoable_edit() {
        let (mut session, _) = session_with_ball();
        session.load_payload(&Lab::CoulombPair.payload()).unwrap();
        assert_eq!(session.scene().body_ids().len(), 3);
        assert_eq!(session.settings().gravity_mps2, 0.0);

        assert!(session.editor.undo());
        assert_eq!(session.scene().body_ids().len(), 1);
    }

    #[test]
    fn test_coulomb_lab_attracts() {
        let mut session = Session::default();
        session.load_lab(Lab::CoulombPair).unwrap();
        let ids = session.scene().body_ids();
        let gap = |s: &Session| {
            s.scene()
                .body_position(ids[0])
                .unwrap()
                .distance(s.scene().body_position(ids[1]).unwrap())
        };
        let start = gap(&session);
        session.play();
        for _ in 0..20 {
            session.frame(FRAME_MS);
        }
        assert!(gap(&session) < start);
        let force = session.forces()[&ids[0]];
        assert!(force.coulomb.x > 0.0);
    }

    #[test]
    fn test_pendulum_rope_stays_within_length() {
        let mut session = Session::default();
        session.load_lab(Lab::PendulumRope).unwrap();
        let ids = session.scene().body_ids();
        session.play();
        for _ in 0..120 {
            session.frame(FRAME_MS);
        }
        let pivot = session.scene().body_position(ids[0]).unwrap();
        let bob = session.scene().body_position(ids[1]).unwrap();
        assert_eq!(pivot, Vec2::new(400.0, 100.0));
        assert!(pivot.distance(bob) < 250.0 * 1.05);
    }

    #[test]
    fn test_readout_follows_selection_at_capped_rate() {
        let (mut session, id) = session_with_ball();
        session.editor.doc.selection.select_body(id);
        session.play();
        for _ in 0..200 {
            session.frame(5.0);
        }
        assert_eq!(session.diagnostics().refreshes(), 10);
        let readout = session.readout().unwrap();
        assert_eq!(readout.body, id);
        assert!(readout.velocity_mps.y > 0.0);
    }

    #[test]
    fn test_apply_settings_rejects_invalid() {
        let mut session = Session::default();
        let bad = SimSettings {
            time_scale: 0.0,
            ..SimSettings::default()
        };
        assert!(session.apply_settings(bad).is_err());
        assert_eq!(session.settings().time_scale, 1.0);
    }

    #[test]
    fn test_export_round_trips_through_json() {
        let (session, _) = session_with_ball();
        let json = session.export_payload().to_json().unwrap();
        let mut other = Session::default();
        other.load_payload(&ScenePayload::from_json(&json).unwrap()).unwrap();
        assert_eq!(other.scene().body_ids().len(), 1);
    }
}
