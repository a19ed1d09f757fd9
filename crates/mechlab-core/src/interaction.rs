//! Pointer-driven editing.
//!
//! At most one gesture is in flight, owned by the pointer id that started it.
//! Live gestures mutate the scene while the pointer moves and commit a single
//! before/after edit on release; creation gestures commit on release only.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::SimSettings;
use crate::constraints::resync_rest_length;
use crate::editor::{Editor, Tool};
use crate::field::FieldRegion;
use crate::hit::{self, BodyHandle, EndpointSide, FieldHandle, Hit};
use crate::meta::{BodyId, ConstraintKind};
use crate::physics::JointEnd;
use crate::scene::{BodySnapshot, ConstraintSnapshot, Scene, SceneDelta};
use crate::selection::{SelectedEntity, Selection};
use crate::shape::{self, MIN_SHAPE_SIZE};
use crate::snap::Snapper;
use crate::spawn::{self, Endpoint};
use crate::units;

/// Pointer travel (screen px) that turns a press into a drag.
pub const DRAG_THRESHOLD_PX: f32 = 4.0;
/// Velocity tool gain: m/s per meter of drag.
pub const VELOCITY_PER_METER: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    Cancel,
}

/// A raw pointer event in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub pointer_id: u32,
    pub phase: PointerPhase,
    pub button: PointerButton,
    pub screen: Vec2,
    /// Shift/ctrl held: selection edits add instead of replace.
    #[serde(default)]
    pub additive: bool,
}

impl PointerEvent {
    pub fn down(pointer_id: u32, screen: Vec2) -> Self {
        Self {
            pointer_id,
            phase: PointerPhase::Down,
            button: PointerButton::Primary,
            screen,
            additive: false,
        }
    }

    pub fn moved(pointer_id: u32, screen: Vec2) -> Self {
        Self {
            phase: PointerPhase::Move,
            ..Self::down(pointer_id, screen)
        }
    }

    pub fn up(pointer_id: u32, screen: Vec2) -> Self {
        Self {
            phase: PointerPhase::Up,
            ..Self::down(pointer_id, screen)
        }
    }

    #[must_use]
    pub fn with_button(self, button: PointerButton) -> Self {
        Self { button, ..self }
    }

    #[must_use]
    pub fn with_additive(self, additive: bool) -> Self {
        Self { additive, ..self }
    }
}

/// Result left on screen by the measurement tools.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Measurement {
    Ruler {
        start: Vec2,
        end: Vec2,
    },
    /// `second` is `None` until the second ray has been drawn.
    Protractor {
        vertex: Vec2,
        first: Vec2,
        second: Option<Vec2>,
    },
}

impl Measurement {
    /// Ruler length in meters.
    pub fn length_m(&self) -> Option<f32> {
        match *self {
            Self::Ruler { start, end } => Some(units::world_to_meters(start.distance(end))),
            Self::Protractor { .. } => None,
        }
    }

    /// Ruler direction (counter-clockwise from +x, screen y flipped) or the
    /// angle between the protractor rays, in degrees.
    pub fn angle_deg(&self) -> Option<f32> {
        match *self {
            Self::Ruler { start, end } => {
                let d = end - start;
                Some((-d.y).atan2(d.x).to_degrees())
            }
            Self::Protractor {
                vertex,
                first,
                second,
            } => angle_between_rays(vertex, first, second?),
        }
    }
}

/// Unsigned angle between two rays from `vertex`, in degrees.
pub fn angle_between_rays(vertex: Vec2, first: Vec2, second: Vec2) -> Option<f32> {
    let a = first - vertex;
    let b = second - vertex;
    if a.length_squared() < f32::EPSILON || b.length_squared() < f32::EPSILON {
        return None;
    }
    Some(a.angle_to(b).abs().to_degrees())
}

/// The single in-flight pointer gesture.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Interaction {
    #[default]
    None,
    Pan {
        last_screen: Vec2,
    },
    Draw {
        tool: Tool,
        start: Vec2,
        current: Vec2,
    },
    MeasureRuler {
        start: Vec2,
        current: Vec2,
    },
    /// `first` is set while drawing the second ray.
    MeasureProtractor {
        vertex: Vec2,
        first: Option<Vec2>,
        current: Vec2,
    },
    SetVelocity {
        body: BodyId,
        start: Vec2,
        current: Vec2,
    },
    SelectPress {
        hit: Hit,
        start_screen: Vec2,
        start_world: Vec2,
        additive: bool,
    },
    BoxSelect {
        start: Vec2,
        current: Vec2,
        additive: bool,
    },
    /// `offset` is the translation the pointer last asked for.
    MoveSelection {
        drag_start: Vec2,
        before: Vec<BodySnapshot>,
        offset: Vec2,
        selection_before: Selection,
    },
    /// `angle` is the orientation the pointer last asked for.
    RotateBody {
        before: BodySnapshot,
        drag_start_angle: f32,
        angle: f32,
    },
    ResizeBody {
        before: BodySnapshot,
    },
    MoveField {
        drag_start: Vec2,
        before: FieldRegion,
        selection_before: Selection,
    },
    ResizeField {
        before: FieldRegion,
    },
    DragConstraintEndpoint {
        side: EndpointSide,
        before: ConstraintSnapshot,
    },
    ConstraintDraw {
        kind: ConstraintKind,
        source: Endpoint,
        current: Vec2,
    },
}

impl Interaction {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pan { .. } => "pan",
            Self::Draw { .. } => "draw",
            Self::MeasureRuler { .. } => "measure_ruler",
            Self::MeasureProtractor { .. } => "measure_protractor",
            Self::SetVelocity { .. } => "set_velocity",
            Self::SelectPress { .. } => "select_press",
            Self::BoxSelect { .. } => "box_select",
            Self::MoveSelection { .. } => "move_selection",
            Self::RotateBody { .. } => "rotate_body",
            Self::ResizeBody { .. } => "resize_body",
            Self::MoveField { .. } => "move_field",
            Self::ResizeField { .. } => "resize_field",
            Self::DragConstraintEndpoint { .. } => "drag_constraint_endpoint",
            Self::ConstraintDraw { .. } => "constraint_draw",
        }
    }
}

fn stop_body(scene: &mut Scene, id: BodyId) {
    if let Some(handle) = scene.body_handle(id) {
        scene.world.set_velocity(handle, Vec2::ZERO);
        scene.world.set_angular_velocity(handle, 0.0);
    }
}

fn place_body(scene: &mut Scene, id: BodyId, position: Vec2, angle: f32) {
    if let Some(handle) = scene.body_handle(id) {
        scene.world.set_position(handle, position);
        scene.world.set_angle(handle, angle);
    }
    stop_body(scene, id);
}

/// Pins the bodies a drag holds to the pose the pointer asked for.
fn hold_pose(scene: &mut Scene, interaction: &Interaction) {
    match interaction {
        Interaction::MoveSelection { before, offset, .. } => {
            for body in before {
                place_body(scene, body.id, body.position + *offset, body.angle);
            }
        }
        Interaction::RotateBody { before, angle, .. } => {
            place_body(scene, before.id, before.position, *angle);
        }
        Interaction::ResizeBody { before } => {
            place_body(scene, before.id, before.position, before.angle);
        }
        _ => {}
    }
}

impl Editor {
    /// Feeds one pointer event into the state machine.
    pub fn handle_pointer(&mut self, event: &PointerEvent, settings: &SimSettings) {
        match event.phase {
            PointerPhase::Down => {
                if self.active_pointer.is_some() {
                    tracing::trace!("[editor] ignoring pointer {} during a gesture", event.pointer_id);
                    return;
                }
                self.pointer_down(event, settings);
                if !self.interaction.is_none() {
                    self.active_pointer = Some(event.pointer_id);
                }
            }
            PointerPhase::Move | PointerPhase::Up | PointerPhase::Cancel => {
                if self.active_pointer != Some(event.pointer_id) {
                    return;
                }
                match event.phase {
                    PointerPhase::Move => self.pointer_move(event, settings),
                    PointerPhase::Up => {
                        self.pointer_up(event, settings);
                        self.interaction = Interaction::None;
                        self.active_pointer = None;
                    }
                    _ => self.cancel_gesture(),
                }
            }
        }
    }

    /// Re-pins bodies held by the gesture; call after every physics step.
    pub fn hold_gesture(&mut self) {
        hold_pose(&mut self.doc.scene, &self.interaction);
    }

    /// Aborts the gesture, reverting anything it changed live.
    pub fn cancel_gesture(&mut self) {
        let interaction = std::mem::take(&mut self.interaction);
        self.active_pointer = None;
        let scene = &mut self.doc.scene;
        match interaction {
            Interaction::RotateBody { before, .. }
            | Interaction::ResizeBody { before } => {
                scene.upsert_body(&before);
            }
            Interaction::MoveSelection {
                before,
                selection_before,
                ..
            } => {
                for body in &before {
                    scene.upsert_body(body);
                }
                self.doc.selection = selection_before;
            }
            Interaction::MoveField {
                before,
                selection_before,
                ..
            } => {
                scene.upsert_field(before);
                self.doc.selection = selection_before;
            }
            Interaction::ResizeField { before } => scene.upsert_field(before),
            Interaction::DragConstraintEndpoint { before, .. } => {
                scene.upsert_constraint(&before);
            }
            Interaction::None => return,
            _ => {}
        }
        tracing::debug!("[editor] gesture cancelled");
    }

    // ------------------------------------------------------------------
    // Pointer down
    // ------------------------------------------------------------------

    fn pointer_down(&mut self, event: &PointerEvent, settings: &SimSettings) {
        if event.button != PointerButton::Primary || self.tool == Tool::Pan {
            self.interaction = Interaction::Pan {
                last_screen: event.screen,
            };
            return;
        }
        let world = self.camera.screen_to_world(event.screen);
        let snapper = Snapper::new(&settings.grid);

        self.interaction = match self.tool {
            Tool::Select => self.begin_select(event, world),
            tool if tool.draws() => {
                let start = snapper.snap(world);
                Interaction::Draw {
                    tool,
                    start,
                    current: start,
                }
            }
            Tool::Rod | Tool::Spring | Tool::Rope | Tool::RigidRope => {
                let scene = &self.doc.scene;
                let source = hit::body_at(scene, world).and_then(|body| {
                    Some(Endpoint {
                        body: Some(body),
                        world: scene.body_position(body)?,
                    })
                });
                match (source, self.tool.constraint_kind()) {
                    (Some(source), Some(kind)) => Interaction::ConstraintDraw {
                        kind,
                        source,
                        current: world,
                    },
                    _ => Interaction::None,
                }
            }
            Tool::Ruler => {
                let start = snapper.snap(world);
                self.measurement = None;
                Interaction::MeasureRuler {
                    start,
                    current: start,
                }
            }
            Tool::Protractor => {
                let current = snapper.snap(world);
                match self.measurement {
                    Some(Measurement::Protractor {
                        vertex,
                        first,
                        second: None,
                    }) => Interaction::MeasureProtractor {
                        vertex,
                        first: Some(first),
                        current,
                    },
                    _ => {
                        self.measurement = None;
                        Interaction::MeasureProtractor {
                            vertex: current,
                            first: None,
                            current,
                        }
                    }
                }
            }
            Tool::Velocity => {
                let scene = &self.doc.scene;
                hit::body_at(scene, world)
                    .and_then(|body| Some((body, scene.body_position(body)?)))
                    .map_or(Interaction::None, |(body, start)| Interaction::SetVelocity {
                        body,
                        start,
                        current: world,
                    })
            }
            _ => Interaction::None,
        };
        if !self.interaction.is_none() {
            tracing::debug!("[editor] begin {} with {:?}", self.interaction.name(), self.tool);
        }
    }

    fn begin_select(&self, event: &PointerEvent, world: Vec2) -> Interaction {
        let scene = &self.doc.scene;
        let hit = hit::hit_test(scene, &self.doc.selection, world, self.camera.zoom);
        match hit {
            Hit::BodyHandle(_, BodyHandle::Move) => self.begin_move(world, self.doc.selection.clone()),
            Hit::BodyHandle(id, BodyHandle::Rotate) => scene
                .body_snapshot(id)
                .map_or(Interaction::None, |before| Interaction::RotateBody {
                    drag_start_angle: (world - before.position).to_angle(),
                    angle: before.angle,
                    before,
                }),
            Hit::BodyHandle(id, BodyHandle::Resize) => scene
                .body_snapshot(id)
                .map_or(Interaction::None, |before| Interaction::ResizeBody { before }),
            Hit::ConstraintEndpoint(id, side) => scene
                .constraint_snapshot(id)
                .map_or(Interaction::None, |before| Interaction::DragConstraintEndpoint { side, before }),
            Hit::FieldHandle(id, FieldHandle::Move) => {
                scene
                    .field(id)
                    .cloned()
                    .map_or(Interaction::None, |before| Interaction::MoveField {
                        drag_start: world,
                        before,
                        selection_before: self.doc.selection.clone(),
                    })
            }
            Hit::FieldHandle(id, FieldHandle::Resize) => scene
                .field(id)
                .cloned()
                .map_or(Interaction::None, |before| Interaction::ResizeField { before }),
            Hit::Body(_) | Hit::Constraint(_) | Hit::Field(_) | Hit::Empty => Interaction::SelectPress {
                hit,
                start_screen: event.screen,
                start_world: world,
                additive: event.additive,
            },
        }
    }

    /// Captures every movable selected body so the group translates rigidly.
    fn begin_move(&self, drag_start: Vec2, selection_before: Selection) -> Interaction {
        let before: Vec<BodySnapshot> = self
            .doc
            .selection
            .movable_bodies()
            .into_iter()
            .filter_map(|id| self.doc.scene.body_snapshot(id))
            .collect();
        if before.is_empty() {
            return Interaction::None;
        }
        Interaction::MoveSelection {
            drag_start,
            before,
            offset: Vec2::ZERO,
            selection_before,
        }
    }

    // ------------------------------------------------------------------
    // Pointer move
    // ------------------------------------------------------------------

    fn pointer_move(&mut self, event: &PointerEvent, settings: &SimSettings) {
        let world = self.camera.screen_to_world(event.screen);
        let snapper = Snapper::new(&settings.grid);
        let mut interaction = std::mem::take(&mut self.interaction);

        match &mut interaction {
            Interaction::None => {}
            Interaction::Pan { last_screen } => {
                self.camera.pan_by(event.screen - *last_screen);
                *last_screen = event.screen;
            }
            Interaction::Draw { current, .. }
            | Interaction::MeasureRuler { current, .. }
            | Interaction::MeasureProtractor { current, .. } => *current = snapper.snap(world),
            Interaction::SetVelocity { current, .. }
            | Interaction::BoxSelect { current, .. }
            | Interaction::ConstraintDraw { current, .. } => *current = world,
            Interaction::SelectPress {
                hit,
                start_screen,
                start_world,
                additive,
            } => {
                let travel = event.screen - *start_screen;
                if travel.length_squared() > DRAG_THRESHOLD_PX * DRAG_THRESHOLD_PX {
                    interaction = self.resolve_press(*hit, *start_world, *additive, world);
                    self.drag_live(&mut interaction, world, &snapper);
                }
            }
            live => self.drag_live(live, world, &snapper),
        }
        self.interaction = interaction;
    }

    /// Turns a press that moved past the threshold into a drag.
    fn resolve_press(&mut self, hit: Hit, start: Vec2, additive: bool, world: Vec2) -> Interaction {
        let selection_before = self.doc.selection.clone();
        match hit {
            Hit::Body(id) => {
                if !self.doc.selection.contains_body(id) && self.doc.selection.primary != SelectedEntity::Body(id) {
                    if additive {
                        self.doc.selection.toggle_body(id);
                    } else {
                        self.doc.selection.select_body(id);
                    }
                }
                let interaction = self.begin_move(start, selection_before.clone());
                if interaction.is_none() {
                    self.doc.selection = selection_before;
                }
                interaction
            }
            Hit::Field(id) => match self.doc.scene.field(id).cloned() {
                Some(before) => {
                    self.doc.selection.select_field(id);
                    Interaction::MoveField {
                        drag_start: start,
                        before,
                        selection_before,
                    }
                }
                None => Interaction::None,
            },
            Hit::Empty => Interaction::BoxSelect {
                start,
                current: world,
                additive,
            },
            // Nothing to drag; release still counts as a click.
            _ => Interaction::SelectPress {
                hit,
                start_screen: self.camera.world_to_screen(start),
                start_world: start,
                additive,
            },
        }
    }

    /// Applies a live gesture for the pointer at `world`.
    fn drag_live(&mut self, interaction: &mut Interaction, world: Vec2, snapper: &Snapper) {
        let scene = &mut self.doc.scene;
        match interaction {
            Interaction::MoveSelection {
                drag_start,
                before,
                offset,
                ..
            } => {
                let Some(lead) = before.first() else {
                    return;
                };
                // Snap the lead body and carry the rest along rigidly.
                *offset = snapper.snap(lead.position + (world - *drag_start)) - lead.position;
            }
            Interaction::RotateBody {
                before,
                drag_start_angle,
                angle,
            } => {
                let raw = before.angle + ((world - before.position).to_angle() - *drag_start_angle);
                *angle = snapper.snap_angle(raw);
            }
            Interaction::ResizeBody { before } => {
                place_body(scene, before.id, before.position, before.angle);
                let Some(mut current) = scene.body_snapshot(before.id) else {
                    return;
                };
                let local = shape::to_local(current.position, current.angle, snapper.snap(world));
                let resized = before.shape.resized_to(local).clamped();
                if resized != current.shape {
                    current.shape = resized;
                    current.meta.volume = units::world_area_to_square_meters(resized.area());
                    scene.upsert_body(&current);
                }
            }
            Interaction::MoveField {
                drag_start, before, ..
            } => {
                let center = snapper.snap(before.shape.center() + (world - *drag_start));
                let mut region = before.clone();
                region.shape = before.shape.with_center(center);
                scene.upsert_field(region);
            }
            Interaction::ResizeField { before } => {
                let mut region = before.clone();
                region.shape = before.shape.resized_to(snapper.snap(world));
                scene.upsert_field(region);
            }
            Interaction::DragConstraintEndpoint { side, before } => {
                let Some(handle) = scene.constraint_handle(before.id) else {
                    return;
                };
                if let Some(joint) = scene.world.joint_mut(handle) {
                    let end = JointEnd::Point(snapper.snap(world));
                    match side {
                        EndpointSide::A => joint.a = end,
                        EndpointSide::B => joint.b = end,
                    }
                }
            }
            _ => {}
        }
        hold_pose(&mut self.doc.scene, interaction);
    }

    // ------------------------------------------------------------------
    // Pointer up
    // ------------------------------------------------------------------

    fn pointer_up(&mut self, event: &PointerEvent, settings: &SimSettings) {
        let world = self.camera.screen_to_world(event.screen);
        let snapper = Snapper::new(&settings.grid);
        let interaction = std::mem::take(&mut self.interaction);

        match interaction {
            Interaction::None | Interaction::Pan { .. } => {}
            Interaction::Draw { tool, start, .. } => {
                self.finish_draw(tool, start, snapper.snap(world), settings);
            }
            Interaction::MeasureRuler { start, .. } => {
                self.measurement = Some(Measurement::Ruler {
                    start,
                    end: snapper.snap(world),
                });
            }
            Interaction::MeasureProtractor { vertex, first, .. } => {
                let end = snapper.snap(world);
                self.measurement = match first {
                    None if vertex.distance(end) >= MIN_SHAPE_SIZE => Some(Measurement::Protractor {
                        vertex,
                        first: end,
                        second: None,
                    }),
                    None => None,
                    Some(first) => Some(Measurement::Protractor {
                        vertex,
                        first,
                        second: Some(end),
                    }),
                };
            }
            Interaction::SetVelocity { body, start, .. } => {
                let velocity_mps = (world - start) / units::PIXELS_PER_METER * VELOCITY_PER_METER;
                self.set_body_velocity_mps(body, velocity_mps);
            }
            Interaction::SelectPress { hit, additive, .. } => self.click(hit, additive),
            Interaction::BoxSelect {
                start, additive, ..
            } => {
                let ids = hit::bodies_in_rect(&self.doc.scene, start, world);
                tracing::debug!("[editor] box select {} bodies", ids.len());
                self.doc.selection.set_bodies(&ids, additive);
            }
            Interaction::MoveSelection {
                before,
                selection_before,
                ..
            } => {
                let after = self.current_bodies(&before);
                self.commit_bodies("move", before, after, Some(selection_before));
            }
            Interaction::RotateBody { before, .. } => {
                let after = self.current_bodies(std::slice::from_ref(&before));
                self.commit_bodies("rotate", vec![before], after, None);
            }
            Interaction::ResizeBody { before } => {
                let after = self.current_bodies(std::slice::from_ref(&before));
                self.commit_bodies("resize", vec![before], after, None);
            }
            Interaction::MoveField {
                before,
                selection_before,
                ..
            } => self.commit_field("move field", before, selection_before),
            Interaction::ResizeField { before } => {
                let selection = self.doc.selection.clone();
                self.commit_field("resize field", before, selection);
            }
            Interaction::DragConstraintEndpoint { side, before } => {
                self.finish_endpoint_drag(side, before, snapper.snap(world));
            }
            Interaction::ConstraintDraw { kind, source, .. } => {
                self.finish_constraint_draw(kind, source, world, &snapper, settings);
            }
        }
    }

    fn click(&mut self, hit: Hit, additive: bool) {
        let selection = &mut self.doc.selection;
        match hit {
            Hit::Body(id) if additive => selection.toggle_body(id),
            Hit::Body(id) => selection.select_body(id),
            Hit::Constraint(id) => selection.select_constraint(id),
            Hit::Field(id) => selection.select_field(id),
            Hit::Empty if !additive => selection.clear(),
            _ => {}
        }
    }

    fn current_bodies(&self, before: &[BodySnapshot]) -> Vec<BodySnapshot> {
        before
            .iter()
            .filter_map(|b| self.doc.scene.body_snapshot(b.id))
            .collect()
    }

    /// Commits a live body edit, skipped when nothing changed.
    fn commit_bodies(
        &mut self,
        label: &str,
        before: Vec<BodySnapshot>,
        after: Vec<BodySnapshot>,
        selection_before: Option<Selection>,
    ) {
        let selection_before = selection_before.unwrap_or_else(|| self.doc.selection.clone());
        if before == after && selection_before == self.doc.selection {
            return;
        }
        // A body removed mid-gesture leaves nothing consistent to commit.
        if before.len() != after.len() {
            return;
        }
        self.commit_live(
            label,
            SceneDelta {
                bodies: after,
                ..SceneDelta::default()
            },
            SceneDelta {
                bodies: before,
                ..SceneDelta::default()
            },
            selection_before,
        );
    }

    fn commit_field(&mut self, label: &str, before: FieldRegion, selection_before: Selection) {
        let Some(after) = self.doc.scene.field(before.id).cloned() else {
            return;
        };
        if after == before && selection_before == self.doc.selection {
            return;
        }
        self.commit_live(
            label,
            SceneDelta {
                fields: vec![after],
                ..SceneDelta::default()
            },
            SceneDelta {
                fields: vec![before],
                ..SceneDelta::default()
            },
            selection_before,
        );
    }

    fn finish_draw(&mut self, tool: Tool, start: Vec2, end: Vec2, settings: &SimSettings) {
        let scene = &mut self.doc.scene;
        if let Some(body_tool) = tool.body_tool() {
            let Some(body) = spawn::body_from_drag(scene, body_tool, start, end, self.options.polygon_sides, settings)
            else {
                return;
            };
            let mut selection = Selection::default();
            selection.select_body(body.id);
            self.commit_creation(format!("add {body_tool:?}"), vec![body], Vec::new(), Vec::new(), selection);
        } else if let Some(magnetic) = tool.field_tool() {
            let Some(region) = spawn::field_from_drag(scene, magnetic, self.options.field_shape, start, end) else {
                return;
            };
            let mut selection = Selection::default();
            selection.select_field(region.id);
            self.commit_creation("add field", Vec::new(), Vec::new(), vec![region], selection);
        }
    }

    fn finish_constraint_draw(
        &mut self,
        kind: ConstraintKind,
        source: Endpoint,
        world: Vec2,
        snapper: &Snapper,
        settings: &SimSettings,
    ) {
        let scene = &mut self.doc.scene;
        let target = match hit::body_at(scene, world).filter(|id| Some(*id) != source.body) {
            Some(body) => {
                let Some(position) = scene.body_position(body) else {
                    return;
                };
                Endpoint {
                    body: Some(body),
                    world: position,
                }
            }
            None => Endpoint {
                body: None,
                world: snapper.snap(world),
            },
        };

        if matches!(kind, ConstraintKind::Rope | ConstraintKind::RigidRope) {
            let Some(plan) = spawn::rope_chain(scene, kind, source, target, settings) else {
                return;
            };
            tracing::debug!(
                "[editor] rope chain with {} segments, {} links",
                plan.bodies.len(),
                plan.constraints.len()
            );
            let selection = self.doc.selection.clone();
            self.commit_creation("add rope", plan.bodies, plan.constraints, Vec::new(), selection);
        } else {
            let Some(constraint) =
                spawn::direct_constraint(scene, kind, self.options.spring_mode, source, target, settings)
            else {
                return;
            };
            let mut selection = Selection::default();
            selection.select_constraint(constraint.id);
            self.commit_creation(format!("add {kind:?}"), Vec::new(), vec![constraint], Vec::new(), selection);
        }
    }

    /// Re-attaches the dragged end to the body under the pointer, or pins it
    /// to the world point.
    fn finish_endpoint_drag(&mut self, side: EndpointSide, before: ConstraintSnapshot, point: Vec2) {
        let scene = &mut self.doc.scene;
        if !scene.contains_constraint(before.id) {
            return;
        }
        let other = match side {
            EndpointSide::A => before.body_b,
            EndpointSide::B => before.body_a,
        };
        let (body, anchor) = match hit::body_at(scene, point).filter(|id| Some(*id) != other) {
            Some(id) => (Some(id), Vec2::ZERO),
            None => (None, point),
        };
        let mut after = before.clone();
        match side {
            EndpointSide::A => {
                after.body_a = body;
                after.point_a = anchor;
            }
            EndpointSide::B => {
                after.body_b = body;
                after.point_b = anchor;
            }
        }
        if scene.upsert_constraint(&after).is_none() {
            scene.upsert_constraint(&before);
            return;
        }
        resync_rest_length(scene, before.id);
        let Some(mut after) = scene.constraint_snapshot(before.id) else {
            return;
        };
        after.length = after.meta.rest_length;
        if after == before {
            return;
        }
        let selection = self.doc.selection.clone();
        self.commit_live(
            "move endpoint",
            SceneDelta {
                constraints: vec![after],
                ..SceneDelta::default()
            },
            SceneDelta {
                constraints: vec![before],
                ..SceneDelta::default()
            },
            selection,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridSettings;
    use crate::meta::SpringMode;
    use crate::scene::tests::ball_snapshot;
    use crate::spawn::rope_segment_count;

    fn settings() -> SimSettings {
        SimSettings::default()
    }

    fn drag(editor: &mut Editor, from: Vec2, to: Vec2) {
        let settings = settings();
        editor.handle_pointer(&PointerEvent::down(1, from), &settings);
        editor.handle_pointer(&PointerEvent::moved(1, (from + to) * 0.5), &settings);
        editor.handle_pointer(&PointerEvent::moved(1, to), &settings);
        editor.handle_pointer(&PointerEvent::up(1, to), &settings);
    }

    fn click(editor: &mut Editor, at: Vec2) {
        let settings = settings();
        editor.handle_pointer(&PointerEvent::down(1, at), &settings);
        editor.handle_pointer(&PointerEvent::up(1, at), &settings);
    }

    fn add_ball(editor: &mut Editor, position: Vec2, radius: f32) -> BodyId {
        let snap = ball_snapshot(editor.scene_mut(), position, radius);
        let id = snap.id;
        editor.commit_creation("add", vec![snap], Vec::new(), Vec::new(), Selection::default());
        id
    }

    #[test]
    fn test_draw_circle_selects_it_and_undoes() {
        let mut editor = Editor::default();
        editor.set_tool(Tool::Circle);
        drag(&mut editor, Vec2::new(100.0, 100.0), Vec2::new(130.0, 140.0));

        let ids = editor.scene().body_ids();
        assert_eq!(ids.len(), 1);
        assert_eq!(editor.selection().primary, SelectedEntity::Body(ids[0]));
        let shape = editor.scene().body_shape(ids[0]).unwrap();
        assert_eq!(shape, crate::shape::ShapeDescriptor::Circle { radius: 50.0 });
        assert!(editor.interaction().is_none());

        assert!(editor.undo());
        assert!(editor.scene().body_ids().is_empty());
        assert!(editor.selection().is_empty());
    }

    #[test]
    fn test_tiny_draw_creates_nothing() {
        let mut editor = Editor::default();
        editor.set_tool(Tool::Rectangle);
        drag(&mut editor, Vec2::new(10.0, 10.0), Vec2::new(11.0, 12.0));
        assert!(editor.scene().body_ids().is_empty());
        assert!(!editor.history.can_undo());
        assert!(editor.interaction().is_none());
    }

    #[test]
    fn test_click_then_small_drag_keeps_selection_and_position() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 20.0);
        let b = add_ball(&mut editor, Vec2::new(300.0, 100.0), 20.0);
        click(&mut editor, Vec2::new(100.0, 100.0));
        assert_eq!(editor.selection().primary, SelectedEntity::Body(a));
        let undo_depth = editor.history.undo_len();

        // Press on the other body but stay under the drag threshold.
        let settings = settings();
        let start = Vec2::new(300.0, 100.0);
        editor.handle_pointer(&PointerEvent::down(1, start), &settings);
        editor.handle_pointer(&PointerEvent::moved(1, start + Vec2::new(2.0, 1.0)), &settings);
        assert!(matches!(editor.interaction(), Interaction::SelectPress { .. }));
        editor.handle_pointer(&PointerEvent::moved(1, start + Vec2::new(1.0, 2.0)), &settings);
        editor.handle_pointer(&PointerEvent::up(1, start + Vec2::new(1.0, 2.0)), &settings);

        assert_eq!(editor.scene().body_position(b), Some(start));
        assert_eq!(editor.history.undo_len(), undo_depth);
        // Released as a click on `b`, which becomes the selection target.
        assert_eq!(editor.selection().primary, SelectedEntity::Body(b));

        // Same again on the already selected body: nothing changes.
        let before = editor.selection().clone();
        editor.handle_pointer(&PointerEvent::down(1, start), &settings);
        editor.handle_pointer(&PointerEvent::moved(1, start + Vec2::new(3.0, 0.0)), &settings);
        editor.handle_pointer(&PointerEvent::up(1, start + Vec2::new(3.0, 0.0)), &settings);
        assert_eq!(editor.selection(), &before);
        assert_eq!(editor.scene().body_position(b), Some(start));
    }

    #[test]
    fn test_drag_moves_multi_selection_rigidly() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 20.0);
        let b = add_ball(&mut editor, Vec2::new(300.0, 100.0), 20.0);
        editor.select_all();
        let selection_before = editor.selection().clone();
        let before = editor.scene().snapshot();

        drag(&mut editor, Vec2::new(100.0, 100.0), Vec2::new(150.0, 80.0));
        assert_eq!(editor.scene().body_position(a), Some(Vec2::new(150.0, 80.0)));
        assert_eq!(editor.scene().body_position(b), Some(Vec2::new(350.0, 80.0)));

        assert!(editor.undo());
        assert!(editor.scene().snapshot().approx_eq(&before, 1e-4));
        assert_eq!(editor.selection(), &selection_before);
        assert!(editor.redo());
        assert_eq!(editor.scene().body_position(b), Some(Vec2::new(350.0, 80.0)));
    }

    #[test]
    fn test_dragging_unselected_body_selects_and_moves_it() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 20.0);
        let b = add_ball(&mut editor, Vec2::new(300.0, 100.0), 20.0);
        click(&mut editor, Vec2::new(100.0, 100.0));

        drag(&mut editor, Vec2::new(300.0, 100.0), Vec2::new(300.0, 200.0));
        assert_eq!(editor.selection().primary, SelectedEntity::Body(b));
        assert_eq!(editor.scene().body_position(a), Some(Vec2::new(100.0, 100.0)));
        assert_eq!(editor.scene().body_position(b), Some(Vec2::new(300.0, 200.0)));

        editor.undo();
        assert_eq!(editor.selection().primary, SelectedEntity::Body(a));
    }

    #[test]
    fn test_move_snaps_final_position_to_grid() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 20.0);
        let settings = SimSettings {
            grid: GridSettings {
                enabled: true,
                step_m: 0.5,
            },
            ..SimSettings::default()
        };
        editor.handle_pointer(&PointerEvent::down(1, Vec2::new(100.0, 100.0)), &settings);
        editor.handle_pointer(&PointerEvent::moved(1, Vec2::new(137.0, 112.0)), &settings);
        editor.handle_pointer(&PointerEvent::up(1, Vec2::new(137.0, 112.0)), &settings);
        assert_eq!(editor.scene().body_position(a), Some(Vec2::new(125.0, 100.0)));
    }

    #[test]
    fn test_box_select_additive_and_empty() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 10.0);
        let b = add_ball(&mut editor, Vec2::new(300.0, 100.0), 10.0);
        click(&mut editor, Vec2::new(100.0, 100.0));

        // An empty sweep with the modifier keeps the selection.
        let settings = settings();
        let sweep = |editor: &mut Editor, from: Vec2, to: Vec2, additive: bool| {
            editor.handle_pointer(&PointerEvent::down(1, from).with_additive(additive), &settings);
            editor.handle_pointer(&PointerEvent::moved(1, to).with_additive(additive), &settings);
            editor.handle_pointer(&PointerEvent::up(1, to).with_additive(additive), &settings);
        };
        sweep(&mut editor, Vec2::new(500.0, 500.0), Vec2::new(600.0, 600.0), true);
        assert_eq!(editor.selection().bodies, vec![a]);

        sweep(&mut editor, Vec2::new(250.0, 50.0), Vec2::new(350.0, 150.0), true);
        assert_eq!(editor.selection().bodies, vec![a, b]);

        // Without the modifier an empty sweep clears.
        sweep(&mut editor, Vec2::new(500.0, 500.0), Vec2::new(600.0, 600.0), false);
        assert!(editor.selection().is_empty());
        // Box selection never enters the history.
        assert_eq!(editor.history.undo_len(), 2);
    }

    #[test]
    fn test_rope_tool_builds_group_that_deletes_atomically() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 20.0);
        let b = add_ball(&mut editor, Vec2::new(400.0, 100.0), 20.0);
        editor.set_tool(Tool::Rope);
        drag(&mut editor, Vec2::new(100.0, 100.0), Vec2::new(400.0, 100.0));

        let segments = rope_segment_count(300.0);
        assert_eq!(segments, 6);
        assert_eq!(editor.scene().body_ids().len(), 2 + segments);
        assert_eq!(editor.scene().constraint_ids().len(), segments + 1);
        let segment = editor.scene().body_ids()[2];
        let group = editor.scene().body_meta(segment).unwrap().rope_group.unwrap();
        assert_eq!(editor.scene().rope_group_bodies(group).len(), segments);

        // Deleting one segment removes the whole chain but not the endpoints.
        editor.set_tool(Tool::Select);
        editor.doc.selection.select_body(segment);
        let before = editor.scene().snapshot();
        assert!(editor.delete_selected());
        assert_eq!(editor.scene().body_ids(), vec![a, b]);
        assert!(editor.scene().constraint_ids().is_empty());

        // Deleting via an endpoint body takes the chain along too.
        editor.undo();
        assert!(editor.scene().snapshot().approx_eq(&before, 1e-4));
        editor.doc.selection.select_body(a);
        assert!(editor.delete_selected());
        assert_eq!(editor.scene().body_ids(), vec![b]);
        assert!(editor.scene().constraint_ids().is_empty());
    }

    #[test]
    fn test_constraint_tool_needs_a_source_body() {
        let mut editor = Editor::default();
        editor.set_tool(Tool::Rod);
        let settings = settings();
        editor.handle_pointer(&PointerEvent::down(1, Vec2::new(10.0, 10.0)), &settings);
        assert!(editor.interaction().is_none());
        editor.handle_pointer(&PointerEvent::up(1, Vec2::new(200.0, 10.0)), &settings);
        assert!(editor.scene().constraint_ids().is_empty());
    }

    #[test]
    fn test_rod_to_world_point_respects_min_distance() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 10.0);
        editor.set_tool(Tool::Rod);
        drag(&mut editor, Vec2::new(100.0, 100.0), Vec2::new(105.0, 112.0));
        assert!(editor.scene().constraint_ids().is_empty());

        drag(&mut editor, Vec2::new(100.0, 100.0), Vec2::new(100.0, 0.0));
        let ids = editor.scene().constraint_ids();
        assert_eq!(ids.len(), 1);
        assert_eq!(editor.scene().constraint_bodies(ids[0]), (Some(a), None));
        assert_eq!(editor.selection().primary, SelectedEntity::Constraint(ids[0]));
        let (pa, pb) = editor.scene().constraint_endpoints(ids[0]).unwrap();
        assert!((pa.distance(pb) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_axis_spring_from_body_to_point() {
        let mut editor = Editor::default();
        add_ball(&mut editor, Vec2::new(100.0, 100.0), 10.0);
        editor.set_tool(Tool::Spring);
        editor.options.spring_mode = SpringMode::Axis;
        drag(&mut editor, Vec2::new(100.0, 100.0), Vec2::new(100.0, 0.0));
        let id = editor.scene().constraint_ids()[0];
        assert!(editor.scene().constraint_meta(id).unwrap().is_axis_spring());
    }

    #[test]
    fn test_endpoint_drag_reattaches_and_undoes() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 10.0);
        let b = add_ball(&mut editor, Vec2::new(100.0, 300.0), 10.0);
        editor.set_tool(Tool::Rod);
        drag(&mut editor, Vec2::new(100.0, 100.0), Vec2::new(300.0, 100.0));
        let id = editor.scene().constraint_ids()[0];
        let before = editor.scene().snapshot();

        // The rod is selected; grab its free end and drop it on `b`.
        editor.set_tool(Tool::Select);
        drag(&mut editor, Vec2::new(300.0, 100.0), Vec2::new(100.0, 300.0));
        assert_eq!(editor.scene().constraint_bodies(id), (Some(a), Some(b)));
        let meta = editor.scene().constraint_meta(id).unwrap();
        assert!((meta.rest_length - 200.0).abs() < 1e-3);

        editor.undo();
        assert!(editor.scene().snapshot().approx_eq(&before, 1e-4));
    }

    #[test]
    fn test_rotate_handle_turns_body() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 20.0);
        click(&mut editor, Vec2::new(100.0, 100.0));
        // Rotate handle sits above the body; drag it to the right side.
        drag(&mut editor, Vec2::new(100.0, 56.0), Vec2::new(144.0, 100.0));
        let angle = editor.scene().body_angle(a).unwrap();
        assert!((angle - std::f32::consts::FRAC_PI_2).abs() < 1e-3);
        editor.undo();
        assert!(editor.scene().body_angle(a).unwrap().abs() < 1e-5);
    }

    #[test]
    fn test_rotation_is_held_across_steps() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 20.0);
        click(&mut editor, Vec2::new(100.0, 100.0));
        let settings = settings();
        editor.handle_pointer(&PointerEvent::down(1, Vec2::new(100.0, 56.0)), &settings);
        editor.handle_pointer(&PointerEvent::moved(1, Vec2::new(144.0, 100.0)), &settings);

        for _ in 0..20 {
            editor.scene_mut().world.step(units::BASE_DELTA_MS);
            editor.hold_gesture();
        }
        assert_eq!(editor.scene().body_position(a), Some(Vec2::new(100.0, 100.0)));
        let angle = editor.scene().body_angle(a).unwrap();
        assert!((angle - std::f32::consts::FRAC_PI_2).abs() < 1e-3);

        editor.handle_pointer(&PointerEvent::up(1, Vec2::new(144.0, 100.0)), &settings);
        assert!(editor.interaction().is_none());
        assert_eq!(editor.history.undo_len(), 2);
    }

    #[test]
    fn test_resize_handle_grows_circle() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 20.0);
        click(&mut editor, Vec2::new(100.0, 100.0));
        drag(&mut editor, Vec2::new(120.0, 100.0), Vec2::new(140.0, 100.0));
        assert_eq!(
            editor.scene().body_shape(a),
            Some(crate::shape::ShapeDescriptor::Circle { radius: 40.0 })
        );
        editor.undo();
        assert_eq!(
            editor.scene().body_shape(a),
            Some(crate::shape::ShapeDescriptor::Circle { radius: 20.0 })
        );
    }

    #[test]
    fn test_field_draw_move_and_undo() {
        let mut editor = Editor::default();
        editor.set_tool(Tool::MagneticField);
        drag(&mut editor, Vec2::new(0.0, 0.0), Vec2::new(200.0, 100.0));
        let id = editor.scene().fields()[0].id;
        assert_eq!(editor.selection().primary, SelectedEntity::Field(id));

        editor.set_tool(Tool::Select);
        editor.clear_selection();
        drag(&mut editor, Vec2::new(50.0, 50.0), Vec2::new(150.0, 50.0));
        assert_eq!(editor.scene().field(id).unwrap().shape.center(), Vec2::new(200.0, 50.0));
        assert_eq!(editor.selection().primary, SelectedEntity::Field(id));

        editor.undo();
        assert_eq!(editor.scene().field(id).unwrap().shape.center(), Vec2::new(100.0, 50.0));
        assert!(editor.selection().is_empty());
    }

    #[test]
    fn test_other_pointers_are_ignored_mid_gesture() {
        let mut editor = Editor::default();
        editor.set_tool(Tool::Circle);
        let settings = settings();
        editor.handle_pointer(&PointerEvent::down(1, Vec2::new(0.0, 0.0)), &settings);
        editor.handle_pointer(&PointerEvent::down(2, Vec2::new(500.0, 500.0)), &settings);
        editor.handle_pointer(&PointerEvent::up(2, Vec2::new(900.0, 500.0)), &settings);
        assert!(matches!(editor.interaction(), Interaction::Draw { .. }));
        assert!(editor.scene().body_ids().is_empty());

        editor.handle_pointer(&PointerEvent::up(1, Vec2::new(30.0, 40.0)), &settings);
        assert!(editor.interaction().is_none());
        assert_eq!(editor.scene().body_ids().len(), 1);
    }

    #[test]
    fn test_secondary_button_pans_with_any_tool() {
        let mut editor = Editor::default();
        editor.set_tool(Tool::Circle);
        let settings = settings();
        let down = PointerEvent::down(3, Vec2::new(100.0, 100.0)).with_button(PointerButton::Secondary);
        editor.handle_pointer(&down, &settings);
        assert!(matches!(editor.interaction(), Interaction::Pan { .. }));
        editor.handle_pointer(&PointerEvent::moved(3, Vec2::new(130.0, 100.0)), &settings);
        editor.handle_pointer(&PointerEvent::up(3, Vec2::new(130.0, 100.0)), &settings);
        assert_eq!(editor.camera.offset, Vec2::new(-30.0, 0.0));
        assert!(editor.scene().body_ids().is_empty());
    }

    #[test]
    fn test_cancel_reverts_live_move() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 20.0);
        let settings = settings();
        editor.handle_pointer(&PointerEvent::down(1, Vec2::new(100.0, 100.0)), &settings);
        editor.handle_pointer(&PointerEvent::moved(1, Vec2::new(200.0, 100.0)), &settings);
        assert_eq!(editor.scene().body_position(a), Some(Vec2::new(200.0, 100.0)));
        let cancel = PointerEvent {
            phase: PointerPhase::Cancel,
            ..PointerEvent::up(1, Vec2::new(200.0, 100.0))
        };
        editor.handle_pointer(&cancel, &settings);
        assert_eq!(editor.scene().body_position(a), Some(Vec2::new(100.0, 100.0)));
        assert!(editor.interaction().is_none());
    }

    #[test]
    fn test_ruler_measures_meters() {
        let mut editor = Editor::default();
        editor.set_tool(Tool::Ruler);
        drag(&mut editor, Vec2::ZERO, Vec2::new(150.0, 0.0));
        let m = editor.measurement().unwrap();
        assert!((m.length_m().unwrap() - 3.0).abs() < 1e-4);
        assert!(m.angle_deg().unwrap().abs() < 1e-4);
    }

    #[test]
    fn test_protractor_two_phases() {
        let mut editor = Editor::default();
        editor.set_tool(Tool::Protractor);
        drag(&mut editor, Vec2::new(100.0, 100.0), Vec2::new(200.0, 100.0));
        let first = *editor.measurement().unwrap();
        assert!(matches!(first, Measurement::Protractor { second: None, .. }));
        assert_eq!(first.angle_deg(), None);

        // The second press keeps the vertex and draws the second ray.
        drag(&mut editor, Vec2::new(100.0, 100.0), Vec2::new(100.0, 0.0));
        let done = editor.measurement().unwrap();
        assert!((done.angle_deg().unwrap() - 90.0).abs() < 1e-3);

        // A third press starts over.
        let settings = settings();
        editor.handle_pointer(&PointerEvent::down(1, Vec2::new(0.0, 0.0)), &settings);
        assert!(matches!(
            editor.interaction(),
            Interaction::MeasureProtractor { first: None, .. }
        ));
    }

    #[test]
    fn test_velocity_tool_sets_two_mps_per_meter() {
        let mut editor = Editor::default();
        let a = add_ball(&mut editor, Vec2::new(100.0, 100.0), 20.0);
        editor.set_tool(Tool::Velocity);
        // One meter to the right of the center.
        drag(&mut editor, Vec2::new(105.0, 100.0), Vec2::new(150.0, 100.0));
        let snap = editor.scene().body_snapshot(a).unwrap();
        assert!((snap.velocity_mps.x - 2.0).abs() < 1e-3);
        editor.undo();
        assert_eq!(editor.scene().body_snapshot(a).unwrap().velocity_mps, Vec2::ZERO);
    }
}
