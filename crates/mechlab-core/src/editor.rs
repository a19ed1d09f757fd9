//! Editor state and the undoable operations on it.
//!
//! Every scene change the editor makes is a [`SceneEdit`]: the delta to
//! apply, the delta that reverts it, and the selection on either side. The
//! pointer state machine lives in [`crate::interaction`].

use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::config::SimSettings;
use crate::field::FieldRegion;
use crate::history::{History, Reversible};
use crate::interaction::{Interaction, Measurement};
use crate::meta::{BodyId, BodyMetaPatch, ConstraintId, ConstraintKind, ConstraintMetaPatch, SpringMode};
use crate::physics::Material;
use crate::scene::{BodySnapshot, ConstraintSnapshot, Scene, SceneDelta};
use crate::selection::{SelectedEntity, Selection};
use crate::spawn::{BodyTool, FieldShapeKind};

/// What the history operates on.
#[derive(Debug, Default)]
pub struct Document {
    pub scene: Scene,
    pub selection: Selection,
}

/// A reversible scene edit described as data.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneEdit {
    pub label: String,
    pub forward: SceneDelta,
    pub backward: SceneDelta,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

impl Reversible<Document> for SceneEdit {
    fn forward(&self, doc: &mut Document) {
        doc.scene.apply_delta(&self.forward);
        doc.selection = self.selection_after.clone();
    }

    fn backward(&self, doc: &mut Document) {
        doc.scene.apply_delta(&self.backward);
        doc.selection = self.selection_before.clone();
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Select,
    Pan,
    Circle,
    Rectangle,
    Polygon,
    Wall,
    Slope,
    Conveyor,
    Track,
    ElectricField,
    MagneticField,
    Rod,
    Spring,
    Rope,
    RigidRope,
    Ruler,
    Protractor,
    Velocity,
}

impl Tool {
    pub fn body_tool(self) -> Option<BodyTool> {
        match self {
            Self::Circle => Some(BodyTool::Circle),
            Self::Rectangle => Some(BodyTool::Rectangle),
            Self::Polygon => Some(BodyTool::Polygon),
            Self::Wall => Some(BodyTool::Wall),
            Self::Slope => Some(BodyTool::Slope),
            Self::Conveyor => Some(BodyTool::Conveyor),
            Self::Track => Some(BodyTool::Track),
            _ => None,
        }
    }

    /// `Some(true)` for magnetic, `Some(false)` for electric field tools.
    pub fn field_tool(self) -> Option<bool> {
        match self {
            Self::ElectricField => Some(false),
            Self::MagneticField => Some(true),
            _ => None,
        }
    }

    pub fn constraint_kind(self) -> Option<ConstraintKind> {
        match self {
            Self::Rod => Some(ConstraintKind::Rod),
            Self::Spring => Some(ConstraintKind::Spring),
            Self::Rope => Some(ConstraintKind::Rope),
            Self::RigidRope => Some(ConstraintKind::RigidRope),
            _ => None,
        }
    }

    pub fn draws(self) -> bool {
        self.body_tool().is_some() || self.field_tool().is_some()
    }
}

/// Per-tool options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolOptions {
    pub polygon_sides: u32,
    pub spring_mode: SpringMode,
    pub field_shape: FieldShapeKind,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            polygon_sides: 5,
            spring_mode: SpringMode::Distance,
            field_shape: FieldShapeKind::Rect,
        }
    }
}

#[derive(Debug, Default)]
pub struct Editor {
    pub doc: Document,
    pub history: History<SceneEdit>,
    pub tool: Tool,
    pub options: ToolOptions,
    pub camera: Camera,
    pub(crate) interaction: Interaction,
    /// Pointer that owns the in-flight gesture.
    pub(crate) active_pointer: Option<u32>,
    pub(crate) measurement: Option<Measurement>,
}

impl Editor {
    pub fn new(scene: Scene) -> Self {
        Self {
            doc: Document {
                scene,
                selection: Selection::default(),
            },
            ..Self::default()
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.doc.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.doc.scene
    }

    pub fn selection(&self) -> &Selection {
        &self.doc.selection
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn measurement(&self) -> Option<&Measurement> {
        self.measurement.as_ref()
    }

    /// Resolves the primary selection, pruning entities that are gone.
    pub fn selected(&mut self) -> SelectedEntity {
        let Document { scene, selection } = &mut self.doc;
        selection.resolve(scene)
    }

    /// Switches tool, abandoning any gesture in flight.
    pub fn set_tool(&mut self, tool: Tool) {
        if self.tool != tool {
            self.cancel_gesture();
            if tool != Tool::Protractor {
                self.measurement = None;
            }
            tracing::debug!("[editor] tool {:?} -> {:?}", self.tool, tool);
            self.tool = tool;
        }
    }

    // ------------------------------------------------------------------
    // Commits
    // ------------------------------------------------------------------

    /// Records an edit whose forward effect has not been applied yet.
    pub fn commit(&mut self, label: impl Into<String>, forward: SceneDelta, backward: SceneDelta, selection_after: Selection) {
        let edit = SceneEdit {
            label: label.into(),
            forward,
            backward,
            selection_before: self.doc.selection.clone(),
            selection_after,
        };
        self.history.commit(&mut self.doc, edit);
    }

    /// Records an edit that was already applied live during a gesture.
    pub(crate) fn commit_live(
        &mut self,
        label: impl Into<String>,
        forward: SceneDelta,
        backward: SceneDelta,
        selection_before: Selection,
    ) {
        let edit = SceneEdit {
            label: label.into(),
            forward,
            backward,
            selection_before,
            selection_after: self.doc.selection.clone(),
        };
        self.history.commit(&mut self.doc, edit);
    }

    /// Commits newly created entities.
    pub fn commit_creation(
        &mut self,
        label: impl Into<String>,
        bodies: Vec<BodySnapshot>,
        constraints: Vec<ConstraintSnapshot>,
        fields: Vec<FieldRegion>,
        selection_after: Selection,
    ) {
        let backward = SceneDelta {
            remove_constraints: constraints.iter().map(|c| c.id).collect(),
            remove_bodies: bodies.iter().map(|b| b.id).collect(),
            remove_fields: fields.iter().map(|f| f.id).collect(),
            ..SceneDelta::default()
        };
        let forward = SceneDelta {
            bodies,
            constraints,
            fields,
            ..SceneDelta::default()
        };
        self.commit(label, forward, backward, selection_after);
    }

    pub fn undo(&mut self) -> bool {
        self.cancel_gesture();
        self.history.undo(&mut self.doc)
    }

    pub fn redo(&mut self) -> bool {
        self.cancel_gesture();
        self.history.redo(&mut self.doc)
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub fn select_all(&mut self) {
        let ids = self.doc.scene.body_ids();
        self.doc.selection.set_bodies(&ids, false);
    }

    pub fn clear_selection(&mut self) {
        self.doc.selection.clear();
    }

    /// Deletes the selection, expanded to attached constraints and whole
    /// rope groups.
    pub fn delete_selected(&mut self) -> bool {
        self.selected();
        let selection = &self.doc.selection;
        let mut bodies: Vec<BodyId> = selection.bodies.clone();
        let mut constraints: Vec<ConstraintId> = Vec::new();
        let mut fields = Vec::new();
        match selection.primary {
            SelectedEntity::None => {}
            SelectedEntity::Body(id) => bodies.push(id),
            SelectedEntity::Constraint(id) => constraints.push(id),
            SelectedEntity::Field(id) => fields.push(id),
        }
        let (bodies, constraints) = self.doc.scene.deletion_closure(&bodies, &constraints);
        if bodies.is_empty() && constraints.is_empty() && fields.is_empty() {
            return false;
        }
        let (forward, backward) = self.doc.scene.removal_deltas(&bodies, &constraints, &fields);
        tracing::debug!(
            "[editor] delete {} bodies, {} constraints, {} fields",
            bodies.len(),
            constraints.len(),
            fields.len()
        );
        self.commit("delete", forward, backward, Selection::default());
        true
    }

    // ------------------------------------------------------------------
    // Property edits
    // ------------------------------------------------------------------

    pub fn update_body_meta(&mut self, id: BodyId, patch: &BodyMetaPatch) -> bool {
        let Some(before) = self.doc.scene.body_snapshot(id) else {
            return false;
        };
        let mut after = before.clone();
        after.meta.apply(patch);
        self.commit_body_change("edit body", before, after)
    }

    pub fn set_body_static(&mut self, id: BodyId, is_static: bool) -> bool {
        let Some(before) = self.doc.scene.body_snapshot(id) else {
            return false;
        };
        let mut after = before.clone();
        after.is_static = is_static;
        self.commit_body_change("toggle static", before, after)
    }

    pub fn set_body_material(&mut self, id: BodyId, material: Material) -> bool {
        let Some(before) = self.doc.scene.body_snapshot(id) else {
            return false;
        };
        let mut after = before.clone();
        after.material = material;
        self.commit_body_change("edit material", before, after)
    }

    /// Sets a body's velocity in m/s.
    pub fn set_body_velocity_mps(&mut self, id: BodyId, velocity: glam::Vec2) -> bool {
        let Some(before) = self.doc.scene.body_snapshot(id) else {
            return false;
        };
        let mut after = before.clone();
        after.velocity_mps = velocity;
        self.commit_body_change("set velocity", before, after)
    }

    fn commit_body_change(&mut self, label: &str, before: BodySnapshot, after: BodySnapshot) -> bool {
        if before == after {
            return false;
        }
        let selection = self.doc.selection.clone();
        self.commit(
            label,
            SceneDelta {
                bodies: vec![after],
                ..SceneDelta::default()
            },
            SceneDelta {
                bodies: vec![before],
                ..SceneDelta::default()
            },
            selection,
        );
        true
    }

    pub fn update_constraint_meta(&mut self, id: ConstraintId, patch: &ConstraintMetaPatch) -> bool {
        let Some(before) = self.doc.scene.constraint_snapshot(id) else {
            return false;
        };
        let mut after = before.clone();
        after.meta.apply(patch);
        after.length = after.meta.rest_length;
        after.stiffness = after.meta.stiffness;
        after.damping = after.meta.damping;
        if before == after {
            return false;
        }
        let selection = self.doc.selection.clone();
        self.commit(
            "edit constraint",
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
        true
    }

    pub fn update_field(&mut self, region: FieldRegion) -> bool {
        let Some(before) = self.doc.scene.field(region.id).cloned() else {
            return false;
        };
        if before == region {
            return false;
        }
        let selection = self.doc.selection.clone();
        self.commit(
            "edit field",
            SceneDelta {
                fields: vec![region],
                ..SceneDelta::default()
            },
            SceneDelta {
                fields: vec![before],
                ..SceneDelta::default()
            },
            selection,
        );
        true
    }

    // ------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------

    /// Empties the scene, aborting any gesture and dropping all history.
    pub fn reset(&mut self, settings: &SimSettings) {
        self.interaction = Interaction::None;
        self.active_pointer = None;
        self.measurement = None;
        self.doc.scene.clear();
        self.doc.scene.world.set_gravity(settings.gravity_vector());
        self.doc.selection.clear();
        self.history.clear();
        tracing::info!("[editor] reset");
    }
}
