//! Scene payloads and the built-in labs.
//!
//! A payload holds the same snapshots the editor produces. Importing assigns
//! fresh ids so a payload can be loaded into a non-empty scene any number of
//! times.

use std::collections::{HashMap, HashSet};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::SimSettings;
use crate::error::SceneError;
use crate::field::{FieldKind, FieldRegion, FieldShape};
use crate::meta::{BodyId, BodyMeta, ConstraintId, ConstraintKind, ConstraintMeta, FieldId, RopeGroupId, SpringMode};
use crate::physics::Material;
use crate::scene::{BodySnapshot, ConstraintSnapshot, Scene, SceneDelta};
use crate::shape::ShapeDescriptor;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenePayload {
    pub bodies: Vec<BodySnapshot>,
    pub constraints: Vec<ConstraintSnapshot>,
    pub fields: Vec<FieldRegion>,
    pub recommended_settings: Option<SimSettings>,
}

impl ScenePayload {
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        let payload: Self = serde_json::from_str(json)?;
        if let Some(settings) = &payload.recommended_settings {
            settings.validate()?;
        }
        Ok(payload)
    }

    pub fn to_json(&self) -> Result<String, SceneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Exports every entity of the scene.
    pub fn from_scene(scene: &Scene) -> Self {
        let snapshot = scene.snapshot();
        Self {
            bodies: snapshot.bodies,
            constraints: snapshot.constraints,
            fields: snapshot.fields,
            recommended_settings: None,
        }
    }

    /// Copies the payload with fresh ids allocated from `scene`.
    ///
    /// Bodies with non-finite state are dropped with a warning, together with
    /// the constraints attached to them. A constraint naming a body the
    /// payload never contained is an error.
    pub fn remap(&self, scene: &mut Scene) -> Result<SceneDelta, SceneError> {
        let mut body_ids: HashMap<BodyId, Option<BodyId>> = HashMap::new();
        let mut groups: HashMap<RopeGroupId, RopeGroupId> = HashMap::new();
        let mut delta = SceneDelta::default();

        for body in &self.bodies {
            if body_ids.contains_key(&body.id) {
                return Err(SceneError::DuplicateId(body.id.0));
            }
            if !is_finite_body(body) {
                tracing::warn!("[library] dropping {} with non-finite state", body.id);
                body_ids.insert(body.id, None);
                continue;
            }
            let id = scene.allocate_body_id();
            body_ids.insert(body.id, Some(id));
            let mut body = body.clone();
            body.id = id;
            body.meta.id = id;
            body.meta.rope_group = body
                .meta
                .rope_group
                .map(|g| *groups.entry(g).or_insert_with(|| scene.allocate_rope_group()));
            delta.bodies.push(body);
        }

        let mut seen: HashSet<ConstraintId> = HashSet::new();
        'constraints: for constraint in &self.constraints {
            if !seen.insert(constraint.id) {
                return Err(SceneError::DuplicateId(constraint.id.0));
            }
            let mut ends = [constraint.body_a, constraint.body_b];
            for end in &mut ends {
                let Some(old) = *end else {
                    continue;
                };
                match body_ids.get(&old) {
                    Some(Some(new)) => *end = Some(*new),
                    Some(None) => {
                        tracing::warn!("[library] dropping {} attached to a dropped body", constraint.id);
                        continue 'constraints;
                    }
                    None => {
                        return Err(SceneError::UnknownBody {
                            constraint: constraint.id,
                            body: old,
                        });
                    }
                }
            }
            let id = scene.allocate_constraint_id();
            let mut constraint = constraint.clone();
            constraint.id = id;
            constraint.meta.id = id;
            [constraint.body_a, constraint.body_b] = ends;
            constraint.meta.rope_group = constraint
                .meta
                .rope_group
                .map(|g| *groups.entry(g).or_insert_with(|| scene.allocate_rope_group()));
            delta.constraints.push(constraint);
        }

        let mut seen: HashSet<FieldId> = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.id) {
                return Err(SceneError::DuplicateId(field.id.0));
            }
            let mut field = field.clone();
            field.id = scene.allocate_field_id();
            delta.fields.push(field);
        }
        Ok(delta)
    }
}

fn is_finite_body(body: &BodySnapshot) -> bool {
    body.position.is_finite()
        && body.angle.is_finite()
        && body.velocity_mps.is_finite()
        && body.angular_velocity_rad_s.is_finite()
        && body.meta.density.is_finite()
        && body.meta.density > 0.0
}

/// Built-in demonstration scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lab {
    CoulombPair,
    PendulumRope,
    AxisSpringOscillator,
    MagneticDeflection,
}

impl Lab {
    pub const ALL: [Self; 4] = [
        Self::CoulombPair,
        Self::PendulumRope,
        Self::AxisSpringOscillator,
        Self::MagneticDeflection,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Self::CoulombPair => "Coulomb pair",
            Self::PendulumRope => "Pendulum on a rope",
            Self::AxisSpringOscillator => "Axis spring oscillator",
            Self::MagneticDeflection => "Magnetic deflection",
        }
    }

    pub fn payload(self) -> ScenePayload {
        let weightless = Some(SimSettings {
            gravity_mps2: 0.0,
            ..SimSettings::default()
        });
        match self {
            Self::CoulombPair => {
                let mut positive = ball(1, Vec2::new(300.0, 300.0), 20.0, "+q");
                positive.meta.is_charged = true;
                positive.meta.charge = 1.0;
                let mut negative = ball(2, Vec2::new(500.0, 300.0), 20.0, "-q");
                negative.meta.is_charged = true;
                negative.meta.charge = -1.0;
                ScenePayload {
                    bodies: vec![positive, negative],
                    recommended_settings: weightless,
                    ..ScenePayload::default()
                }
            }
            Self::PendulumRope => {
                let mut pivot = ball(1, Vec2::new(400.0, 100.0), 8.0, "Pivot");
                pivot.is_static = true;
                // 250 px rope released from 45 degrees.
                let offset = 250.0 * std::f32::consts::FRAC_1_SQRT_2;
                let bob = ball(2, Vec2::new(400.0 + offset, 100.0 + offset), 20.0, "Bob");
                let rope = link(3, ConstraintKind::Rope, Some(1), Vec2::ZERO, Some(2), Vec2::ZERO, 250.0);
                ScenePayload {
                    bodies: vec![pivot, bob],
                    constraints: vec![rope],
                    ..ScenePayload::default()
                }
            }
            Self::AxisSpringOscillator => {
                // Rest length 200 px, released 60 px stretched along +x.
                let block = ball(1, Vec2::new(460.0, 300.0), 20.0, "Mass");
                let mut spring = link(
                    2,
                    ConstraintKind::Spring,
                    None,
                    Vec2::new(200.0, 300.0),
                    Some(1),
                    Vec2::ZERO,
                    200.0,
                );
                spring.meta.mode = SpringMode::Axis;
                spring.meta.axis_angle_rad = Some(0.0);
                spring.meta.guide = true;
                ScenePayload {
                    bodies: vec![block],
                    constraints: vec![spring],
                    recommended_settings: weightless,
                    ..ScenePayload::default()
                }
            }
            Self::MagneticDeflection => {
                let mut particle = ball(1, Vec2::new(150.0, 300.0), 10.0, "Particle");
                particle.meta.is_charged = true;
                particle.meta.charge = 1.0;
                particle.velocity_mps = Vec2::new(3.0, 0.0);
                let field = FieldRegion {
                    id: FieldId(2),
                    kind: FieldKind::Magnetic { strength: 1.0 },
                    shape: FieldShape::Rect {
                        center: Vec2::new(500.0, 300.0),
                        width: 400.0,
                        height: 400.0,
                    },
                };
                ScenePayload {
                    bodies: vec![particle],
                    fields: vec![field],
                    recommended_settings: weightless,
                    ..ScenePayload::default()
                }
            }
        }
    }
}

fn ball(id: u64, position: Vec2, radius: f32, label: &str) -> BodySnapshot {
    let id = BodyId(id);
    let shape = ShapeDescriptor::Circle { radius };
    let mut meta = BodyMeta::new(id, &shape, crate::meta::DEFAULT_DENSITY);
    meta.label = label.to_owned();
    BodySnapshot {
        id,
        meta,
        shape,
        position,
        angle: 0.0,
        velocity_mps: Vec2::ZERO,
        angular_velocity_rad_s: 0.0,
        is_static: false,
        material: Material::default(),
    }
}

fn link(
    id: u64,
    kind: ConstraintKind,
    body_a: Option<u64>,
    point_a: Vec2,
    body_b: Option<u64>,
    point_b: Vec2,
    length: f32,
) -> ConstraintSnapshot {
    let id = ConstraintId(id);
    let meta = ConstraintMeta::new(id, kind, length);
    ConstraintSnapshot {
        id,
        stiffness: meta.stiffness,
        damping: meta.damping,
        meta,
        body_a: body_a.map(BodyId),
        body_b: body_b.map(BodyId),
        point_a,
        point_b,
        length,
    }
}
