//! Domain metadata attached to engine bodies and joints.
//!
//! Engine handles are transient; every entity the editor touches gets a
//! stable id written once into the engine's `user_data` slot. The registry
//! keeps side tables keyed by those ids: one for body metadata, one for shape
//! descriptors and one for constraint metadata.

use std::collections::HashMap;
use std::fmt;

use rapier2d::prelude::RigidBodyHandle;
use serde::{Deserialize, Serialize};

use crate::physics::{JointHandle, PhysicsWorld};
use crate::shape::ShapeDescriptor;
use crate::units;

/// Density used when an entity's mass is unknown (kg/m²).
pub const DEFAULT_DENSITY: f32 = 10.0;

// ============================================================================
// Stable ids
// ============================================================================

macro_rules! stable_id {
    ($(#[$attr:meta])* $name:ident, $prefix:literal) => {
        $(#[$attr])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

stable_id!(
    /// Stable id of a body, independent of its engine handle.
    BodyId,
    "body"
);
stable_id!(
    /// Stable id of a constraint.
    ConstraintId,
    "constraint"
);
stable_id!(
    /// Id of an authored field region.
    FieldId,
    "field"
);
stable_id!(
    /// Shared by every segment body and link of one synthesized rope.
    RopeGroupId,
    "rope"
);

/// Type tags for `user_data` encoding.
pub const USER_DATA_BODY: u64 = 1;
pub const USER_DATA_CONSTRAINT: u64 = 2;

/// Encodes a type tag and id into u128 `user_data`.
pub fn encode_user_data(type_tag: u64, id: u64) -> u128 {
    (u128::from(type_tag) << 64) | u128::from(id)
}

/// Decodes u128 `user_data` into (`type_tag`, id).
#[allow(clippy::cast_possible_truncation)]
pub fn decode_user_data(user_data: u128) -> (u64, u64) {
    let type_tag = (user_data >> 64) as u64;
    let id = user_data as u64;
    (type_tag, id)
}

fn body_id_from_user_data(user_data: u128) -> Option<BodyId> {
    match decode_user_data(user_data) {
        (USER_DATA_BODY, id) => Some(BodyId(id)),
        _ => None,
    }
}

fn constraint_id_from_user_data(user_data: u128) -> Option<ConstraintId> {
    match decode_user_data(user_data) {
        (USER_DATA_CONSTRAINT, id) => Some(ConstraintId(id)),
        _ => None,
    }
}

// ============================================================================
// Body metadata
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeDistribution {
    #[default]
    Point,
    Uniform,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConveyorMeta {
    pub enabled: bool,
    /// Belt speed along the body's local x axis (m/s).
    pub speed: f32,
    /// Fraction of the speed difference removed per step, 0..1.
    pub grip: f32,
}

impl Default for ConveyorMeta {
    fn default() -> Self {
        Self {
            enabled: true,
            speed: 2.0,
            grip: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorMeta {
    pub enabled: bool,
    pub label: String,
    pub count: u32,
}

impl Default for SensorMeta {
    fn default() -> Self {
        Self {
            enabled: true,
            label: "Sensor".to_string(),
            count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyMeta {
    pub id: BodyId,
    pub label: String,
    pub is_charged: bool,
    /// Coulombs, signed.
    pub charge: f32,
    pub charge_distribution: ChargeDistribution,
    /// Area in m².
    pub volume: f32,
    /// kg/m².
    pub density: f32,
    #[serde(default)]
    pub conveyor: Option<ConveyorMeta>,
    #[serde(default)]
    pub sensor: Option<SensorMeta>,
    #[serde(default)]
    pub rope_group: Option<RopeGroupId>,
}

impl BodyMeta {
    pub fn new(id: BodyId, shape: &ShapeDescriptor, density: f32) -> Self {
        Self {
            id,
            label: format!("Body {}", id.0),
            is_charged: false,
            charge: 0.0,
            charge_distribution: ChargeDistribution::Point,
            volume: units::world_area_to_square_meters(shape.area()),
            density,
            conveyor: None,
            sensor: None,
            rope_group: None,
        }
    }

    /// Charge that takes part in electrostatics, zero when uncharged.
    pub fn effective_charge(&self) -> f32 {
        if self.is_charged && self.charge.is_finite() {
            self.charge
        } else {
            0.0
        }
    }

    pub fn apply(&mut self, patch: &BodyMetaPatch) {
        if let Some(label) = &patch.label {
            self.label.clone_from(label);
        }
        if let Some(is_charged) = patch.is_charged {
            self.is_charged = is_charged;
        }
        if let Some(charge) = patch.charge {
            self.charge = charge;
        }
        if let Some(distribution) = patch.charge_distribution {
            self.charge_distribution = distribution;
        }
        if let Some(volume) = patch.volume {
            self.volume = volume;
        }
        if let Some(density) = patch.density {
            self.density = density;
        }
        if let Some(conveyor) = patch.conveyor {
            self.conveyor = conveyor;
        }
        if let Some(sensor) = &patch.sensor {
            self.sensor.clone_from(sensor);
        }
        if let Some(rope_group) = patch.rope_group {
            self.rope_group = rope_group;
        }
    }
}

/// Partial update of [`BodyMeta`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyMetaPatch {
    pub label: Option<String>,
    pub is_charged: Option<bool>,
    pub charge: Option<f32>,
    pub charge_distribution: Option<ChargeDistribution>,
    pub volume: Option<f32>,
    pub density: Option<f32>,
    pub conveyor: Option<Option<ConveyorMeta>>,
    pub sensor: Option<Option<SensorMeta>>,
    pub rope_group: Option<Option<RopeGroupId>>,
}

// ============================================================================
// Constraint metadata
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    #[default]
    Rod,
    Rope,
    RigidRope,
    Spring,
}

impl ConstraintKind {
    /// Ropes only pull.
    pub fn is_tension_only(self) -> bool {
        matches!(self, Self::Rope | Self::RigidRope)
    }

    /// Solver stiffness and damping a freshly drawn constraint gets.
    pub fn default_tuning(self) -> (f32, f32) {
        match self {
            Self::Rod => (1.0, 0.0),
            Self::Rope => (0.8, 0.05),
            Self::RigidRope => (1.0, 0.1),
            Self::Spring => (0.05, 0.02),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpringMode {
    #[default]
    Distance,
    Axis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintMeta {
    pub id: ConstraintId,
    pub kind: ConstraintKind,
    pub mode: SpringMode,
    /// Pixels.
    pub rest_length: f32,
    pub stiffness: f32,
    pub damping: f32,
    #[serde(default)]
    pub axis_angle_rad: Option<f32>,
    #[serde(default)]
    pub guide: bool,
    #[serde(default)]
    pub rope_group: Option<RopeGroupId>,
}

impl ConstraintMeta {
    pub fn new(id: ConstraintId, kind: ConstraintKind, rest_length: f32) -> Self {
        let (stiffness, damping) = kind.default_tuning();
        Self {
            id,
            kind,
            mode: SpringMode::Distance,
            rest_length,
            stiffness,
            damping,
            axis_angle_rad: None,
            guide: false,
            rope_group: None,
        }
    }

    pub fn is_axis_spring(&self) -> bool {
        self.kind == ConstraintKind::Spring && self.mode == SpringMode::Axis
    }

    pub fn apply(&mut self, patch: &ConstraintMetaPatch) {
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(mode) = patch.mode {
            self.mode = mode;
        }
        if let Some(rest_length) = patch.rest_length {
            self.rest_length = rest_length.max(0.0);
        }
        if let Some(stiffness) = patch.stiffness {
            self.stiffness = stiffness.clamp(0.0, 1.0);
        }
        if let Some(damping) = patch.damping {
            self.damping = damping.clamp(0.0, 1.0);
        }
        if let Some(axis) = patch.axis_angle_rad {
            self.axis_angle_rad = axis;
        }
        if let Some(guide) = patch.guide {
            self.guide = guide;
        }
        if let Some(rope_group) = patch.rope_group {
            self.rope_group = rope_group;
        }
    }
}

/// Partial update of [`ConstraintMeta`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintMetaPatch {
    pub kind: Option<ConstraintKind>,
    pub mode: Option<SpringMode>,
    pub rest_length: Option<f32>,
    pub stiffness: Option<f32>,
    pub damping: Option<f32>,
    pub axis_angle_rad: Option<Option<f32>>,
    pub guide: Option<bool>,
    pub rope_group: Option<Option<RopeGroupId>>,
}

// ============================================================================
// Registry
// ============================================================================

/// Side tables of domain metadata keyed by stable id.
#[derive(Debug, Clone)]
pub struct MetaRegistry {
    bodies: HashMap<BodyId, BodyMeta>,
    shapes: HashMap<BodyId, ShapeDescriptor>,
    constraints: HashMap<ConstraintId, ConstraintMeta>,
    next_id: u64,
}

impl Default for MetaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaRegistry {
    pub fn new() -> Self {
        Self {
            bodies: HashMap::new(),
            shapes: HashMap::new(),
            constraints: HashMap::new(),
            next_id: 1,
        }
    }

    /// Allocates a fresh id, shared by every id kind.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Makes sure `id` will never be handed out again.
    pub fn reserve_id(&mut self, id: u64) {
        if id >= self.next_id {
            self.next_id = id + 1;
        }
    }

    /// Stable id of a body, assigning one if the body has none yet.
    pub fn ensure_body_id(&mut self, world: &mut PhysicsWorld, handle: RigidBodyHandle) -> Option<BodyId> {
        let user_data = world.user_data(handle)?;
        if let Some(id) = body_id_from_user_data(user_data) {
            self.reserve_id(id.0);
            return Some(id);
        }
        let id = BodyId(self.allocate_id());
        world.set_user_data(handle, encode_user_data(USER_DATA_BODY, id.0));
        Some(id)
    }

    /// Stable id of a body without assigning one.
    pub fn body_id(world: &PhysicsWorld, handle: RigidBodyHandle) -> Option<BodyId> {
        body_id_from_user_data(world.user_data(handle)?)
    }

    /// Returns the body's metadata, creating default metadata on first
    /// access, then merges `patch` into it.
    pub fn ensure_body_meta(
        &mut self,
        world: &mut PhysicsWorld,
        handle: RigidBodyHandle,
        patch: Option<&BodyMetaPatch>,
    ) -> Option<&BodyMeta> {
        let id = self.ensure_body_id(world, handle)?;
        if !self.bodies.contains_key(&id) {
            let shape = self.ensure_shape(world, handle)?;
            let volume = units::world_area_to_square_meters(shape.area());
            let density = match world.mass(handle) {
                Some(mass) if mass > 0.0 && volume > 0.0 => mass / volume,
                _ => DEFAULT_DENSITY,
            };
            self.bodies.insert(id, BodyMeta::new(id, &shape, density));
        }
        let meta = self.bodies.get_mut(&id)?;
        if let Some(patch) = patch {
            meta.apply(patch);
        }
        Some(&*meta)
    }

    /// Returns existing metadata, never creates.
    pub fn get_body_meta(&self, world: &PhysicsWorld, handle: RigidBodyHandle) -> Option<&BodyMeta> {
        self.bodies.get(&Self::body_id(world, handle)?)
    }

    pub fn body_meta(&self, id: BodyId) -> Option<&BodyMeta> {
        self.bodies.get(&id)
    }

    pub fn body_meta_mut(&mut self, id: BodyId) -> Option<&mut BodyMeta> {
        self.bodies.get_mut(&id)
    }

    pub fn set_body_meta(&mut self, meta: BodyMeta) {
        self.reserve_id(meta.id.0);
        self.bodies.insert(meta.id, meta);
    }

    /// Linear scan over live bodies.
    pub fn find_body_by_meta_id(world: &PhysicsWorld, id: BodyId) -> Option<RigidBodyHandle> {
        world
            .rigid_body_set
            .iter()
            .find(|(_, body)| body_id_from_user_data(body.user_data) == Some(id))
            .map(|(handle, _)| handle)
    }

    /// Shape descriptor of a body, inferred from its collider on first access.
    pub fn ensure_shape(&mut self, world: &mut PhysicsWorld, handle: RigidBodyHandle) -> Option<ShapeDescriptor> {
        let id = self.ensure_body_id(world, handle)?;
        if let Some(shape) = self.shapes.get(&id) {
            return Some(*shape);
        }
        let shape = Self::infer_shape(world, handle)?;
        self.shapes.insert(id, shape);
        Some(shape)
    }

    /// Reconstructs a descriptor from the engine collider.
    pub fn infer_shape(world: &PhysicsWorld, handle: RigidBodyHandle) -> Option<ShapeDescriptor> {
        world.collider_shape(handle)
    }

    pub fn shape(&self, id: BodyId) -> Option<ShapeDescriptor> {
        self.shapes.get(&id).copied()
    }

    pub fn set_shape(&mut self, id: BodyId, shape: ShapeDescriptor) {
        self.shapes.insert(id, shape);
    }

    // ------------------------------------------------------------------
    // Constraints
    // ------------------------------------------------------------------

    pub fn ensure_constraint_id(&mut self, world: &mut PhysicsWorld, handle: JointHandle) -> Option<ConstraintId> {
        if let Some(id) = constraint_id_from_user_data(world.joint(handle)?.user_data) {
            self.reserve_id(id.0);
            return Some(id);
        }
        let id = ConstraintId(self.allocate_id());
        if let Some(joint) = world.joint_mut(handle) {
            joint.user_data = encode_user_data(USER_DATA_CONSTRAINT, id.0);
        }
        Some(id)
    }

    pub fn constraint_id(world: &PhysicsWorld, handle: JointHandle) -> Option<ConstraintId> {
        constraint_id_from_user_data(world.joint(handle)?.user_data)
    }

    /// Constraint counterpart of [`Self::ensure_body_meta`]; defaults are
    /// read back from the joint's current solver parameters.
    pub fn ensure_constraint_meta(
        &mut self,
        world: &mut PhysicsWorld,
        handle: JointHandle,
        patch: Option<&ConstraintMetaPatch>,
    ) -> Option<&ConstraintMeta> {
        let id = self.ensure_constraint_id(world, handle)?;
        if !self.constraints.contains_key(&id) {
            let joint = world.joint(handle)?;
            let mut meta = ConstraintMeta::new(id, ConstraintKind::Rod, joint.length);
            meta.stiffness = joint.stiffness;
            meta.damping = joint.damping;
            self.constraints.insert(id, meta);
        }
        let meta = self.constraints.get_mut(&id)?;
        if let Some(patch) = patch {
            meta.apply(patch);
        }
        Some(&*meta)
    }

    pub fn get_constraint_meta(&self, world: &PhysicsWorld, handle: JointHandle) -> Option<&ConstraintMeta> {
        self.constraints.get(&Self::constraint_id(world, handle)?)
    }

    pub fn constraint_meta(&self, id: ConstraintId) -> Option<&ConstraintMeta> {
        self.constraints.get(&id)
    }

    pub fn constraint_meta_mut(&mut self, id: ConstraintId) -> Option<&mut ConstraintMeta> {
        self.constraints.get_mut(&id)
    }

    pub fn set_constraint_meta(&mut self, meta: ConstraintMeta) {
        self.reserve_id(meta.id.0);
        self.constraints.insert(meta.id, meta);
    }

    pub fn find_constraint_by_meta_id(world: &PhysicsWorld, id: ConstraintId) -> Option<JointHandle> {
        world
            .joints()
            .find(|(_, joint)| constraint_id_from_user_data(joint.user_data) == Some(id))
            .map(|(handle, _)| handle)
    }

    /// Ids of every constraint with metadata, sorted.
    pub fn constraint_ids(&self) -> Vec<ConstraintId> {
        let mut ids: Vec<ConstraintId> = self.constraints.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    // ------------------------------------------------------------------
    // Lifetime
    // ------------------------------------------------------------------

    pub fn forget_body(&mut self, id: BodyId) {
        self.bodies.remove(&id);
        self.shapes.remove(&id);
    }

    pub fn forget_constraint(&mut self, id: ConstraintId) {
        self.constraints.remove(&id);
    }

    /// Drops rows whose engine entity no longer exists.
    pub fn prune(&mut self, world: &PhysicsWorld) {
        let live_bodies: Vec<BodyId> = world
            .rigid_body_set
            .iter()
            .filter_map(|(_, body)| body_id_from_user_data(body.user_data))
            .collect();
        self.bodies.retain(|id, _| live_bodies.contains(id));
        self.shapes.retain(|id, _| live_bodies.contains(id));

        let live_constraints: Vec<ConstraintId> = world
            .joints()
            .filter_map(|(_, joint)| constraint_id_from_user_data(joint.user_data))
            .collect();
        self.constraints
            .retain(|id, _| live_constraints.contains(id));
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
