//! Physics simulation using `Rapier2D`.
//!
//! `PhysicsWorld` is the only place that talks to the engine. On top of the
//! rigid-body pipeline it provides:
//! - velocities reported as per-step displacements (see [`crate::units`]),
//! - soft distance joints whose length, stiffness and damping can be changed
//!   every step (ropes and axis springs are built on these),
//! - collision start/stop events and the resulting set of active contacts.

use std::collections::BTreeMap;
use std::fmt;

use glam::Vec2;
use parking_lot::Mutex;
use rapier2d::prelude::*;
use serde::{Deserialize, Serialize};

use crate::shape::ShapeDescriptor;
use crate::units::{self, BASE_DELTA_MS};

/// Position iterations of the distance-joint solver per step.
pub const JOINT_ITERATIONS: usize = 4;

/// Longest step accepted by [`PhysicsWorld::step`] (milliseconds).
pub const MAX_STEP_MS: f32 = 50.0;

/// Default gravity vector (downward, in pixels/s²).
pub fn default_gravity() -> Vec2 {
    Vec2::new(0.0, units::mps2_to_world_acceleration(9.81))
}

/// Contact material of a body's collider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub restitution: f32,
    pub friction: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            restitution: 0.3,
            friction: 0.4,
        }
    }
}

/// Everything needed to create a body.
#[derive(Debug, Clone, Copy)]
pub struct BodyDesc {
    pub shape: ShapeDescriptor,
    pub position: Vec2,
    pub angle: f32,
    /// Pixels per step.
    pub velocity: Vec2,
    /// Radians per step.
    pub angular_velocity: f32,
    pub is_static: bool,
    /// kg/m².
    pub density: f32,
    pub material: Material,
    pub user_data: u128,
}

/// Handle of a distance joint owned by [`PhysicsWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointHandle(u32);

/// One end of a distance joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointEnd {
    /// Attached to a body at a local-space anchor.
    Body {
        handle: RigidBodyHandle,
        local_anchor: Vec2,
    },
    /// Pinned to a fixed world point.
    Point(Vec2),
}

impl JointEnd {
    pub fn body(&self) -> Option<RigidBodyHandle> {
        match self {
            Self::Body { handle, .. } => Some(*handle),
            Self::Point(_) => None,
        }
    }
}

/// A soft two-point distance constraint.
///
/// A stiffness of zero disables position correction, a damping of zero
/// disables relative-velocity damping; with both zero the joint exerts no
/// force at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceJoint {
    pub a: JointEnd,
    pub b: JointEnd,
    /// Solved length in pixels.
    pub length: f32,
    pub stiffness: f32,
    pub damping: f32,
    pub user_data: u128,
}

impl DistanceJoint {
    /// Number of ends attached to a body.
    pub fn attached_bodies(&self) -> usize {
        usize::from(self.a.body().is_some()) + usize::from(self.b.body().is_some())
    }

    pub fn is_attached_to(&self, handle: RigidBodyHandle) -> bool {
        self.a.body() == Some(handle) || self.b.body() == Some(handle)
    }
}

/// Kind of a collision notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    Started,
    Stopped,
}

/// Collision notification mapped onto bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactEvent {
    pub phase: ContactPhase,
    pub body1: RigidBodyHandle,
    pub body2: RigidBodyHandle,
    /// Contact normal pointing from body1 towards body2, zero when unknown.
    pub normal: Vec2,
}

/// A pair of bodies currently touching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveContact {
    collider1: ColliderHandle,
    collider2: ColliderHandle,
    pub body1: RigidBodyHandle,
    pub body2: RigidBodyHandle,
    pub normal: Vec2,
}

impl ActiveContact {
    /// The other body of the pair, if `handle` is part of it.
    pub fn other(&self, handle: RigidBodyHandle) -> Option<RigidBodyHandle> {
        if self.body1 == handle {
            Some(self.body2)
        } else if self.body2 == handle {
            Some(self.body1)
        } else {
            None
        }
    }
}

/// Collects engine collision events during a step.
///
/// The engine requires event handlers to be `Send + Sync`, hence the mutex.
#[derive(Default)]
struct CollisionRecorder {
    events: Mutex<Vec<(CollisionEvent, Vec2)>>,
}

impl EventHandler for CollisionRecorder {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        contact_pair: Option<&ContactPair>,
    ) {
        let normal = contact_pair
            .and_then(|pair| pair.manifolds.first())
            .map_or(Vec2::ZERO, |manifold| {
                Vec2::new(manifold.data.normal.x, manifold.data.normal.y)
            });
        self.events.lock().push((event, normal));
    }

    fn handle_contact_force_event(
        &self,
        _dt: f32,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: f32,
    ) {
    }
}

/// Physics world containing all `Rapier2D` components plus soft joints.
pub struct PhysicsWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub integration_parameters: IntegrationParameters,
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub gravity: Vector,
    pub frame: u64,
    last_delta_ms: f32,
    joints: BTreeMap<JointHandle, DistanceJoint>,
    next_joint: u32,
    collisions: CollisionRecorder,
    contact_events: Vec<ContactEvent>,
    active_contacts: Vec<ActiveContact>,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("frame", &self.frame)
            .field("rigid_body_count", &self.rigid_body_set.len())
            .field("collider_count", &self.collider_set.len())
            .field("joint_count", &self.joints.len())
            .field("gravity", &self.gravity)
            .finish_non_exhaustive()
    }
}

impl PhysicsWorld {
    /// Creates a new physics world with default gravity.
    pub fn new() -> Self {
        Self::with_gravity(default_gravity())
    }

    /// Creates a new physics world with custom gravity (px/s²).
    pub fn with_gravity(gravity: Vec2) -> Self {
        let integration_parameters = IntegrationParameters {
            dt: BASE_DELTA_MS / 1000.0,
            ..Default::default()
        };

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: Vector::new(gravity.x, gravity.y),
            frame: 0,
            last_delta_ms: BASE_DELTA_MS,
            joints: BTreeMap::new(),
            next_joint: 1,
            collisions: CollisionRecorder::default(),
            contact_events: Vec::new(),
            active_contacts: Vec::new(),
        }
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = Vector::new(gravity.x, gravity.y);
    }

    pub fn gravity(&self) -> Vec2 {
        Vec2::new(self.gravity.x, self.gravity.y)
    }

    /// Delta of the most recent step, used to interpret step velocities.
    pub fn last_delta_ms(&self) -> f32 {
        self.last_delta_ms
    }

    fn step_seconds(&self) -> f32 {
        self.last_delta_ms / 1000.0
    }

    /// Advances the simulation by `delta_ms` milliseconds.
    ///
    /// Step velocities keep their meaning across a change of step length:
    /// the per-second rate is preserved and re-expressed in the new delta.
    pub fn step(&mut self, delta_ms: f32) {
        let requested_ms = units::effective_delta_ms(delta_ms);
        if requested_ms > MAX_STEP_MS {
            tracing::debug!("[physics] step of {requested_ms:.1} ms clamped to {MAX_STEP_MS} ms");
        }
        let delta_ms = requested_ms.min(MAX_STEP_MS);
        let dt = delta_ms / 1000.0;
        self.integration_parameters.dt = dt;

        self.physics_pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            &(),
            &self.collisions,
        );

        self.solve_joints(dt);

        // add_force() accumulates until reset.
        for (_, body) in self.rigid_body_set.iter_mut() {
            body.reset_forces(false);
            body.reset_torques(false);
        }

        self.collect_contacts();
        self.last_delta_ms = delta_ms;
        self.frame += 1;
    }

    /// Returns the current simulation frame number.
    pub fn current_frame(&self) -> u64 {
        self.frame
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    /// Creates a body with a single collider and returns its handle.
    pub fn add_body(&mut self, desc: &BodyDesc) -> RigidBodyHandle {
        let builder = if desc.is_static {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic()
        };
        let seconds = self.step_seconds();
        let linvel = desc.velocity / seconds;
        let rigid_body = builder
            .translation(Vector::new(desc.position.x, desc.position.y))
            .linvel(Vector::new(linvel.x, linvel.y))
            .angvel(desc.angular_velocity / seconds)
            .ccd_enabled(true)
            .user_data(desc.user_data)
            .build();
        let handle = self.rigid_body_set.insert(rigid_body);
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_rotation(Rotation::from_angle(desc.angle), true);
        }
        let collider = collider_builder(&desc.shape, desc.density, desc.material).build();
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        handle
    }

    /// Removes a body, its collider and every joint attached to it.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.joints.retain(|_, joint| !joint.is_attached_to(handle));
        self.active_contacts
            .retain(|c| c.body1 != handle && c.body2 != handle);
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
    }

    pub fn contains_body(&self, handle: RigidBodyHandle) -> bool {
        self.rigid_body_set.get(handle).is_some()
    }

    pub fn body_handles(&self) -> Vec<RigidBodyHandle> {
        self.rigid_body_set.iter().map(|(handle, _)| handle).collect()
    }

    pub fn body_count(&self) -> usize {
        self.rigid_body_set.len()
    }

    /// Replaces a body's collider, keeping the body and its joints.
    pub fn set_body_shape(
        &mut self,
        handle: RigidBodyHandle,
        shape: &ShapeDescriptor,
        density: f32,
    ) {
        let Some(body) = self.rigid_body_set.get(handle) else {
            return;
        };
        let old: Vec<ColliderHandle> = body.colliders().to_vec();
        let material = old
            .first()
            .and_then(|c| self.collider_set.get(*c))
            .map_or_else(Material::default, |c| Material {
                restitution: c.restitution(),
                friction: c.friction(),
            });
        for collider in old {
            self.collider_set.remove(
                collider,
                &mut self.island_manager,
                &mut self.rigid_body_set,
                true,
            );
        }
        let collider = collider_builder(shape, density, material).build();
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);
    }

    /// Infers a shape descriptor from the body's collider.
    pub fn collider_shape(&self, handle: RigidBodyHandle) -> Option<ShapeDescriptor> {
        let body = self.rigid_body_set.get(handle)?;
        let collider = self.collider_set.get(*body.colliders().first()?)?;
        let shape = collider.shape();
        if let Some(ball) = shape.as_ball() {
            Some(ShapeDescriptor::Circle {
                radius: ball.radius,
            })
        } else if let Some(cuboid) = shape.as_cuboid() {
            Some(ShapeDescriptor::Rectangle {
                width: cuboid.half_extents.x * 2.0,
                height: cuboid.half_extents.y * 2.0,
            })
        } else if let Some(polygon) = shape.as_convex_polygon() {
            let points = polygon.points();
            let radius = points
                .iter()
                .map(|p| p.x.hypot(p.y))
                .fold(0.0_f32, f32::max);
            #[allow(clippy::cast_possible_truncation)]
            let sides = points.len() as u32;
            Some(ShapeDescriptor::Polygon { sides, radius })
        } else {
            None
        }
    }

    pub fn user_data(&self, handle: RigidBodyHandle) -> Option<u128> {
        self.rigid_body_set.get(handle).map(|b| b.user_data)
    }

    pub fn set_user_data(&mut self, handle: RigidBodyHandle, user_data: u128) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.user_data = user_data;
        }
    }

    pub fn position(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        let body = self.rigid_body_set.get(handle)?;
        let pos = body.translation();
        Some(Vec2::new(pos.x, pos.y))
    }

    pub fn set_position(&mut self, handle: RigidBodyHandle, position: Vec2) {
        if !position.is_finite() {
            return;
        }
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_translation(Vector::new(position.x, position.y), true);
        }
    }

    pub fn angle(&self, handle: RigidBodyHandle) -> Option<f32> {
        self.rigid_body_set
            .get(handle)
            .map(|body| body.rotation().angle())
    }

    pub fn set_angle(&mut self, handle: RigidBodyHandle, angle: f32) {
        if !angle.is_finite() {
            return;
        }
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_rotation(Rotation::from_angle(angle), true);
        }
    }

    /// Linear velocity as pixels per step of the last step's delta.
    pub fn velocity(&self, handle: RigidBodyHandle) -> Option<Vec2> {
        let body = self.rigid_body_set.get(handle)?;
        let v = body.linvel();
        Some(Vec2::new(v.x, v.y) * self.step_seconds())
    }

    pub fn set_velocity(&mut self, handle: RigidBodyHandle, velocity: Vec2) {
        let linvel = velocity / self.step_seconds();
        if !linvel.is_finite() {
            return;
        }
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_linvel(Vector::new(linvel.x, linvel.y), true);
        }
    }

    /// Angular velocity as radians per step of the last step's delta.
    pub fn angular_velocity(&self, handle: RigidBodyHandle) -> Option<f32> {
        let body = self.rigid_body_set.get(handle)?;
        Some(body.angvel() * self.step_seconds())
    }

    pub fn set_angular_velocity(&mut self, handle: RigidBodyHandle, angular_velocity: f32) {
        let angvel = angular_velocity / self.step_seconds();
        if !angvel.is_finite() {
            return;
        }
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_angvel(angvel, true);
        }
    }

    /// Mass in kilograms.
    pub fn mass(&self, handle: RigidBodyHandle) -> Option<f32> {
        self.rigid_body_set.get(handle).map(RigidBody::mass)
    }

    pub fn is_static(&self, handle: RigidBodyHandle) -> bool {
        self.rigid_body_set
            .get(handle)
            .is_some_and(|body| !body.is_dynamic())
    }

    pub fn set_static(&mut self, handle: RigidBodyHandle, is_static: bool) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            let body_type = if is_static {
                RigidBodyType::Fixed
            } else {
                RigidBodyType::Dynamic
            };
            body.set_body_type(body_type, true);
        }
    }

    pub fn material(&self, handle: RigidBodyHandle) -> Option<Material> {
        let body = self.rigid_body_set.get(handle)?;
        let collider = self.collider_set.get(*body.colliders().first()?)?;
        Some(Material {
            restitution: collider.restitution(),
            friction: collider.friction(),
        })
    }

    pub fn set_material(&mut self, handle: RigidBodyHandle, material: Material) {
        let Some(body) = self.rigid_body_set.get(handle) else {
            return;
        };
        let colliders: Vec<ColliderHandle> = body.colliders().to_vec();
        for collider in colliders {
            if let Some(collider) = self.collider_set.get_mut(collider) {
                collider.set_restitution(material.restitution);
                collider.set_friction(material.friction);
            }
        }
    }

    /// Adds a force (kg·px/s²) at the center of mass for the next step.
    pub fn add_force(&mut self, handle: RigidBodyHandle, force: Vec2) {
        if !force.is_finite() {
            return;
        }
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.add_force(Vector::new(force.x, force.y), true);
        }
    }

    /// Adds a force applied at a world point, producing the matching torque.
    pub fn add_force_at_point(&mut self, handle: RigidBodyHandle, force: Vec2, point: Vec2) {
        if !force.is_finite() || !point.is_finite() {
            return;
        }
        let Some(center) = self.position(handle) else {
            return;
        };
        let torque = (point - center).perp_dot(force);
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.add_force(Vector::new(force.x, force.y), true);
            body.add_torque(torque, true);
        }
    }

    // ------------------------------------------------------------------
    // Joints
    // ------------------------------------------------------------------

    pub fn add_joint(&mut self, joint: DistanceJoint) -> JointHandle {
        let handle = JointHandle(self.next_joint);
        self.next_joint += 1;
        self.joints.insert(handle, joint);
        handle
    }

    pub fn remove_joint(&mut self, handle: JointHandle) -> Option<DistanceJoint> {
        self.joints.remove(&handle)
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&DistanceJoint> {
        self.joints.get(&handle)
    }

    pub fn joint_mut(&mut self, handle: JointHandle) -> Option<&mut DistanceJoint> {
        self.joints.get_mut(&handle)
    }

    pub fn joint_handles(&self) -> Vec<JointHandle> {
        self.joints.keys().copied().collect()
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &DistanceJoint)> {
        self.joints.iter().map(|(handle, joint)| (*handle, joint))
    }

    /// World position of a joint end, `None` if its body is gone.
    pub fn joint_end_position(&self, end: &JointEnd) -> Option<Vec2> {
        end_position(&self.rigid_body_set, end)
    }

    /// Current distance between the two ends of a joint.
    pub fn joint_separation(&self, handle: JointHandle) -> Option<f32> {
        let joint = self.joints.get(&handle)?;
        let a = self.joint_end_position(&joint.a)?;
        let b = self.joint_end_position(&joint.b)?;
        Some(a.distance(b))
    }

    fn solve_joints(&mut self, dt: f32) {
        if self.joints.is_empty() || dt <= 0.0 {
            return;
        }
        let bodies = &mut self.rigid_body_set;
        for iteration in 0..JOINT_ITERATIONS {
            for joint in self.joints.values() {
                solve_joint(bodies, joint, dt, iteration == 0);
            }
        }
    }

    // ------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------

    fn collect_contacts(&mut self) {
        let raw = std::mem::take(&mut *self.collisions.events.lock());
        self.contact_events.clear();
        for (event, normal) in raw {
            match event {
                CollisionEvent::Started(h1, h2, _flags) => {
                    let (Some(b1), Some(b2)) = (self.collider_body(h1), self.collider_body(h2))
                    else {
                        continue;
                    };
                    self.contact_events.push(ContactEvent {
                        phase: ContactPhase::Started,
                        body1: b1,
                        body2: b2,
                        normal,
                    });
                    if !self.active_contacts.iter().any(|c| same_pair(c, h1, h2)) {
                        self.active_contacts.push(ActiveContact {
                            collider1: h1,
                            collider2: h2,
                            body1: b1,
                            body2: b2,
                            normal,
                        });
                    }
                }
                CollisionEvent::Stopped(h1, h2, _flags) => {
                    if let Some(contact) =
                        self.active_contacts.iter().find(|c| same_pair(c, h1, h2))
                    {
                        self.contact_events.push(ContactEvent {
                            phase: ContactPhase::Stopped,
                            body1: contact.body1,
                            body2: contact.body2,
                            normal: contact.normal,
                        });
                    }
                    self.active_contacts.retain(|c| !same_pair(c, h1, h2));
                }
            }
        }
    }

    fn collider_body(&self, handle: ColliderHandle) -> Option<RigidBodyHandle> {
        self.collider_set.get(handle)?.parent()
    }

    /// Collision events produced by the last step.
    pub fn contact_events(&self) -> &[ContactEvent] {
        &self.contact_events
    }

    /// Pairs of bodies touching after the last step.
    pub fn active_contacts(&self) -> &[ActiveContact] {
        &self.active_contacts
    }

    /// Resets the physics world to an empty state, keeping gravity.
    pub fn reset(&mut self) {
        *self = Self::with_gravity(self.gravity());
    }
}

fn same_pair(contact: &ActiveContact, h1: ColliderHandle, h2: ColliderHandle) -> bool {
    (contact.collider1 == h1 && contact.collider2 == h2)
        || (contact.collider1 == h2 && contact.collider2 == h1)
}

fn collider_builder(shape: &ShapeDescriptor, density: f32, material: Material) -> ColliderBuilder {
    let builder = match *shape {
        ShapeDescriptor::Circle { radius } => ColliderBuilder::ball(radius),
        ShapeDescriptor::Rectangle { width, height } => {
            ColliderBuilder::cuboid(width / 2.0, height / 2.0)
        }
        ShapeDescriptor::Polygon { .. } => {
            let points: Vec<Vector> = shape
                .vertices()
                .iter()
                .map(|v| Vector::new(v.x, v.y))
                .collect();
            ColliderBuilder::convex_hull(&points)
                .unwrap_or_else(|| ColliderBuilder::ball(shape.bounding_radius()))
        }
    };
    builder
        .density(units::density_to_world(density.max(f32::EPSILON)))
        .restitution(material.restitution)
        .friction(material.friction)
        .active_events(ActiveEvents::COLLISION_EVENTS)
}

fn end_position(bodies: &RigidBodySet, end: &JointEnd) -> Option<Vec2> {
    match end {
        JointEnd::Point(p) => Some(*p),
        JointEnd::Body {
            handle,
            local_anchor,
        } => {
            let body = bodies.get(*handle)?;
            let t = body.translation();
            let center = Vec2::new(t.x, t.y);
            Some(crate::shape::to_world(center, body.rotation().angle(), *local_anchor))
        }
    }
}

fn inverse_mass(bodies: &RigidBodySet, end: &JointEnd) -> f32 {
    let Some(handle) = end.body() else {
        return 0.0;
    };
    match bodies.get(handle) {
        Some(body) if body.is_dynamic() && body.mass() > 0.0 => 1.0 / body.mass(),
        _ => 0.0,
    }
}

/// Projects one joint towards its length and damps the relative velocity
/// along its axis, splitting the correction by inverse mass.
fn solve_joint(bodies: &mut RigidBodySet, joint: &DistanceJoint, dt: f32, apply_damping: bool) {
    if joint.stiffness <= 0.0 && joint.damping <= 0.0 {
        return;
    }
    let (Some(pa), Some(pb)) = (end_position(bodies, &joint.a), end_position(bodies, &joint.b))
    else {
        return;
    };
    let delta = pb - pa;
    let current = delta.length();
    if current < 1e-6 {
        return;
    }
    let normal = delta / current;
    let inv_a = inverse_mass(bodies, &joint.a);
    let inv_b = inverse_mass(bodies, &joint.b);
    let total = inv_a + inv_b;
    if total <= 0.0 {
        return;
    }
    let share_a = inv_a / total;
    let share_b = inv_b / total;

    if joint.stiffness > 0.0 {
        // Per-iteration stiffness that compounds to `stiffness` per step.
        let k = 1.0 - (1.0 - joint.stiffness.min(1.0)).powf(1.0 / JOINT_ITERATIONS as f32);
        let correction = normal * (current - joint.length) * k;
        nudge(bodies, &joint.a, correction * share_a, dt);
        nudge(bodies, &joint.b, -correction * share_b, dt);
    }

    if apply_damping && joint.damping > 0.0 {
        let va = end_velocity(bodies, &joint.a);
        let vb = end_velocity(bodies, &joint.b);
        let relative = (vb - va).dot(normal) * joint.damping.min(1.0);
        add_velocity(bodies, &joint.a, normal * relative * share_a);
        add_velocity(bodies, &joint.b, -normal * relative * share_b);
    }
}

fn nudge(bodies: &mut RigidBodySet, end: &JointEnd, offset: Vec2, dt: f32) {
    let Some(handle) = end.body() else {
        return;
    };
    if !offset.is_finite() || offset == Vec2::ZERO {
        return;
    }
    if let Some(body) = bodies.get_mut(handle) {
        if !body.is_dynamic() {
            return;
        }
        let t = body.translation();
        body.set_translation(Vector::new(t.x + offset.x, t.y + offset.y), true);
        let v = body.linvel();
        let dv = offset / dt;
        body.set_linvel(Vector::new(v.x + dv.x, v.y + dv.y), true);
    }
}

fn end_velocity(bodies: &RigidBodySet, end: &JointEnd) -> Vec2 {
    end.body()
        .and_then(|handle| bodies.get(handle))
        .map_or(Vec2::ZERO, |body| {
            let v = body.linvel();
            Vec2::new(v.x, v.y)
        })
}

fn add_velocity(bodies: &mut RigidBodySet, end: &JointEnd, dv: Vec2) {
    let Some(handle) = end.body() else {
        return;
    };
    if !dv.is_finite() {
        return;
    }
    if let Some(body) = bodies.get_mut(handle) {
        if body.is_dynamic() {
            let v = body.linvel();
            body.set_linvel(Vector::new(v.x + dv.x, v.y + dv.y), true);
        }
    }
}
