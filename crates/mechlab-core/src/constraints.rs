//! Constraint behaviors layered over the engine's distance joint.
//!
//! - Ropes are tension-only: slack ropes exert nothing.
//! - Axis springs pull a single body along a fixed world direction relative
//!   to a fixed anchor, optionally with a stiff perpendicular guide.
//!
//! Both are re-evaluated every step before the engine integrates.

use glam::Vec2;

use crate::meta::{ConstraintId, ConstraintMeta, SpringMode};
use crate::physics::JointEnd;
use crate::scene::Scene;
use crate::units;

/// Spring constant in N/m at stiffness 1.
pub const AXIS_SPRING_K_SCALE: f32 = 200.0;
/// Damping coefficient in N·s/m at damping 1.
pub const AXIS_DAMPING_SCALE: f32 = 20.0;
/// Guide stiffness and damping relative to the spring.
pub const GUIDE_MULTIPLIER: f32 = 8.0;
/// Ceiling on the applied axis-spring force (N).
pub const MAX_AXIS_FORCE_N: f32 = 2000.0;

/// Joint parameters a tension-only constraint uses at separation `d`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RopeState {
    pub length: f32,
    pub stiffness: f32,
    pub damping: f32,
}

impl RopeState {
    pub fn is_taut(&self) -> bool {
        self.stiffness > 0.0
    }
}

/// Taut above the rest length, slack (no force) at or below it.
pub fn rope_state(separation: f32, rest_length: f32, stiffness: f32, damping: f32) -> RopeState {
    if separation > rest_length {
        RopeState {
            length: rest_length,
            stiffness,
            damping,
        }
    } else {
        RopeState {
            length: separation,
            stiffness: 0.0,
            damping: 0.0,
        }
    }
}

/// Inputs of the axis spring force, all in SI units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSpring {
    /// Anchor-to-body offset (m).
    pub offset: Vec2,
    /// Body velocity (m/s).
    pub velocity: Vec2,
    /// Rest length along the axis (m).
    pub rest_length: f32,
    pub axis_angle: f32,
    pub stiffness: f32,
    pub damping: f32,
    pub guide: bool,
}

impl AxisSpring {
    /// Damped spring force along the axis plus the optional guide (N),
    /// clamped to [`MAX_AXIS_FORCE_N`].
    pub fn force(&self) -> Vec2 {
        let axis = Vec2::from_angle(self.axis_angle);
        let normal = axis.perp();
        let k = self.stiffness * AXIS_SPRING_K_SCALE;
        let c = self.damping * AXIS_DAMPING_SCALE;

        let extension = self.offset.dot(axis) - self.rest_length;
        let along = -k * extension - c * self.velocity.dot(axis);
        let mut force = axis * along;

        if self.guide {
            let perp_offset = self.offset.dot(normal);
            let perp_velocity = self.velocity.dot(normal);
            let perp =
                -(k * GUIDE_MULTIPLIER) * perp_offset - (c * GUIDE_MULTIPLIER) * perp_velocity;
            force += normal * perp;
        }
        force.clamp_length_max(MAX_AXIS_FORCE_N)
    }
}

/// Applies rope and axis-spring behavior to every constraint for the coming
/// step.
pub fn apply_constraint_behaviors(scene: &mut Scene) {
    for id in scene.constraint_ids() {
        let Some(meta) = scene.constraint_meta(id).cloned() else {
            continue;
        };
        if meta.kind.is_tension_only() {
            apply_rope(scene, id, &meta);
        } else if meta.is_axis_spring() {
            apply_axis_spring(scene, id, &meta);
        } else {
            sync_distance(scene, id, &meta);
        }
    }
}

fn apply_rope(scene: &mut Scene, id: ConstraintId, meta: &ConstraintMeta) {
    let Some(handle) = scene.constraint_handle(id) else {
        return;
    };
    let Some(separation) = scene.world.joint_separation(handle) else {
        return;
    };
    let state = rope_state(separation, meta.rest_length, meta.stiffness, meta.damping);
    if let Some(joint) = scene.world.joint_mut(handle) {
        joint.length = state.length;
        joint.stiffness = state.stiffness;
        joint.damping = state.damping;
    }
}

fn sync_distance(scene: &mut Scene, id: ConstraintId, meta: &ConstraintMeta) {
    let Some(handle) = scene.constraint_handle(id) else {
        return;
    };
    if let Some(joint) = scene.world.joint_mut(handle) {
        joint.length = meta.rest_length;
        joint.stiffness = meta.stiffness;
        joint.damping = meta.damping;
    }
}

fn apply_axis_spring(scene: &mut Scene, id: ConstraintId, meta: &ConstraintMeta) {
    let Some(handle) = scene.constraint_handle(id) else {
        return;
    };
    let Some(joint) = scene.world.joint(handle).copied() else {
        return;
    };

    if joint.attached_bodies() >= 2 {
        // Two bodies: the axis no longer has a fixed anchor.
        if let Some(meta) = scene.meta.constraint_meta_mut(id) {
            meta.mode = SpringMode::Distance;
        }
        sync_distance(scene, id, meta);
        tracing::debug!("[constraints] {id} reverted to distance spring");
        return;
    }

    if let Some(joint) = scene.world.joint_mut(handle) {
        joint.stiffness = 0.0;
        joint.damping = 0.0;
    }

    let (anchor, body_end) = match (joint.a, joint.b) {
        (JointEnd::Point(anchor), end @ JointEnd::Body { .. })
        | (end @ JointEnd::Body { .. }, JointEnd::Point(anchor)) => (anchor, end),
        _ => return,
    };
    let Some(body) = body_end.body() else {
        return;
    };
    let Some(attach) = scene.world.joint_end_position(&body_end) else {
        return;
    };
    if scene.world.is_static(body) {
        return;
    }
    let Some(velocity) = scene.world.velocity(body) else {
        return;
    };

    let offset_px = attach - anchor;
    let axis_angle = match meta.axis_angle_rad {
        Some(angle) => angle,
        None => {
            let angle = offset_px.y.atan2(offset_px.x);
            if let Some(meta) = scene.meta.constraint_meta_mut(id) {
                meta.axis_angle_rad = Some(angle);
            }
            angle
        }
    };

    let delta_ms = scene.world.last_delta_ms();
    let spring = AxisSpring {
        offset: offset_px / units::PIXELS_PER_METER,
        velocity: Vec2::new(
            units::world_velocity_step_to_mps(velocity.x, delta_ms),
            units::world_velocity_step_to_mps(velocity.y, delta_ms),
        ),
        rest_length: units::world_to_meters(meta.rest_length),
        axis_angle,
        stiffness: meta.stiffness,
        damping: meta.damping,
        guide: meta.guide,
    };
    let force = spring.force();
    if !force.is_finite() || force == Vec2::ZERO {
        return;
    }
    let engine_force = Vec2::new(
        units::newtons_to_world_force(force.x),
        units::newtons_to_world_force(force.y),
    );
    scene.world.add_force_at_point(body, engine_force, attach);
}

/// Stores the constraint's current geometry as its rest length (and, for
/// axis springs, its axis) after an endpoint was dragged.
pub fn resync_rest_length(scene: &mut Scene, id: ConstraintId) {
    let Some((a, b)) = scene.constraint_endpoints(id) else {
        return;
    };
    let (body_a, _) = scene.constraint_bodies(id);
    let Some(meta) = scene.meta.constraint_meta_mut(id) else {
        return;
    };
    let length = a.distance(b);
    if !length.is_finite() {
        return;
    }
    meta.rest_length = length;
    if meta.is_axis_spring() {
        // Axis runs from the fixed anchor towards the body.
        let d = if body_a.is_some() { a - b } else { b - a };
        if d != Vec2::ZERO {
            meta.axis_angle_rad = Some(d.y.atan2(d.x));
        }
    }
    let meta = meta.clone();
    if let Some(handle) = scene.constraint_handle(id) {
        if let Some(joint) = scene.world.joint_mut(handle) {
            joint.length = meta.rest_length;
        }
    }
}
