//! The editable scene: engine world, metadata side tables and field regions.
//!
//! Everything the editor changes goes through snapshots. A snapshot captures
//! one entity completely, so an edit is recorded as the snapshots to write
//! and the ids to remove ([`SceneDelta`]), and replaying the inverse delta
//! restores the previous state.

use std::collections::BTreeSet;

use glam::Vec2;
use rapier2d::prelude::RigidBodyHandle;
use serde::{Deserialize, Serialize};

use crate::field::FieldRegion;
use crate::meta::{
    encode_user_data, BodyId, BodyMeta, ConstraintId, ConstraintMeta, FieldId, MetaRegistry,
    RopeGroupId, USER_DATA_BODY, USER_DATA_CONSTRAINT,
};
use crate::physics::{BodyDesc, DistanceJoint, JointEnd, JointHandle, Material, PhysicsWorld};
use crate::shape::ShapeDescriptor;
use crate::units;

/// Everything needed to recreate a body exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub id: BodyId,
    pub meta: BodyMeta,
    pub shape: ShapeDescriptor,
    pub position: Vec2,
    pub angle: f32,
    /// m/s, so a snapshot keeps its meaning across step-length changes.
    pub velocity_mps: Vec2,
    pub angular_velocity_rad_s: f32,
    pub is_static: bool,
    pub material: Material,
}

/// Everything needed to recreate a constraint exactly.
///
/// `point_a`/`point_b` are local anchors when the matching body is set and
/// world points otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSnapshot {
    pub id: ConstraintId,
    pub meta: ConstraintMeta,
    pub body_a: Option<BodyId>,
    pub body_b: Option<BodyId>,
    pub point_a: Vec2,
    pub point_b: Vec2,
    /// Solver length in pixels.
    pub length: f32,
    pub stiffness: f32,
    pub damping: f32,
}

impl ConstraintSnapshot {
    pub fn attached_bodies(&self) -> impl Iterator<Item = BodyId> {
        self.body_a.into_iter().chain(self.body_b)
    }
}

/// All entities, each list ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub bodies: Vec<BodySnapshot>,
    pub constraints: Vec<ConstraintSnapshot>,
    pub fields: Vec<FieldRegion>,
}

impl SceneSnapshot {
    /// Equality with a tolerance on engine-derived floats.
    pub fn approx_eq(&self, other: &Self, eps: f32) -> bool {
        let close = |a: f32, b: f32| (a - b).abs() <= eps;
        let close_v = |a: Vec2, b: Vec2| close(a.x, b.x) && close(a.y, b.y);

        self.bodies.len() == other.bodies.len()
            && self.constraints.len() == other.constraints.len()
            && self.fields == other.fields
            && self.bodies.iter().zip(&other.bodies).all(|(a, b)| {
                a.id == b.id
                    && a.meta == b.meta
                    && a.shape == b.shape
                    && a.is_static == b.is_static
                    && a.material == b.material
                    && close_v(a.position, b.position)
                    && close(a.angle, b.angle)
                    && close_v(a.velocity_mps, b.velocity_mps)
                    && close(a.angular_velocity_rad_s, b.angular_velocity_rad_s)
            })
            && self.constraints.iter().zip(&other.constraints).all(|(a, b)| {
                a.id == b.id
                    && a.meta == b.meta
                    && a.body_a == b.body_a
                    && a.body_b == b.body_b
                    && close_v(a.point_a, b.point_a)
                    && close_v(a.point_b, b.point_b)
                    && close(a.length, b.length)
                    && close(a.stiffness, b.stiffness)
                    && close(a.damping, b.damping)
            })
    }
}

/// A batch of removals followed by upserts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneDelta {
    pub remove_constraints: Vec<ConstraintId>,
    pub remove_bodies: Vec<BodyId>,
    pub remove_fields: Vec<FieldId>,
    pub bodies: Vec<BodySnapshot>,
    pub constraints: Vec<ConstraintSnapshot>,
    pub fields: Vec<FieldRegion>,
}

impl SceneDelta {
    pub fn is_empty(&self) -> bool {
        self.remove_constraints.is_empty()
            && self.remove_bodies.is_empty()
            && self.remove_fields.is_empty()
            && self.bodies.is_empty()
            && self.constraints.is_empty()
            && self.fields.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Scene {
    pub world: PhysicsWorld,
    pub meta: MetaRegistry,
    fields: Vec<FieldRegion>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gravity(gravity: Vec2) -> Self {
        Self {
            world: PhysicsWorld::with_gravity(gravity),
            ..Self::default()
        }
    }

    /// Removes every entity, keeping gravity.
    pub fn clear(&mut self) {
        self.world.reset();
        self.meta.clear();
        self.fields.clear();
    }

    // ------------------------------------------------------------------
    // Ids and lookups
    // ------------------------------------------------------------------

    pub fn allocate_body_id(&mut self) -> BodyId {
        BodyId(self.meta.allocate_id())
    }

    pub fn allocate_constraint_id(&mut self) -> ConstraintId {
        ConstraintId(self.meta.allocate_id())
    }

    pub fn allocate_field_id(&mut self) -> FieldId {
        FieldId(self.meta.allocate_id())
    }

    pub fn allocate_rope_group(&mut self) -> RopeGroupId {
        RopeGroupId(self.meta.allocate_id())
    }

    pub fn body_handle(&self, id: BodyId) -> Option<RigidBodyHandle> {
        MetaRegistry::find_body_by_meta_id(&self.world, id)
    }

    pub fn constraint_handle(&self, id: ConstraintId) -> Option<JointHandle> {
        MetaRegistry::find_constraint_by_meta_id(&self.world, id)
    }

    pub fn body_id(&self, handle: RigidBodyHandle) -> Option<BodyId> {
        MetaRegistry::body_id(&self.world, handle)
    }

    pub fn contains_body(&self, id: BodyId) -> bool {
        self.body_handle(id).is_some()
    }

    pub fn contains_constraint(&self, id: ConstraintId) -> bool {
        self.constraint_handle(id).is_some()
    }

    /// Ids of live bodies, ascending. Later ids are drawn on top.
    pub fn body_ids(&self) -> Vec<BodyId> {
        let mut ids: Vec<BodyId> = self
            .world
            .body_handles()
            .into_iter()
            .filter_map(|handle| self.body_id(handle))
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn constraint_ids(&self) -> Vec<ConstraintId> {
        let mut ids: Vec<ConstraintId> = self
            .world
            .joint_handles()
            .into_iter()
            .filter_map(|handle| MetaRegistry::constraint_id(&self.world, handle))
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn body_meta(&self, id: BodyId) -> Option<&BodyMeta> {
        self.meta.body_meta(id)
    }

    pub fn constraint_meta(&self, id: ConstraintId) -> Option<&ConstraintMeta> {
        self.meta.constraint_meta(id)
    }

    pub fn body_shape(&self, id: BodyId) -> Option<ShapeDescriptor> {
        self.meta.shape(id)
    }

    pub fn body_position(&self, id: BodyId) -> Option<Vec2> {
        self.world.position(self.body_handle(id)?)
    }

    pub fn body_angle(&self, id: BodyId) -> Option<f32> {
        self.world.angle(self.body_handle(id)?)
    }

    pub fn fields(&self) -> &[FieldRegion] {
        &self.fields
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldRegion> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// World positions of both ends of a constraint.
    pub fn constraint_endpoints(&self, id: ConstraintId) -> Option<(Vec2, Vec2)> {
        let joint = self.world.joint(self.constraint_handle(id)?)?;
        Some((
            self.world.joint_end_position(&joint.a)?,
            self.world.joint_end_position(&joint.b)?,
        ))
    }

    /// Bodies attached to a constraint.
    pub fn constraint_bodies(&self, id: ConstraintId) -> (Option<BodyId>, Option<BodyId>) {
        let Some(joint) = self
            .constraint_handle(id)
            .and_then(|handle| self.world.joint(handle))
        else {
            return (None, None);
        };
        (
            joint.a.body().and_then(|h| self.body_id(h)),
            joint.b.body().and_then(|h| self.body_id(h)),
        )
    }

    pub fn constraints_attached_to(&self, body: BodyId) -> Vec<ConstraintId> {
        let Some(handle) = self.body_handle(body) else {
            return Vec::new();
        };
        let mut ids: Vec<ConstraintId> = self
            .world
            .joints()
            .filter(|(_, joint)| joint.is_attached_to(handle))
            .filter_map(|(joint, _)| MetaRegistry::constraint_id(&self.world, joint))
            .collect();
        ids.sort_unstable();
        ids
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn body_snapshot(&self, id: BodyId) -> Option<BodySnapshot> {
        let handle = self.body_handle(id)?;
        let delta_ms = self.world.last_delta_ms();
        let step_velocity = self.world.velocity(handle)?;
        Some(BodySnapshot {
            id,
            meta: self.meta.body_meta(id)?.clone(),
            shape: self.meta.shape(id)?,
            position: self.world.position(handle)?,
            angle: self.world.angle(handle)?,
            velocity_mps: Vec2::new(
                units::world_velocity_step_to_mps(step_velocity.x, delta_ms),
                units::world_velocity_step_to_mps(step_velocity.y, delta_ms),
            ),
            angular_velocity_rad_s: units::world_angular_velocity_step_to_rad_s(
                self.world.angular_velocity(handle)?,
                delta_ms,
            ),
            is_static: self.world.is_static(handle),
            material: self.world.material(handle)?,
        })
    }

    pub fn constraint_snapshot(&self, id: ConstraintId) -> Option<ConstraintSnapshot> {
        let joint = self.world.joint(self.constraint_handle(id)?)?;
        let (body_a, point_a) = self.describe_end(&joint.a)?;
        let (body_b, point_b) = self.describe_end(&joint.b)?;
        Some(ConstraintSnapshot {
            id,
            meta: self.meta.constraint_meta(id)?.clone(),
            body_a,
            body_b,
            point_a,
            point_b,
            length: joint.length,
            stiffness: joint.stiffness,
            damping: joint.damping,
        })
    }

    fn describe_end(&self, end: &JointEnd) -> Option<(Option<BodyId>, Vec2)> {
        match *end {
            JointEnd::Point(p) => Some((None, p)),
            JointEnd::Body {
                handle,
                local_anchor,
            } => Some((Some(self.body_id(handle)?), local_anchor)),
        }
    }

    /// Snapshot of every entity that has metadata.
    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            bodies: self
                .body_ids()
                .into_iter()
                .filter_map(|id| self.body_snapshot(id))
                .collect(),
            constraints: self
                .constraint_ids()
                .into_iter()
                .filter_map(|id| self.constraint_snapshot(id))
                .collect(),
            fields: self.fields.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Creates the body, or rewrites the live body with the same id in place.
    pub fn upsert_body(&mut self, snap: &BodySnapshot) -> Option<RigidBodyHandle> {
        let shape = snap.shape.clamped();
        let delta_ms = self.world.last_delta_ms();
        let velocity = Vec2::new(
            units::mps_to_world_velocity_step(snap.velocity_mps.x, delta_ms),
            units::mps_to_world_velocity_step(snap.velocity_mps.y, delta_ms),
        );
        let angular_velocity = units::rad_s_to_world_angular_velocity_step(snap.angular_velocity_rad_s, delta_ms);
        let handle = if let Some(handle) = self.body_handle(snap.id) {
            let density_changed = self
                .meta
                .body_meta(snap.id)
                .is_none_or(|meta| meta.density != snap.meta.density);
            if density_changed || self.meta.shape(snap.id) != Some(shape) {
                self.world
                    .set_body_shape(handle, &shape, snap.meta.density);
            }
            self.world.set_static(handle, snap.is_static);
            self.world.set_position(handle, snap.position);
            self.world.set_angle(handle, snap.angle);
            self.world.set_velocity(handle, velocity);
            self.world.set_angular_velocity(handle, angular_velocity);
            self.world.set_material(handle, snap.material);
            handle
        } else {
            self.world.add_body(&BodyDesc {
                shape,
                position: snap.position,
                angle: snap.angle,
                velocity,
                angular_velocity,
                is_static: snap.is_static,
                density: snap.meta.density,
                material: snap.material,
                user_data: encode_user_data(USER_DATA_BODY, snap.id.0),
            })
        };
        let mut meta = snap.meta.clone();
        meta.id = snap.id;
        self.meta.set_shape(snap.id, shape);
        self.meta.set_body_meta(meta);
        Some(handle)
    }

    /// Creates or rewrites a constraint. Aborts if an attached body is gone.
    pub fn upsert_constraint(&mut self, snap: &ConstraintSnapshot) -> Option<JointHandle> {
        let a = self.joint_end(snap.body_a, snap.point_a)?;
        let b = self.joint_end(snap.body_b, snap.point_b)?;
        let joint = DistanceJoint {
            a,
            b,
            length: snap.length,
            stiffness: snap.stiffness,
            damping: snap.damping,
            user_data: encode_user_data(USER_DATA_CONSTRAINT, snap.id.0),
        };
        let handle = if let Some(handle) = self.constraint_handle(snap.id) {
            if let Some(existing) = self.world.joint_mut(handle) {
                *existing = joint;
            }
            handle
        } else {
            self.world.add_joint(joint)
        };
        let mut meta = snap.meta.clone();
        meta.id = snap.id;
        self.meta.set_constraint_meta(meta);
        Some(handle)
    }

    fn joint_end(&self, body: Option<BodyId>, point: Vec2) -> Option<JointEnd> {
        match body {
            Some(id) => Some(JointEnd::Body {
                handle: self.body_handle(id)?,
                local_anchor: point,
            }),
            None => Some(JointEnd::Point(point)),
        }
    }

    pub fn upsert_field(&mut self, region: FieldRegion) {
        self.meta.reserve_id(region.id.0);
        if let Some(existing) = self.fields.iter_mut().find(|f| f.id == region.id) {
            *existing = region;
        } else {
            self.fields.push(region);
            self.fields.sort_by_key(|f| f.id);
        }
    }

    pub fn remove_constraint(&mut self, id: ConstraintId) {
        if let Some(handle) = self.constraint_handle(id) {
            self.world.remove_joint(handle);
        }
        self.meta.forget_constraint(id);
    }

    /// Removes a body along with every constraint attached to it.
    pub fn remove_body(&mut self, id: BodyId) {
        for constraint in self.constraints_attached_to(id) {
            self.remove_constraint(constraint);
        }
        if let Some(handle) = self.body_handle(id) {
            self.world.remove_body(handle);
        }
        self.meta.forget_body(id);
    }

    pub fn remove_field(&mut self, id: FieldId) {
        self.fields.retain(|f| f.id != id);
    }

    /// Applies removals first, then upserts bodies, constraints and fields.
    pub fn apply_delta(&mut self, delta: &SceneDelta) {
        for id in &delta.remove_constraints {
            self.remove_constraint(*id);
        }
        for id in &delta.remove_bodies {
            self.remove_body(*id);
        }
        for id in &delta.remove_fields {
            self.remove_field(*id);
        }
        for body in &delta.bodies {
            self.upsert_body(body);
        }
        for constraint in &delta.constraints {
            if self.upsert_constraint(constraint).is_none() {
                tracing::debug!("[scene] skipped {} with a missing endpoint", constraint.id);
            }
        }
        for field in &delta.fields {
            self.upsert_field(field.clone());
        }
    }

    // ------------------------------------------------------------------
    // Rope groups
    // ------------------------------------------------------------------

    /// Expands a deletion request to everything that must go with it:
    /// constraints attached to deleted bodies, and every body and constraint
    /// sharing a rope group with anything deleted. Iterates to a fixpoint.
    ///
    /// Group membership is found by scanning all entities.
    pub fn deletion_closure(
        &self,
        bodies: &[BodyId],
        constraints: &[ConstraintId],
    ) -> (BTreeSet<BodyId>, BTreeSet<ConstraintId>) {
        let mut body_set: BTreeSet<BodyId> = bodies
            .iter()
            .copied()
            .filter(|id| self.contains_body(*id))
            .collect();
        let mut constraint_set: BTreeSet<ConstraintId> = constraints
            .iter()
            .copied()
            .filter(|id| self.contains_constraint(*id))
            .collect();
        let mut groups: BTreeSet<RopeGroupId> = BTreeSet::new();

        loop {
            let before = (body_set.len(), constraint_set.len(), groups.len());

            for body in &body_set {
                constraint_set.extend(self.constraints_attached_to(*body));
                if let Some(group) = self.body_meta(*body).and_then(|m| m.rope_group) {
                    groups.insert(group);
                }
            }
            for constraint in &constraint_set {
                if let Some(group) = self.constraint_meta(*constraint).and_then(|m| m.rope_group) {
                    groups.insert(group);
                }
            }
            if !groups.is_empty() {
                for id in self.body_ids() {
                    if self
                        .body_meta(id)
                        .and_then(|m| m.rope_group)
                        .is_some_and(|g| groups.contains(&g))
                    {
                        body_set.insert(id);
                    }
                }
                for id in self.constraint_ids() {
                    if self
                        .constraint_meta(id)
                        .and_then(|m| m.rope_group)
                        .is_some_and(|g| groups.contains(&g))
                    {
                        constraint_set.insert(id);
                    }
                }
            }

            if before == (body_set.len(), constraint_set.len(), groups.len()) {
                break;
            }
        }
        (body_set, constraint_set)
    }

    /// Ids of the bodies in a rope group.
    pub fn rope_group_bodies(&self, group: RopeGroupId) -> Vec<BodyId> {
        self.body_ids()
            .into_iter()
            .filter(|id| self.body_meta(*id).and_then(|m| m.rope_group) == Some(group))
            .collect()
    }

    /// Ids of the constraints in a rope group.
    pub fn rope_group_constraints(&self, group: RopeGroupId) -> Vec<ConstraintId> {
        self.constraint_ids()
            .into_iter()
            .filter(|id| self.constraint_meta(*id).and_then(|m| m.rope_group) == Some(group))
            .collect()
    }

    /// Forward and backward deltas that delete the given entities.
    pub fn removal_deltas(
        &self,
        bodies: &BTreeSet<BodyId>,
        constraints: &BTreeSet<ConstraintId>,
        fields: &[FieldId],
    ) -> (SceneDelta, SceneDelta) {
        let forward = SceneDelta {
            remove_constraints: constraints.iter().copied().collect(),
            remove_bodies: bodies.iter().copied().collect(),
            remove_fields: fields.to_vec(),
            ..SceneDelta::default()
        };
        let backward = SceneDelta {
            bodies: bodies.iter().filter_map(|id| self.body_snapshot(*id)).collect(),
            constraints: constraints
                .iter()
                .filter_map(|id| self.constraint_snapshot(*id))
                .collect(),
            fields: fields.iter().filter_map(|id| self.field(*id).cloned()).collect(),
            ..SceneDelta::default()
        };
        (forward, backward)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::meta::{ConstraintKind, ConstraintMeta};

    pub(crate) fn ball_snapshot(scene: &mut Scene, position: Vec2, radius: f32) -> BodySnapshot {
        let id = scene.allocate_body_id();
        let shape = ShapeDescriptor::Circle { radius };
        BodySnapshot {
            id,
            meta: BodyMeta::new(id, &shape, 10.0),
            shape,
            position,
            angle: 0.0,
            velocity_mps: Vec2::ZERO,
            angular_velocity_rad_s: 0.0,
            is_static: false,
            material: Material::default(),
        }
    }

    pub(crate) fn link(
        scene: &mut Scene,
        a: Option<BodyId>,
        b: Option<BodyId>,
        point_a: Vec2,
        point_b: Vec2,
        kind: ConstraintKind,
        length: f32,
    ) -> ConstraintSnapshot {
        let id = scene.allocate_constraint_id();
        let meta = ConstraintMeta::new(id, kind, length);
        ConstraintSnapshot {
            id,
            stiffness: meta.stiffness,
            damping: meta.damping,
            meta,
            body_a: a,
            body_b: b,
            point_a,
            point_b,
            length,
        }
    }

    #[test]
    fn test_upsert_creates_then_updates_in_place() {
        let mut scene = Scene::new();
        let mut snap = ball_snapshot(&mut scene, Vec2::new(10.0, 20.0), 15.0);
        let first = scene.upsert_body(&snap).unwrap();

        snap.position = Vec2::new(40.0, 50.0);
        snap.shape = ShapeDescriptor::Circle { radius: 30.0 };
        let second = scene.upsert_body(&snap).unwrap();

        assert_eq!(first, second);
        assert_eq!(scene.body_ids(), vec![snap.id]);
        let back = scene.body_snapshot(snap.id).unwrap();
        assert_eq!(back.position, Vec2::new(40.0, 50.0));
        assert_eq!(back.shape, ShapeDescriptor::Circle { radius: 30.0 });
    }

    #[test]
    fn test_snapshot_velocity_survives_step_length_change() {
        let mut scene = Scene::with_gravity(Vec2::ZERO);
        let mut snap = ball_snapshot(&mut scene, Vec2::ZERO, 10.0);
        snap.velocity_mps = Vec2::new(2.0, -1.0);
        snap.angular_velocity_rad_s = 3.0;
        scene.upsert_body(&snap);
        let saved = scene.body_snapshot(snap.id).unwrap();

        // A faster time scale shortens the step.
        scene.world.step(units::BASE_DELTA_MS * 2.0);
        scene.upsert_body(&saved);

        let back = scene.body_snapshot(snap.id).unwrap();
        assert!((back.velocity_mps - Vec2::new(2.0, -1.0)).length() < 1e-3);
        assert!((back.angular_velocity_rad_s - 3.0).abs() < 1e-3);
        let handle = scene.body_handle(snap.id).unwrap();
        let step = scene.world.velocity(handle).unwrap();
        let expected = units::mps_to_world_velocity_step(2.0, units::BASE_DELTA_MS * 2.0);
        assert!((step.x - expected).abs() < 1e-3);
    }

    #[test]
    fn test_removing_body_removes_attached_constraints() {
        let mut scene = Scene::new();
        let a = ball_snapshot(&mut scene, Vec2::ZERO, 10.0);
        let b = ball_snapshot(&mut scene, Vec2::new(100.0, 0.0), 10.0);
        scene.upsert_body(&a);
        scene.upsert_body(&b);
        let c = link(&mut scene, Some(a.id), Some(b.id), Vec2::ZERO, Vec2::ZERO, ConstraintKind::Rod, 100.0);
        scene.upsert_constraint(&c).unwrap();

        scene.remove_body(a.id);
        assert!(!scene.contains_constraint(c.id));
        assert!(scene.constraint_meta(c.id).is_none());
        assert!(scene.body_meta(a.id).is_none());
        assert!(scene.contains_body(b.id));
    }

    #[test]
    fn test_constraint_to_missing_body_is_skipped() {
        let mut scene = Scene::new();
        let c = link(
            &mut scene,
            Some(BodyId(999)),
            None,
            Vec2::ZERO,
            Vec2::ZERO,
            ConstraintKind::Rod,
            10.0,
        );
        assert!(scene.upsert_constraint(&c).is_none());
        assert!(scene.constraint_ids().is_empty());
    }

    #[test]
    fn test_removal_deltas_round_trip() {
        let mut scene = Scene::new();
        let a = ball_snapshot(&mut scene, Vec2::new(5.0, 5.0), 10.0);
        scene.upsert_body(&a);
        let c = link(&mut scene, Some(a.id), None, Vec2::ZERO, Vec2::new(5.0, -60.0), ConstraintKind::Rope, 65.0);
        scene.upsert_constraint(&c).unwrap();
        let before = scene.snapshot();

        let (bodies, constraints) = scene.deletion_closure(&[a.id], &[]);
        assert!(constraints.contains(&c.id));
        let (forward, backward) = scene.removal_deltas(&bodies, &constraints, &[]);
        scene.apply_delta(&forward);
        assert!(scene.snapshot().bodies.is_empty());
        scene.apply_delta(&backward);
        assert!(scene.snapshot().approx_eq(&before, 1e-4));
    }

    #[test]
    fn test_deletion_closure_follows_rope_groups() {
        let mut scene = Scene::new();
        let group = scene.allocate_rope_group();
        let end = ball_snapshot(&mut scene, Vec2::ZERO, 10.0);
        scene.upsert_body(&end);
        let mut seg = ball_snapshot(&mut scene, Vec2::new(50.0, 0.0), 4.0);
        seg.meta.rope_group = Some(group);
        scene.upsert_body(&seg);
        let mut l1 = link(&mut scene, Some(end.id), Some(seg.id), Vec2::ZERO, Vec2::ZERO, ConstraintKind::Rope, 50.0);
        l1.meta.rope_group = Some(group);
        scene.upsert_constraint(&l1).unwrap();
        let mut l2 = link(&mut scene, Some(seg.id), None, Vec2::ZERO, Vec2::new(100.0, 0.0), ConstraintKind::Rope, 50.0);
        l2.meta.rope_group = Some(group);
        scene.upsert_constraint(&l2).unwrap();

        // Deleting the endpoint pulls the whole rope but not the endpoint's peers.
        let (bodies, constraints) = scene.deletion_closure(&[end.id], &[]);
        assert_eq!(bodies, BTreeSet::from([end.id, seg.id]));
        assert_eq!(constraints, BTreeSet::from([l1.id, l2.id]));

        // Deleting one link pulls the segment but leaves the endpoint body.
        let (bodies, constraints) = scene.deletion_closure(&[], &[l2.id]);
        assert_eq!(bodies, BTreeSet::from([seg.id]));
        assert_eq!(constraints.len(), 2);
        assert_eq!(scene.rope_group_bodies(group), vec![seg.id]);
    }
}
