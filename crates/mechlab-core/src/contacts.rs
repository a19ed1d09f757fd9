//! Conveyor and sensor behavior driven by collision events.

use glam::Vec2;
use rapier2d::prelude::RigidBodyHandle;

use crate::physics::ContactPhase;
use crate::scene::Scene;
use crate::shape;
use crate::units;

/// Runs after an engine step: counts sensor hits and drives conveyor belts.
pub fn apply_contact_behaviors(scene: &mut Scene) {
    count_sensor_hits(scene);
    drive_conveyors(scene);
}

fn count_sensor_hits(scene: &mut Scene) {
    let started: Vec<(RigidBodyHandle, RigidBodyHandle)> = scene
        .world
        .contact_events()
        .iter()
        .filter(|e| e.phase == ContactPhase::Started)
        .map(|e| (e.body1, e.body2))
        .collect();

    for (h1, h2) in started {
        for handle in [h1, h2] {
            let Some(id) = scene.body_id(handle) else {
                continue;
            };
            if let Some(sensor) = scene
                .meta
                .body_meta_mut(id)
                .and_then(|m| m.sensor.as_mut())
                .filter(|s| s.enabled)
            {
                sensor.count += 1;
                tracing::debug!("[contacts] sensor {} hit ({})", sensor.label, sensor.count);
            }
        }
    }
}

fn drive_conveyors(scene: &mut Scene) {
    let pairs: Vec<(RigidBodyHandle, RigidBodyHandle)> = scene
        .world
        .active_contacts()
        .iter()
        .flat_map(|c| [(c.body1, c.body2), (c.body2, c.body1)])
        .collect();
    let delta_ms = scene.world.last_delta_ms();

    for (belt, rider) in pairs {
        let Some(conveyor) = scene
            .body_id(belt)
            .and_then(|id| scene.body_meta(id))
            .and_then(|m| m.conveyor)
            .filter(|c| c.enabled)
        else {
            continue;
        };
        if scene.world.is_static(rider) {
            continue;
        }
        let (Some(angle), Some(velocity)) = (scene.world.angle(belt), scene.world.velocity(rider))
        else {
            continue;
        };
        let tangent = shape::rotate(Vec2::X, angle);
        let target = units::mps_to_world_velocity_step(conveyor.speed, delta_ms);
        if let Some(nudged) = nudge_tangential(velocity, tangent, target, conveyor.grip) {
            scene.world.set_velocity(rider, nudged);
        }
    }
}

/// Moves the tangential component of `velocity` towards `target` by `grip`.
pub fn nudge_tangential(velocity: Vec2, tangent: Vec2, target: f32, grip: f32) -> Option<Vec2> {
    let current = velocity.dot(tangent);
    let next = current + (target - current) * grip.clamp(0.0, 1.0);
    let nudged = velocity + tangent * (next - current);
    nudged.is_finite().then_some(nudged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{ConveyorMeta, SensorMeta};
    use crate::scene::tests::ball_snapshot;
    use crate::shape::ShapeDescriptor;
    use crate::units::BASE_DELTA_MS;

    #[test]
    fn test_nudge_only_changes_tangential_component() {
        let v = Vec2::new(1.0, 3.0);
        let nudged = nudge_tangential(v, Vec2::X, 5.0, 0.5).unwrap();
        assert_eq!(nudged, Vec2::new(3.0, 3.0));
        assert_eq!(nudge_tangential(v, Vec2::X, 5.0, 0.0).unwrap(), v);
        assert_eq!(nudge_tangential(v, Vec2::X, 5.0, 1.0).unwrap(), Vec2::new(5.0, 3.0));
    }

    fn ground(scene: &mut Scene) -> crate::scene::BodySnapshot {
        let mut snap = ball_snapshot(scene, Vec2::new(0.0, 100.0), 10.0);
        snap.shape = ShapeDescriptor::Rectangle {
            width: 1000.0,
            height: 20.0,
        };
        snap.is_static = true;
        snap
    }

    #[test]
    fn test_sensor_counts_collision_starts() {
        let mut scene = Scene::new();
        let mut floor = ground(&mut scene);
        floor.meta.sensor = Some(SensorMeta::default());
        scene.upsert_body(&floor);
        let ball = ball_snapshot(&mut scene, Vec2::new(0.0, 60.0), 10.0);
        scene.upsert_body(&ball);

        for _ in 0..90 {
            scene.world.step(BASE_DELTA_MS);
            apply_contact_behaviors(&mut scene);
        }
        let count = scene.body_meta(floor.id).unwrap().sensor.as_ref().unwrap().count;
        assert!(count >= 1);
    }

    #[test]
    fn test_conveyor_carries_resting_body() {
        let mut scene = Scene::new();
        let mut belt = ground(&mut scene);
        belt.meta.conveyor = Some(ConveyorMeta {
            enabled: true,
            speed: 2.0,
            grip: 0.5,
        });
        scene.upsert_body(&belt);
        let ball = ball_snapshot(&mut scene, Vec2::new(0.0, 75.0), 10.0);
        scene.upsert_body(&ball);

        for _ in 0..120 {
            scene.world.step(BASE_DELTA_MS);
            apply_contact_behaviors(&mut scene);
        }
        let x = scene.body_position(ball.id).unwrap().x;
        assert!(x > 10.0, "belt moved the body to {x}");
    }
}
