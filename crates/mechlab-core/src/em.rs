//! Electromagnetic forces on charged bodies.
//!
//! Runs once per step before the engine integrates. Forces are computed in
//! SI units (meters, coulombs, newtons) and converted to engine force units
//! when applied. The model is deliberately simplified: Coulomb forces are
//! softened near zero separation and clamped, fields are uniform inside their
//! region and zero outside.

use std::collections::HashMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::meta::{BodyId, ChargeDistribution};
use crate::scene::Scene;
use crate::units;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmSettings {
    /// Coulomb constant, scaled so that charges of a few coulombs at a few
    /// meters give forces of a few newtons.
    pub coulomb_k: f32,
    /// Softening length ε in meters.
    pub softening_m: f32,
    /// Ceiling on each pairwise Coulomb force (N).
    pub max_force_n: f32,
    /// Multiplier on electric field forces.
    pub electric_scale: f32,
}

impl Default for EmSettings {
    fn default() -> Self {
        Self {
            coulomb_k: 9.0,
            softening_m: 0.1,
            max_force_n: 500.0,
            electric_scale: 1.0,
        }
    }
}

/// Per-body forces applied in one step, in newtons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForceBreakdown {
    pub coulomb: Vec2,
    pub electric: Vec2,
    pub magnetic: Vec2,
    pub total: Vec2,
}

#[derive(Debug, Clone, Copy)]
struct Charged {
    id: BodyId,
    /// Meters.
    position: Vec2,
    /// m/s.
    velocity: Vec2,
    charge: f32,
    /// Meters.
    softening: f32,
    is_static: bool,
}

/// Softened, clamped Coulomb force on body `a` due to body `b` (newtons).
///
/// Positive `q_a·q_b` pushes `a` away from `b`. Returns zero when the bodies
/// coincide.
pub fn coulomb_force(
    a: Vec2,
    b: Vec2,
    q_a: f32,
    q_b: f32,
    softening: f32,
    settings: &EmSettings,
) -> Vec2 {
    let separation = b - a;
    let d2 = separation.length_squared();
    if d2 <= f32::EPSILON {
        return Vec2::ZERO;
    }
    let direction = separation / d2.sqrt();
    let magnitude = settings.coulomb_k * q_a * q_b / (d2 + softening * softening);
    let magnitude = magnitude.clamp(-settings.max_force_n, settings.max_force_n);
    -direction * magnitude
}

/// Lorentz force of an out-of-plane field: `q·(v × B ẑ)`.
pub fn magnetic_force(charge: f32, velocity: Vec2, strength: f32) -> Vec2 {
    Vec2::new(velocity.y * strength, -velocity.x * strength) * charge
}

fn collect_charged(scene: &Scene, settings: &EmSettings) -> Vec<Charged> {
    let delta_ms = scene.world.last_delta_ms();
    scene
        .body_ids()
        .into_iter()
        .filter_map(|id| {
            let meta = scene.body_meta(id)?;
            let charge = meta.effective_charge();
            if charge == 0.0 {
                return None;
            }
            let handle = scene.body_handle(id)?;
            let position = scene.world.position(handle)?;
            let velocity = scene.world.velocity(handle)?;
            let softening = match meta.charge_distribution {
                ChargeDistribution::Point => settings.softening_m,
                ChargeDistribution::Uniform => scene
                    .body_shape(id)
                    .map_or(settings.softening_m, |shape| {
                        settings
                            .softening_m
                            .max(units::world_to_meters(shape.equivalent_radius()))
                    }),
            };
            Some(Charged {
                id,
                position: position / units::PIXELS_PER_METER,
                velocity: Vec2::new(
                    units::world_velocity_step_to_mps(velocity.x, delta_ms),
                    units::world_velocity_step_to_mps(velocity.y, delta_ms),
                ),
                charge,
                softening,
                is_static: scene.world.is_static(handle),
            })
        })
        .collect()
}

/// Computes and applies electromagnetic forces for the coming step.
///
/// Returns the breakdown for every non-static charged body that received a
/// force. The breakdown is a record of what was applied.
pub fn apply_em_forces(scene: &mut Scene, settings: &EmSettings) -> HashMap<BodyId, ForceBreakdown> {
    let charged = collect_charged(scene, settings);
    let mut breakdown: HashMap<BodyId, ForceBreakdown> = HashMap::new();

    for (i, a) in charged.iter().enumerate() {
        for b in &charged[i + 1..] {
            if a.is_static && b.is_static {
                continue;
            }
            let softening = a.softening.max(b.softening);
            let force = coulomb_force(a.position, b.position, a.charge, b.charge, softening, settings);
            if !force.is_finite() {
                continue;
            }
            if !a.is_static {
                breakdown.entry(a.id).or_default().coulomb += force;
            }
            if !b.is_static {
                breakdown.entry(b.id).or_default().coulomb -= force;
            }
        }
    }

    for body in charged.iter().filter(|c| !c.is_static) {
        let world_position = body.position * units::PIXELS_PER_METER;
        for field in scene.fields().iter().filter(|f| f.contains(world_position)) {
            let electric = field.electric_vector() * body.charge * settings.electric_scale;
            if electric.is_finite() && electric != Vec2::ZERO {
                breakdown.entry(body.id).or_default().electric += electric;
            }
            let magnetic = magnetic_force(body.charge, body.velocity, field.magnetic_strength());
            if magnetic.is_finite() && magnetic != Vec2::ZERO {
                breakdown.entry(body.id).or_default().magnetic += magnetic;
            }
        }
    }

    for (id, forces) in &mut breakdown {
        forces.total = forces.coulomb + forces.electric + forces.magnetic;
        let Some(handle) = scene.body_handle(*id) else {
            continue;
        };
        let engine_force = Vec2::new(
            units::newtons_to_world_force(forces.total.x),
            units::newtons_to_world_force(forces.total.y),
        );
        scene.world.add_force(handle, engine_force);
    }
    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldKind, FieldRegion, FieldShape};
    use crate::meta::FieldId;
    use crate::scene::tests::ball_snapshot;
    use crate::units::BASE_DELTA_MS;

    fn charged_ball(scene: &mut Scene, position: Vec2, charge: f32) -> BodyId {
        let mut snap = ball_snapshot(scene, position, 20.0);
        snap.meta.is_charged = true;
        snap.meta.charge = charge;
        scene.upsert_body(&snap);
        snap.id
    }

    #[test]
    fn test_coulomb_sign() {
        let settings = EmSettings::default();
        let a = Vec2::ZERO;
        for b in [Vec2::new(1.0, 0.0), Vec2::new(-0.3, 2.0), Vec2::new(0.001, -0.001)] {
            // Same sign: force on a points away from b.
            let repel = coulomb_force(a, b, 1.0, 2.0, 0.1, &settings);
            assert!(repel.dot(b - a) < 0.0);
            let repel = coulomb_force(a, b, -1.0, -2.0, 0.1, &settings);
            assert!(repel.dot(b - a) < 0.0);
            // Opposite sign: towards b.
            let attract = coulomb_force(a, b, 1.0, -2.0, 0.1, &settings);
            assert!(attract.dot(b - a) > 0.0);
        }
        assert_eq!(coulomb_force(a, a, 1.0, 1.0, 0.1, &settings), Vec2::ZERO);
    }

    #[test]
    fn test_coulomb_is_clamped() {
        let settings = EmSettings {
            softening_m: 0.0,
            ..EmSettings::default()
        };
        let f = coulomb_force(Vec2::ZERO, Vec2::new(1e-3, 0.0), 100.0, 100.0, 0.0, &settings);
        assert!((f.length() - settings.max_force_n).abs() < 1e-3);
    }

    #[test]
    fn test_opposite_charges_attract_after_one_step() {
        let mut scene = Scene::with_gravity(Vec2::ZERO);
        let left = charged_ball(&mut scene, Vec2::new(100.0, 100.0), 1.0);
        let right = charged_ball(&mut scene, Vec2::new(200.0, 100.0), -1.0);

        let forces = apply_em_forces(&mut scene, &EmSettings::default());
        assert!(forces[&left].total.x > 0.0);
        assert!(forces[&right].total.x < 0.0);
        scene.world.step(BASE_DELTA_MS);

        let vl = scene.world.velocity(scene.body_handle(left).unwrap()).unwrap();
        let vr = scene.world.velocity(scene.body_handle(right).unwrap()).unwrap();
        assert!(vl.x > 0.0, "left moved {vl:?}");
        assert!(vr.x < 0.0, "right moved {vr:?}");
    }

    #[test]
    fn test_static_pairs_and_uncharged_bodies_are_skipped() {
        let mut scene = Scene::with_gravity(Vec2::ZERO);
        let mut a = ball_snapshot(&mut scene, Vec2::ZERO, 10.0);
        a.is_static = true;
        a.meta.is_charged = true;
        a.meta.charge = 1.0;
        scene.upsert_body(&a);
        let mut b = ball_snapshot(&mut scene, Vec2::new(50.0, 0.0), 10.0);
        b.is_static = true;
        b.meta.is_charged = true;
        b.meta.charge = 1.0;
        scene.upsert_body(&b);
        let c = ball_snapshot(&mut scene, Vec2::new(0.0, 50.0), 10.0);
        scene.upsert_body(&c);

        assert!(apply_em_forces(&mut scene, &EmSettings::default()).is_empty());
    }

    #[test]
    fn test_electric_field_pushes_positive_charge_along_field() {
        let mut scene = Scene::with_gravity(Vec2::ZERO);
        let id = charged_ball(&mut scene, Vec2::new(50.0, 50.0), 2.0);
        scene.upsert_field(FieldRegion {
            id: FieldId(100),
            kind: FieldKind::Electric {
                magnitude: 3.0,
                direction_rad: 0.0,
            },
            shape: FieldShape::Rect {
                center: Vec2::new(50.0, 50.0),
                width: 200.0,
                height: 200.0,
            },
        });
        let forces = apply_em_forces(&mut scene, &EmSettings::default());
        assert!((forces[&id].electric.x - 6.0).abs() < 1e-4);
        assert_eq!(forces[&id].magnetic, Vec2::ZERO);
    }

    #[test]
    fn test_magnetic_force_is_perpendicular_to_velocity() {
        let v = Vec2::new(2.0, 0.0);
        let f = magnetic_force(1.0, v, 0.5);
        assert!(f.dot(v).abs() < 1e-6);
        assert_eq!(f, Vec2::new(0.0, -1.0));
        assert_eq!(magnetic_force(1.0, Vec2::ZERO, 3.0), Vec2::ZERO);
    }
}
