//! Free-body readout for the selected body, refreshed at a capped rate.

use std::collections::HashMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::SimSettings;
use crate::em::ForceBreakdown;
use crate::meta::BodyId;
use crate::scene::Scene;
use crate::units;

/// Readout refreshes per second of frame time.
pub const READOUT_HZ: f32 = 10.0;

/// Forces and motion of one body, in SI units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreeBodyReadout {
    pub body: BodyId,
    pub mass_kg: f32,
    /// Weight, +y down.
    pub gravity_n: Vec2,
    pub em: ForceBreakdown,
    pub net_n: Vec2,
    pub velocity_mps: Vec2,
    pub speed_mps: f32,
    pub kinetic_energy_j: f32,
}

/// Computes the readout from the forces applied in the last step.
pub fn free_body_readout(
    scene: &Scene,
    id: BodyId,
    forces: &HashMap<BodyId, ForceBreakdown>,
    settings: &SimSettings,
) -> Option<FreeBodyReadout> {
    let handle = scene.body_handle(id)?;
    let is_static = scene.world.is_static(handle);
    let mass_kg = if is_static { 0.0 } else { scene.world.mass(handle)? };
    let gravity_n = Vec2::new(0.0, mass_kg * settings.gravity_mps2);
    let em = forces.get(&id).copied().unwrap_or_default();

    let delta_ms = scene.world.last_delta_ms();
    let step_velocity = scene.world.velocity(handle)?;
    let velocity_mps = Vec2::new(
        units::world_velocity_step_to_mps(step_velocity.x, delta_ms),
        units::world_velocity_step_to_mps(step_velocity.y, delta_ms),
    );
    let speed_mps = velocity_mps.length();
    let readout = FreeBodyReadout {
        body: id,
        mass_kg,
        gravity_n,
        em,
        net_n: gravity_n + em.total,
        velocity_mps,
        speed_mps,
        kinetic_energy_j: 0.5 * mass_kg * speed_mps * speed_mps,
    };
    readout.is_finite().then_some(readout)
}

impl FreeBodyReadout {
    fn is_finite(&self) -> bool {
        self.mass_kg.is_finite() && self.net_n.is_finite() && self.velocity_mps.is_finite()
    }
}

/// Lets work through at most `hz` times per second of accumulated frame time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throttle {
    interval_ms: f32,
    elapsed_ms: f32,
}

impl Throttle {
    pub fn new(hz: f32) -> Self {
        Self {
            interval_ms: 1000.0 / hz,
            elapsed_ms: 0.0,
        }
    }

    pub fn tick(&mut self, frame_ms: f32) -> bool {
        if frame_ms.is_finite() && frame_ms > 0.0 {
            self.elapsed_ms += frame_ms;
        }
        if self.elapsed_ms < self.interval_ms {
            return false;
        }
        // Drop whole missed intervals so a long frame does not cause a burst.
        self.elapsed_ms %= self.interval_ms;
        true
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostics {
    throttle: Throttle,
    readout: Option<FreeBodyReadout>,
    refreshes: u64,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            throttle: Throttle::new(READOUT_HZ),
            readout: None,
            refreshes: 0,
        }
    }
}

impl Diagnostics {
    pub fn readout(&self) -> Option<&FreeBodyReadout> {
        self.readout.as_ref()
    }

    /// Number of recomputations so far.
    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    /// Recomputes the readout for `body` if the throttle allows it.
    pub fn update(
        &mut self,
        frame_ms: f32,
        scene: &Scene,
        body: Option<BodyId>,
        forces: &HashMap<BodyId, ForceBreakdown>,
        settings: &SimSettings,
    ) -> bool {
        if !self.throttle.tick(frame_ms) {
            return false;
        }
        self.readout = body.and_then(|id| free_body_readout(scene, id, forces, settings));
        self.refreshes += 1;
        true
    }

    pub fn clear(&mut self) {
        self.readout = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::tests::ball_snapshot;

    #[test]
    fn test_throttle_caps_rate() {
        let mut throttle = Throttle::new(READOUT_HZ);
        // One second at 200 fps.
        let fired = (0..200).filter(|_| throttle.tick(5.0)).count();
        assert_eq!(fired, 10);

        // One second at 20 fps.
        let mut throttle = Throttle::new(READOUT_HZ);
        let fired = (0..20).filter(|_| throttle.tick(50.0)).count();
        assert_eq!(fired, 10);
    }

    #[test]
    fn test_long_frame_fires_once() {
        let mut throttle = Throttle::new(READOUT_HZ);
        assert!(!throttle.tick(0.0));
        assert!(throttle.tick(1000.0));
        assert!(!throttle.tick(1.0));
    }

    #[test]
    fn test_readout_for_resting_ball() {
        let mut scene = Scene::with_gravity(Vec2::ZERO);
        let mut snap = ball_snapshot(&mut scene, Vec2::ZERO, 25.0);
        snap.velocity_mps = Vec2::new(2.0, 0.0);
        scene.upsert_body(&snap);
        scene.world.step(units::BASE_DELTA_MS);
        let settings = SimSettings::default();

        let readout = free_body_readout(&scene, snap.id, &HashMap::new(), &settings).unwrap();
        // Half-meter radius at 10 kg/m².
        let expected = 10.0 * std::f32::consts::PI * 0.25;
        assert!((readout.mass_kg - expected).abs() < 0.01);
        assert!((readout.gravity_n.y - readout.mass_kg * 9.81).abs() < 1e-3);
        assert!((readout.speed_mps - 2.0).abs() < 1e-3);
        assert!((readout.kinetic_energy_j - 0.5 * readout.mass_kg * 4.0).abs() < 1e-3);
        assert_eq!(readout.em, ForceBreakdown::default());
    }

    #[test]
    fn test_update_clears_when_nothing_selected() {
        let scene = Scene::new();
        let mut diagnostics = Diagnostics::default();
        assert!(!diagnostics.update(16.0, &scene, None, &HashMap::new(), &SimSettings::default()));
        assert!(diagnostics.update(100.0, &scene, None, &HashMap::new(), &SimSettings::default()));
        assert!(diagnostics.readout().is_none());
        assert_eq!(diagnostics.refreshes(), 1);
    }
}
