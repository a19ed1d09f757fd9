//! Simulation settings.
//!
//! Settings are plain serde data with per-field defaults, so partial JSON
//! documents (including a scene payload's recommended settings) load cleanly.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::em::EmSettings;
use crate::error::ConfigError;
use crate::physics::Material;
use crate::units;

/// Largest accepted time scale.
pub const MAX_TIME_SCALE: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub enabled: bool,
    /// Grid step in meters.
    pub step_m: f32,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            step_m: 0.5,
        }
    }
}

impl GridSettings {
    /// Grid step in pixels, `None` when snapping is off.
    pub fn step_px(&self) -> Option<f32> {
        (self.enabled && self.step_m > 0.0).then(|| units::meters_to_world(self.step_m))
    }
}

/// Parameters new entities are created with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnDefaults {
    /// kg/m².
    pub density: f32,
    pub material: Material,
    pub spring_stiffness: f32,
    pub spring_damping: f32,
}

impl Default for SpawnDefaults {
    fn default() -> Self {
        Self {
            density: 10.0,
            material: Material::default(),
            spring_stiffness: 0.05,
            spring_damping: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Downward gravity in m/s².
    pub gravity_mps2: f32,
    /// Simulated time per frame time.
    pub time_scale: f32,
    pub grid: GridSettings,
    pub em: EmSettings,
    pub defaults: SpawnDefaults,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            gravity_mps2: 9.81,
            time_scale: 1.0,
            grid: GridSettings::default(),
            em: EmSettings::default(),
            defaults: SpawnDefaults::default(),
        }
    }
}

impl SimSettings {
    /// Parses settings JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("gravity_mps2", self.gravity_mps2, self.gravity_mps2.is_finite()),
            (
                "time_scale",
                self.time_scale,
                self.time_scale > 0.0 && self.time_scale <= MAX_TIME_SCALE,
            ),
            ("grid.step_m", self.grid.step_m, self.grid.step_m > 0.0),
            ("defaults.density", self.defaults.density, self.defaults.density > 0.0),
            ("em.coulomb_k", self.em.coulomb_k, self.em.coulomb_k.is_finite()),
            ("em.softening_m", self.em.softening_m, self.em.softening_m >= 0.0),
            ("em.max_force_n", self.em.max_force_n, self.em.max_force_n > 0.0),
        ];
        for (field, value, ok) in checks {
            if !ok {
                return Err(ConfigError::InvalidValue { field, value });
            }
        }
        Ok(())
    }

    /// Gravity vector in engine units (px/s², +y down).
    pub fn gravity_vector(&self) -> Vec2 {
        Vec2::new(0.0, units::mps2_to_world_acceleration(self.gravity_mps2))
    }
}
