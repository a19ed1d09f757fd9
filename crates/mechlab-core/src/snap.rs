//! Grid and angle snapping.
//!
//! Snapping applies to final world coordinates of a gesture, never to the
//! per-move deltas.

use glam::Vec2;

use crate::config::GridSettings;

/// Angle snapping step while rotating, in degrees.
pub const ANGLE_SNAP_DEG: f32 = 15.0;

/// Grid snapping in world pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapper {
    interval: Option<f32>,
}

impl Snapper {
    pub fn new(grid: &GridSettings) -> Self {
        Self {
            interval: grid.step_px(),
        }
    }

    pub fn disabled() -> Self {
        Self { interval: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    pub fn snap(&self, pos: Vec2) -> Vec2 {
        match self.interval {
            Some(interval) => snap_to_grid(pos, interval),
            None => pos,
        }
    }

    /// Scalar snap for sizes and lengths, never below one interval.
    pub fn snap_scalar(&self, value: f32) -> f32 {
        match self.interval {
            Some(interval) => ((value / interval).round() * interval).max(interval),
            None => value,
        }
    }

    /// Angle snap (radians in, radians out); only active with the grid.
    pub fn snap_angle(&self, angle_rad: f32) -> f32 {
        if self.interval.is_none() {
            return angle_rad;
        }
        let deg = angle_rad.to_degrees();
        ((deg / ANGLE_SNAP_DEG).round() * ANGLE_SNAP_DEG).to_radians()
    }
}

pub fn snap_to_grid(pos: Vec2, interval: f32) -> Vec2 {
    if interval <= 0.0 || !interval.is_finite() {
        return pos;
    }
    Vec2::new(
        (pos.x / interval).round() * interval,
        (pos.y / interval).round() * interval,
    )
}
