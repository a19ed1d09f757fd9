//! Unit conversion between engine units and SI units.
//!
//! The engine works in pixels, kilograms and seconds, but reports velocity as
//! a displacement per simulation step rather than a per-second rate. Every
//! readout that is shown to the user in m/s must therefore be corrected with
//! the delta time of the step that produced it.

/// Fixed world scale.
pub const PIXELS_PER_METER: f32 = 50.0;

/// Nominal step length in milliseconds (60Hz).
pub const BASE_DELTA_MS: f32 = 1000.0 / 60.0;

/// Returns `delta_ms` if it is usable as a step length, else the nominal step.
pub fn effective_delta_ms(delta_ms: f32) -> f32 {
    if delta_ms.is_finite() && delta_ms > 0.0 {
        delta_ms
    } else {
        BASE_DELTA_MS
    }
}

pub fn meters_to_world(meters: f32) -> f32 {
    meters * PIXELS_PER_METER
}

pub fn world_to_meters(world: f32) -> f32 {
    world / PIXELS_PER_METER
}

/// Converts a per-step displacement (px/step) into m/s.
///
/// `delta_ms` must be the delta of the step that produced the value, not the
/// frame's wall-clock delta.
pub fn world_velocity_step_to_mps(step_velocity: f32, delta_ms: f32) -> f32 {
    let seconds = effective_delta_ms(delta_ms) / 1000.0;
    world_to_meters(step_velocity) / seconds
}

/// Inverse of [`world_velocity_step_to_mps`] for the same `delta_ms`.
pub fn mps_to_world_velocity_step(mps: f32, delta_ms: f32) -> f32 {
    let seconds = effective_delta_ms(delta_ms) / 1000.0;
    meters_to_world(mps * seconds)
}

/// Converts m/s into a displacement per nominal step.
pub fn mps_to_world_velocity_base_step(mps: f32) -> f32 {
    mps_to_world_velocity_step(mps, BASE_DELTA_MS)
}

/// Converts a per-step rotation (rad/step) into rad/s.
pub fn world_angular_velocity_step_to_rad_s(step_angular: f32, delta_ms: f32) -> f32 {
    step_angular / (effective_delta_ms(delta_ms) / 1000.0)
}

/// Inverse of [`world_angular_velocity_step_to_rad_s`].
pub fn rad_s_to_world_angular_velocity_step(rad_s: f32, delta_ms: f32) -> f32 {
    rad_s * (effective_delta_ms(delta_ms) / 1000.0)
}

/// Converts newtons into engine force (kg·px/s²).
pub fn newtons_to_world_force(newtons: f32) -> f32 {
    newtons * PIXELS_PER_METER
}

/// Converts engine force (kg·px/s²) into newtons.
pub fn world_force_to_newtons(force: f32) -> f32 {
    force / PIXELS_PER_METER
}

/// Converts an acceleration in m/s² into px/s².
pub fn mps2_to_world_acceleration(mps2: f32) -> f32 {
    mps2 * PIXELS_PER_METER
}

/// Converts an area in px² into m².
pub fn world_area_to_square_meters(area: f32) -> f32 {
    area / (PIXELS_PER_METER * PIXELS_PER_METER)
}

/// Converts a density in kg/m² into the engine's kg/px².
pub fn density_to_world(kg_per_m2: f32) -> f32 {
    kg_per_m2 / (PIXELS_PER_METER * PIXELS_PER_METER)
}
