//! Editor camera: pan and zoom between screen and world coordinates.

use glam::Vec2;
use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 10.0;
/// Zoom factor per wheel notch.
pub const ZOOM_STEP: f32 = 1.1;

/// `world = screen / zoom + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// World position shown at the screen origin.
    pub offset: Vec2,
    pub zoom: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl Camera {
    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        screen / self.zoom + self.offset
    }

    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        (world - self.offset) * self.zoom
    }

    /// Converts a length in screen pixels to world pixels.
    pub fn screen_length(&self, pixels: f32) -> f32 {
        pixels / self.zoom
    }

    /// Dragging right moves the view so content follows the pointer.
    pub fn pan_by(&mut self, screen_delta: Vec2) {
        self.offset -= screen_delta / self.zoom;
    }

    /// Zooms by `factor`, keeping the world point under `screen` fixed.
    pub fn zoom_at(&mut self, screen: Vec2, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let anchor = self.screen_to_world(screen);
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        self.offset = anchor - screen / self.zoom;
    }

    /// Wheel zoom: positive `notches` zoom in.
    pub fn zoom_wheel(&mut self, screen: Vec2, notches: f32) {
        if notches.abs() < 0.001 {
            return;
        }
        let factor = if notches > 0.0 { ZOOM_STEP } else { 1.0 / ZOOM_STEP };
        self.zoom_at(screen, factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_world_round_trip() {
        let camera = Camera {
            offset: Vec2::new(-30.0, 12.0),
            zoom: 2.5,
        };
        let p = Vec2::new(123.0, 45.0);
        assert!(camera.world_to_screen(camera.screen_to_world(p)).distance(p) < 1e-4);
    }

    #[test]
    fn test_zoom_keeps_cursor_fixed() {
        let mut camera = Camera::default();
        let cursor = Vec2::new(200.0, 150.0);
        let before = camera.screen_to_world(cursor);
        camera.zoom_wheel(cursor, 1.0);
        assert!((camera.zoom - ZOOM_STEP).abs() < 1e-6);
        assert!(camera.screen_to_world(cursor).distance(before) < 1e-3);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut camera = Camera::default();
        camera.zoom_at(Vec2::ZERO, 1000.0);
        assert_eq!(camera.zoom, MAX_ZOOM);
        camera.zoom_at(Vec2::ZERO, f32::NAN);
        assert_eq!(camera.zoom, MAX_ZOOM);
    }

    #[test]
    fn test_pan() {
        let mut camera = Camera {
            offset: Vec2::ZERO,
            zoom: 2.0,
        };
        camera.pan_by(Vec2::new(10.0, 0.0));
        assert_eq!(camera.offset, Vec2::new(-5.0, 0.0));
    }
}
