//! Authored electric and magnetic field regions.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::meta::FieldId;
use crate::shape::MIN_SHAPE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Uniform field of `magnitude` (N/C) pointing along `direction_rad`.
    Electric { magnitude: f32, direction_rad: f32 },
    /// Out-of-plane field in tesla; positive points out of the plane.
    Magnetic { strength: f32 },
}

/// Region geometry in world pixels. Rectangles are axis-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldShape {
    Rect { center: Vec2, width: f32, height: f32 },
    Circle { center: Vec2, radius: f32 },
}

impl FieldShape {
    pub fn center(&self) -> Vec2 {
        match *self {
            Self::Rect { center, .. } | Self::Circle { center, .. } => center,
        }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        match *self {
            Self::Rect {
                center,
                width,
                height,
            } => {
                let d = (point - center).abs();
                d.x <= width * 0.5 && d.y <= height * 0.5
            }
            Self::Circle { center, radius } => point.distance_squared(center) <= radius * radius,
        }
    }

    pub fn with_center(self, center: Vec2) -> Self {
        match self {
            Self::Rect { width, height, .. } => Self::Rect {
                center,
                width,
                height,
            },
            Self::Circle { radius, .. } => Self::Circle { center, radius },
        }
    }

    /// World position of the resize handle.
    pub fn resize_handle(&self) -> Vec2 {
        match *self {
            Self::Rect {
                center,
                width,
                height,
            } => center + Vec2::new(width, height) * 0.5,
            Self::Circle { center, radius } => center + Vec2::new(radius, 0.0),
        }
    }

    /// Reshapes the region so its resize handle lands on `handle`.
    pub fn resized_to(self, handle: Vec2) -> Self {
        match self {
            Self::Rect { center, .. } => {
                let half = (handle - center).abs();
                Self::Rect {
                    center,
                    width: (half.x * 2.0).max(MIN_SHAPE_SIZE),
                    height: (half.y * 2.0).max(MIN_SHAPE_SIZE),
                }
            }
            Self::Circle { center, .. } => Self::Circle {
                center,
                radius: handle.distance(center).max(MIN_SHAPE_SIZE),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRegion {
    pub id: FieldId,
    pub kind: FieldKind,
    pub shape: FieldShape,
}

impl FieldRegion {
    pub fn contains(&self, point: Vec2) -> bool {
        self.shape.contains(point)
    }

    /// Electric field vector (N/C), zero for magnetic regions.
    pub fn electric_vector(&self) -> Vec2 {
        match self.kind {
            FieldKind::Electric {
                magnitude,
                direction_rad,
            } => Vec2::from_angle(direction_rad) * magnitude,
            FieldKind::Magnetic { .. } => Vec2::ZERO,
        }
    }

    /// Out-of-plane magnetic strength (T), zero for electric regions.
    pub fn magnetic_strength(&self) -> f32 {
        match self.kind {
            FieldKind::Magnetic { strength } => strength,
            FieldKind::Electric { .. } => 0.0,
        }
    }
}
