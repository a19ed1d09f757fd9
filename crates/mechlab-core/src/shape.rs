//! Body shape descriptors.
//!
//! A descriptor records the parameters a body was authored with, so resize
//! operations can recompute exact geometry instead of reverse-engineering it
//! from the engine's collider.

use std::f32::consts::{FRAC_PI_2, TAU};

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Smallest radius or edge length a shape can be resized to (pixels).
pub const MIN_SHAPE_SIZE: f32 = 4.0;
/// Polygon side count limits.
pub const MIN_POLYGON_SIDES: u32 = 3;
pub const MAX_POLYGON_SIDES: u32 = 12;

/// Authoring-time shape parameters, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeDescriptor {
    Circle { radius: f32 },
    Rectangle { width: f32, height: f32 },
    Polygon { sides: u32, radius: f32 },
}

impl ShapeDescriptor {
    /// Returns the descriptor with every dimension clamped to the minimum.
    pub fn clamped(self) -> Self {
        match self {
            Self::Circle { radius } => Self::Circle {
                radius: clamp_size(radius),
            },
            Self::Rectangle { width, height } => Self::Rectangle {
                width: clamp_size(width),
                height: clamp_size(height),
            },
            Self::Polygon { sides, radius } => Self::Polygon {
                sides: sides.clamp(MIN_POLYGON_SIDES, MAX_POLYGON_SIDES),
                radius: clamp_size(radius),
            },
        }
    }

    /// Area in px².
    pub fn area(&self) -> f32 {
        match *self {
            Self::Circle { radius } => std::f32::consts::PI * radius * radius,
            Self::Rectangle { width, height } => width * height,
            Self::Polygon { sides, radius } => {
                let n = sides as f32;
                0.5 * n * radius * radius * (TAU / n).sin()
            }
        }
    }

    /// Radius of the smallest circle around the local origin containing the shape.
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            Self::Circle { radius } | Self::Polygon { radius, .. } => radius,
            Self::Rectangle { width, height } => 0.5 * width.hypot(height),
        }
    }

    /// Radius of a disc with the same area.
    pub fn equivalent_radius(&self) -> f32 {
        (self.area() / std::f32::consts::PI).sqrt()
    }

    /// Local-space half extents used to place editing handles.
    pub fn half_extents(&self) -> Vec2 {
        match *self {
            Self::Circle { radius } | Self::Polygon { radius, .. } => Vec2::splat(radius),
            Self::Rectangle { width, height } => Vec2::new(width, height) * 0.5,
        }
    }

    /// Local-space position of the resize handle.
    pub fn resize_handle_local(&self) -> Vec2 {
        match *self {
            Self::Circle { radius } | Self::Polygon { radius, .. } => Vec2::new(radius, 0.0),
            Self::Rectangle { width, height } => Vec2::new(width, height) * 0.5,
        }
    }

    /// Recomputes the descriptor so its resize handle lands on `local`.
    pub fn resized_to(&self, local: Vec2) -> Self {
        match *self {
            Self::Circle { .. } => Self::Circle {
                radius: local.length(),
            },
            Self::Rectangle { .. } => Self::Rectangle {
                width: local.x.abs() * 2.0,
                height: local.y.abs() * 2.0,
            },
            Self::Polygon { sides, .. } => Self::Polygon {
                sides,
                radius: local.length(),
            },
        }
        .clamped()
    }

    /// Local-space vertices for polygonal shapes; circles return an empty list.
    pub fn vertices(&self) -> Vec<Vec2> {
        match *self {
            Self::Circle { .. } => Vec::new(),
            Self::Rectangle { width, height } => {
                let h = Vec2::new(width, height) * 0.5;
                vec![
                    Vec2::new(-h.x, -h.y),
                    Vec2::new(h.x, -h.y),
                    Vec2::new(h.x, h.y),
                    Vec2::new(-h.x, h.y),
                ]
            }
            Self::Polygon { sides, radius } => regular_polygon(sides, radius),
        }
    }

    /// Point containment in the shape's local frame.
    pub fn contains_local(&self, p: Vec2) -> bool {
        match *self {
            Self::Circle { radius } => p.length_squared() <= radius * radius,
            Self::Rectangle { width, height } => {
                p.x.abs() <= width * 0.5 && p.y.abs() <= height * 0.5
            }
            Self::Polygon { .. } => convex_contains(&self.vertices(), p),
        }
    }

    /// Point containment for a shape placed at `center` rotated by `angle`.
    pub fn contains_point(&self, center: Vec2, angle: f32, point: Vec2) -> bool {
        self.contains_local(to_local(center, angle, point))
    }
}

fn clamp_size(value: f32) -> f32 {
    if value.is_finite() {
        value.abs().max(MIN_SHAPE_SIZE)
    } else {
        MIN_SHAPE_SIZE
    }
}

/// Vertices of a regular polygon, first vertex pointing up (-y).
pub fn regular_polygon(sides: u32, radius: f32) -> Vec<Vec2> {
    let n = sides.clamp(MIN_POLYGON_SIDES, MAX_POLYGON_SIDES);
    (0..n)
        .map(|i| {
            let a = -FRAC_PI_2 + TAU * i as f32 / n as f32;
            Vec2::new(a.cos(), a.sin()) * radius
        })
        .collect()
}

/// Rotates a local offset into world space.
pub fn rotate(v: Vec2, angle: f32) -> Vec2 {
    Vec2::from_angle(angle).rotate(v)
}

/// Transforms a world point into a body's local frame.
pub fn to_local(center: Vec2, angle: f32, point: Vec2) -> Vec2 {
    rotate(point - center, -angle)
}

/// Transforms a local point into world space.
pub fn to_world(center: Vec2, angle: f32, local: Vec2) -> Vec2 {
    center + rotate(local, angle)
}

fn convex_contains(vertices: &[Vec2], p: Vec2) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let mut sign = 0.0_f32;
    for (i, a) in vertices.iter().enumerate() {
        let b = vertices[(i + 1) % vertices.len()];
        let cross = (b - *a).perp_dot(p - *a);
        if cross.abs() < f32::EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_areas() {
        let c = ShapeDescriptor::Circle { radius: 10.0 };
        assert!((c.area() - 314.159).abs() < 0.01);

        let r = ShapeDescriptor::Rectangle {
            width: 4.0,
            height: 5.0,
        };
        assert_eq!(r.area(), 20.0);

        // A square as a 4-gon with circumradius sqrt(2) has side 2.
        let p = ShapeDescriptor::Polygon {
            sides: 4,
            radius: 2.0_f32.sqrt(),
        };
        assert!((p.area() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_clamped_never_degenerate() {
        let s = ShapeDescriptor::Rectangle {
            width: 0.0,
            height: -3.0,
        }
        .clamped();
        assert_eq!(
            s,
            ShapeDescriptor::Rectangle {
                width: MIN_SHAPE_SIZE,
                height: MIN_SHAPE_SIZE
            }
        );

        let p = ShapeDescriptor::Polygon {
            sides: 1,
            radius: f32::NAN,
        }
        .clamped();
        assert_eq!(
            p,
            ShapeDescriptor::Polygon {
                sides: MIN_POLYGON_SIDES,
                radius: MIN_SHAPE_SIZE
            }
        );
    }

    #[test]
    fn test_rotated_rectangle_containment() {
        let r = ShapeDescriptor::Rectangle {
            width: 100.0,
            height: 10.0,
        };
        let center = Vec2::new(50.0, 50.0);
        assert!(r.contains_point(center, 0.0, Vec2::new(95.0, 50.0)));
        // Rotated a quarter turn the long axis is vertical.
        let quarter = std::f32::consts::FRAC_PI_2;
        assert!(!r.contains_point(center, quarter, Vec2::new(95.0, 50.0)));
        assert!(r.contains_point(center, quarter, Vec2::new(50.0, 95.0)));
    }

    #[test]
    fn test_polygon_containment() {
        let p = ShapeDescriptor::Polygon {
            sides: 6,
            radius: 20.0,
        };
        assert!(p.contains_local(Vec2::ZERO));
        assert!(p.contains_local(Vec2::new(0.0, -15.0)));
        assert!(!p.contains_local(Vec2::new(0.0, -25.0)));
        assert_eq!(p.vertices().len(), 6);
    }

    #[test]
    fn test_resize_round_trip_through_handle() {
        let r = ShapeDescriptor::Rectangle {
            width: 30.0,
            height: 12.0,
        };
        assert_eq!(r.resized_to(r.resize_handle_local()), r);

        let c = ShapeDescriptor::Circle { radius: 8.0 };
        assert_eq!(c.resized_to(Vec2::new(0.0, 20.0)), ShapeDescriptor::Circle { radius: 20.0 });
        assert_eq!(c.resized_to(Vec2::ZERO), ShapeDescriptor::Circle { radius: MIN_SHAPE_SIZE });
    }

    #[test]
    fn test_local_world_round_trip() {
        let center = Vec2::new(3.0, -7.0);
        let p = Vec2::new(10.0, 4.0);
        let back = to_world(center, 0.7, to_local(center, 0.7, p));
        assert!(back.distance(p) < 1e-4);
    }
}
