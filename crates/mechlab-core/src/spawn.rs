//! Builds the snapshots that drawing tools commit.
//!
//! Nothing here touches the engine: the editor turns the returned snapshots
//! into one undoable edit.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::SimSettings;
use crate::field::{FieldKind, FieldRegion, FieldShape};
use crate::meta::{
    BodyId, BodyMeta, ConstraintKind, ConstraintMeta, ConveyorMeta, SpringMode,
};
use crate::physics::Material;
use crate::scene::{BodySnapshot, ConstraintSnapshot, Scene};
use crate::shape::{self, ShapeDescriptor, MIN_SHAPE_SIZE};

/// Constraints shorter than this are not created (pixels).
pub const MIN_CONSTRAINT_DISTANCE: f32 = 20.0;

/// Rope synthesis: one segment per this many pixels of span.
pub const ROPE_SEGMENT_SPACING: f32 = 60.0;
pub const ROPE_MIN_SEGMENTS: usize = 6;
pub const ROPE_MAX_SEGMENTS: usize = 18;
pub const ROPE_SEGMENT_RADIUS: f32 = 4.0;
/// Segment density (kg/m²), light so the rope does not dominate its ends.
pub const ROPE_SEGMENT_DENSITY: f32 = 2.0;

/// Thickness of line-like static bodies (pixels).
pub const WALL_THICKNESS: f32 = 20.0;
pub const SLOPE_THICKNESS: f32 = 10.0;
pub const CONVEYOR_THICKNESS: f32 = 16.0;
pub const TRACK_THICKNESS: f32 = 6.0;

/// Shapes drawn by dragging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyTool {
    Circle,
    Rectangle,
    Polygon,
    Wall,
    Slope,
    Conveyor,
    Track,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldShapeKind {
    #[default]
    Rect,
    Circle,
}

/// Number of segment bodies a rope spanning `distance` pixels gets.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rope_segment_count(distance: f32) -> usize {
    let raw = if distance.is_finite() {
        (distance / ROPE_SEGMENT_SPACING).floor().max(0.0) as usize
    } else {
        0
    };
    raw.clamp(ROPE_MIN_SEGMENTS, ROPE_MAX_SEGMENTS)
}

fn below(value: f32, min: f32) -> bool {
    !value.is_finite() || value < min
}

fn body_snapshot(
    scene: &mut Scene,
    shape: ShapeDescriptor,
    position: Vec2,
    angle: f32,
    is_static: bool,
    density: f32,
    material: Material,
) -> BodySnapshot {
    let id = scene.allocate_body_id();
    BodySnapshot {
        id,
        meta: BodyMeta::new(id, &shape, density),
        shape,
        position,
        angle,
        velocity_mps: Vec2::ZERO,
        angular_velocity_rad_s: 0.0,
        is_static,
        material,
    }
}

/// A static bar along the segment `start..end`, or `None` if too short.
fn bar(start: Vec2, end: Vec2, thickness: f32) -> Option<(ShapeDescriptor, Vec2, f32)> {
    let d = end - start;
    let length = d.length();
    if below(length, MIN_SHAPE_SIZE) {
        return None;
    }
    let shape = ShapeDescriptor::Rectangle {
        width: length,
        height: thickness,
    };
    Some((shape, (start + end) * 0.5, d.y.atan2(d.x)))
}

/// Body produced by a drawing tool dragged from `start` to `end`.
///
/// Returns `None` when the drag is below the minimum size.
pub fn body_from_drag(
    scene: &mut Scene,
    tool: BodyTool,
    start: Vec2,
    end: Vec2,
    polygon_sides: u32,
    settings: &SimSettings,
) -> Option<BodySnapshot> {
    let defaults = &settings.defaults;
    let material = defaults.material;
    let density = defaults.density;
    let d = end - start;

    let (shape, center, angle, is_static, material) = match tool {
        BodyTool::Circle => {
            let radius = d.length();
            if below(radius, MIN_SHAPE_SIZE) {
                return None;
            }
            (ShapeDescriptor::Circle { radius }, start, 0.0, false, material)
        }
        BodyTool::Rectangle => {
            let size = d.abs();
            if below(size.x, MIN_SHAPE_SIZE) || below(size.y, MIN_SHAPE_SIZE) {
                return None;
            }
            let shape = ShapeDescriptor::Rectangle {
                width: size.x,
                height: size.y,
            };
            (shape, (start + end) * 0.5, 0.0, false, material)
        }
        BodyTool::Polygon => {
            let radius = d.length();
            if below(radius, MIN_SHAPE_SIZE) {
                return None;
            }
            let shape = ShapeDescriptor::Polygon {
                sides: polygon_sides,
                radius,
            }
            .clamped();
            (shape, start, 0.0, false, material)
        }
        BodyTool::Wall => {
            let (shape, center, angle) = bar(start, end, WALL_THICKNESS)?;
            (shape, center, angle, true, material)
        }
        BodyTool::Slope => {
            let (shape, center, angle) = bar(start, end, SLOPE_THICKNESS)?;
            let slick = Material {
                friction: 0.05,
                ..material
            };
            (shape, center, angle, true, slick)
        }
        BodyTool::Conveyor => {
            let (shape, center, angle) = bar(start, end, CONVEYOR_THICKNESS)?;
            let belt = Material {
                friction: 0.9,
                ..material
            };
            (shape, center, angle, true, belt)
        }
        BodyTool::Track => {
            let (shape, center, angle) = bar(start, end, TRACK_THICKNESS)?;
            let rail = Material {
                restitution: 0.0,
                friction: 0.0,
            };
            (shape, center, angle, true, rail)
        }
    };

    let mut snap = body_snapshot(scene, shape, center, angle, is_static, density, material);
    match tool {
        BodyTool::Wall => snap.meta.label = format!("Wall {}", snap.id.0),
        BodyTool::Slope => snap.meta.label = format!("Slope {}", snap.id.0),
        BodyTool::Track => snap.meta.label = format!("Track {}", snap.id.0),
        BodyTool::Conveyor => {
            snap.meta.label = format!("Conveyor {}", snap.id.0);
            snap.meta.conveyor = Some(ConveyorMeta::default());
        }
        BodyTool::Circle | BodyTool::Rectangle | BodyTool::Polygon => {}
    }
    Some(snap)
}

/// Field region produced by a field tool drag, `None` below minimum size.
pub fn field_from_drag(
    scene: &mut Scene,
    magnetic: bool,
    shape: FieldShapeKind,
    start: Vec2,
    end: Vec2,
) -> Option<FieldRegion> {
    let shape = match shape {
        FieldShapeKind::Rect => {
            let size = (end - start).abs();
            if below(size.x, MIN_SHAPE_SIZE) || below(size.y, MIN_SHAPE_SIZE) {
                return None;
            }
            FieldShape::Rect {
                center: (start + end) * 0.5,
                width: size.x,
                height: size.y,
            }
        }
        FieldShapeKind::Circle => {
            let radius = start.distance(end);
            if below(radius, MIN_SHAPE_SIZE) {
                return None;
            }
            FieldShape::Circle {
                center: start,
                radius,
            }
        }
    };
    let kind = if magnetic {
        FieldKind::Magnetic { strength: 1.0 }
    } else {
        FieldKind::Electric {
            magnitude: 5.0,
            direction_rad: 0.0,
        }
    };
    Some(FieldRegion {
        id: scene.allocate_field_id(),
        kind,
        shape,
    })
}

/// One end of a constraint being drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoint {
    pub body: Option<BodyId>,
    /// World position of the attachment point.
    pub world: Vec2,
}

impl Endpoint {
    /// Anchor as stored in a snapshot: local to the body, else the world point.
    fn anchor(&self, scene: &Scene) -> Option<Vec2> {
        match self.body {
            Some(id) => {
                let center = scene.body_position(id)?;
                let angle = scene.body_angle(id)?;
                Some(shape::to_local(center, angle, self.world))
            }
            None => Some(self.world),
        }
    }
}

/// Snapshots a constraint-drawing gesture commits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintPlan {
    /// Rope segments, empty for direct constraints.
    pub bodies: Vec<BodySnapshot>,
    pub constraints: Vec<ConstraintSnapshot>,
}

/// A direct constraint between two endpoints.
///
/// Axis springs are only kept when exactly one end is attached to a body.
pub fn direct_constraint(
    scene: &mut Scene,
    kind: ConstraintKind,
    spring_mode: SpringMode,
    a: Endpoint,
    b: Endpoint,
    settings: &SimSettings,
) -> Option<ConstraintSnapshot> {
    let length = a.world.distance(b.world);
    if below(length, MIN_CONSTRAINT_DISTANCE) {
        return None;
    }
    let point_a = a.anchor(scene)?;
    let point_b = b.anchor(scene)?;
    let id = scene.allocate_constraint_id();
    let mut meta = ConstraintMeta::new(id, kind, length);
    if kind == ConstraintKind::Spring {
        meta.stiffness = settings.defaults.spring_stiffness;
        meta.damping = settings.defaults.spring_damping;
        let attached = usize::from(a.body.is_some()) + usize::from(b.body.is_some());
        if spring_mode == SpringMode::Axis && attached == 1 {
            meta.mode = SpringMode::Axis;
            let (anchor, body) = if a.body.is_some() { (b.world, a.world) } else { (a.world, b.world) };
            let d = body - anchor;
            meta.axis_angle_rad = Some(d.y.atan2(d.x));
        }
    }
    Some(ConstraintSnapshot {
        id,
        stiffness: meta.stiffness,
        damping: meta.damping,
        length,
        meta,
        body_a: a.body,
        body_b: b.body,
        point_a,
        point_b,
    })
}

/// A chain of small circle bodies linked end to end, all in one rope group.
///
/// The chain has [`rope_segment_count`] segment bodies evenly spaced between
/// the endpoints and one more link than segments.
pub fn rope_chain(
    scene: &mut Scene,
    kind: ConstraintKind,
    a: Endpoint,
    b: Endpoint,
    settings: &SimSettings,
) -> Option<ConstraintPlan> {
    let distance = a.world.distance(b.world);
    if below(distance, MIN_CONSTRAINT_DISTANCE) {
        return None;
    }
    let point_a = a.anchor(scene)?;
    let point_b = b.anchor(scene)?;
    let group = scene.allocate_rope_group();
    let n = rope_segment_count(distance);
    #[allow(clippy::cast_precision_loss)]
    let spacing = distance / (n + 1) as f32;

    let mut plan = ConstraintPlan::default();
    for i in 1..=n {
        #[allow(clippy::cast_precision_loss)]
        let t = i as f32 / (n + 1) as f32;
        let mut segment = body_snapshot(
            scene,
            ShapeDescriptor::Circle {
                radius: ROPE_SEGMENT_RADIUS,
            },
            a.world.lerp(b.world, t),
            0.0,
            false,
            ROPE_SEGMENT_DENSITY,
            settings.defaults.material,
        );
        segment.meta.label = format!("Rope segment {i}");
        segment.meta.rope_group = Some(group);
        plan.bodies.push(segment);
    }

    let mut ends: Vec<(Option<BodyId>, Vec2)> = Vec::with_capacity(n + 2);
    ends.push((a.body, point_a));
    ends.extend(plan.bodies.iter().map(|s| (Some(s.id), Vec2::ZERO)));
    ends.push((b.body, point_b));

    for pair in ends.windows(2) {
        let (body_a, point_a) = pair[0];
        let (body_b, point_b) = pair[1];
        let id = scene.allocate_constraint_id();
        let mut meta = ConstraintMeta::new(id, kind, spacing);
        meta.rope_group = Some(group);
        plan.constraints.push(ConstraintSnapshot {
            id,
            stiffness: meta.stiffness,
            damping: meta.damping,
            length: spacing,
            meta,
            body_a,
            body_b,
            point_a,
            point_b,
        });
    }
    Some(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rope_segment_count_is_clamped() {
        assert_eq!(rope_segment_count(0.0), ROPE_MIN_SEGMENTS);
        assert_eq!(rope_segment_count(300.0), 6);
        assert_eq!(rope_segment_count(600.0), 10);
        assert_eq!(rope_segment_count(659.0), 10);
        assert_eq!(rope_segment_count(5000.0), ROPE_MAX_SEGMENTS);
        assert_eq!(rope_segment_count(f32::NAN), ROPE_MIN_SEGMENTS);
    }

    #[test]
    fn test_small_drags_create_nothing() {
        let mut scene = Scene::new();
        let settings = SimSettings::default();
        let p = Vec2::new(10.0, 10.0);
        for tool in [BodyTool::Circle, BodyTool::Rectangle, BodyTool::Polygon, BodyTool::Wall] {
            assert!(body_from_drag(&mut scene, tool, p, p + Vec2::splat(1.0), 5, &settings).is_none());
        }
        assert!(field_from_drag(&mut scene, false, FieldShapeKind::Rect, p, p).is_none());
    }

    #[test]
    fn test_wall_is_static_bar_along_drag() {
        let mut scene = Scene::new();
        let settings = SimSettings::default();
        let snap = body_from_drag(
            &mut scene,
            BodyTool::Wall,
            Vec2::ZERO,
            Vec2::new(0.0, 100.0),
            3,
            &settings,
        )
        .unwrap();
        assert!(snap.is_static);
        assert_eq!(snap.position, Vec2::new(0.0, 50.0));
        assert!((snap.angle - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
        assert_eq!(
            snap.shape,
            ShapeDescriptor::Rectangle {
                width: 100.0,
                height: WALL_THICKNESS
            }
        );
    }

    #[test]
    fn test_conveyor_carries_metadata() {
        let mut scene = Scene::new();
        let snap = body_from_drag(
            &mut scene,
            BodyTool::Conveyor,
            Vec2::ZERO,
            Vec2::new(200.0, 0.0),
            3,
            &SimSettings::default(),
        )
        .unwrap();
        assert!(snap.meta.conveyor.is_some_and(|c| c.enabled));
    }

    #[test]
    fn test_rope_chain_between_points() {
        let mut scene = Scene::new();
        let plan = rope_chain(
            &mut scene,
            ConstraintKind::Rope,
            Endpoint {
                body: None,
                world: Vec2::ZERO,
            },
            Endpoint {
                body: None,
                world: Vec2::new(300.0, 0.0),
            },
            &SimSettings::default(),
        )
        .unwrap();
        assert_eq!(plan.bodies.len(), 6);
        assert_eq!(plan.constraints.len(), 7);
        let group = plan.bodies[0].meta.rope_group;
        assert!(group.is_some());
        assert!(plan.constraints.iter().all(|c| c.meta.rope_group == group));
        assert!(plan.constraints.iter().all(|c| (c.length - 300.0 / 7.0).abs() < 1e-4));
    }

    #[test]
    fn test_axis_spring_needs_single_body() {
        let mut scene = Scene::new();
        let settings = SimSettings::default();
        let free = Endpoint {
            body: None,
            world: Vec2::ZERO,
        };
        let far = Endpoint {
            body: None,
            world: Vec2::new(0.0, 100.0),
        };
        let spring =
            direct_constraint(&mut scene, ConstraintKind::Spring, SpringMode::Axis, free, far, &settings)
                .unwrap();
        // No body attached: stays a plain distance spring.
        assert_eq!(spring.meta.mode, SpringMode::Distance);
        assert!(direct_constraint(
            &mut scene,
            ConstraintKind::Rod,
            SpringMode::Distance,
            free,
            Endpoint {
                body: None,
                world: Vec2::new(5.0, 0.0)
            },
            &settings
        )
        .is_none());
    }
}
