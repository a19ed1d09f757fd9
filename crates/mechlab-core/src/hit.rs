//! Hit testing of the scene under the pointer.
//!
//! Tolerances are given in screen pixels and converted with the camera zoom,
//! so handles stay equally easy to grab at every zoom level.

use glam::Vec2;

use crate::meta::{BodyId, ConstraintId, FieldId};
use crate::scene::Scene;
use crate::selection::{SelectedEntity, Selection};
use crate::shape;

/// Grab radius of editing handles (screen px).
pub const HANDLE_TOLERANCE_PX: f32 = 8.0;
/// Distance within which a constraint segment is hit (screen px).
pub const CONSTRAINT_TOLERANCE_PX: f32 = 6.0;
/// Distance of the rotate and move handles beyond the shape (screen px).
pub const HANDLE_OFFSET_PX: f32 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyHandle {
    Resize,
    Rotate,
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldHandle {
    Move,
    Resize,
}

/// Which end of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSide {
    A,
    B,
}

/// Result of the select tool's hit test, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    BodyHandle(BodyId, BodyHandle),
    ConstraintEndpoint(ConstraintId, EndpointSide),
    FieldHandle(FieldId, FieldHandle),
    Body(BodyId),
    Constraint(ConstraintId),
    Field(FieldId),
    Empty,
}

/// Calculate distance from a point to a line segment.
pub fn point_to_segment_distance(point: Vec2, seg_start: Vec2, seg_end: Vec2) -> f32 {
    let line = seg_end - seg_start;
    let len_sq = line.length_squared();
    if len_sq < 0.0001 {
        return point.distance(seg_start);
    }
    let t = ((point - seg_start).dot(line) / len_sq).clamp(0.0, 1.0);
    let closest = seg_start + t * line;
    point.distance(closest)
}

/// Check if a point is inside the axis-aligned rectangle spanned by two corners.
pub fn point_in_rect(point: Vec2, corner_a: Vec2, corner_b: Vec2) -> bool {
    let min = corner_a.min(corner_b);
    let max = corner_a.max(corner_b);
    point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
}

/// World positions of a body's editing handles.
pub fn body_handle_positions(scene: &Scene, id: BodyId, zoom: f32) -> Option<[(BodyHandle, Vec2); 3]> {
    let shape = scene.body_shape(id)?;
    let center = scene.body_position(id)?;
    let angle = scene.body_angle(id)?;
    let reach = shape.half_extents().y + HANDLE_OFFSET_PX / zoom;
    Some([
        (
            BodyHandle::Resize,
            shape::to_world(center, angle, shape.resize_handle_local()),
        ),
        (
            BodyHandle::Rotate,
            shape::to_world(center, angle, Vec2::new(0.0, -reach)),
        ),
        (
            BodyHandle::Move,
            shape::to_world(center, angle, Vec2::new(0.0, reach)),
        ),
    ])
}

fn hit_body_handle(scene: &Scene, selection: &Selection, point: Vec2, zoom: f32) -> Option<Hit> {
    let SelectedEntity::Body(id) = selection.primary else {
        return None;
    };
    let tolerance = HANDLE_TOLERANCE_PX / zoom;
    body_handle_positions(scene, id, zoom)?
        .into_iter()
        .find(|(_, pos)| pos.distance(point) <= tolerance)
        .map(|(handle, _)| Hit::BodyHandle(id, handle))
}

fn hit_constraint_endpoint(scene: &Scene, selection: &Selection, point: Vec2, zoom: f32) -> Option<Hit> {
    let SelectedEntity::Constraint(id) = selection.primary else {
        return None;
    };
    let (a, b) = scene.constraint_endpoints(id)?;
    let tolerance = HANDLE_TOLERANCE_PX / zoom;
    let (da, db) = (a.distance(point), b.distance(point));
    if da <= tolerance && da <= db {
        Some(Hit::ConstraintEndpoint(id, EndpointSide::A))
    } else if db <= tolerance {
        Some(Hit::ConstraintEndpoint(id, EndpointSide::B))
    } else {
        None
    }
}

fn hit_field_handle(scene: &Scene, selection: &Selection, point: Vec2, zoom: f32) -> Option<Hit> {
    let SelectedEntity::Field(id) = selection.primary else {
        return None;
    };
    let field = scene.field(id)?;
    let tolerance = HANDLE_TOLERANCE_PX / zoom;
    if field.shape.resize_handle().distance(point) <= tolerance {
        Some(Hit::FieldHandle(id, FieldHandle::Resize))
    } else if field.shape.center().distance(point) <= tolerance {
        Some(Hit::FieldHandle(id, FieldHandle::Move))
    } else {
        None
    }
}

/// Topmost body containing the point.
pub fn body_at(scene: &Scene, point: Vec2) -> Option<BodyId> {
    scene.body_ids().into_iter().rev().find(|id| {
        let (Some(shape), Some(center), Some(angle)) = (
            scene.body_shape(*id),
            scene.body_position(*id),
            scene.body_angle(*id),
        ) else {
            return false;
        };
        shape.contains_point(center, angle, point)
    })
}

/// Constraint whose segment passes nearest the point, within tolerance.
pub fn constraint_at(scene: &Scene, point: Vec2, zoom: f32) -> Option<ConstraintId> {
    let tolerance = CONSTRAINT_TOLERANCE_PX / zoom;
    scene
        .constraint_ids()
        .into_iter()
        .filter_map(|id| {
            let (a, b) = scene.constraint_endpoints(id)?;
            let d = point_to_segment_distance(point, a, b);
            (d <= tolerance).then_some((id, d))
        })
        .min_by(|x, y| x.1.total_cmp(&y.1))
        .map(|(id, _)| id)
}

/// Topmost field region containing the point.
pub fn field_at(scene: &Scene, point: Vec2) -> Option<FieldId> {
    scene
        .fields()
        .iter()
        .rev()
        .find(|f| f.contains(point))
        .map(|f| f.id)
}

/// Full select-tool hit test in priority order: selection handles,
/// constraint endpoint handles, field handles, bodies, constraints, fields.
pub fn hit_test(scene: &Scene, selection: &Selection, point: Vec2, zoom: f32) -> Hit {
    hit_body_handle(scene, selection, point, zoom)
        .or_else(|| hit_constraint_endpoint(scene, selection, point, zoom))
        .or_else(|| hit_field_handle(scene, selection, point, zoom))
        .or_else(|| body_at(scene, point).map(Hit::Body))
        .or_else(|| constraint_at(scene, point, zoom).map(Hit::Constraint))
        .or_else(|| field_at(scene, point).map(Hit::Field))
        .unwrap_or(Hit::Empty)
}

/// Bodies whose center lies in the rectangle spanned by two corners.
pub fn bodies_in_rect(scene: &Scene, corner_a: Vec2, corner_b: Vec2) -> Vec<BodyId> {
    scene
        .body_ids()
        .into_iter()
        .filter(|id| {
            scene
                .body_position(*id)
                .is_some_and(|p| point_in_rect(p, corner_a, corner_b))
        })
        .collect()
}
