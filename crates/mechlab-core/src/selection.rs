//! Current selection: one primary entity plus an ordered body multi-select.

use serde::{Deserialize, Serialize};

use crate::meta::{BodyId, ConstraintId, FieldId};
use crate::scene::Scene;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum SelectedEntity {
    #[default]
    None,
    Body(BodyId),
    Field(FieldId),
    Constraint(ConstraintId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub primary: SelectedEntity,
    /// Selected bodies in selection order.
    pub bodies: Vec<BodyId>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.primary == SelectedEntity::None && self.bodies.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn contains_body(&self, id: BodyId) -> bool {
        self.bodies.contains(&id)
    }

    pub fn select_body(&mut self, id: BodyId) {
        self.primary = SelectedEntity::Body(id);
        self.bodies = vec![id];
    }

    /// Adds or removes a body from the multi-select.
    pub fn toggle_body(&mut self, id: BodyId) {
        if let Some(index) = self.bodies.iter().position(|b| *b == id) {
            self.bodies.remove(index);
            if self.primary == SelectedEntity::Body(id) {
                self.primary = self
                    .bodies
                    .last()
                    .map_or(SelectedEntity::None, |b| SelectedEntity::Body(*b));
            }
        } else {
            self.bodies.push(id);
            self.primary = SelectedEntity::Body(id);
        }
    }

    pub fn select_field(&mut self, id: FieldId) {
        self.primary = SelectedEntity::Field(id);
        self.bodies.clear();
    }

    pub fn select_constraint(&mut self, id: ConstraintId) {
        self.primary = SelectedEntity::Constraint(id);
        self.bodies.clear();
    }

    /// Replaces the body selection, or unions with it when `additive`.
    pub fn set_bodies(&mut self, ids: &[BodyId], additive: bool) {
        if additive {
            for id in ids {
                if !self.bodies.contains(id) {
                    self.bodies.push(*id);
                }
            }
            if let Some(last) = ids.last() {
                self.primary = SelectedEntity::Body(*last);
            }
        } else {
            self.bodies = ids.to_vec();
            self.primary = ids
                .last()
                .map_or(SelectedEntity::None, |b| SelectedEntity::Body(*b));
        }
    }

    /// Bodies a move gesture acts on; falls back to the primary body.
    pub fn movable_bodies(&self) -> Vec<BodyId> {
        match self.primary {
            SelectedEntity::Body(id) if !self.bodies.contains(&id) => {
                let mut bodies = self.bodies.clone();
                bodies.push(id);
                bodies
            }
            _ => self.bodies.clone(),
        }
    }

    /// Drops ids whose entity is gone and returns the resolved primary.
    pub fn resolve(&mut self, scene: &Scene) -> SelectedEntity {
        self.bodies.retain(|id| scene.contains_body(*id));
        let alive = match self.primary {
            SelectedEntity::None => true,
            SelectedEntity::Body(id) => scene.contains_body(id),
            SelectedEntity::Field(id) => scene.field(id).is_some(),
            SelectedEntity::Constraint(id) => scene.contains_constraint(id),
        };
        if !alive {
            self.primary = self
                .bodies
                .last()
                .map_or(SelectedEntity::None, |b| SelectedEntity::Body(*b));
        }
        self.primary
    }
}
