//! Error types for the fallible surfaces: settings and scene payloads.
//!
//! Editing and stepping never fail; they resolve stale lookups to `None`.

use crate::meta::{BodyId, ConstraintId};

/// Error type for simulation settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: f32 },
}

/// Error type for scene payload import.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("invalid scene payload: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate id {0} in payload")]
    DuplicateId(u64),
    #[error("{constraint} references unknown {body}")]
    UnknownBody {
        constraint: ConstraintId,
        body: BodyId,
    },
    #[error(transparent)]
    Settings(#[from] ConfigError),
}
