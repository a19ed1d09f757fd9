//! Mechlab Core Library
//!
//! Editing and simulation-extension core of a 2D mechanics and
//! electromagnetism sandbox, built on `Rapier2D`.
//!
//! - Bodies live in the engine; stable ids and domain metadata (charge,
//!   conveyor, sensor, constraint kind) live in side tables keyed by id.
//! - Electric, magnetic and Coulomb forces, tension-only ropes and
//!   axis-locked springs are applied around each engine step.
//! - A pointer-driven interaction machine turns gestures into reversible
//!   scene edits recorded in an undo/redo history.
//!
//! [`Session`] owns everything and is driven once per display frame.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod camera;
pub mod config;
pub mod constraints;
pub mod contacts;
pub mod diagnostics;
pub mod editor;
pub mod em;
pub mod error;
pub mod field;
pub mod history;
pub mod hit;
pub mod interaction;
pub mod library;
pub mod meta;
pub mod physics;
pub mod scene;
pub mod selection;
pub mod session;
pub mod shape;
pub mod snap;
pub mod spawn;
pub mod units;

pub use config::{GridSettings, SimSettings};
pub use editor::{Editor, SceneEdit, Tool, ToolOptions};
pub use em::{EmSettings, ForceBreakdown};
pub use error::{ConfigError, SceneError};
pub use field::{FieldKind, FieldRegion, FieldShape};
pub use history::{History, Reversible};
pub use interaction::{Interaction, Measurement, PointerButton, PointerEvent, PointerPhase};
pub use library::{Lab, ScenePayload};
pub use meta::{BodyId, BodyMeta, ConstraintId, ConstraintKind, ConstraintMeta, FieldId, RopeGroupId, SpringMode};
pub use physics::{PhysicsWorld, default_gravity};
pub use scene::{BodySnapshot, ConstraintSnapshot, Scene, SceneDelta, SceneSnapshot};
pub use selection::{SelectedEntity, Selection};
pub use session::{Session, SessionView};
pub use shape::ShapeDescriptor;
