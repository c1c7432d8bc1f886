//! Keel - relation resolution and validation for generated backends
//!
//! This crate provides the core library functionality for Keel: resolving
//! the relations declared in an entity blueprint, and validating that a
//! generated backend installs, builds, boots and answers HTTP requests.

pub mod core;
pub mod ops;
pub mod resolver;
pub mod util;

pub use core::blueprint::{Blueprint, EntityDefinition, RelationDeclaration};
pub use ops::validate::{validate_runtime, ValidationError, ValidationResult};
pub use resolver::{resolve_relations, RelationMap, ResolvedRelation};
pub use util::context::GlobalContext;
