//! Core data structures for Keel.
//!
//! The blueprint is the input of everything else: modules, their entity
//! schemas and the relations between them, as authored.

pub mod blueprint;

pub use blueprint::{
    Blueprint, BlueprintError, EntityDefinition, EntitySchema, OnDelete, RelationDeclaration,
    RelationKind, BLUEPRINT_NAME,
};
