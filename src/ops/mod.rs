//! High-level operations.
//!
//! This module contains the implementation of Keel commands.

pub mod check;
pub mod relations;
pub mod validate;

pub use check::{check_batch, check_project, validate_syntactic, CheckOptions, SyntacticReport};
pub use relations::{resolve_blueprint, resolve_blueprint_file, write_enriched, RelationsReport};
pub use validate::{
    format_result, validate_runtime, validate_runtime_with, ValidateOptions, ValidationResult,
};
