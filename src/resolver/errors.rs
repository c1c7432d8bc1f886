//! Relation resolution diagnostics.
//!
//! None of these abort resolution. Each one describes a declaration that was
//! dropped (or replaced) so generation can carry on with the rest.

use thiserror::Error;

use crate::util::diagnostic::Diagnostic;

/// A problem found while resolving relations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelationDiagnostic {
    #[error("invalid relation format on `{owner}` (#{index}): missing `{missing}`")]
    MissingKey {
        owner: String,
        /// Position of the declaration within the owner's relation list.
        index: usize,
        missing: &'static str,
    },

    #[error("invalid relation type on `{owner}` -> `{target}`: `{kind}`")]
    InvalidKind {
        owner: String,
        target: String,
        kind: String,
    },

    #[error("invalid onDelete on `{owner}` -> `{target}`: `{on_delete}`")]
    InvalidOnDelete {
        owner: String,
        target: String,
        on_delete: String,
    },

    #[error("duplicate relation `{owner}` -> `{target}`: `{kept}` replaces `{replaced}`")]
    Duplicate {
        owner: String,
        target: String,
        kept: String,
        replaced: String,
    },

    #[error("removing invalid relation: {owner} -> {target} (module '{target}' not found)")]
    UnknownTarget { owner: String, target: String },
}

impl RelationDiagnostic {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            RelationDiagnostic::MissingKey { owner, missing, .. } => {
                Diagnostic::error(self.to_string())
                    .with_context("the relation was skipped")
                    .with_suggestion(format!(
                        "Add `{}` to the relation in module `{}`",
                        missing, owner
                    ))
            }

            RelationDiagnostic::InvalidKind { .. } => Diagnostic::error(self.to_string())
                .with_context("the relation was skipped")
                .with_suggestion("Use one of OneToOne, OneToMany, ManyToOne, ManyToMany"),

            RelationDiagnostic::InvalidOnDelete { .. } => Diagnostic::error(self.to_string())
                .with_context("the relation was skipped")
                .with_suggestion("Use one of CASCADE, SET NULL, RESTRICT, NO ACTION, SET DEFAULT"),

            RelationDiagnostic::Duplicate { owner, target, .. } => {
                Diagnostic::warning(self.to_string()).with_suggestion(format!(
                    "Keep a single relation from `{}` to `{}`",
                    owner, target
                ))
            }

            RelationDiagnostic::UnknownTarget { target, .. } => {
                Diagnostic::warning(self.to_string())
                    .with_suggestion(format!("Add a module named `{}`", target))
                    .with_suggestion("Or fix the `model` name in the relation")
            }
        }
    }

    /// Whether this diagnostic means a declaration was dropped.
    pub fn is_dropped(&self) -> bool {
        !matches!(self, RelationDiagnostic::Duplicate { .. })
    }
}
