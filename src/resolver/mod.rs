//! Relation resolution.
//!
//! Blueprints declare relations from one side only. The resolver validates
//! those declarations, drops the ones pointing at entities that do not exist,
//! and pairs up reciprocal declarations so each side learns the other side's
//! field name. The resolver is pure and deterministic - loading the blueprint
//! happens before, rendering happens after.

pub mod encode;
pub mod errors;
pub mod resolve;

pub use errors::RelationDiagnostic;
pub use resolve::{apply_inverse_fields, resolve_relations};

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::core::blueprint::{OnDelete, RelationKind};

/// Key of a resolved relation: the declaring entity and its target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationKey {
    pub owner: String,
    pub target: String,
}

impl RelationKey {
    pub fn new(owner: impl Into<String>, target: impl Into<String>) -> Self {
        RelationKey {
            owner: owner.into(),
            target: target.into(),
        }
    }

    /// The key of the reverse direction.
    pub fn reversed(&self) -> RelationKey {
        RelationKey {
            owner: self.target.clone(),
            target: self.owner.clone(),
        }
    }

    /// Whether the relation points back at its own entity.
    pub fn is_self(&self) -> bool {
        self.owner == self.target
    }
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.owner, self.target)
    }
}

/// A validated relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRelation {
    /// Target entity; always one of the blueprint's entity names.
    #[serde(rename = "model")]
    pub target: String,

    #[serde(rename = "type")]
    pub kind: RelationKind,

    pub field: String,

    #[serde(rename = "onDelete")]
    pub on_delete: OnDelete,

    /// Field name of the reciprocal declaration, when there is one.
    #[serde(rename = "inverseField", skip_serializing_if = "Option::is_none")]
    pub inverse_field: Option<String>,
}

/// Resolved relations keyed by `(owner, target)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationMap {
    relations: BTreeMap<RelationKey, ResolvedRelation>,
}

impl RelationMap {
    pub fn new() -> Self {
        RelationMap::default()
    }

    /// Insert a relation, returning the one it replaced.
    pub fn insert(
        &mut self,
        key: RelationKey,
        relation: ResolvedRelation,
    ) -> Option<ResolvedRelation> {
        self.relations.insert(key, relation)
    }

    /// Look up the relation declared by `owner` towards `target`.
    pub fn get(&self, owner: &str, target: &str) -> Option<&ResolvedRelation> {
        self.relations.get(&RelationKey::new(owner, target))
    }

    pub fn get_key(&self, key: &RelationKey) -> Option<&ResolvedRelation> {
        self.relations.get(key)
    }

    pub fn contains(&self, owner: &str, target: &str) -> bool {
        self.get(owner, target).is_some()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Iterate relations in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&RelationKey, &ResolvedRelation)> {
        self.relations.iter()
    }

    /// Relations declared by a single entity.
    pub fn owned_by<'a>(
        &'a self,
        owner: &'a str,
    ) -> impl Iterator<Item = (&'a RelationKey, &'a ResolvedRelation)> + 'a {
        self.relations.iter().filter(move |(k, _)| k.owner == owner)
    }

    /// Number of relations that found their reciprocal.
    pub fn bidirectional_count(&self) -> usize {
        self.relations
            .values()
            .filter(|r| r.inverse_field.is_some())
            .count()
    }
}

/// Output of [`resolve_relations`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Surviving relations.
    pub relations: RelationMap,

    /// Everything skipped or replaced, in declaration order.
    pub diagnostics: Vec<RelationDiagnostic>,
}

impl Resolution {
    /// Number of declarations that were dropped.
    pub fn dropped_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_dropped()).count()
    }
}
