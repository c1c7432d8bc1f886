//! Blueprint YAML schema.
//!
//! A blueprint describes a root application and the entity modules it
//! contains. Relations are declared one-directionally by whoever wrote the
//! blueprint (a human or a generator), so nothing in here is trusted: the
//! relation fields stay optional and are validated by the resolver.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use miette::{Diagnostic as MietteDiagnostic, NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Conventional blueprint file name.
pub const BLUEPRINT_NAME: &str = "blueprint.yaml";

/// Errors produced while loading a blueprint.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum BlueprintError {
    #[error("failed to read blueprint {path}")]
    #[diagnostic(code(keel::blueprint::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid blueprint YAML: {message}")]
    #[diagnostic(
        code(keel::blueprint::parse),
        help("Blueprints need a `modules` list; each module needs a `name`")
    )]
    Parse {
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("here")]
        span: Option<SourceSpan>,
    },
}

/// A parsed blueprint document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blueprint {
    /// Root application settings, passed through untouched to templates.
    #[serde(default)]
    pub root: BTreeMap<String, serde_yaml::Value>,

    /// Entity modules in declaration order.
    #[serde(default)]
    pub modules: Vec<EntityDefinition>,
}

impl Blueprint {
    /// Load a blueprint from a YAML file.
    pub fn load(path: &Path) -> Result<Self, BlueprintError> {
        let content = std::fs::read_to_string(path).map_err(|source| BlueprintError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::parse(&content, &path.display().to_string())
    }

    /// Parse blueprint content. `name` is only used for error reporting.
    pub fn parse(content: &str, name: &str) -> Result<Self, BlueprintError> {
        // An empty document is a blueprint with no modules.
        if content.trim().is_empty() {
            return Ok(Blueprint::default());
        }

        serde_yaml::from_str(content).map_err(|e| {
            let span = e
                .location()
                .map(|loc| SourceSpan::from((loc.index(), 1)));
            BlueprintError::Parse {
                message: e.to_string(),
                src: NamedSource::new(name, content.to_string()),
                span,
            }
        })
    }

    /// Names of all modules, in declaration order.
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }
}

/// One entity module of a blueprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Module name, unique within a blueprint.
    pub name: String,

    /// Entity schema: relations plus whatever else the templates consume.
    #[serde(default)]
    pub entity: EntitySchema,

    /// Which files to generate for this module (controller, service, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generate: Vec<String>,

    #[serde(default, rename = "authProtected")]
    pub auth_protected: bool,
}

impl EntityDefinition {
    /// Create an entity with no relations.
    pub fn new(name: impl Into<String>) -> Self {
        EntityDefinition {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a relation declaration.
    pub fn with_relation(mut self, relation: RelationDeclaration) -> Self {
        self.entity.relations.push(relation);
        self
    }

    /// Declared relations, in declaration order.
    pub fn relations(&self) -> &[RelationDeclaration] {
        &self.entity.relations
    }
}

/// The `entity` block of a module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    #[serde(default)]
    pub relations: Vec<RelationDeclaration>,

    /// Fields, table options and anything else not interpreted here.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A relation as authored. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDeclaration {
    /// Target entity name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Relation kind as written (`OneToMany`, ...).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Property name on the owning entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, rename = "onDelete", skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,

    /// Filled in after resolution when the target declares the reverse side.
    #[serde(default, rename = "inverseField", skip_serializing_if = "Option::is_none")]
    pub inverse_field: Option<String>,
}

impl RelationDeclaration {
    /// Create a complete declaration with the default `onDelete`.
    pub fn new(
        model: impl Into<String>,
        kind: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        RelationDeclaration {
            model: Some(model.into()),
            kind: Some(kind.into()),
            field: Some(field.into()),
            on_delete: None,
            inverse_field: None,
        }
    }

    /// Set the `onDelete` behavior.
    pub fn on_delete(mut self, on_delete: impl Into<String>) -> Self {
        self.on_delete = Some(on_delete.into());
        self
    }
}

/// Cardinality of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::OneToOne => "OneToOne",
            RelationKind::OneToMany => "OneToMany",
            RelationKind::ManyToOne => "ManyToOne",
            RelationKind::ManyToMany => "ManyToMany",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = RelationKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "onetoone" => Ok(RelationKind::OneToOne),
            "onetomany" => Ok(RelationKind::OneToMany),
            "manytoone" => Ok(RelationKind::ManyToOne),
            "manytomany" => Ok(RelationKind::ManyToMany),
            _ => Err(RelationKindParseError(s.to_string())),
        }
    }
}

/// Error parsing a relation kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid relation type '{0}', valid values: OneToOne, OneToMany, ManyToOne, ManyToMany")]
pub struct RelationKindParseError(pub String);

/// Referential action when the target row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OnDelete {
    #[default]
    #[serde(rename = "CASCADE")]
    Cascade,
    #[serde(rename = "SET NULL")]
    SetNull,
    #[serde(rename = "RESTRICT")]
    Restrict,
    #[serde(rename = "NO ACTION")]
    NoAction,
    #[serde(rename = "SET DEFAULT")]
    SetDefault,
}

impl OnDelete {
    /// The SQL spelling, as TypeORM expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::Restrict => "RESTRICT",
            OnDelete::NoAction => "NO ACTION",
            OnDelete::SetDefault => "SET DEFAULT",
        }
    }
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnDelete {
    type Err = OnDeleteParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('_', " ").as_str() {
            "CASCADE" => Ok(OnDelete::Cascade),
            "SET NULL" => Ok(OnDelete::SetNull),
            "RESTRICT" => Ok(OnDelete::Restrict),
            "NO ACTION" => Ok(OnDelete::NoAction),
            "SET DEFAULT" | "DEFAULT" => Ok(OnDelete::SetDefault),
            _ => Err(OnDeleteParseError(s.to_string())),
        }
    }
}

/// Error parsing an `onDelete` value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid onDelete '{0}', valid values: CASCADE, SET NULL, RESTRICT, NO ACTION, SET DEFAULT")]
pub struct OnDeleteParseError(pub String);
