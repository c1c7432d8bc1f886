//! Resolve the relations of a blueprint.
//!
//! Loads the blueprint, runs the resolver over its modules and carries the
//! inverse fields back onto the declarations. The enriched blueprint is what
//! the generator consumes; the report is what `keel relations` prints.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Serialize, Serializer};

use crate::core::blueprint::Blueprint;
use crate::resolver::{apply_inverse_fields, resolve_relations, RelationDiagnostic, RelationMap};
use crate::util::fs::write_string;

/// Outcome of resolving one blueprint.
#[derive(Debug, Clone, Serialize)]
pub struct RelationsReport {
    pub blueprint: PathBuf,

    /// Module names in declaration order
    pub entities: Vec<String>,

    pub relations: RelationMap,

    pub bidirectional: usize,
    pub dropped: usize,

    /// Declarations that received an inverse field
    pub applied: usize,

    #[serde(serialize_with = "serialize_messages")]
    pub diagnostics: Vec<RelationDiagnostic>,

    /// Blueprint with inverse fields filled in
    #[serde(skip)]
    pub enriched: Blueprint,
}

impl RelationsReport {
    /// Whether every declaration survived resolution.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

fn serialize_messages<S>(diagnostics: &[RelationDiagnostic], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(diagnostics.iter().map(|d| d.to_string()))
}

/// Resolve a blueprint that is already in memory.
pub fn resolve_blueprint(path: &Path, mut blueprint: Blueprint) -> RelationsReport {
    let resolution = resolve_relations(&blueprint.modules);
    let applied = apply_inverse_fields(&mut blueprint.modules, &resolution.relations);

    tracing::info!(
        "{}: {} entities, {} relations ({} bidirectional)",
        path.display(),
        blueprint.modules.len(),
        resolution.relations.len(),
        resolution.relations.bidirectional_count()
    );

    RelationsReport {
        blueprint: path.to_path_buf(),
        entities: blueprint.module_names().iter().map(|s| s.to_string()).collect(),
        bidirectional: resolution.relations.bidirectional_count(),
        dropped: resolution.dropped_count(),
        applied,
        relations: resolution.relations,
        diagnostics: resolution.diagnostics,
        enriched: blueprint,
    }
}

/// Load a blueprint file and resolve its relations.
pub fn resolve_blueprint_file(path: &Path) -> Result<RelationsReport> {
    let blueprint = Blueprint::load(path)?;
    Ok(resolve_blueprint(path, blueprint))
}

/// Write the enriched blueprint as YAML.
pub fn write_enriched(report: &RelationsReport, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(&report.enriched)
        .context("failed to serialize enriched blueprint")?;
    write_string(path, &yaml)?;
    tracing::info!("Wrote enriched blueprint to {}", path.display());
    Ok(())
}

/// Human-readable report.
pub fn format_report(report: &RelationsReport, color: bool) -> String {
    let mut output = String::new();

    output.push_str(&format!("Relations: {}\n", report.blueprint.display()));
    output.push_str(&format!("{}\n\n", "=".repeat(50)));

    for entity in &report.entities {
        let owned: Vec<_> = report.relations.owned_by(entity).collect();
        if owned.is_empty() {
            output.push_str(&format!("{} (no relations)\n", entity));
            continue;
        }

        output.push_str(&format!("{}\n", entity));
        for (_, relation) in owned {
            output.push_str(&format!(
                "  {}: {} {} (onDelete: {})",
                relation.field, relation.kind, relation.target, relation.on_delete
            ));
            match relation.inverse_field {
                Some(ref inverse) => output.push_str(&format!(" <-> {}.{}\n", relation.target, inverse)),
                None => output.push('\n'),
            }
        }
    }

    if !report.diagnostics.is_empty() {
        output.push('\n');
        for diag in &report.diagnostics {
            output.push_str(&diag.to_diagnostic().format(color));
            output.push('\n');
        }
    }

    output.push_str(&format!(
        "\n{} relations, {} bidirectional, {} dropped\n",
        report.relations.len(),
        report.bidirectional,
        report.dropped
    ));

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PETCLINIC: &str = r#"
root:
  name: petclinic
modules:
  - name: Owner
    entity:
      fields:
        - name: firstName
          type: string
      relations:
        - model: Pet
          type: OneToMany
          field: pets
  - name: Pet
    entity:
      relations:
        - model: Owner
          type: ManyToOne
          field: owner
          onDelete: SET NULL
        - model: Visit
          type: OneToMany
          field: visits
  - name: Vet
"#;

    fn report() -> RelationsReport {
        let blueprint = Blueprint::parse(PETCLINIC, "blueprint.yaml").unwrap();
        resolve_blueprint(Path::new("blueprint.yaml"), blueprint)
    }

    #[test]
    fn test_report_counts() {
        let report = report();

        assert_eq!(report.entities, vec!["Owner", "Pet", "Vet"]);
        assert_eq!(report.relations.len(), 2);
        assert_eq!(report.bidirectional, 2);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.applied, 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_enriched_blueprint_has_inverse_fields() {
        let report = report();
        let pet = &report.enriched.modules[1];

        assert_eq!(pet.relations()[0].inverse_field.as_deref(), Some("pets"));
        // The dangling declaration stays as authored.
        assert_eq!(pet.relations()[1].inverse_field, None);
    }

    #[test]
    fn test_human_format() {
        let output = format_report(&report(), false);

        assert!(output.contains("Owner\n  pets: OneToMany Pet (onDelete: CASCADE) <-> Pet.owner"));
        assert!(output.contains("owner: ManyToOne Owner (onDelete: SET NULL) <-> Owner.pets"));
        assert!(output.contains("Vet (no relations)"));
        assert!(output.contains("module 'Visit' not found"));
        assert!(output.contains("2 relations, 2 bidirectional, 1 dropped"));
    }

    #[test]
    fn test_json_report() {
        let json = serde_json::to_value(report()).unwrap();

        assert_eq!(json["relations"][0]["owner"], "Owner");
        assert_eq!(json["relations"][0]["inverseField"], "owner");
        assert_eq!(json["dropped"], 1);
        assert!(json["diagnostics"][0]
            .as_str()
            .unwrap()
            .contains("Pet -> Visit"));
        assert!(json.get("enriched").is_none());
    }

    #[test]
    fn test_write_enriched_round_trips() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out/blueprint.yaml");

        write_enriched(&report(), &out).unwrap();

        let reloaded = Blueprint::load(&out).unwrap();
        assert_eq!(
            reloaded.modules[0].relations()[0].inverse_field.as_deref(),
            Some("owner")
        );
        assert!(reloaded.modules[0].entity.extra.contains_key("fields"));
        assert_eq!(reloaded.root["name"], serde_yaml::Value::from("petclinic"));
    }

    #[test]
    fn test_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = resolve_blueprint_file(&tmp.path().join("blueprint.yaml")).unwrap_err();
        assert!(err.to_string().contains("failed to read blueprint"));
    }
}
