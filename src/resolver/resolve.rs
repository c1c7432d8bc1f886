//! The relation resolution algorithm.

use std::collections::{HashMap, HashSet};

use super::{RelationDiagnostic, RelationKey, RelationMap, Resolution, ResolvedRelation};
use crate::core::blueprint::{EntityDefinition, OnDelete, RelationDeclaration, RelationKind};

/// Resolve the relations declared by a batch of entities.
///
/// 1. Validate every declaration; incomplete ones are skipped with a
///    diagnostic. A missing `onDelete` defaults to `CASCADE`.
/// 2. Drop declarations whose target is not one of the batch's entities.
/// 3. For each surviving `(owner, target)`, copy the field name of the
///    surviving `(target, owner)` declaration into `inverse_field`.
///
/// Entity names must be unique within the batch. When the same
/// `(owner, target)` pair is declared twice the later declaration wins.
pub fn resolve_relations(entities: &[EntityDefinition]) -> Resolution {
    let mut diagnostics = Vec::new();

    // Declaration order is kept so diagnostics come out deterministically.
    let mut provisional: Vec<(RelationKey, ResolvedRelation)> = Vec::new();
    let mut positions: HashMap<RelationKey, usize> = HashMap::new();

    for entity in entities {
        for (index, declaration) in entity.relations().iter().enumerate() {
            let (key, relation) = match validate_declaration(&entity.name, index, declaration) {
                Ok(pair) => pair,
                Err(diag) => {
                    tracing::error!("{}", diag);
                    diagnostics.push(diag);
                    continue;
                }
            };

            match positions.get(&key) {
                Some(&pos) => {
                    let diag = RelationDiagnostic::Duplicate {
                        owner: key.owner.clone(),
                        target: key.target.clone(),
                        kept: relation.field.clone(),
                        replaced: provisional[pos].1.field.clone(),
                    };
                    tracing::warn!("{}", diag);
                    diagnostics.push(diag);
                    provisional[pos].1 = relation;
                }
                None => {
                    positions.insert(key.clone(), provisional.len());
                    provisional.push((key, relation));
                }
            }
        }
    }

    let entity_names: HashSet<&str> = entities.iter().map(|e| e.name.as_str()).collect();

    let mut relations = RelationMap::new();
    for (key, relation) in provisional {
        if entity_names.contains(key.target.as_str()) {
            relations.insert(key, relation);
        } else {
            let diag = RelationDiagnostic::UnknownTarget {
                owner: key.owner,
                target: key.target,
            };
            tracing::warn!("{}", diag);
            diagnostics.push(diag);
        }
    }

    link_inverses(&mut relations);

    tracing::debug!(
        "resolved {} relations ({} bidirectional, {} diagnostics)",
        relations.len(),
        relations.bidirectional_count(),
        diagnostics.len()
    );

    Resolution {
        relations,
        diagnostics,
    }
}

/// Fill `inverse_field` from the reverse declaration, each direction on its own.
///
/// A self-relation is its own reverse key; a single declaration can't be its
/// own reciprocal, so self-relations never get an inverse.
fn link_inverses(relations: &mut RelationMap) {
    let inverses: Vec<(RelationKey, String)> = relations
        .iter()
        .filter(|(key, _)| !key.is_self())
        .filter_map(|(key, _)| {
            relations
                .get_key(&key.reversed())
                .map(|reverse| (key.clone(), reverse.field.clone()))
        })
        .collect();

    for (key, inverse_field) in inverses {
        if let Some(relation) = relations.relations.get_mut(&key) {
            relation.inverse_field = Some(inverse_field);
        }
    }
}

fn validate_declaration(
    owner: &str,
    index: usize,
    declaration: &RelationDeclaration,
) -> Result<(RelationKey, ResolvedRelation), RelationDiagnostic> {
    let missing = |name: &'static str| RelationDiagnostic::MissingKey {
        owner: owner.to_string(),
        index,
        missing: name,
    };

    let target = declaration.model.as_deref().ok_or_else(|| missing("model"))?;
    let kind_str = declaration.kind.as_deref().ok_or_else(|| missing("type"))?;
    let field = declaration.field.as_deref().ok_or_else(|| missing("field"))?;

    let kind: RelationKind = kind_str
        .parse()
        .map_err(|_| RelationDiagnostic::InvalidKind {
            owner: owner.to_string(),
            target: target.to_string(),
            kind: kind_str.to_string(),
        })?;

    let on_delete = match declaration.on_delete.as_deref() {
        Some(value) => value
            .parse::<OnDelete>()
            .map_err(|_| RelationDiagnostic::InvalidOnDelete {
                owner: owner.to_string(),
                target: target.to_string(),
                on_delete: value.to_string(),
            })?,
        None => OnDelete::default(),
    };

    Ok((
        RelationKey::new(owner, target),
        ResolvedRelation {
            target: target.to_string(),
            kind,
            field: field.to_string(),
            on_delete,
            inverse_field: None,
        },
    ))
}

/// Carry resolved inverse fields back onto the blueprint's declarations.
///
/// Returns the number of declarations that received an inverse field.
pub fn apply_inverse_fields(entities: &mut [EntityDefinition], relations: &RelationMap) -> usize {
    let mut applied = 0;

    for entity in entities.iter_mut() {
        for declaration in entity.entity.relations.iter_mut() {
            let Some(target) = declaration.model.as_deref() else {
                continue;
            };
            if let Some(inverse) = relations
                .get(&entity.name, target)
                .and_then(|r| r.inverse_field.as_ref())
            {
                declaration.inverse_field = Some(inverse.clone());
                applied += 1;
            }
        }
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_and_pet() -> Vec<EntityDefinition> {
        vec![
            EntityDefinition::new("Owner")
                .with_relation(RelationDeclaration::new("Pet", "OneToMany", "pets")),
            EntityDefinition::new("Pet")
                .with_relation(RelationDeclaration::new("Owner", "ManyToOne", "owner")),
        ]
    }

    #[test]
    fn test_owner_pet_resolves_both_directions() {
        let resolution = resolve_relations(&owner_and_pet());

        assert_eq!(resolution.relations.len(), 2);
        assert!(resolution.diagnostics.is_empty());

        let owner_pet = resolution.relations.get("Owner", "Pet").unwrap();
        assert_eq!(owner_pet.kind, RelationKind::OneToMany);
        assert_eq!(owner_pet.field, "pets");
        assert_eq!(owner_pet.inverse_field.as_deref(), Some("owner"));

        let pet_owner = resolution.relations.get("Pet", "Owner").unwrap();
        assert_eq!(pet_owner.kind, RelationKind::ManyToOne);
        assert_eq!(pet_owner.inverse_field.as_deref(), Some("pets"));
    }

    #[test]
    fn test_on_delete_defaults_to_cascade() {
        let resolution = resolve_relations(&owner_and_pet());
        let rel = resolution.relations.get("Owner", "Pet").unwrap();
        assert_eq!(rel.on_delete, OnDelete::Cascade);
    }

    #[test]
    fn test_explicit_on_delete_is_kept() {
        let entities = vec![
            EntityDefinition::new("Pet").with_relation(
                RelationDeclaration::new("Owner", "ManyToOne", "owner").on_delete("SET NULL"),
            ),
            EntityDefinition::new("Owner"),
        ];
        let resolution = resolve_relations(&entities);
        let rel = resolution.relations.get("Pet", "Owner").unwrap();
        assert_eq!(rel.on_delete, OnDelete::SetNull);
    }

    #[test]
    fn test_dangling_relation_is_removed() {
        let entities = vec![
            EntityDefinition::new("Owner")
                .with_relation(RelationDeclaration::new("Pet", "OneToMany", "pets"))
                .with_relation(RelationDeclaration::new("Vet", "ManyToMany", "vets"))
                .with_relation(RelationDeclaration::new("Visit", "OneToMany", "visits")),
            EntityDefinition::new("Pet"),
            EntityDefinition::new("Visit"),
        ];

        let resolution = resolve_relations(&entities);

        assert!(!resolution.relations.contains("Owner", "Vet"));
        assert!(resolution.relations.contains("Owner", "Pet"));
        assert!(resolution.relations.contains("Owner", "Visit"));
        assert_eq!(
            resolution.diagnostics,
            vec![RelationDiagnostic::UnknownTarget {
                owner: "Owner".to_string(),
                target: "Vet".to_string(),
            }]
        );
    }

    #[test]
    fn test_one_sided_relation_has_no_inverse() {
        let entities = vec![
            EntityDefinition::new("Post")
                .with_relation(RelationDeclaration::new("Tag", "ManyToMany", "tags")),
            EntityDefinition::new("Tag"),
        ];
        let resolution = resolve_relations(&entities);
        let rel = resolution.relations.get("Post", "Tag").unwrap();
        assert!(rel.inverse_field.is_none());
        assert_eq!(resolution.relations.bidirectional_count(), 0);
    }

    #[test]
    fn test_self_relation_declared_once() {
        let entities = vec![EntityDefinition::new("Employee")
            .with_relation(RelationDeclaration::new("Employee", "ManyToOne", "manager"))];

        let resolution = resolve_relations(&entities);
        let rel = resolution.relations.get("Employee", "Employee").unwrap();
        assert_eq!(rel.field, "manager");
        assert!(rel.inverse_field.is_none());
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn test_self_relation_declared_twice_keeps_later() {
        let entities = vec![EntityDefinition::new("Employee")
            .with_relation(RelationDeclaration::new("Employee", "ManyToOne", "manager"))
            .with_relation(RelationDeclaration::new("Employee", "OneToMany", "reports"))];

        let resolution = resolve_relations(&entities);
        assert_eq!(resolution.relations.len(), 1);
        let rel = resolution.relations.get("Employee", "Employee").unwrap();
        assert_eq!(rel.field, "reports");
        assert!(matches!(
            resolution.diagnostics.as_slice(),
            [RelationDiagnostic::Duplicate { kept, replaced, .. }]
                if kept == "reports" && replaced == "manager"
        ));
        assert_eq!(resolution.dropped_count(), 0);
    }

    #[test]
    fn test_incomplete_declaration_is_skipped() {
        let mut missing_field = RelationDeclaration::new("Pet", "OneToMany", "pets");
        missing_field.field = None;

        let entities = vec![
            EntityDefinition::new("Owner")
                .with_relation(missing_field)
                .with_relation(RelationDeclaration::new("Visit", "OneToMany", "visits")),
            EntityDefinition::new("Pet"),
            EntityDefinition::new("Visit"),
        ];

        let resolution = resolve_relations(&entities);
        assert!(!resolution.relations.contains("Owner", "Pet"));
        assert!(resolution.relations.contains("Owner", "Visit"));
        assert_eq!(
            resolution.diagnostics,
            vec![RelationDiagnostic::MissingKey {
                owner: "Owner".to_string(),
                index: 0,
                missing: "field",
            }]
        );
    }

    #[test]
    fn test_invalid_kind_is_skipped() {
        let entities = vec![
            EntityDefinition::new("Owner")
                .with_relation(RelationDeclaration::new("Pet", "OneToFew", "pets")),
            EntityDefinition::new("Pet"),
        ];
        let resolution = resolve_relations(&entities);
        assert!(resolution.relations.is_empty());
        assert!(matches!(
            resolution.diagnostics[0],
            RelationDiagnostic::InvalidKind { .. }
        ));
    }

    #[test]
    fn test_entity_without_relations_contributes_nothing() {
        let entities = vec![EntityDefinition::new("Owner"), EntityDefinition::new("Pet")];
        let resolution = resolve_relations(&entities);
        assert!(resolution.relations.is_empty());
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn test_reciprocal_to_dangling_target_does_not_link() {
        // Pet -> Owner survives, Owner -> Pet survives, Owner -> Ghost is dropped;
        // Ghost never exists so nothing links to it.
        let entities = vec![
            EntityDefinition::new("Owner")
                .with_relation(RelationDeclaration::new("Ghost", "OneToOne", "ghost"))
                .with_relation(RelationDeclaration::new("Pet", "OneToMany", "pets")),
            EntityDefinition::new("Pet")
                .with_relation(RelationDeclaration::new("Owner", "ManyToOne", "owner")),
        ];
        let resolution = resolve_relations(&entities);
        assert_eq!(resolution.relations.len(), 2);
        assert_eq!(resolution.relations.bidirectional_count(), 2);
    }

    #[test]
    fn test_apply_inverse_fields() {
        let mut entities = owner_and_pet();
        entities.push(
            EntityDefinition::new("Visit")
                .with_relation(RelationDeclaration::new("Pet", "ManyToOne", "pet")),
        );

        let resolution = resolve_relations(&entities);
        let applied = apply_inverse_fields(&mut entities, &resolution.relations);

        assert_eq!(applied, 2);
        assert_eq!(
            entities[0].relations()[0].inverse_field.as_deref(),
            Some("owner")
        );
        assert_eq!(
            entities[1].relations()[0].inverse_field.as_deref(),
            Some("pets")
        );
        assert!(entities[2].relations()[0].inverse_field.is_none());
    }
}
