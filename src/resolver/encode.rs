//! Serialized form of a [`RelationMap`].
//!
//! JSON objects can't be keyed by a pair, so the map is written as a list of
//! entries ordered by `(owner, target)`.

use serde::ser::{Serialize, SerializeSeq, Serializer};

use super::{RelationMap, ResolvedRelation};

/// One serialized relation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RelationEntry<'a> {
    pub owner: &'a str,
    #[serde(flatten)]
    pub relation: &'a ResolvedRelation,
}

impl RelationMap {
    /// Entries in serialization order.
    pub fn entries(&self) -> Vec<RelationEntry<'_>> {
        self.iter()
            .map(|(key, relation)| RelationEntry {
                owner: &key.owner,
                relation,
            })
            .collect()
    }
}

impl Serialize for RelationMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for entry in self.entries() {
            seq.serialize_element(&entry)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::blueprint::{OnDelete, RelationKind};
    use crate::resolver::RelationKey;

    #[test]
    fn test_relation_map_serializes_as_list() {
        let mut map = RelationMap::new();
        map.insert(
            RelationKey::new("Pet", "Owner"),
            ResolvedRelation {
                target: "Owner".to_string(),
                kind: RelationKind::ManyToOne,
                field: "owner".to_string(),
                on_delete: OnDelete::SetNull,
                inverse_field: Some("pets".to_string()),
            },
        );
        map.insert(
            RelationKey::new("Owner", "Pet"),
            ResolvedRelation {
                target: "Pet".to_string(),
                kind: RelationKind::OneToMany,
                field: "pets".to_string(),
                on_delete: OnDelete::Cascade,
                inverse_field: None,
            },
        );

        let json = serde_json::to_value(&map).unwrap();
        let entries = json.as_array().unwrap();
        assert_eq!(entries.len(), 2);

        // Ordered by owner
        assert_eq!(entries[0]["owner"], "Owner");
        assert_eq!(entries[0]["model"], "Pet");
        assert_eq!(entries[0]["type"], "OneToMany");
        assert_eq!(entries[0]["onDelete"], "CASCADE");
        assert!(entries[0].get("inverseField").is_none());

        assert_eq!(entries[1]["owner"], "Pet");
        assert_eq!(entries[1]["onDelete"], "SET NULL");
        assert_eq!(entries[1]["inverseField"], "pets");
    }
}
