//! Records written to the universal EAV target.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::value::Value;
use crate::mapping::StorageTier;
use crate::schema::RelationshipKind;
use crate::store::key::{record_id, MigrationId};

/// Kind of record stored in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Entity,
    Relationship,
    Artifact,
    Index,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordKind::Entity => "entity",
            RecordKind::Relationship => "relationship",
            RecordKind::Artifact => "artifact",
            RecordKind::Index => "index",
        };
        f.write_str(s)
    }
}

/// Where a target record came from. Every record is tagged with its migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub migration_id: MigrationId,
    pub source_table: String,
    pub source_key: String,
    pub batch_no: u64,
}

/// A universal entity: identity fields plus two tiers of attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub entity_type: String,
    pub natural_key: String,
    pub identity: BTreeMap<String, Value>,
    pub attributes: BTreeMap<String, Value>,
    pub properties: BTreeMap<String, Value>,
    pub provenance: Provenance,
}

impl EntityRecord {
    /// Create an empty record; the id is derived from type, table and key.
    pub fn new(entity_type: &str, natural_key: &str, provenance: Provenance) -> Self {
        let id = entity_id(entity_type, &provenance.source_table, natural_key);
        Self {
            id,
            entity_type: entity_type.to_string(),
            natural_key: natural_key.to_string(),
            identity: BTreeMap::new(),
            attributes: BTreeMap::new(),
            properties: BTreeMap::new(),
            provenance,
        }
    }

    /// Store a value in the given tier.
    pub fn set(&mut self, tier: StorageTier, field: impl Into<String>, value: Value) {
        let map = match tier {
            StorageTier::Identity => &mut self.identity,
            StorageTier::AttributeMetadata => &mut self.attributes,
            StorageTier::DynamicProperty => &mut self.properties,
        };
        map.insert(field.into(), value);
    }

    /// Read a field from any tier.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.identity
            .get(field)
            .or_else(|| self.attributes.get(field))
            .or_else(|| self.properties.get(field))
    }
}

/// Deterministic entity id.
pub fn entity_id(entity_type: &str, source_table: &str, natural_key: &str) -> String {
    record_id("entity", &[entity_type, source_table, natural_key])
}

/// Reference to an entity by its source table and key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub source_table: String,
    pub key_field: String,
    pub key: String,
}

/// A link between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: String,
    pub relationship_type: String,
    pub kind: RelationshipKind,
    /// Source column (or columns) carrying the link.
    #[serde(default)]
    pub via: String,
    pub from: EntityRef,
    pub to: EntityRef,
    pub provenance: Provenance,
}

impl RelationshipRecord {
    /// Create a relationship with a deterministic id.
    ///
    /// The id covers the linking column and the source row's key, so two
    /// foreign keys pointing at the same target row stay distinct, as do
    /// two junction rows joining the same pair.
    pub fn new(
        relationship_type: impl Into<String>,
        kind: RelationshipKind,
        via: impl Into<String>,
        from: EntityRef,
        to: EntityRef,
        provenance: Provenance,
    ) -> Self {
        let relationship_type = relationship_type.into();
        let via = via.into();
        let id = record_id(
            "relationship",
            &[
                &relationship_type,
                &provenance.source_table,
                &provenance.source_key,
                &via,
                &from.source_table,
                &from.key,
                &to.source_table,
                &to.key_field,
                &to.key,
            ],
        );
        Self {
            id,
            relationship_type,
            kind,
            via,
            from,
            to,
            provenance,
        }
    }
}

/// An advisory business-logic artifact (translated rule).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    pub rule_kind: String,
    pub definition: String,
    pub enforcement: String,
    pub provenance: Provenance,
}

/// A secondary index over target fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    pub field: String,
    pub tier: StorageTier,
    pub unique: bool,
    pub provenance: Provenance,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance(batch_no: u64) -> Provenance {
        Provenance {
            migration_id: MigrationId::from_bytes([1u8; 16]),
            source_table: "OCRD".to_string(),
            source_key: "C001".to_string(),
            batch_no,
        }
    }

    #[test]
    fn test_entity_id_ignores_batch() {
        let a = EntityRecord::new("customer", "C001", provenance(1));
        let b = EntityRecord::new("customer", "C001", provenance(7));
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_entity_tiers() {
        let mut record = EntityRecord::new("customer", "C001", provenance(1));
        record.set(StorageTier::Identity, "code", Value::text("C001"));
        record.set(StorageTier::AttributeMetadata, "card_type", Value::text("C"));
        record.set(StorageTier::DynamicProperty, "balance", Value::Float(10.5));

        assert_eq!(record.identity.len(), 1);
        assert_eq!(record.get("card_type"), Some(&Value::text("C")));
        assert_eq!(record.get("balance"), Some(&Value::Float(10.5)));
        assert!(record.get("missing").is_none());
    }
}
