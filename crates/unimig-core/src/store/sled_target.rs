//! Persistent EAV target backed by sled.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};

use crate::connector::{
    ArtifactRecord, ConnectorError, EntityRecord, IndexRecord, Provenance, RecordKind,
    RelationshipRecord, TargetWriter,
};
use crate::error::Error;
use crate::store::key::MigrationId;

/// Tree name for entity records.
const ENTITY_TREE: &str = "eav:entities";

/// Tree name for relationship records.
const RELATIONSHIP_TREE: &str = "eav:relationships";

/// Tree name for business-logic artifacts.
const ARTIFACT_TREE: &str = "eav:artifacts";

/// Tree name for secondary index definitions.
const INDEX_TREE: &str = "eav:indexes";

/// Tree name for the provenance index (migration + kind + table + id -> empty).
const PROVENANCE_TREE: &str = "eav:provenance";

/// Tree name for installed EAV tables (name -> empty).
const SCHEMA_TREE: &str = "eav:schema";

/// A record the target can store and trace back to its migration.
trait Tagged: Serialize + DeserializeOwned {
    const KIND: RecordKind;
    fn id(&self) -> &str;
    fn provenance(&self) -> &Provenance;
}

impl Tagged for EntityRecord {
    const KIND: RecordKind = RecordKind::Entity;
    fn id(&self) -> &str {
        &self.id
    }
    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

impl Tagged for RelationshipRecord {
    const KIND: RecordKind = RecordKind::Relationship;
    fn id(&self) -> &str {
        &self.id
    }
    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

impl Tagged for ArtifactRecord {
    const KIND: RecordKind = RecordKind::Artifact;
    fn id(&self) -> &str {
        &self.id
    }
    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

impl Tagged for IndexRecord {
    const KIND: RecordKind = RecordKind::Index;
    fn id(&self) -> &str {
        &self.id
    }
    fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

fn kind_code(kind: RecordKind) -> u8 {
    match kind {
        RecordKind::Entity => 0,
        RecordKind::Relationship => 1,
        RecordKind::Artifact => 2,
        RecordKind::Index => 3,
    }
}

const ALL_KINDS: [RecordKind; 4] = [
    RecordKind::Entity,
    RecordKind::Relationship,
    RecordKind::Artifact,
    RecordKind::Index,
];

fn storage(err: sled::Error) -> ConnectorError {
    ConnectorError::Storage(err.to_string())
}

/// The universal EAV store on sled.
///
/// Records are stored as JSON keyed by their deterministic id, so writing
/// the same record twice is an upsert. A provenance index keyed by
/// (migration, kind, table, id) answers counts and rollbacks without a scan
/// of the record trees.
pub struct SledTarget {
    name: String,
    entities: Tree,
    relationships: Tree,
    artifacts: Tree,
    indexes: Tree,
    provenance: Tree,
    schema: Tree,
}

impl SledTarget {
    /// Open or create the target trees in `db`.
    pub fn open(db: &Db, name: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            name: name.into(),
            entities: db.open_tree(ENTITY_TREE)?,
            relationships: db.open_tree(RELATIONSHIP_TREE)?,
            artifacts: db.open_tree(ARTIFACT_TREE)?,
            indexes: db.open_tree(INDEX_TREE)?,
            provenance: db.open_tree(PROVENANCE_TREE)?,
            schema: db.open_tree(SCHEMA_TREE)?,
        })
    }

    /// Register the EAV tables as present.
    pub fn install_tables(&self, tables: &[String]) -> Result<(), Error> {
        for table in tables {
            self.schema.insert(table.to_ascii_lowercase().as_bytes(), &[])?;
        }
        Ok(())
    }

    /// Fetch an entity by id.
    pub fn entity(&self, id: &str) -> Result<Option<EntityRecord>, Error> {
        match self.entities.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All entities of a type.
    pub fn entities_of_type(&self, entity_type: &str) -> Result<Vec<EntityRecord>, Error> {
        let mut out = Vec::new();
        for item in self.entities.iter() {
            let (_, bytes) = item?;
            let record: EntityRecord = serde_json::from_slice(&bytes)?;
            if record.entity_type == entity_type {
                out.push(record);
            }
        }
        out.sort_by(|a, b| a.natural_key.cmp(&b.natural_key));
        Ok(out)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Flush all trees to disk.
    pub fn flush(&self) -> Result<(), Error> {
        for tree in [
            &self.entities,
            &self.relationships,
            &self.artifacts,
            &self.indexes,
            &self.provenance,
            &self.schema,
        ] {
            tree.flush()?;
        }
        Ok(())
    }

    fn tree(&self, kind: RecordKind) -> &Tree {
        match kind {
            RecordKind::Entity => &self.entities,
            RecordKind::Relationship => &self.relationships,
            RecordKind::Artifact => &self.artifacts,
            RecordKind::Index => &self.indexes,
        }
    }

    fn upsert<T: Tagged>(&self, records: &[T]) -> Result<usize, ConnectorError> {
        let tree = self.tree(T::KIND);
        for record in records {
            let bytes =
                serde_json::to_vec(record).map_err(|e| ConnectorError::Write(e.to_string()))?;
            let new_key = provenance_key(T::KIND, record.provenance(), record.id());
            if let Some(old) = tree.insert(record.id().as_bytes(), bytes).map_err(storage)? {
                let previous: T = serde_json::from_slice(&old)
                    .map_err(|e| ConnectorError::Storage(e.to_string()))?;
                let old_key = provenance_key(T::KIND, previous.provenance(), previous.id());
                if old_key != new_key {
                    self.provenance.remove(old_key).map_err(storage)?;
                }
            }
            self.provenance.insert(new_key, &[]).map_err(storage)?;
        }
        Ok(records.len())
    }

    fn delete_prefix(&self, kind: RecordKind, prefix: &[u8]) -> Result<u64, ConnectorError> {
        let tree = self.tree(kind);
        let keys: Vec<sled::IVec> = self
            .provenance
            .scan_prefix(prefix)
            .keys()
            .collect::<Result<_, _>>()
            .map_err(storage)?;
        let mut deleted = 0;
        for key in keys {
            if let Some(id) = record_id_of(&key) {
                if tree.remove(id).map_err(storage)?.is_some() {
                    deleted += 1;
                }
            }
            self.provenance.remove(key).map_err(storage)?;
        }
        Ok(deleted)
    }
}

fn migration_prefix(migration_id: &MigrationId, kind: RecordKind) -> Vec<u8> {
    let mut key = Vec::with_capacity(64);
    key.extend_from_slice(migration_id.as_bytes());
    key.push(kind_code(kind));
    key
}

fn table_prefix(migration_id: &MigrationId, kind: RecordKind, table: &str) -> Vec<u8> {
    let mut key = migration_prefix(migration_id, kind);
    key.extend_from_slice(table.to_ascii_lowercase().as_bytes());
    key.push(0);
    key
}

fn provenance_key(kind: RecordKind, provenance: &Provenance, id: &str) -> Vec<u8> {
    let mut key = table_prefix(&provenance.migration_id, kind, &provenance.source_table);
    key.extend_from_slice(id.as_bytes());
    key
}

/// The record id is everything after the table terminator.
fn record_id_of(key: &[u8]) -> Option<&[u8]> {
    let rest = key.get(17..)?;
    let end = rest.iter().position(|b| *b == 0)?;
    rest.get(end + 1..)
}

impl TargetWriter for SledTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn missing_tables(&self, required: &[String]) -> Result<Vec<String>, ConnectorError> {
        let mut missing = Vec::new();
        for table in required {
            if !self
                .schema
                .contains_key(table.to_ascii_lowercase().as_bytes())
                .map_err(storage)?
            {
                missing.push(table.clone());
            }
        }
        Ok(missing)
    }

    fn upsert_entities(&self, records: &[EntityRecord]) -> Result<usize, ConnectorError> {
        self.upsert(records)
    }

    fn upsert_relationships(
        &self,
        records: &[RelationshipRecord],
    ) -> Result<usize, ConnectorError> {
        self.upsert(records)
    }

    fn record_artifact(&self, artifact: &ArtifactRecord) -> Result<(), ConnectorError> {
        self.upsert(std::slice::from_ref(artifact)).map(|_| ())
    }

    fn create_index(&self, index: &IndexRecord) -> Result<(), ConnectorError> {
        self.upsert(std::slice::from_ref(index)).map(|_| ())
    }

    fn count_migrated(
        &self,
        migration_id: &MigrationId,
        source_table: &str,
        kind: RecordKind,
    ) -> Result<u64, ConnectorError> {
        let prefix = table_prefix(migration_id, kind, source_table);
        let mut count = 0;
        for key in self.provenance.scan_prefix(prefix).keys() {
            key.map_err(storage)?;
            count += 1;
        }
        Ok(count)
    }

    fn count_tagged(&self, migration_id: &MigrationId) -> Result<u64, ConnectorError> {
        let mut count = 0;
        for key in self.provenance.scan_prefix(migration_id.as_bytes()).keys() {
            key.map_err(storage)?;
            count += 1;
        }
        Ok(count)
    }

    fn delete_migrated(
        &self,
        migration_id: &MigrationId,
        source_table: Option<&str>,
        kind: Option<RecordKind>,
    ) -> Result<u64, ConnectorError> {
        let kinds: Vec<RecordKind> = match kind {
            Some(k) => vec![k],
            None => ALL_KINDS.to_vec(),
        };
        let mut deleted = 0;
        for kind in kinds {
            let prefix = match source_table {
                Some(table) => table_prefix(migration_id, kind, table),
                None => migration_prefix(migration_id, kind),
            };
            deleted += self.delete_prefix(kind, &prefix)?;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::Value;
    use crate::mapping::StorageTier;

    fn open() -> (tempfile::TempDir, SledTarget) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let target = SledTarget::open(&db, "eav").unwrap();
        (dir, target)
    }

    fn entity(migration: u8, table: &str, key: &str) -> EntityRecord {
        let mut record = EntityRecord::new(
            "customer",
            key,
            Provenance {
                migration_id: MigrationId::from_bytes([migration; 16]),
                source_table: table.to_string(),
                source_key: key.to_string(),
                batch_no: 1,
            },
        );
        record.set(StorageTier::Identity, "code", Value::text(key));
        record
    }

    #[test]
    fn test_missing_tables_until_installed() {
        let (_dir, target) = open();
        let required = vec!["universal_entities".to_string(), "entity_properties".to_string()];
        assert_eq!(target.missing_tables(&required).unwrap(), required);

        target.install_tables(&required).unwrap();
        assert!(target.missing_tables(&required).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let (_dir, target) = open();
        let batch = vec![entity(1, "OCRD", "C1"), entity(1, "OCRD", "C2")];
        target.upsert_entities(&batch).unwrap();
        target.upsert_entities(&batch).unwrap();

        let id = MigrationId::from_bytes([1; 16]);
        assert_eq!(target.entity_count(), 2);
        assert_eq!(target.count_migrated(&id, "ocrd", RecordKind::Entity).unwrap(), 2);
        assert_eq!(
            target.entity(&batch[0].id).unwrap().unwrap().get("code"),
            Some(&Value::text("C1"))
        );
    }

    #[test]
    fn test_retagging_moves_provenance() {
        let (_dir, target) = open();
        target.upsert_entities(&[entity(1, "OCRD", "C1")]).unwrap();
        target.upsert_entities(&[entity(2, "OCRD", "C1")]).unwrap();

        assert_eq!(target.count_tagged(&MigrationId::from_bytes([1; 16])).unwrap(), 0);
        assert_eq!(target.count_tagged(&MigrationId::from_bytes([2; 16])).unwrap(), 1);
    }

    #[test]
    fn test_delete_by_table_and_all() {
        let (_dir, target) = open();
        let id = MigrationId::from_bytes([1; 16]);
        target
            .upsert_entities(&[entity(1, "OCRD", "C1"), entity(1, "OCRD_ARCHIVE", "C9")])
            .unwrap();

        assert_eq!(target.delete_migrated(&id, Some("OCRD"), None).unwrap(), 1);
        assert_eq!(target.entity_count(), 1);
        assert_eq!(target.delete_migrated(&id, None, None).unwrap(), 1);
        assert_eq!(target.count_tagged(&id).unwrap(), 0);
        assert_eq!(target.entity_count(), 0);
    }
}
