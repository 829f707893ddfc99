//! In-memory connectors.
//!
//! [`MemorySource`] serves a JSON snapshot of tables and rows. [`MemoryTarget`]
//! is a dashmap-backed EAV store with failure injection for exercising the
//! retry and resume paths.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use super::record::{ArtifactRecord, EntityRecord, IndexRecord, RecordKind, RelationshipRecord};
use super::value::{compare_keys, row_key, BatchCursor, Row, Value};
use super::{matches_filter, ConnectorError, SourceReader, SourceTable, TargetWriter};
use crate::store::key::MigrationId;

/// A table plus its rows, as stored in a snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTable {
    #[serde(flatten)]
    pub table: SourceTable,
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// A serialized source database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<SnapshotTable>,
}

impl SourceSnapshot {
    /// Parse a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Render the snapshot as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

struct TableData {
    table: SourceTable,
    /// Rows sorted by the primary key (or the first column when there is none).
    rows: Vec<Row>,
    sort_key: Vec<String>,
}

/// Source backed by rows held in memory.
pub struct MemorySource {
    name: String,
    tables: Vec<TableData>,
    reachable: bool,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
            reachable: true,
        }
    }

    /// A source that fails every connectivity check.
    pub fn unreachable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
            reachable: false,
        }
    }

    /// Build a source from a snapshot.
    pub fn from_snapshot(snapshot: SourceSnapshot) -> Self {
        snapshot
            .tables
            .into_iter()
            .fold(Self::new(snapshot.name), |source, t| {
                source.with_table(t.table, t.rows)
            })
    }

    /// Add a table with its rows.
    pub fn with_table(mut self, table: SourceTable, mut rows: Vec<Row>) -> Self {
        let sort_key = if table.primary_key.is_empty() {
            table.columns.iter().take(1).map(|c| c.name.clone()).collect()
        } else {
            table.primary_key.clone()
        };
        rows.sort_by(|a, b| compare_keys(&row_key(a, &sort_key), &row_key(b, &sort_key)));
        self.tables.push(TableData {
            table,
            rows,
            sort_key,
        });
        self
    }

    /// Capture the source as a serializable snapshot.
    pub fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            name: self.name.clone(),
            tables: self
                .tables
                .iter()
                .map(|t| SnapshotTable {
                    table: t.table.clone(),
                    rows: t.rows.clone(),
                })
                .collect(),
        }
    }

    fn check_reachable(&self) -> Result<(), ConnectorError> {
        if self.reachable {
            Ok(())
        } else {
            Err(ConnectorError::Unreachable {
                endpoint: self.name.clone(),
                reason: "connection refused".to_string(),
            })
        }
    }

    fn data(&self, table: &str) -> Result<&TableData, ConnectorError> {
        self.check_reachable()?;
        self.tables
            .iter()
            .find(|t| t.table.name.eq_ignore_ascii_case(table))
            .ok_or_else(|| ConnectorError::TableNotFound(table.to_string()))
    }
}

impl SourceReader for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ping(&self) -> Result<(), ConnectorError> {
        self.check_reachable()
    }

    fn list_tables(&self) -> Result<Vec<SourceTable>, ConnectorError> {
        self.check_reachable()?;
        Ok(self.tables.iter().map(|t| t.table.clone()).collect())
    }

    fn row_count(&self, table: &str) -> Result<u64, ConnectorError> {
        Ok(self.data(table)?.rows.len() as u64)
    }

    fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>, ConnectorError> {
        Ok(self.data(table)?.rows.iter().take(limit).cloned().collect())
    }

    fn read_batch(
        &self,
        table: &str,
        order_key: &[String],
        after: Option<&BatchCursor>,
        limit: usize,
    ) -> Result<Vec<Row>, ConnectorError> {
        let data = self.data(table)?;

        let resorted;
        let rows: &[Row] = if order_key == data.sort_key.as_slice() {
            &data.rows
        } else {
            let mut copy = data.rows.clone();
            copy.sort_by(|a, b| compare_keys(&row_key(a, order_key), &row_key(b, order_key)));
            resorted = copy;
            &resorted
        };

        let start = after.map_or(0, |cursor| cursor.position(rows, order_key));

        Ok(rows[start..].iter().take(limit).cloned().collect())
    }
}

/// EAV target held in memory.
pub struct MemoryTarget {
    name: String,
    tables: Option<HashSet<String>>,
    entities: DashMap<String, EntityRecord>,
    relationships: DashMap<String, RelationshipRecord>,
    artifacts: DashMap<String, ArtifactRecord>,
    indexes: DashMap<String, IndexRecord>,
    /// (source table, batch number) -> remaining injected failures.
    failures: DashMap<(String, u64), u32>,
    write_calls: AtomicU64,
}

impl MemoryTarget {
    /// A target where every required table exists.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: None,
            entities: DashMap::new(),
            relationships: DashMap::new(),
            artifacts: DashMap::new(),
            indexes: DashMap::new(),
            failures: DashMap::new(),
            write_calls: AtomicU64::new(0),
        }
    }

    /// Restrict the target to an explicit set of existing tables.
    pub fn with_tables(mut self, tables: &[&str]) -> Self {
        self.tables = Some(tables.iter().map(|t| t.to_ascii_lowercase()).collect());
        self
    }

    /// Fail the next `times` writes of the given batch.
    pub fn fail_batch(&self, source_table: &str, batch_no: u64, times: u32) {
        self.failures
            .insert((source_table.to_ascii_lowercase(), batch_no), times);
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    /// Remove every stored record.
    pub fn reset(&self) {
        self.entities.clear();
        self.relationships.clear();
        self.artifacts.clear();
        self.indexes.clear();
    }

    /// Number of entities stored.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of relationships stored.
    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Number of artifacts stored.
    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    /// Number of indexes stored.
    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }

    /// Fetch an entity by id.
    pub fn entity(&self, id: &str) -> Option<EntityRecord> {
        self.entities.get(id).map(|e| e.value().clone())
    }

    /// All entities of a type, sorted by natural key.
    pub fn entities_of_type(&self, entity_type: &str) -> Vec<EntityRecord> {
        let mut out: Vec<_> = self
            .entities
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.natural_key.cmp(&b.natural_key));
        out
    }

    /// All relationships, sorted by id.
    pub fn relationships(&self) -> Vec<RelationshipRecord> {
        let mut out: Vec<_> = self.relationships.iter().map(|r| r.value().clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Number of upsert calls received, including failed ones.
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn check_injected_failure(&self, source_table: &str, batch_no: u64) -> Result<(), ConnectorError> {
        let key = (source_table.to_ascii_lowercase(), batch_no);
        if let Some(mut remaining) = self.failures.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ConnectorError::Write(format!(
                    "injected failure for {} batch {}",
                    source_table, batch_no
                )));
            }
        }
        Ok(())
    }
}

fn count_where<T, F>(map: &DashMap<String, T>, pred: F) -> u64
where
    F: Fn(&T) -> bool,
{
    map.iter().filter(|e| pred(e.value())).count() as u64
}

fn delete_where<T, F>(map: &DashMap<String, T>, pred: F) -> u64
where
    F: Fn(&T) -> bool,
{
    let before = map.len();
    map.retain(|_, v| !pred(v));
    (before - map.len()) as u64
}

impl TargetWriter for MemoryTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn missing_tables(&self, required: &[String]) -> Result<Vec<String>, ConnectorError> {
        Ok(match &self.tables {
            None => Vec::new(),
            Some(existing) => required
                .iter()
                .filter(|t| !existing.contains(&t.to_ascii_lowercase()))
                .cloned()
                .collect(),
        })
    }

    fn upsert_entities(&self, records: &[EntityRecord]) -> Result<usize, ConnectorError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(first) = records.first() {
            self.check_injected_failure(&first.provenance.source_table, first.provenance.batch_no)?;
        }
        for record in records {
            self.entities.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    fn upsert_relationships(
        &self,
        records: &[RelationshipRecord],
    ) -> Result<usize, ConnectorError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(first) = records.first() {
            self.check_injected_failure(&first.provenance.source_table, first.provenance.batch_no)?;
        }
        for record in records {
            self.relationships.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    fn record_artifact(&self, artifact: &ArtifactRecord) -> Result<(), ConnectorError> {
        self.artifacts.insert(artifact.id.clone(), artifact.clone());
        Ok(())
    }

    fn create_index(&self, index: &IndexRecord) -> Result<(), ConnectorError> {
        self.indexes.insert(index.id.clone(), index.clone());
        Ok(())
    }

    fn count_migrated(
        &self,
        migration_id: &MigrationId,
        source_table: &str,
        kind: RecordKind,
    ) -> Result<u64, ConnectorError> {
        let table = Some(source_table);
        Ok(match kind {
            RecordKind::Entity => count_where(&self.entities, |r| {
                matches_filter(&r.provenance, migration_id, table)
            }),
            RecordKind::Relationship => count_where(&self.relationships, |r| {
                matches_filter(&r.provenance, migration_id, table)
            }),
            RecordKind::Artifact => count_where(&self.artifacts, |r| {
                matches_filter(&r.provenance, migration_id, table)
            }),
            RecordKind::Index => count_where(&self.indexes, |r| {
                matches_filter(&r.provenance, migration_id, table)
            }),
        })
    }

    fn count_tagged(&self, migration_id: &MigrationId) -> Result<u64, ConnectorError> {
        Ok(
            count_where(&self.entities, |r| matches_filter(&r.provenance, migration_id, None))
                + count_where(&self.relationships, |r| {
                    matches_filter(&r.provenance, migration_id, None)
                })
                + count_where(&self.artifacts, |r| {
                    matches_filter(&r.provenance, migration_id, None)
                })
                + count_where(&self.indexes, |r| {
                    matches_filter(&r.provenance, migration_id, None)
                }),
        )
    }

    fn delete_migrated(
        &self,
        migration_id: &MigrationId,
        source_table: Option<&str>,
        kind: Option<RecordKind>,
    ) -> Result<u64, ConnectorError> {
        let wants = |k: RecordKind| kind.map(|want| want == k).unwrap_or(true);
        let mut deleted = 0;
        if wants(RecordKind::Entity) {
            deleted += delete_where(&self.entities, |r| {
                matches_filter(&r.provenance, migration_id, source_table)
            });
        }
        if wants(RecordKind::Relationship) {
            deleted += delete_where(&self.relationships, |r| {
                matches_filter(&r.provenance, migration_id, source_table)
            });
        }
        if wants(RecordKind::Artifact) {
            deleted += delete_where(&self.artifacts, |r| {
                matches_filter(&r.provenance, migration_id, source_table)
            });
        }
        if wants(RecordKind::Index) {
            deleted += delete_where(&self.indexes, |r| {
                matches_filter(&r.provenance, migration_id, source_table)
            });
        }
        Ok(deleted)
    }
}
