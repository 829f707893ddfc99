//! Capability interfaces to the source database and the EAV target.
//!
//! The engine depends on [`SourceReader`] and [`TargetWriter`] only. Vendor
//! connectors live outside this crate and are injected at the boundary; the
//! bundled [`MemorySource`], [`MemoryTarget`] and
//! [`SledTarget`](crate::store::SledTarget) cover snapshots, tests and the CLI.

pub mod memory;
pub mod record;
pub mod value;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{
    ConstraintDescriptor, IndexDescriptor, ReferentialAction, TriggerDescriptor,
};
use crate::store::key::MigrationId;

pub use memory::{MemorySource, MemoryTarget, SnapshotTable, SourceSnapshot};
pub use record::{
    entity_id, ArtifactRecord, EntityRecord, EntityRef, IndexRecord, Provenance, RecordKind,
    RelationshipRecord,
};
pub use value::{compare_keys, row_key, BatchCursor, Row, Value};

/// Errors raised by connectors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    /// The endpoint cannot be reached.
    #[error("cannot reach {endpoint}: {reason}")]
    Unreachable {
        /// Endpoint name.
        endpoint: String,
        /// Underlying reason.
        reason: String,
    },

    /// A table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Reading failed.
    #[error("read failed: {0}")]
    Read(String),

    /// Writing failed.
    #[error("write failed: {0}")]
    Write(String),

    /// Underlying storage failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ConnectorError {
    /// Whether this error means the endpoint is unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ConnectorError::Unreachable { .. })
    }
}

/// A column as reported by source introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumn {
    pub name: String,
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub scale: Option<u32>,
    #[serde(default)]
    pub is_identity: bool,
    #[serde(default)]
    pub computed: Option<String>,
    #[serde(default)]
    pub unique: bool,
}

fn default_true() -> bool {
    true
}

impl SourceColumn {
    /// A nullable column of the given type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
            max_length: None,
            precision: None,
            scale: None,
            is_identity: false,
            computed: None,
            unique: false,
        }
    }

    /// Mark the column as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the maximum length.
    pub fn with_max_length(mut self, len: u32) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Set a default expression.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Mark as computed from an expression.
    pub fn computed(mut self, expression: impl Into<String>) -> Self {
        self.computed = Some(expression.into());
        self
    }
}

/// A foreign key as reported by source introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceForeignKey {
    #[serde(default)]
    pub name: Option<String>,
    pub column: String,
    pub target_table: String,
    pub target_column: String,
    #[serde(default)]
    pub on_delete: ReferentialAction,
    #[serde(default)]
    pub on_update: ReferentialAction,
}

impl SourceForeignKey {
    /// Create a foreign key with default actions.
    pub fn new(
        column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            column: column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }
}

/// A table as reported by source introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTable {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
    pub columns: Vec<SourceColumn>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<SourceForeignKey>,
    #[serde(default)]
    pub indexes: Vec<IndexDescriptor>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDescriptor>,
    #[serde(default)]
    pub triggers: Vec<TriggerDescriptor>,
    #[serde(default)]
    pub estimated_size_bytes: Option<u64>,
}

fn default_schema() -> String {
    "dbo".to_string()
}

impl SourceTable {
    /// Create a table in the default schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: default_schema(),
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            constraints: Vec::new(),
            triggers: Vec::new(),
            estimated_size_bytes: None,
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: SourceColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key.
    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Add a foreign key.
    pub fn with_foreign_key(mut self, fk: SourceForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Add an index.
    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    /// Add a constraint.
    pub fn with_constraint(mut self, constraint: ConstraintDescriptor) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Add a trigger.
    pub fn with_trigger(mut self, trigger: TriggerDescriptor) -> Self {
        self.triggers.push(trigger);
        self
    }
}

/// Read access to the source database.
pub trait SourceReader: Send + Sync {
    /// Display name of the source.
    fn name(&self) -> &str;

    /// Check that the source is reachable.
    fn ping(&self) -> Result<(), ConnectorError>;

    /// Introspect all tables.
    fn list_tables(&self) -> Result<Vec<SourceTable>, ConnectorError>;

    /// Exact row count of a table.
    fn row_count(&self, table: &str) -> Result<u64, ConnectorError>;

    /// Up to `limit` rows for profiling.
    fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>, ConnectorError>;

    /// Up to `limit` rows ordered by `order_key`, starting past `after`.
    fn read_batch(
        &self,
        table: &str,
        order_key: &[String],
        after: Option<&BatchCursor>,
        limit: usize,
    ) -> Result<Vec<Row>, ConnectorError>;
}

/// Write access to the universal EAV target.
///
/// All writes are upserts keyed by record id, so replaying a batch is safe.
pub trait TargetWriter: Send + Sync {
    /// Display name of the target.
    fn name(&self) -> &str;

    /// Which of the required target tables are absent.
    fn missing_tables(&self, required: &[String]) -> Result<Vec<String>, ConnectorError>;

    /// Upsert a batch of entities; returns the number written.
    fn upsert_entities(&self, records: &[EntityRecord]) -> Result<usize, ConnectorError>;

    /// Upsert a batch of relationships; returns the number written.
    fn upsert_relationships(&self, records: &[RelationshipRecord])
        -> Result<usize, ConnectorError>;

    /// Store a business-logic artifact.
    fn record_artifact(&self, artifact: &ArtifactRecord) -> Result<(), ConnectorError>;

    /// Create a secondary index.
    fn create_index(&self, index: &IndexRecord) -> Result<(), ConnectorError>;

    /// Number of records of `kind` from `source_table` tagged with the migration.
    fn count_migrated(
        &self,
        migration_id: &MigrationId,
        source_table: &str,
        kind: RecordKind,
    ) -> Result<u64, ConnectorError>;

    /// Number of records of any kind tagged with the migration.
    fn count_tagged(&self, migration_id: &MigrationId) -> Result<u64, ConnectorError>;

    /// Delete records tagged with the migration, optionally narrowed by table and kind.
    fn delete_migrated(
        &self,
        migration_id: &MigrationId,
        source_table: Option<&str>,
        kind: Option<RecordKind>,
    ) -> Result<u64, ConnectorError>;
}

/// Whether a record with this provenance matches a delete filter.
pub(crate) fn matches_filter(
    provenance: &Provenance,
    migration_id: &MigrationId,
    source_table: Option<&str>,
) -> bool {
    provenance.migration_id == *migration_id
        && source_table
            .map(|t| provenance.source_table.eq_ignore_ascii_case(t))
            .unwrap_or(true)
}
