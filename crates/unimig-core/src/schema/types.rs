//! Structural model produced by schema analysis.
//!
//! Every descriptor here is an immutable snapshot: re-analysis produces a
//! new [`SchemaAnalysisResult`] rather than mutating an existing one.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::analyzer::AnalysisOptions;
use crate::validation::Impact;

/// Broad storage family of a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFamily {
    Integer,
    Decimal,
    Text,
    Temporal,
    Boolean,
    Uuid,
    Other,
}

impl TypeFamily {
    /// Classify a vendor type name such as `nvarchar(50)` or `BIGINT`.
    pub fn from_declared(declared: &str) -> Self {
        let base = declared
            .trim()
            .to_ascii_lowercase()
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default()
            .to_string();

        match base.as_str() {
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "mediumint" | "serial"
            | "bigserial" | "smallserial" | "int2" | "int4" | "int8" | "long" => {
                TypeFamily::Integer
            }
            "decimal" | "numeric" | "money" | "smallmoney" | "float" | "real" | "double"
            | "float4" | "float8" | "number" => TypeFamily::Decimal,
            "char" | "varchar" | "nchar" | "nvarchar" | "text" | "ntext" | "string" | "clob"
            | "nclob" | "varchar2" | "nvarchar2" | "character" | "citext" | "mediumtext"
            | "longtext" => TypeFamily::Text,
            "date" | "datetime" | "datetime2" | "smalldatetime" | "timestamp" | "timestamptz"
            | "time" | "timetz" | "datetimeoffset" | "interval" => TypeFamily::Temporal,
            "bit" | "bool" | "boolean" => TypeFamily::Boolean,
            "uuid" | "uniqueidentifier" | "guid" => TypeFamily::Uuid,
            _ => TypeFamily::Other,
        }
    }
}

/// Business classification of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnClassification {
    Identifier,
    Name,
    Description,
    Amount,
    Date,
    Flag,
    Reference,
    Other,
}

impl fmt::Display for ColumnClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnClassification::Identifier => "identifier",
            ColumnClassification::Name => "name",
            ColumnClassification::Description => "description",
            ColumnClassification::Amount => "amount",
            ColumnClassification::Date => "date",
            ColumnClassification::Flag => "flag",
            ColumnClassification::Reference => "reference",
            ColumnClassification::Other => "other",
        };
        f.write_str(s)
    }
}

/// Referential action on delete/update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
}

/// Inferred semantics of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Foreign key column is itself unique.
    OneToOne,
    /// Plain foreign key on the many side.
    OneToMany,
    /// One side of a junction table.
    ManyToMany,
    /// Foreign key targeting its own table.
    SelfReferencing,
    /// Self reference through a parent-style column.
    Hierarchical,
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationshipKind::OneToOne => "one-to-one",
            RelationshipKind::OneToMany => "one-to-many",
            RelationshipKind::ManyToMany => "many-to-many",
            RelationshipKind::SelfReferencing => "self-referencing",
            RelationshipKind::Hierarchical => "hierarchical",
        };
        f.write_str(s)
    }
}

/// A source index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// Kind of a table constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Check,
    Unique,
    Default,
}

/// A source constraint other than primary and foreign keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDescriptor {
    pub name: String,
    pub kind: ConstraintKind,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub expression: Option<String>,
}

/// A source trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    pub name: String,
    #[serde(default)]
    pub timing: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub body: String,
}

/// Statistics gathered from sampled rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Rows sampled.
    pub sampled: u64,
    /// True nulls observed.
    pub nulls: u64,
    /// Null-equivalent sentinels observed ("", "NULL", "N/A", ...).
    pub null_sentinels: u64,
    /// Distinct non-null values observed.
    pub distinct: u64,
    /// Text values with leading or trailing whitespace.
    pub untrimmed: u64,
}

impl ColumnStats {
    /// Fraction of sampled values that are null or null-equivalent.
    pub fn null_ratio(&self) -> f64 {
        if self.sampled == 0 {
            0.0
        } else {
            (self.nulls + self.null_sentinels) as f64 / self.sampled as f64
        }
    }
}

/// One analyzed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub type_family: TypeFamily,
    pub nullable: bool,
    pub default: Option<String>,
    pub max_length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub is_identity: bool,
    pub computed: Option<String>,
    pub unique: bool,
    pub classification: ColumnClassification,
    pub business_meaning: String,
    pub suggested_field: String,
    pub confidence: f64,
    /// Name pattern and declared type disagree.
    pub manual_review: bool,
    pub stats: Option<ColumnStats>,
}

/// One analyzed foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub name: Option<String>,
    pub column: String,
    pub target_table: String,
    pub target_column: String,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
    /// `None` when relationship analysis was disabled.
    pub semantics: Option<RelationshipKind>,
}

impl ForeignKeyDescriptor {
    /// Whether the key points back at its own table.
    pub fn is_self_reference(&self, table: &str) -> bool {
        self.target_table.eq_ignore_ascii_case(table)
    }
}

/// Kind of pattern discovered in sampled data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PatternKind {
    LowCardinality { distinct: u64 },
    SequentialKeys,
    UniformLength { length: usize },
    MostlyNull { ratio: f64 },
}

/// A data pattern observed on a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPattern {
    pub column: String,
    pub pattern: PatternKind,
    pub detail: String,
}

/// One analyzed table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    pub indexes: Vec<IndexDescriptor>,
    pub constraints: Vec<ConstraintDescriptor>,
    pub triggers: Vec<TriggerDescriptor>,
    pub row_count: u64,
    pub estimated_size_bytes: u64,
    pub business_purpose: String,
    pub data_patterns: Vec<DataPattern>,
    /// Exactly two foreign keys and no independent business columns.
    pub is_junction: bool,
}

impl TableDescriptor {
    /// Look up a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Whether the column participates in the primary key.
    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key
            .iter()
            .any(|pk| pk.eq_ignore_ascii_case(column))
    }

    /// Whether the column is a foreign key column.
    pub fn is_foreign_key(&self, column: &str) -> bool {
        self.foreign_keys
            .iter()
            .any(|fk| fk.column.eq_ignore_ascii_case(column))
    }

    /// Foreign keys that point at other tables.
    pub fn outgoing_references(&self) -> impl Iterator<Item = &ForeignKeyDescriptor> {
        self.foreign_keys
            .iter()
            .filter(move |fk| !fk.is_self_reference(&self.name))
    }

    /// Whether the column is covered by a single-column unique index or constraint.
    pub fn is_unique(&self, column: &str) -> bool {
        let single_pk = self.primary_key.len() == 1 && self.is_primary_key(column);
        let flagged = self.column(column).map(|c| c.unique).unwrap_or(false);
        let indexed = self.indexes.iter().any(|idx| {
            idx.unique && idx.columns.len() == 1 && idx.columns[0].eq_ignore_ascii_case(column)
        });
        let constrained = self.constraints.iter().any(|c| {
            c.kind == ConstraintKind::Unique
                && c.columns.len() == 1
                && c.columns[0].eq_ignore_ascii_case(column)
        });
        single_pk || flagged || indexed || constrained
    }
}

/// Kind of a business rule extracted from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessRuleKind {
    CheckConstraint,
    DefaultValue,
    ComputedColumn,
    Trigger,
    Uniqueness,
}

impl fmt::Display for BusinessRuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BusinessRuleKind::CheckConstraint => "check constraint",
            BusinessRuleKind::DefaultValue => "default value",
            BusinessRuleKind::ComputedColumn => "computed column",
            BusinessRuleKind::Trigger => "trigger",
            BusinessRuleKind::Uniqueness => "uniqueness",
        };
        f.write_str(s)
    }
}

/// A business rule embedded in the source schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub table: String,
    pub name: String,
    pub kind: BusinessRuleKind,
    pub columns: Vec<String>,
    pub expression: String,
    pub description: String,
}

/// Kind of a data-quality issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssueKind {
    NullSentinelInRequiredColumn,
    MissingPrimaryKey,
    DuplicateKeyValues,
    MostlyNullColumn,
    UntrimmedText,
}

/// One data-quality issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityIssue {
    pub table: String,
    pub column: Option<String>,
    pub kind: QualityIssueKind,
    pub severity: Impact,
    pub message: String,
}

/// Schema-wide data-quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    /// 0-100, starting at 100.
    pub score: u8,
    pub issues: Vec<DataQualityIssue>,
    pub cleanup_required: bool,
}

impl DataQualityReport {
    /// Number of issues at the given severity.
    pub fn count(&self, severity: Impact) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

/// Result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaAnalysisResult {
    pub source_name: String,
    /// blake3 fingerprint of the structural snapshot.
    pub fingerprint: String,
    pub vocabulary_version: String,
    pub tables: Vec<TableDescriptor>,
    pub business_rules: Vec<BusinessRule>,
    pub data_quality: DataQualityReport,
    pub options: AnalysisOptions,
}

impl SchemaAnalysisResult {
    /// Look up a table by name (case-insensitive).
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Total rows across all tables.
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.row_count).sum()
    }

    /// Business rules attached to a table.
    pub fn rules_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a BusinessRule> {
        self.business_rules
            .iter()
            .filter(move |r| r.table.eq_ignore_ascii_case(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_family_from_declared() {
        assert_eq!(TypeFamily::from_declared("nvarchar(50)"), TypeFamily::Text);
        assert_eq!(TypeFamily::from_declared("BIGINT"), TypeFamily::Integer);
        assert_eq!(TypeFamily::from_declared("numeric(19, 6)"), TypeFamily::Decimal);
        assert_eq!(TypeFamily::from_declared("datetime2"), TypeFamily::Temporal);
        assert_eq!(TypeFamily::from_declared("bit"), TypeFamily::Boolean);
        assert_eq!(TypeFamily::from_declared("uniqueidentifier"), TypeFamily::Uuid);
        assert_eq!(TypeFamily::from_declared("geometry"), TypeFamily::Other);
    }

    #[test]
    fn test_null_ratio() {
        let stats = ColumnStats {
            sampled: 10,
            nulls: 3,
            null_sentinels: 2,
            distinct: 4,
            untrimmed: 0,
        };
        assert!((stats.null_ratio() - 0.5).abs() < f64::EPSILON);
        assert_eq!(ColumnStats::default().null_ratio(), 0.0);
    }
}
