//! Mapping decisions produced per source table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::connector::Value;
use crate::schema::{BusinessRuleKind, ColumnClassification, RelationshipKind};
use crate::validation::{FindingStatus, ValidationFinding};
use crate::vocabulary::EntityCategory;

/// Where a mapped field lives in the universal model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageTier {
    /// Rarely-changing identity fields on the entity row.
    Identity,
    /// Stable, low-cardinality business attributes.
    AttributeMetadata,
    /// Flexible per-tenant properties.
    DynamicProperty,
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageTier::Identity => write!(f, "identity"),
            StorageTier::AttributeMetadata => write!(f, "attribute-metadata"),
            StorageTier::DynamicProperty => write!(f, "dynamic-property"),
        }
    }
}

/// How a table is carried over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStrategy {
    Direct,
    /// Wide tables spread over several attribute groups.
    Split,
    /// Junction tables folded into relationship records.
    Merge,
    /// At least one field needs a value transformation.
    Transform,
}

impl fmt::Display for MappingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingStrategy::Direct => write!(f, "direct"),
            MappingStrategy::Split => write!(f, "split"),
            MappingStrategy::Merge => write!(f, "merge"),
            MappingStrategy::Transform => write!(f, "transform"),
        }
    }
}

/// Value transformation applied while migrating a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transformation {
    Trim,
    ToBoolean,
    ToIsoDate,
    ToDecimal,
}

impl Transformation {
    /// Human-readable expression for scripts and reports.
    pub fn expression(&self, column: &str) -> String {
        match self {
            Transformation::Trim => format!("TRIM({})", column),
            Transformation::ToBoolean => format!(
                "CASE WHEN UPPER({c}) IN ('Y','YES','T','TRUE','1') THEN TRUE ELSE FALSE END",
                c = column
            ),
            Transformation::ToIsoDate => format!("TO_ISO_DATE({})", column),
            Transformation::ToDecimal => format!("CAST({} AS DECIMAL)", column),
        }
    }

    /// Apply to a value. Values that cannot be converted pass through unchanged.
    pub fn apply(&self, value: &Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (Transformation::Trim, Value::Text(s)) => Value::Text(s.trim().to_string()),
            (Transformation::ToBoolean, Value::Text(s)) => {
                match s.trim().to_ascii_uppercase().as_str() {
                    "Y" | "YES" | "T" | "TRUE" | "1" => Value::Bool(true),
                    "N" | "NO" | "F" | "FALSE" | "0" => Value::Bool(false),
                    _ => value.clone(),
                }
            }
            (Transformation::ToBoolean, Value::Int(i)) => Value::Bool(*i != 0),
            (Transformation::ToIsoDate, Value::Text(s)) => {
                iso_date(s.trim()).map(Value::Text).unwrap_or_else(|| value.clone())
            }
            (Transformation::ToIsoDate, Value::Int(i)) => {
                iso_date(&i.to_string()).map(Value::Text).unwrap_or_else(|| value.clone())
            }
            (Transformation::ToDecimal, Value::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| value.clone()),
            (Transformation::ToDecimal, Value::Int(i)) => Value::Float(*i as f64),
            _ => value.clone(),
        }
    }
}

/// `YYYYMMDD` to `YYYY-MM-DD`; already-ISO dates pass through.
fn iso_date(s: &str) -> Option<String> {
    if s.len() == 8 && s.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("{}-{}-{}", &s[0..4], &s[4..6], &s[6..8]));
    }
    let bytes = s.as_bytes();
    if s.len() >= 10 && bytes[4] == b'-' && bytes[7] == b'-' {
        return s.get(..10).map(str::to_string);
    }
    None
}

/// Validation attached to a mapped field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "value")]
pub enum FieldValidation {
    Unique,
    NotNull,
    MaxLength(u32),
}

/// Source column to target field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_column: String,
    pub target_field: String,
    pub tier: StorageTier,
    pub classification: ColumnClassification,
    pub transformation: Option<Transformation>,
    pub validations: Vec<FieldValidation>,
    pub confidence: f64,
}

/// Whether a translated rule is enforced automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enforcement {
    /// Surfaced for review; confirmed by the validation pass before use.
    Advisory,
    /// Procedural logic that needs manual re-implementation.
    Manual,
}

/// A source business rule restated over target fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRuleMapping {
    pub rule_name: String,
    pub kind: BusinessRuleKind,
    pub source_expression: String,
    pub target_expression: String,
    pub target_fields: Vec<String>,
    pub enforcement: Enforcement,
    pub note: String,
}

/// Per-signal scores behind a mapping decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalScores {
    pub table: f64,
    pub column: f64,
    /// `None` when the table has no outgoing foreign keys.
    pub relationship: Option<f64>,
    /// `None` when no industry or business context was supplied.
    pub context: Option<f64>,
}

/// A lower-ranked candidate kept for manual override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeMapping {
    pub entity_type: String,
    pub confidence: f64,
    pub reasoning: String,
}

/// Cardinality note for one foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipNote {
    pub column: String,
    pub target_table: String,
    pub target_column: String,
    pub target_entity_type: Option<String>,
    pub kind: RelationshipKind,
    pub note: String,
}

/// Mapping of one source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMapping {
    pub source_table: String,
    pub entity_type: String,
    pub category: EntityCategory,
    pub confidence: f64,
    pub reasoning: String,
    pub strategy: MappingStrategy,
    /// Source columns that form the upsert key.
    pub natural_key: Vec<String>,
    pub field_mappings: Vec<FieldMapping>,
    pub business_rules: Vec<BusinessRuleMapping>,
    pub relationships: Vec<RelationshipNote>,
    /// At most two, best first.
    pub alternatives: Vec<AlternativeMapping>,
    pub signals: SignalScores,
    pub needs_review: bool,
    pub validation: Vec<ValidationFinding>,
}

impl EntityMapping {
    /// Field mapping for a source column.
    pub fn field(&self, source_column: &str) -> Option<&FieldMapping> {
        self.field_mappings
            .iter()
            .find(|f| f.source_column.eq_ignore_ascii_case(source_column))
    }

    /// Worst validation status recorded on the mapping.
    pub fn validation_status(&self) -> FindingStatus {
        self.validation
            .iter()
            .map(|f| f.status)
            .max()
            .unwrap_or(FindingStatus::Passed)
    }
}

/// Kind of a non-blocking mapping warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingWarningKind {
    /// No vocabulary entry matched; a fallback type was used.
    InsufficientSignal,
    /// Confidence below the review threshold.
    LowConfidence,
    /// No key suitable for idempotent upserts.
    NoNaturalKey,
}

/// A warning surfaced for review. Never blocks the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingWarning {
    pub table: String,
    pub kind: MappingWarningKind,
    pub message: String,
}

/// Mapping of a whole schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMappingResult {
    pub schema_fingerprint: String,
    pub vocabulary_version: String,
    pub industry_context: Option<String>,
    pub business_context: Option<String>,
    pub confidence_threshold: f64,
    /// One per analyzed table, in schema order.
    pub mappings: Vec<EntityMapping>,
    pub warnings: Vec<MappingWarning>,
    pub overall_confidence: f64,
}

impl EntityMappingResult {
    /// Mapping for a source table (case-insensitive).
    pub fn mapping(&self, table: &str) -> Option<&EntityMapping> {
        self.mappings
            .iter()
            .find(|m| m.source_table.eq_ignore_ascii_case(table))
    }

    /// Mappings flagged for manual review.
    pub fn needs_review(&self) -> impl Iterator<Item = &EntityMapping> {
        self.mappings.iter().filter(|m| m.needs_review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_boolean() {
        assert_eq!(Transformation::ToBoolean.apply(&Value::text("Y")), Value::Bool(true));
        assert_eq!(Transformation::ToBoolean.apply(&Value::text("n")), Value::Bool(false));
        assert_eq!(Transformation::ToBoolean.apply(&Value::text("?")), Value::text("?"));
        assert_eq!(Transformation::ToBoolean.apply(&Value::Null), Value::Null);
    }

    #[test]
    fn test_transform_dates_and_decimals() {
        assert_eq!(
            Transformation::ToIsoDate.apply(&Value::text("20240131")),
            Value::text("2024-01-31")
        );
        assert_eq!(
            Transformation::ToIsoDate.apply(&Value::Int(20240131)),
            Value::text("2024-01-31")
        );
        assert_eq!(
            Transformation::ToIsoDate.apply(&Value::text("2024-01-31 10:00:00")),
            Value::text("2024-01-31")
        );
        assert_eq!(
            Transformation::ToDecimal.apply(&Value::text(" 12.50 ")),
            Value::Float(12.5)
        );
        assert_eq!(Transformation::Trim.apply(&Value::text(" a ")), Value::text("a"));
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(StorageTier::AttributeMetadata.to_string(), "attribute-metadata");
        assert_eq!(MappingStrategy::Merge.to_string(), "merge");
    }
}
