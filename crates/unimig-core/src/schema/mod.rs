//! Schema analysis: introspection, column classification, relationship
//! shapes and data-quality scoring.

pub mod analyzer;
pub mod classifier;
pub mod quality;
pub mod types;

pub use analyzer::{AnalysisError, AnalysisOptions, SchemaAnalyzer};
pub use classifier::{Classification, ColumnClassifier, KeyRole};
pub use types::{
    BusinessRule, BusinessRuleKind, ColumnClassification, ColumnDescriptor, ColumnStats,
    ConstraintDescriptor, ConstraintKind, DataPattern, DataQualityIssue, DataQualityReport,
    ForeignKeyDescriptor, IndexDescriptor, PatternKind, QualityIssueKind, ReferentialAction,
    RelationshipKind, SchemaAnalysisResult, TableDescriptor, TriggerDescriptor, TypeFamily,
};
