//! Entity-type mapping: multi-signal scoring, field tiering and rule
//! translation.

pub mod mapper;
pub mod scoring;
pub mod types;

pub use mapper::{natural_key, EntityTypeMapper, DEFAULT_CONFIDENCE_THRESHOLD};
pub use types::{
    AlternativeMapping, BusinessRuleMapping, Enforcement, EntityMapping, EntityMappingResult,
    FieldMapping, FieldValidation, MappingStrategy, MappingWarning, MappingWarningKind,
    RelationshipNote, SignalScores, StorageTier, Transformation,
};
