//! unimig core - schema analysis, entity mapping, and batched migration.
//!
//! This crate converts a conventional relational schema into the universal
//! entity-attribute-value model. Data flows strictly
//! analyzer → mapper → planner → executor → validator:
//!
//! ```ignore
//! use unimig_core::{AnalysisOptions, Engine, ExecutionOptions, TargetConfig};
//!
//! let engine = Engine::new(source, target, &log_db)?;
//! let schema = engine.analyze(&AnalysisOptions::default())?;
//! let mapping = engine.map(&schema, None, Some("sap"), None);
//! let plan = engine.plan(&schema, &mapping, &TargetConfig::default())?;
//! let report = engine.execute(&plan, &ExecutionOptions::default())?;
//! let validation = engine.validate(&schema, &mapping, &report);
//! ```

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod config;
pub mod connector;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod migration;
pub mod schema;
pub mod store;
pub mod validation;
pub mod vocabulary;

pub use config::EngineConfig;
pub use connector::{
    ConnectorError, EntityRecord, MemorySource, MemoryTarget, RecordKind, RelationshipRecord, Row,
    SourceReader, SourceSnapshot, TargetWriter, Value,
};
pub use engine::Engine;
pub use error::Error;
pub use mapping::{
    EntityMapping, EntityMappingResult, EntityTypeMapper, FieldMapping, MappingStrategy,
    StorageTier,
};
pub use migration::{
    CancellationToken, ExecutionOptions, ExecutionReport, MigrationError, MigrationExecutor,
    MigrationId, MigrationLog, MigrationPlan, MigrationPlanner, MigrationStatus, PhaseKind,
    RollbackScope, TargetConfig,
};
pub use schema::{
    AnalysisError, AnalysisOptions, ColumnClassification, ColumnDescriptor, ForeignKeyDescriptor,
    SchemaAnalysisResult, SchemaAnalyzer, TableDescriptor,
};
pub use store::SledTarget;
pub use validation::{
    FindingStatus, Impact, MigrationValidator, ValidationConfig, ValidationFinding,
    ValidationReport,
};
pub use vocabulary::Vocabulary;
