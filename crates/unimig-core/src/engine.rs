//! Engine facade over the five pipeline stages.

use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::connector::{SourceReader, TargetWriter};
use crate::error::Error;
use crate::mapping::{EntityMappingResult, EntityTypeMapper};
use crate::migration::{
    ExecutionOptions, ExecutionReport, MigrationError, MigrationExecutor, MigrationId,
    MigrationPlan, MigrationPlanner, MigrationState, RollbackReport, RollbackScope, ScriptSet,
    TargetConfig,
};
use crate::schema::{AnalysisError, AnalysisOptions, SchemaAnalysisResult, SchemaAnalyzer};
use crate::validation::{MigrationValidator, ValidationReport};

/// Analyze, map, plan, execute and validate against one source and target.
pub struct Engine {
    config: EngineConfig,
    source: Arc<dyn SourceReader>,
    analyzer: SchemaAnalyzer,
    mapper: EntityTypeMapper,
    planner: MigrationPlanner,
    executor: MigrationExecutor,
    validator: MigrationValidator,
}

impl Engine {
    /// Create an engine with the default configuration.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        log_db: &sled::Db,
    ) -> Result<Self, Error> {
        Self::with_config(source, target, log_db, EngineConfig::default())
    }

    /// Create an engine; the migration log lives in `log_db`.
    pub fn with_config(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        log_db: &sled::Db,
        config: EngineConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let executor = MigrationExecutor::new(Arc::clone(&source), target, log_db)?;
        info!(
            source = %source.name(),
            vocabulary = %config.vocabulary.version,
            "Engine ready"
        );
        Ok(Self {
            analyzer: SchemaAnalyzer::new(Arc::clone(&config.vocabulary)),
            mapper: EntityTypeMapper::new(Arc::clone(&config.vocabulary)),
            planner: MigrationPlanner::new(),
            validator: MigrationValidator::new(config.validation.clone()),
            executor,
            source,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Introspect the source.
    pub fn analyze(&self, options: &AnalysisOptions) -> Result<SchemaAnalysisResult, AnalysisError> {
        self.analyzer.analyze(self.source.as_ref(), options)
    }

    /// Map every analyzed table to a universal entity type.
    ///
    /// Without an explicit threshold the configured one applies.
    pub fn map(
        &self,
        schema: &SchemaAnalysisResult,
        business_context: Option<&str>,
        industry_context: Option<&str>,
        confidence_threshold: Option<f64>,
    ) -> EntityMappingResult {
        self.mapper.generate_mapping(
            schema,
            business_context,
            industry_context,
            Some(confidence_threshold.unwrap_or(self.config.confidence_threshold)),
        )
    }

    /// Build a migration plan.
    pub fn plan(
        &self,
        schema: &SchemaAnalysisResult,
        mapping: &EntityMappingResult,
        target: &TargetConfig,
    ) -> Result<MigrationPlan, MigrationError> {
        self.planner.generate_migration_plan(schema, mapping, target)
    }

    /// Render forward and rollback scripts for a plan.
    pub fn scripts(&self, plan: &MigrationPlan) -> ScriptSet {
        ScriptSet::render(plan)
    }

    /// Run a plan, or resume it from its checkpoints.
    pub fn execute(
        &self,
        plan: &MigrationPlan,
        options: &ExecutionOptions,
    ) -> Result<ExecutionReport, MigrationError> {
        self.executor.execute(plan, options)
    }

    /// Run a plan behind the pre-migration validation of its schema and
    /// mapping. With blocking data-quality checks configured, a failed
    /// check stops the run before the first batch.
    pub fn execute_validated(
        &self,
        schema: &SchemaAnalysisResult,
        mapping: &EntityMappingResult,
        plan: &MigrationPlan,
        options: &ExecutionOptions,
    ) -> Result<ExecutionReport, MigrationError> {
        let pre = self.validator.pre_validate(schema, mapping);
        let options = options.clone().with_pre_validation(pre.findings);
        self.executor.execute(plan, &options)
    }

    /// Checks that need only the analysis and the mapping.
    pub fn pre_validate(
        &self,
        schema: &SchemaAnalysisResult,
        mapping: &EntityMappingResult,
    ) -> ValidationReport {
        self.validator.pre_validate(schema, mapping)
    }

    /// Validate an executed migration.
    pub fn validate(
        &self,
        schema: &SchemaAnalysisResult,
        mapping: &EntityMappingResult,
        report: &ExecutionReport,
    ) -> ValidationReport {
        self.validator.validate(schema, mapping, report)
    }

    pub fn rollback(
        &self,
        plan: &MigrationPlan,
        scope: RollbackScope,
        force: bool,
    ) -> Result<RollbackReport, MigrationError> {
        self.executor.rollback(plan, scope, force)
    }

    pub fn status(&self, migration_id: &MigrationId) -> Result<MigrationState, MigrationError> {
        self.executor.status(migration_id)
    }

    pub fn list_migrations(&self) -> Result<Vec<MigrationState>, MigrationError> {
        self.executor.list_migrations()
    }
}
