//! Subcommands and their handlers.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand, ValueEnum};
use tracing::info;
use unimig_core::migration::{MigrationLog, RollbackScope, ScriptSet};
use unimig_core::{
    AnalysisOptions, Engine, EngineConfig, EntityMappingResult, EntityTypeMapper, ExecutionOptions,
    ExecutionReport, MemorySource, MigrationId, MigrationPlan, MigrationPlanner, MigrationStatus,
    MigrationValidator, PhaseKind, SchemaAnalysisResult, TargetConfig, TargetWriter,
    ValidationConfig,
};

use crate::formatter::Formatter;
use crate::workspace::{self, CliError};

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_dir: PathBuf,
    pub vocabulary: Option<PathBuf>,
}

impl Settings {
    fn engine_config(&self) -> Result<EngineConfig, CliError> {
        let vocabulary = workspace::load_vocabulary(self.vocabulary.as_deref())?;
        Ok(EngineConfig::default().with_vocabulary(vocabulary))
    }
}

/// Rendered command output and whether the command succeeded.
pub struct Output {
    pub text: String,
    pub success: bool,
}

impl Output {
    fn ok(text: String) -> Self {
        Self { text, success: true }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Introspect a source snapshot
    Analyze(AnalyzeArgs),
    /// Map analyzed tables to universal entity types
    Map(MapArgs),
    /// Build a phased migration plan
    Plan(PlanArgs),
    /// Run or resume a plan against the target store
    Execute(ExecuteArgs),
    /// Undo one phase or a whole migration
    Rollback(RollbackArgs),
    /// Show migrations recorded in the log
    Status(StatusArgs),
    /// Validate a mapping, and optionally an execution report
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Source snapshot (JSON)
    #[arg(short, long)]
    pub source: PathBuf,

    /// Where to write the analysis
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Industry hint, e.g. sap
    #[arg(long)]
    pub industry: Option<String>,

    /// Free-text business context
    #[arg(long)]
    pub business_context: Option<String>,

    /// Rows sampled per table for profiling
    #[arg(long, default_value_t = 100)]
    pub sample_rows: usize,

    /// Skip business rule extraction
    #[arg(long)]
    pub no_business_logic: bool,

    /// Skip relationship inference
    #[arg(long)]
    pub no_relationships: bool,

    /// Skip constraint extraction
    #[arg(long)]
    pub no_constraints: bool,
}

#[derive(Args, Debug)]
pub struct MapArgs {
    /// Analysis produced by `analyze`
    #[arg(long)]
    pub schema: PathBuf,

    /// Where to write the mapping
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    #[arg(long)]
    pub industry: Option<String>,

    #[arg(long)]
    pub business_context: Option<String>,

    /// Confidence below which a mapping needs review
    #[arg(long)]
    pub threshold: Option<f64>,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[arg(long)]
    pub schema: PathBuf,

    #[arg(long)]
    pub mapping: PathBuf,

    /// Where to write the plan
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Directory for forward and rollback scripts
    #[arg(long)]
    pub scripts: Option<PathBuf>,

    #[arg(long, default_value_t = 1000)]
    pub batch_size: u64,

    /// Tables migrated concurrently within a phase
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Seconds during which a full rollback is allowed
    #[arg(long, default_value_t = 86_400)]
    pub rollback_window: u64,
}

#[derive(Args, Debug)]
pub struct ExecuteArgs {
    #[arg(short, long)]
    pub source: PathBuf,

    #[arg(long)]
    pub plan: PathBuf,

    /// Target store directory
    #[arg(short, long)]
    pub target: PathBuf,

    /// Where to write the execution report
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Create the universal tables in the target first
    #[arg(long)]
    pub install: bool,

    /// Continue from the last committed batch
    #[arg(long)]
    pub resume: bool,

    /// Read and transform without writing
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    #[arg(long, default_value_t = 100)]
    pub retry_backoff_ms: u64,

    /// Analysis to validate before any data moves
    #[arg(long, requires = "mapping")]
    pub schema: Option<PathBuf>,

    #[arg(long, requires = "schema")]
    pub mapping: Option<PathBuf>,

    /// Stop before the first batch on high-impact data quality issues
    #[arg(long)]
    pub strict: bool,
}

impl AnalyzeArgs {
    fn to_config(&self) -> AnalysisOptions {
        let mut options = AnalysisOptions::default()
            .with_business_logic(!self.no_business_logic)
            .with_relationships(!self.no_relationships)
            .with_constraints(!self.no_constraints)
            .with_sample_rows(self.sample_rows);
        if let Some(industry) = &self.industry {
            options = options.with_industry(industry.clone());
        }
        if let Some(context) = &self.business_context {
            options = options.with_business_context(context.clone());
        }
        options
    }
}

impl PlanArgs {
    fn to_config(&self) -> Result<TargetConfig, CliError> {
        if self.batch_size == 0 || self.workers == 0 {
            return Err(CliError::Usage(
                "batch size and workers must be positive".to_string(),
            ));
        }
        Ok(TargetConfig::default()
            .with_batch_size(self.batch_size)
            .with_parallel_workers(self.workers)
            .with_rollback_window_secs(self.rollback_window))
    }
}

impl ExecuteArgs {
    fn to_config(&self) -> ExecutionOptions {
        ExecutionOptions::default()
            .with_resume(self.resume)
            .with_dry_run(self.dry_run)
            .with_max_retries(self.max_retries)
            .with_retry_backoff_ms(self.retry_backoff_ms)
    }
}

/// Phases that can be rolled back on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PhaseArg {
    MasterData,
    TransactionalData,
    Relationships,
    BusinessLogic,
    Indexes,
}

impl From<PhaseArg> for PhaseKind {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::MasterData => PhaseKind::MasterData,
            PhaseArg::TransactionalData => PhaseKind::TransactionalData,
            PhaseArg::Relationships => PhaseKind::Relationships,
            PhaseArg::BusinessLogic => PhaseKind::BusinessLogic,
            PhaseArg::Indexes => PhaseKind::Indexes,
        }
    }
}

#[derive(Args, Debug)]
pub struct RollbackArgs {
    #[arg(long)]
    pub plan: PathBuf,

    #[arg(short, long)]
    pub target: PathBuf,

    /// Roll back a single phase instead of the whole migration
    #[arg(long, value_enum)]
    pub phase: Option<PhaseArg>,

    /// Ignore the rollback window and dependent phases
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Migration id (hex); lists every migration when omitted
    #[arg(short, long)]
    pub migration: Option<String>,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[arg(long)]
    pub schema: PathBuf,

    #[arg(long)]
    pub mapping: PathBuf,

    /// Execution report produced by `execute`
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Treat high-impact data quality issues as failures
    #[arg(long)]
    pub strict: bool,
}

/// Run a subcommand.
pub fn run(command: Command, settings: &Settings, formatter: &dyn Formatter) -> Result<Output, CliError> {
    match command {
        Command::Analyze(args) => analyze(args, settings, formatter),
        Command::Map(args) => map(args, settings, formatter),
        Command::Plan(args) => plan(args, formatter),
        Command::Execute(args) => execute(args, settings, formatter),
        Command::Rollback(args) => rollback(args, settings, formatter),
        Command::Status(args) => status(args, settings, formatter),
        Command::Validate(args) => validate(args, formatter),
    }
}

fn analyze(args: AnalyzeArgs, settings: &Settings, formatter: &dyn Formatter) -> Result<Output, CliError> {
    let source = workspace::open_source(&args.source)?;
    let config = settings.engine_config()?;

    let options = args.to_config();

    let schema = unimig_core::SchemaAnalyzer::new(Arc::clone(&config.vocabulary))
        .analyze(&source, &options)?;
    if let Some(out) = &args.out {
        workspace::write_json(out, &schema)?;
        info!(path = %out.display(), tables = schema.tables.len(), "Analysis saved");
    }
    Ok(Output::ok(formatter.format_schema(&schema)))
}

fn map(args: MapArgs, settings: &Settings, formatter: &dyn Formatter) -> Result<Output, CliError> {
    let schema: SchemaAnalysisResult = workspace::read_json(&args.schema)?;
    let config = settings.engine_config()?;

    let industry = args.industry.or_else(|| schema.options.industry_context.clone());
    let business = args
        .business_context
        .or_else(|| schema.options.business_context.clone());
    let threshold = args.threshold.unwrap_or(config.confidence_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(CliError::Usage(format!(
            "threshold {} is outside [0, 1]",
            threshold
        )));
    }

    let mapping = EntityTypeMapper::new(config.vocabulary).generate_mapping(
        &schema,
        business.as_deref(),
        industry.as_deref(),
        Some(threshold),
    );
    if let Some(out) = &args.out {
        workspace::write_json(out, &mapping)?;
        info!(path = %out.display(), "Mapping saved");
    }
    Ok(Output::ok(formatter.format_mapping(&mapping)))
}

fn plan(args: PlanArgs, formatter: &dyn Formatter) -> Result<Output, CliError> {
    let schema: SchemaAnalysisResult = workspace::read_json(&args.schema)?;
    let mapping: EntityMappingResult = workspace::read_json(&args.mapping)?;
    let target = args.to_config()?;

    let plan = MigrationPlanner::new().generate_migration_plan(&schema, &mapping, &target)?;
    if let Some(out) = &args.out {
        workspace::write_json(out, &plan)?;
        info!(path = %out.display(), migration_id = %plan.migration_id, "Plan saved");
    }
    if let Some(dir) = &args.scripts {
        let written = ScriptSet::render(&plan).write_to(dir, &plan)?;
        info!(dir = %dir.display(), files = written.len(), "Scripts written");
    }
    Ok(Output::ok(formatter.format_plan(&plan)))
}

fn execute(args: ExecuteArgs, settings: &Settings, formatter: &dyn Formatter) -> Result<Output, CliError> {
    let source = workspace::open_source(&args.source)?;
    let plan: MigrationPlan = workspace::read_json(&args.plan)?;
    let (_target_db, target) = workspace::open_target(&args.target)?;
    if args.install {
        target.install_tables(&plan.target.required_tables())?;
    }
    let log_db = workspace::open_log(&settings.log_dir)?;

    let engine = Engine::with_config(
        Arc::new(source),
        Arc::clone(&target) as Arc<dyn TargetWriter>,
        &log_db,
        settings
            .engine_config()?
            .with_target(plan.target.clone())
            .with_validation(ValidationConfig::default().with_block_on_data_quality(args.strict)),
    )?;
    let options = args.to_config();

    let report = match (&args.schema, &args.mapping) {
        (Some(schema), Some(mapping)) => {
            let schema: SchemaAnalysisResult = workspace::read_json(schema)?;
            let mapping: EntityMappingResult = workspace::read_json(mapping)?;
            engine.execute_validated(&schema, &mapping, &plan, &options)?
        }
        _ => engine.execute(&plan, &options)?,
    };
    target.flush()?;
    log_db.flush()?;

    if let Some(out) = &args.out {
        workspace::write_json(out, &report)?;
    }
    Ok(Output {
        text: formatter.format_execution(&report),
        success: report.complete || (report.dry_run && report.error.is_none()),
    })
}

fn rollback(args: RollbackArgs, settings: &Settings, formatter: &dyn Formatter) -> Result<Output, CliError> {
    let plan: MigrationPlan = workspace::read_json(&args.plan)?;
    let (_target_db, target) = workspace::open_target(&args.target)?;
    let log_db = workspace::open_log(&settings.log_dir)?;

    // rollback never reads the source
    let engine = Engine::with_config(
        Arc::new(MemorySource::new(plan.source_name.clone())),
        Arc::clone(&target) as Arc<dyn TargetWriter>,
        &log_db,
        settings.engine_config()?,
    )?;
    let scope = match args.phase {
        Some(phase) => RollbackScope::Phase(phase.into()),
        None => RollbackScope::Full,
    };

    let report = engine.rollback(&plan, scope, args.force)?;
    target.flush()?;
    log_db.flush()?;
    Ok(Output {
        text: formatter.format_rollback(&report),
        success: report.records_remaining == 0 || scope != RollbackScope::Full,
    })
}

fn status(args: StatusArgs, settings: &Settings, formatter: &dyn Formatter) -> Result<Output, CliError> {
    let log_db = workspace::open_log(&settings.log_dir)?;
    let log = MigrationLog::open(&log_db)?;

    match args.migration {
        Some(raw) => {
            let id: MigrationId = raw
                .parse()
                .map_err(|e| CliError::Usage(format!("invalid migration id {}: {}", raw, e)))?;
            let state = log
                .load_state(&id)?
                .ok_or_else(|| CliError::Usage(format!("no migration {} in {}", id, settings.log_dir.display())))?;
            let tables = log.tables(&id)?;
            Ok(Output {
                text: formatter.format_status(&state, &tables),
                success: state.status != MigrationStatus::Failed,
            })
        }
        None => Ok(Output::ok(formatter.format_states(&log.list_states()?))),
    }
}

fn validate(args: ValidateArgs, formatter: &dyn Formatter) -> Result<Output, CliError> {
    let schema: SchemaAnalysisResult = workspace::read_json(&args.schema)?;
    let mapping: EntityMappingResult = workspace::read_json(&args.mapping)?;
    let validator =
        MigrationValidator::new(ValidationConfig::default().with_block_on_data_quality(args.strict));

    let report = match &args.report {
        Some(path) => {
            let execution: ExecutionReport = workspace::read_json(path)?;
            validator.validate(&schema, &mapping, &execution)
        }
        None => validator.pre_validate(&schema, &mapping),
    };
    Ok(Output {
        text: formatter.format_validation(&report),
        success: !report.is_blocking(),
    })
}
