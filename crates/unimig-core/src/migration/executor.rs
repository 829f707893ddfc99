//! Migration executor - runs a plan phase by phase.
//!
//! Phases run strictly in order. Tables inside a data phase are grouped into
//! dependency waves and spread over a bounded pool of scoped threads; the
//! batches of one table always commit in sequence so its checkpoint stays
//! monotonic.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::MigrationError;
use super::plan::{CheckKind, MigrationPhase, MigrationPlan, PhaseKind, TablePlan, WorkKind};
use super::state::{
    encode_cursor, BatchRecord, BatchStatus, MigrationLog, MigrationState, MigrationStatus,
    PhaseProgress, PhaseStatus, TableRecord,
};
use super::transform;
use crate::connector::{
    ArtifactRecord, BatchCursor, ConnectorError, IndexRecord, Provenance, RecordKind,
    SourceReader, TargetWriter,
};
use crate::store::key::{current_timestamp, record_id, MigrationId};
use crate::validation::{FindingStatus, Impact, ValidationFinding};

/// Cooperative cancellation signal, observed between batches and phases.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The batch in flight still commits.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-run execution options.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Continue from the persisted checkpoints of an earlier run.
    pub resume: bool,
    /// Read and transform, but never write to the target or the log.
    pub dry_run: bool,
    /// Extra attempts for a failing batch before the phase fails.
    pub max_retries: u32,
    /// Backoff before retry `n` is `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
    pub cancellation: CancellationToken,
    /// Findings of a pre-migration validation. A failed finding stops the
    /// run in the pre-validation phase, before any data moves.
    pub pre_validation: Vec<ValidationFinding>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            resume: false,
            dry_run: false,
            max_retries: 3,
            retry_backoff_ms: 100,
            cancellation: CancellationToken::new(),
            pre_validation: Vec::new(),
        }
    }
}

impl ExecutionOptions {
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_pre_validation(mut self, findings: Vec<ValidationFinding>) -> Self {
        self.pre_validation = findings;
        self
    }
}

/// Outcome for one table within a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    pub phase: PhaseKind,
    pub table: String,
    pub work: WorkKind,
    pub status: PhaseStatus,
    pub batches_planned: u64,
    pub batches_committed: u64,
    pub rows_read: u64,
    /// Records written (or, in a dry run, that would have been written).
    pub rows_written: u64,
    pub rows_rejected: u64,
    /// First batch of this run when it picked up from a checkpoint.
    pub resumed_from_batch: Option<u64>,
    pub retries: u32,
    pub error: Option<String>,
}

impl TableReport {
    fn new(phase: PhaseKind, table: &TablePlan) -> Self {
        Self {
            phase,
            table: table.source_table.clone(),
            work: table.work,
            status: PhaseStatus::Running,
            batches_planned: table.batch.batch_count,
            batches_committed: 0,
            rows_read: 0,
            rows_written: 0,
            rows_rejected: 0,
            resumed_from_batch: None,
            retries: 0,
            error: None,
        }
    }

    /// A table finished by an earlier run.
    fn carried_over(phase: PhaseKind, table: &TablePlan, record: &TableRecord) -> Self {
        Self {
            status: record.status,
            batches_committed: record.batches_committed,
            rows_read: record.rows_read,
            rows_written: record.rows_written,
            rows_rejected: record.rows_rejected,
            ..Self::new(phase, table)
        }
    }
}

/// Outcome for one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: PhaseKind,
    pub status: PhaseStatus,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub rows_written: u64,
    pub batches_committed: u64,
    pub error: Option<String>,
}

impl From<&PhaseProgress> for PhaseReport {
    fn from(p: &PhaseProgress) -> Self {
        Self {
            phase: p.phase,
            status: p.status,
            started_at: p.started_at,
            completed_at: p.completed_at,
            rows_written: p.rows_processed,
            batches_committed: p.batches_committed,
            error: p.error.clone(),
        }
    }
}

/// Result of one execution run. Produced whether or not the run succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub migration_id: MigrationId,
    pub source_name: String,
    pub status: MigrationStatus,
    /// True only when every phase and every post-migration check passed.
    pub complete: bool,
    pub dry_run: bool,
    pub started_at: u64,
    pub completed_at: u64,
    pub phases: Vec<PhaseReport>,
    pub tables: Vec<TableReport>,
    pub findings: Vec<ValidationFinding>,
    /// Earliest batch a resumed table restarted at.
    pub resumed_from_batch: Option<u64>,
    pub error: Option<String>,
}

impl ExecutionReport {
    pub fn phase(&self, kind: PhaseKind) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == kind)
    }

    /// Report for a table, preferring its entity work over link work.
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        let matches = |t: &&TableReport| t.table.eq_ignore_ascii_case(name);
        self.tables
            .iter()
            .filter(matches)
            .find(|t| t.work == WorkKind::Entities)
            .or_else(|| self.tables.iter().find(matches))
    }

    pub fn total_rows_written(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_written).sum()
    }

    pub fn failed_findings(&self) -> impl Iterator<Item = &ValidationFinding> {
        self.findings
            .iter()
            .filter(|f| f.status == FindingStatus::Failed)
    }
}

/// What to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "phase")]
pub enum RollbackScope {
    /// Undo one data phase.
    Phase(PhaseKind),
    /// Emergency rollback of everything tagged with the migration.
    Full,
}

impl fmt::Display for RollbackScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackScope::Phase(kind) => write!(f, "phase {}", kind),
            RollbackScope::Full => write!(f, "full"),
        }
    }
}

/// Result of a rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub migration_id: MigrationId,
    pub scope: RollbackScope,
    pub phases: Vec<PhaseKind>,
    pub records_deleted: u64,
    /// Records still tagged with the migration afterwards.
    pub records_remaining: u64,
}

enum PhaseOutcome {
    Complete { rows: u64, batches: u64 },
    Cancelled,
    Failed(String),
}

struct BatchOutcome {
    rows: u64,
    written: u64,
    rejected: u64,
    cursor: Option<BatchCursor>,
}

/// Runs migration plans against a source and a target.
pub struct MigrationExecutor {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    log: MigrationLog,
}

impl MigrationExecutor {
    /// Create an executor whose log lives in `db`.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        db: &sled::Db,
    ) -> Result<Self, MigrationError> {
        Ok(Self {
            source,
            target,
            log: MigrationLog::open(db)?,
        })
    }

    pub fn log(&self) -> &MigrationLog {
        &self.log
    }

    /// Persisted state of a migration.
    pub fn status(&self, migration_id: &MigrationId) -> Result<MigrationState, MigrationError> {
        self.log
            .load_state(migration_id)?
            .ok_or(MigrationError::MigrationNotFound {
                migration_id: *migration_id,
            })
    }

    pub fn list_migrations(&self) -> Result<Vec<MigrationState>, MigrationError> {
        self.log.list_states()
    }

    /// Execute a plan.
    ///
    /// Connectivity, missing target tables and unmet phase dependencies are
    /// returned as errors before anything is written. Every other outcome,
    /// including failed batches and failed post-migration checks, comes back
    /// as a report.
    pub fn execute(
        &self,
        plan: &MigrationPlan,
        options: &ExecutionOptions,
    ) -> Result<ExecutionReport, MigrationError> {
        plan.validate()?;
        let id = plan.migration_id;
        let started_at = current_timestamp();

        let previous = self.log.load_state(&id)?;
        let resuming = options.resume
            && !options.dry_run
            && previous.as_ref().map(MigrationState::can_resume).unwrap_or(false);
        let mut state = match previous {
            Some(state) if resuming => state,
            _ => MigrationState::new(id, &plan.source_name, options.dry_run),
        };

        self.preflight(plan, &state, resuming)?;

        if !options.dry_run && !resuming {
            self.log.clear(&id)?;
        }
        state.start();
        self.persist(&state, options)?;
        info!(
            migration_id = %id,
            source = %plan.source_name,
            resume = resuming,
            dry_run = options.dry_run,
            "Starting migration"
        );

        let mut tables: Vec<TableReport> = Vec::new();
        let mut findings: Vec<ValidationFinding> = Vec::new();
        let mut halted: Option<(MigrationStatus, String)> = None;

        for phase in &plan.phases {
            if options.cancellation.is_cancelled() {
                if let Some(p) = state.phase_mut(phase.kind) {
                    p.finish(PhaseStatus::Cancelled);
                }
                halted = Some((
                    MigrationStatus::Cancelled,
                    format!("cancelled before phase {}", phase.kind),
                ));
                break;
            }
            let already_done = state
                .phase(phase.kind)
                .map(|p| p.status == PhaseStatus::Complete)
                .unwrap_or(false);
            if resuming && already_done {
                debug!(migration_id = %id, phase = %phase.kind, "Phase already complete");
                continue;
            }
            if let Some(dependency) = phase
                .depends_on
                .iter()
                .copied()
                .find(|dep| state.phase(*dep).map(|p| p.status) != Some(PhaseStatus::Complete))
            {
                let err = MigrationError::DependencyUnmet {
                    phase: phase.kind,
                    dependency,
                };
                halted = Some((MigrationStatus::Failed, err.to_string()));
                break;
            }

            if let Some(p) = state.phase_mut(phase.kind) {
                p.start();
            }
            self.persist(&state, options)?;
            info!(migration_id = %id, phase = %phase.kind, "Phase started");

            let outcome = match phase.kind {
                PhaseKind::PreValidation => {
                    let checks = if options.pre_validation.is_empty() {
                        pre_findings(plan)
                    } else {
                        options.pre_validation.clone()
                    };
                    let blocking: Vec<String> = checks
                        .iter()
                        .filter(|f| f.status == FindingStatus::Failed)
                        .map(|f| format!("{}: {}", f.check, f.message))
                        .collect();
                    findings.extend(checks);
                    if blocking.is_empty() {
                        PhaseOutcome::Complete { rows: 0, batches: 0 }
                    } else {
                        PhaseOutcome::Failed(format!(
                            "pre-migration validation failed: {}",
                            blocking.join("; ")
                        ))
                    }
                }
                PhaseKind::MasterData
                | PhaseKind::TransactionalData
                | PhaseKind::Relationships => {
                    let reports = self.run_data_phase(plan, phase, options, resuming)?;
                    let outcome = data_outcome(&reports);
                    for report in reports.iter().filter(|r| r.status == PhaseStatus::Failed) {
                        findings.push(
                            ValidationFinding::failed(
                                "execution",
                                Impact::High,
                                report.error.clone().unwrap_or_default(),
                                "fix the cause and resume from the last checkpoint",
                            )
                            .for_table(report.table.clone()),
                        );
                    }
                    tables.extend(reports);
                    outcome
                }
                PhaseKind::BusinessLogic => self.run_artifacts(plan, phase, options),
                PhaseKind::Indexes => self.run_indexes(plan, phase, options),
                PhaseKind::PostValidation => {
                    if options.dry_run {
                        PhaseOutcome::Complete { rows: 0, batches: 0 }
                    } else {
                        findings.extend(self.post_findings(plan, phase)?);
                        PhaseOutcome::Complete { rows: 0, batches: 0 }
                    }
                }
            };

            let Some(progress) = state.phase_mut(phase.kind) else {
                continue;
            };
            match outcome {
                PhaseOutcome::Complete { rows, batches } => {
                    progress.rows_processed = rows;
                    progress.batches_committed = batches;
                    progress.finish(PhaseStatus::Complete);
                    info!(migration_id = %id, phase = %phase.kind, rows, batches, "Phase complete");
                    self.persist(&state, options)?;
                }
                PhaseOutcome::Cancelled => {
                    progress.finish(PhaseStatus::Cancelled);
                    warn!(migration_id = %id, phase = %phase.kind, "Phase cancelled");
                    halted = Some((
                        MigrationStatus::Cancelled,
                        format!("cancelled during phase {}", phase.kind),
                    ));
                    break;
                }
                PhaseOutcome::Failed(message) => {
                    progress.fail(message.clone());
                    warn!(migration_id = %id, phase = %phase.kind, error = %message, "Phase failed");
                    halted = Some((MigrationStatus::Failed, message));
                    break;
                }
            }
        }

        let (status, error) = match halted {
            Some((MigrationStatus::Cancelled, message)) => {
                findings.push(ValidationFinding::warning(
                    "cancellation",
                    Impact::Medium,
                    message.clone(),
                    "resume the migration to continue from the last checkpoint",
                ));
                (MigrationStatus::Cancelled, Some(message))
            }
            Some((status, message)) => (status, Some(message)),
            None => {
                let failed: Vec<&ValidationFinding> = findings
                    .iter()
                    .filter(|f| f.status == FindingStatus::Failed)
                    .collect();
                if failed.is_empty() {
                    (MigrationStatus::Complete, None)
                } else {
                    let message = failed
                        .iter()
                        .map(|f| f.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; ");
                    let err = MigrationError::ValidationFailed { message };
                    (MigrationStatus::ValidationFailed, Some(err.to_string()))
                }
            }
        };
        state.finish(status, error.clone());
        self.persist(&state, options)?;
        if !options.dry_run {
            self.log.flush()?;
        }

        let report = ExecutionReport {
            migration_id: id,
            source_name: plan.source_name.clone(),
            status,
            complete: status == MigrationStatus::Complete && !options.dry_run,
            dry_run: options.dry_run,
            started_at,
            completed_at: current_timestamp(),
            phases: state.phases.iter().map(PhaseReport::from).collect(),
            resumed_from_batch: tables.iter().filter_map(|t| t.resumed_from_batch).min(),
            tables,
            findings,
            error,
        };
        info!(
            migration_id = %id,
            status = %report.status,
            rows = report.total_rows_written(),
            "Migration finished"
        );
        Ok(report)
    }

    /// Undo a phase, or everything tagged with the migration.
    ///
    /// A full rollback is refused once the emergency window has passed, and a
    /// phase rollback is refused while a dependent phase still holds data,
    /// unless `force` is set.
    pub fn rollback(
        &self,
        plan: &MigrationPlan,
        scope: RollbackScope,
        force: bool,
    ) -> Result<RollbackReport, MigrationError> {
        let id = plan.migration_id;
        let mut state = self.status(&id)?;
        let mut deleted = 0;
        let mut phases = Vec::new();

        match scope {
            RollbackScope::Full => {
                let window_secs = plan.rollback.emergency_window_secs;
                let elapsed_secs = state
                    .started_at
                    .map(|t| current_timestamp().saturating_sub(t) / 1_000_000)
                    .unwrap_or(0);
                if elapsed_secs > window_secs && !force {
                    return Err(MigrationError::RollbackWindowExpired {
                        migration_id: id,
                        elapsed_secs,
                        window_secs,
                    });
                }
                for undo in &plan.rollback.phases {
                    deleted += self.undo_phase(&id, undo.phase, plan)?;
                    phases.push(undo.phase);
                }
                deleted += self
                    .target
                    .delete_migrated(&id, None, None)
                    .map_err(MigrationError::from_connector)?;
                self.log.clear(&id)?;
                for progress in state.phases.iter_mut() {
                    progress.finish(PhaseStatus::RolledBack);
                }
            }
            RollbackScope::Phase(kind) => {
                if plan.rollback.for_phase(kind).is_none() {
                    return Err(MigrationError::InvalidPlan {
                        message: format!("phase {} has no rollback path", kind),
                    });
                }
                if !force {
                    let holding = plan.phases.iter().find(|p| {
                        p.kind.writes_data()
                            && p.depends_on.contains(&kind)
                            && matches!(
                                state.phase(p.kind).map(|s| s.status),
                                Some(PhaseStatus::Complete | PhaseStatus::Running | PhaseStatus::Failed)
                            )
                    });
                    if let Some(dependent) = holding {
                        return Err(MigrationError::DependencyUnmet {
                            phase: dependent.kind,
                            dependency: kind,
                        });
                    }
                }
                deleted += self.undo_phase(&id, kind, plan)?;
                self.log.clear_phase(&id, kind)?;
                phases.push(kind);
                if let Some(progress) = state.phase_mut(kind) {
                    progress.finish(PhaseStatus::RolledBack);
                }
                if let Some(post) = state.phase_mut(PhaseKind::PostValidation) {
                    *post = PhaseProgress::new(PhaseKind::PostValidation);
                }
            }
        }

        state.finish(MigrationStatus::RolledBack, None);
        self.log.save_state(&state)?;
        self.log.flush()?;

        let remaining = self
            .target
            .count_tagged(&id)
            .map_err(MigrationError::from_connector)?;
        info!(
            migration_id = %id,
            scope = %scope,
            deleted,
            remaining,
            "Rollback finished"
        );
        Ok(RollbackReport {
            migration_id: id,
            scope,
            phases,
            records_deleted: deleted,
            records_remaining: remaining,
        })
    }

    fn undo_phase(
        &self,
        id: &MigrationId,
        kind: PhaseKind,
        plan: &MigrationPlan,
    ) -> Result<u64, MigrationError> {
        let Some(undo) = plan.rollback.for_phase(kind) else {
            return Ok(0);
        };
        let mut deleted = 0;
        for step in &undo.steps {
            let n = self
                .target
                .delete_migrated(id, step.table.as_deref(), Some(step.kind))
                .map_err(MigrationError::from_connector)?;
            debug!(
                migration_id = %id,
                phase = %kind,
                table = step.table.as_deref().unwrap_or("-"),
                kind = %step.kind,
                deleted = n,
                "Rollback step"
            );
            deleted += n;
        }
        Ok(deleted)
    }

    fn preflight(
        &self,
        plan: &MigrationPlan,
        state: &MigrationState,
        resuming: bool,
    ) -> Result<(), MigrationError> {
        self.source.ping().map_err(MigrationError::from_connector)?;
        let missing = self
            .target
            .missing_tables(&plan.target.required_tables())
            .map_err(MigrationError::from_connector)?;
        if !missing.is_empty() {
            return Err(MigrationError::TargetSchemaMissing { missing });
        }
        if resuming {
            for phase in &plan.phases {
                let done = |kind: PhaseKind| {
                    state.phase(kind).map(|p| p.status) == Some(PhaseStatus::Complete)
                };
                if !done(phase.kind) {
                    continue;
                }
                if let Some(dependency) = phase.depends_on.iter().copied().find(|d| !done(*d)) {
                    return Err(MigrationError::DependencyUnmet {
                        phase: phase.kind,
                        dependency,
                    });
                }
            }
        }
        Ok(())
    }

    fn persist(&self, state: &MigrationState, options: &ExecutionOptions) -> Result<(), MigrationError> {
        if options.dry_run {
            return Ok(());
        }
        self.log.save_state(state)
    }

    fn run_data_phase(
        &self,
        plan: &MigrationPlan,
        phase: &MigrationPhase,
        options: &ExecutionOptions,
        resuming: bool,
    ) -> Result<Vec<TableReport>, MigrationError> {
        let done: HashMap<String, TableRecord> = if resuming {
            self.log
                .tables(&plan.migration_id)?
                .into_iter()
                .filter(|t| t.phase == phase.kind && t.status == PhaseStatus::Complete)
                .map(|t| (t.table.to_ascii_lowercase(), t))
                .collect()
        } else {
            HashMap::new()
        };

        let mut finished: HashSet<String> = HashSet::new();
        let mut pending: Vec<&TablePlan> = phase.tables.iter().collect();
        let mut reports = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let (mut wave, mut rest): (Vec<&TablePlan>, Vec<&TablePlan>) =
                pending.into_iter().partition(|t| {
                    t.depends_on
                        .iter()
                        .all(|d| finished.contains(&d.to_ascii_lowercase()))
                });
            if wave.is_empty() {
                wave = std::mem::take(&mut rest);
            }
            pending = rest;

            let results = self.run_wave(plan, phase.kind, &wave, options, resuming, &done)?;
            let all_complete = results.iter().all(|r| r.status == PhaseStatus::Complete);
            finished.extend(
                results
                    .iter()
                    .filter(|r| r.status == PhaseStatus::Complete)
                    .map(|r| r.table.to_ascii_lowercase()),
            );
            reports.extend(results);
            if !all_complete {
                break;
            }
        }
        Ok(reports)
    }

    fn run_wave(
        &self,
        plan: &MigrationPlan,
        kind: PhaseKind,
        wave: &[&TablePlan],
        options: &ExecutionOptions,
        resuming: bool,
        done: &HashMap<String, TableRecord>,
    ) -> Result<Vec<TableReport>, MigrationError> {
        let workers = plan.target.parallel_workers.clamp(1, wave.len().max(1));
        let queue: Mutex<VecDeque<(usize, &TablePlan)>> =
            Mutex::new(wave.iter().copied().enumerate().collect());
        let results: Mutex<Vec<(usize, Result<TableReport, MigrationError>)>> =
            Mutex::new(Vec::with_capacity(wave.len()));

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let next = queue.lock().pop_front();
                    let Some((idx, table)) = next else {
                        break;
                    };
                    let result = match done.get(&table.source_table.to_ascii_lowercase()) {
                        Some(record) => Ok(TableReport::carried_over(kind, table, record)),
                        None => self.run_table(plan, kind, table, options, resuming),
                    };
                    results.lock().push((idx, result));
                });
            }
        });

        let mut results = results.into_inner();
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, r)| r).collect()
    }

    /// Move one table batch by batch from its cursor to the end.
    fn run_table(
        &self,
        plan: &MigrationPlan,
        phase: PhaseKind,
        table: &TablePlan,
        options: &ExecutionOptions,
        resuming: bool,
    ) -> Result<TableReport, MigrationError> {
        let id = plan.migration_id;
        let mut report = TableReport::new(phase, table);
        let mut cursor: Option<BatchCursor> = None;
        let mut batch_no = 0u64;

        if resuming {
            if let Some(checkpoint) = self.log.latest_checkpoint(&id, phase, &table.source_table)? {
                cursor = checkpoint.cursor()?;
                batch_no = checkpoint.batch_no;
                report.batches_committed = checkpoint.batch_no;
                report.rows_read = checkpoint.total_read;
                report.rows_written = checkpoint.total_written;
                report.rows_rejected = checkpoint.total_rejected;
                report.resumed_from_batch = Some(checkpoint.batch_no + 1);
                info!(
                    migration_id = %id,
                    phase = %phase,
                    table = %table.source_table,
                    batch = checkpoint.batch_no + 1,
                    "Resuming table from checkpoint"
                );
            }
        }

        let mut record = TableRecord {
            migration_id: *id.as_bytes(),
            phase,
            table: table.source_table.clone(),
            status: PhaseStatus::Running,
            batches_committed: report.batches_committed,
            rows_read: report.rows_read,
            rows_written: report.rows_written,
            rows_rejected: report.rows_rejected,
            started_at: current_timestamp(),
            completed_at: None,
            error: None,
        };
        if !options.dry_run {
            self.log.record_table(&record)?;
        }
        debug!(migration_id = %id, phase = %phase, table = %table.source_table, work = %table.work, "Table started");

        let limit = usize::try_from(table.batch.batch_size).unwrap_or(usize::MAX).max(1);
        loop {
            if options.cancellation.is_cancelled() {
                report.status = PhaseStatus::Cancelled;
                break;
            }
            let next = batch_no + 1;
            let batch_started = current_timestamp();

            let mut attempts = 0u32;
            let result = loop {
                attempts += 1;
                match self.transfer(plan, table, cursor.as_ref(), next, limit, options.dry_run) {
                    Ok(outcome) => break Ok(outcome),
                    Err(err) if attempts <= options.max_retries => {
                        warn!(
                            migration_id = %id,
                            phase = %phase,
                            table = %table.source_table,
                            batch = next,
                            attempt = attempts,
                            error = %err,
                            "Batch failed, retrying"
                        );
                        report.retries += 1;
                        if options.retry_backoff_ms > 0 {
                            std::thread::sleep(Duration::from_millis(
                                options.retry_backoff_ms * u64::from(attempts),
                            ));
                        }
                    }
                    Err(err) => break Err(err),
                }
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    let failure = MigrationError::BatchFailed {
                        table: table.source_table.clone(),
                        batch_no: next,
                        attempts,
                        reason: err.to_string(),
                    };
                    if !options.dry_run {
                        self.log.record_batch(&BatchRecord {
                            migration_id: *id.as_bytes(),
                            phase,
                            table: table.source_table.clone(),
                            batch_no: next,
                            rows_read: 0,
                            rows_written: 0,
                            rows_rejected: 0,
                            total_read: report.rows_read,
                            total_written: report.rows_written,
                            total_rejected: report.rows_rejected,
                            cursor: None,
                            status: BatchStatus::Failed,
                            attempts,
                            started_at: batch_started,
                            completed_at: current_timestamp(),
                            error: Some(err.to_string()),
                        })?;
                    }
                    warn!(migration_id = %id, phase = %phase, table = %table.source_table, batch = next, error = %failure, "Batch escalated");
                    report.status = PhaseStatus::Failed;
                    report.error = Some(failure.to_string());
                    break;
                }
            };

            if outcome.rows == 0 {
                break;
            }
            batch_no = next;
            report.batches_committed = batch_no;
            report.rows_read += outcome.rows;
            report.rows_written += outcome.written;
            report.rows_rejected += outcome.rejected;
            if outcome.cursor.is_some() {
                cursor = outcome.cursor;
            }

            if !options.dry_run {
                let encoded = cursor.as_ref().map(encode_cursor).transpose()?;
                self.log.record_batch(&BatchRecord {
                    migration_id: *id.as_bytes(),
                    phase,
                    table: table.source_table.clone(),
                    batch_no,
                    rows_read: outcome.rows,
                    rows_written: outcome.written,
                    rows_rejected: outcome.rejected,
                    total_read: report.rows_read,
                    total_written: report.rows_written,
                    total_rejected: report.rows_rejected,
                    cursor: encoded,
                    status: BatchStatus::Committed,
                    attempts,
                    started_at: batch_started,
                    completed_at: current_timestamp(),
                    error: None,
                })?;
            }
            debug!(
                migration_id = %id,
                phase = %phase,
                table = %table.source_table,
                batch = batch_no,
                rows = outcome.rows,
                written = outcome.written,
                rejected = outcome.rejected,
                "Batch committed"
            );

            if outcome.rows < limit as u64 {
                break;
            }
        }

        if report.status == PhaseStatus::Running {
            report.status = PhaseStatus::Complete;
        }
        record.status = report.status;
        record.batches_committed = report.batches_committed;
        record.rows_read = report.rows_read;
        record.rows_written = report.rows_written;
        record.rows_rejected = report.rows_rejected;
        record.completed_at = Some(current_timestamp());
        record.error = report.error.clone();
        if !options.dry_run {
            self.log.record_table(&record)?;
        }
        info!(
            migration_id = %id,
            phase = %phase,
            table = %table.source_table,
            status = %report.status,
            batches = report.batches_committed,
            rows = report.rows_written,
            rejected = report.rows_rejected,
            "Table finished"
        );
        Ok(report)
    }

    /// Read, transform and write one batch.
    fn transfer(
        &self,
        plan: &MigrationPlan,
        table: &TablePlan,
        cursor: Option<&BatchCursor>,
        batch_no: u64,
        limit: usize,
        dry_run: bool,
    ) -> Result<BatchOutcome, ConnectorError> {
        let rows = self
            .source
            .read_batch(&table.source_table, &table.batch.order_key, cursor, limit)?;
        let next_cursor = BatchCursor::after(&rows, &table.batch.order_key, cursor);
        let id = &plan.migration_id;

        let (written, rejected) = match table.work {
            WorkKind::Entities => {
                let out = transform::entities(table, &rows, id, batch_no);
                let written = if dry_run || out.records.is_empty() {
                    out.records.len()
                } else {
                    self.target.upsert_entities(&out.records)?
                };
                (written, out.rejected)
            }
            WorkKind::ReferenceLinks | WorkKind::JunctionLinks => {
                let out = if table.work == WorkKind::ReferenceLinks {
                    transform::reference_links(table, &rows, id, batch_no)
                } else {
                    transform::junction_links(table, &rows, id, batch_no)
                };
                let written = if dry_run || out.records.is_empty() {
                    out.records.len()
                } else {
                    self.target.upsert_relationships(&out.records)?
                };
                (written, out.rejected)
            }
        };

        Ok(BatchOutcome {
            rows: rows.len() as u64,
            written: written as u64,
            rejected,
            cursor: next_cursor,
        })
    }

    fn run_artifacts(
        &self,
        plan: &MigrationPlan,
        phase: &MigrationPhase,
        options: &ExecutionOptions,
    ) -> PhaseOutcome {
        for spec in &phase.artifacts {
            let artifact = ArtifactRecord {
                id: record_id("artifact", &[&spec.source_table, &spec.name]),
                name: spec.name.clone(),
                entity_type: spec.entity_type.clone(),
                rule_kind: spec.rule_kind.clone(),
                definition: spec.definition.clone(),
                enforcement: spec.enforcement.clone(),
                provenance: provenance(plan, &spec.source_table, &spec.name),
            };
            if options.dry_run {
                continue;
            }
            if let Err(err) = retry(options, || self.target.record_artifact(&artifact)) {
                return PhaseOutcome::Failed(format!("artifact {}: {}", spec.name, err));
            }
        }
        PhaseOutcome::Complete {
            rows: phase.artifacts.len() as u64,
            batches: 0,
        }
    }

    fn run_indexes(
        &self,
        plan: &MigrationPlan,
        phase: &MigrationPhase,
        options: &ExecutionOptions,
    ) -> PhaseOutcome {
        for spec in &phase.indexes {
            let index = IndexRecord {
                id: record_id("index", &[&spec.name]),
                name: spec.name.clone(),
                entity_type: spec.entity_type.clone(),
                field: spec.field.clone(),
                tier: spec.tier,
                unique: spec.unique,
                provenance: provenance(plan, &spec.source_table, &spec.field),
            };
            if options.dry_run {
                continue;
            }
            if let Err(err) = retry(options, || self.target.create_index(&index)) {
                return PhaseOutcome::Failed(format!("index {}: {}", spec.name, err));
            }
        }
        PhaseOutcome::Complete {
            rows: phase.indexes.len() as u64,
            batches: 0,
        }
    }

    /// Row-count and integrity checks against the target.
    fn post_findings(
        &self,
        plan: &MigrationPlan,
        phase: &MigrationPhase,
    ) -> Result<Vec<ValidationFinding>, MigrationError> {
        let id = plan.migration_id;
        let logged = self.log.tables(&id)?;
        let mut findings = Vec::with_capacity(phase.checks.len());

        for check in &phase.checks {
            let Some(table) = check.table.as_deref() else {
                continue;
            };
            let finding = match check.kind {
                CheckKind::RowCount => {
                    let kind = match plan.table(table, WorkKind::Entities) {
                        Some(_) => RecordKind::Entity,
                        None => RecordKind::Relationship,
                    };
                    let source = self.source.row_count(table);
                    let migrated = self.target.count_migrated(&id, table, kind);
                    match (source, migrated) {
                        (Ok(source), Ok(migrated)) if source == migrated => ValidationFinding::passed(
                            "row_count",
                            format!("{} source rows, {} migrated {} records", source, migrated, kind),
                        ),
                        (Ok(source), Ok(migrated)) => ValidationFinding::failed(
                            "row_count",
                            Impact::High,
                            format!(
                                "{} has {} source rows but {} migrated {} records",
                                table, source, migrated, kind
                            ),
                            "inspect rejected rows, then roll back and re-run the migration",
                        ),
                        (Err(err), _) | (_, Err(err)) => ValidationFinding::failed(
                            "row_count",
                            Impact::High,
                            format!("could not count {}: {}", table, err),
                            "restore connectivity and re-run post-migration validation",
                        ),
                    }
                }
                CheckKind::ReferentialIntegrity => {
                    let expected = logged.iter().find(|t| {
                        t.phase == PhaseKind::Relationships && t.table.eq_ignore_ascii_case(table)
                    });
                    let migrated = self
                        .target
                        .count_migrated(&id, table, RecordKind::Relationship)
                        .map_err(MigrationError::from_connector)?;
                    match expected {
                        Some(record) if record.rows_written != migrated => ValidationFinding::failed(
                            "referential_integrity",
                            Impact::High,
                            format!(
                                "{} produced {} references but the target holds {} relationship records",
                                table, record.rows_written, migrated
                            ),
                            "roll back the relationships phase and re-run it",
                        ),
                        Some(record) if record.rows_rejected > 0 => ValidationFinding::warning(
                            "referential_integrity",
                            Impact::Medium,
                            format!(
                                "{} rows of {} had no usable key for their references",
                                record.rows_rejected, table
                            ),
                            "review the source rows with missing keys",
                        ),
                        Some(_) => ValidationFinding::passed(
                            "referential_integrity",
                            format!("{} relationship records of {} present", migrated, table),
                        ),
                        None => ValidationFinding::failed(
                            "referential_integrity",
                            Impact::High,
                            format!("no log of relationship work for {}", table),
                            "re-run the relationships phase",
                        ),
                    }
                }
                CheckKind::SourceReachable | CheckKind::TargetSchema => continue,
            };
            if finding.status == FindingStatus::Failed {
                warn!(migration_id = %id, table, check = %finding.check, message = %finding.message, "Post-migration check failed");
            }
            findings.push(finding.for_table(table));
        }
        Ok(findings)
    }
}

fn retry<T>(
    options: &ExecutionOptions,
    mut op: impl FnMut() -> Result<T, ConnectorError>,
) -> Result<T, ConnectorError> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(_) if attempts <= options.max_retries => {
                if options.retry_backoff_ms > 0 {
                    std::thread::sleep(Duration::from_millis(
                        options.retry_backoff_ms * u64::from(attempts),
                    ));
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn provenance(plan: &MigrationPlan, source_table: &str, source_key: &str) -> Provenance {
    Provenance {
        migration_id: plan.migration_id,
        source_table: source_table.to_string(),
        source_key: source_key.to_string(),
        batch_no: 0,
    }
}

fn pre_findings(plan: &MigrationPlan) -> Vec<ValidationFinding> {
    plan.phase(PhaseKind::PreValidation)
        .map(|phase| {
            phase
                .checks
                .iter()
                .map(|c| ValidationFinding::passed(c.name.clone(), c.description.clone()))
                .collect()
        })
        .unwrap_or_default()
}

fn data_outcome(reports: &[TableReport]) -> PhaseOutcome {
    if let Some(failed) = reports.iter().find(|r| r.status == PhaseStatus::Failed) {
        return PhaseOutcome::Failed(failed.error.clone().unwrap_or_else(|| {
            format!("table {} failed", failed.table)
        }));
    }
    if reports.iter().any(|r| r.status == PhaseStatus::Cancelled) {
        return PhaseOutcome::Cancelled;
    }
    PhaseOutcome::Complete {
        rows: reports.iter().map(|r| r.rows_written).sum(),
        batches: reports.iter().map(|r| r.batches_committed).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{
        MemorySource, MemoryTarget, Row, SourceColumn, SourceForeignKey, SourceTable, Value,
    };
    use crate::mapping::EntityTypeMapper;
    use crate::migration::{MigrationPlanner, TargetConfig};
    use crate::schema::{AnalysisOptions, SchemaAnalyzer};
    use crate::vocabulary::Vocabulary;

    fn shop(customers: i64, orders: i64) -> MemorySource {
        let customer_table = SourceTable::new("customers")
            .with_column(SourceColumn::new("customer_id", "int").not_null())
            .with_column(SourceColumn::new("customer_name", "varchar(100)"))
            .with_primary_key(&["customer_id"]);
        let order_table = SourceTable::new("orders")
            .with_column(SourceColumn::new("order_id", "int").not_null())
            .with_column(SourceColumn::new("customer_id", "int").not_null())
            .with_column(SourceColumn::new("order_total", "decimal(12,2)"))
            .with_primary_key(&["order_id"])
            .with_foreign_key(SourceForeignKey::new("customer_id", "customers", "customer_id"));

        let customer_rows: Vec<Row> = (1..=customers)
            .map(|i| {
                Row::from([
                    ("customer_id".to_string(), Value::Int(i)),
                    ("customer_name".to_string(), Value::text(format!("Customer {}", i))),
                ])
            })
            .collect();
        let order_rows: Vec<Row> = (1..=orders)
            .map(|i| {
                Row::from([
                    ("order_id".to_string(), Value::Int(i)),
                    ("customer_id".to_string(), Value::Int(1 + i % customers.max(1))),
                    ("order_total".to_string(), Value::Float(i as f64 * 1.5)),
                ])
            })
            .collect();

        MemorySource::new("shop")
            .with_table(customer_table, customer_rows)
            .with_table(order_table, order_rows)
    }

    fn plan_for(source: &MemorySource, batch_size: u64) -> MigrationPlan {
        let vocab = Arc::new(Vocabulary::standard());
        let schema = SchemaAnalyzer::new(Arc::clone(&vocab))
            .analyze(source, &AnalysisOptions::default())
            .unwrap();
        let mapping = EntityTypeMapper::new(vocab).generate_mapping(&schema, None, None, None);
        MigrationPlanner::new()
            .generate_migration_plan(
                &schema,
                &mapping,
                &TargetConfig::default().with_batch_size(batch_size),
            )
            .unwrap()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        target: Arc<MemoryTarget>,
        executor: MigrationExecutor,
        plan: MigrationPlan,
    }

    fn fixture(target: MemoryTarget) -> Fixture {
        let source = shop(25, 40);
        let plan = plan_for(&source, 10);
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let target = Arc::new(target);
        let executor = MigrationExecutor::new(
            Arc::new(source),
            Arc::clone(&target) as Arc<dyn TargetWriter>,
            &db,
        )
        .unwrap();
        Fixture {
            _dir: dir,
            target,
            executor,
            plan,
        }
    }

    fn fast() -> ExecutionOptions {
        ExecutionOptions::default().with_retry_backoff_ms(0)
    }

    #[test]
    fn test_execute_moves_every_row() {
        let f = fixture(MemoryTarget::new("eav"));
        let report = f.executor.execute(&f.plan, &fast()).unwrap();

        assert_eq!(report.status, MigrationStatus::Complete);
        assert!(report.complete);
        assert_eq!(f.target.entity_count(), 65);
        assert_eq!(f.target.relationship_count(), 40);
        assert_eq!(report.table("customers").unwrap().batches_committed, 3);
        assert_eq!(report.table("orders").unwrap().batches_committed, 4);
        assert!(report.failed_findings().next().is_none());

        let state = f.executor.status(&f.plan.migration_id).unwrap();
        assert_eq!(state.status, MigrationStatus::Complete);
        assert!(state.phases.iter().all(|p| p.status == PhaseStatus::Complete));
    }

    #[test]
    fn test_missing_target_tables_abort_before_writes() {
        let f = fixture(MemoryTarget::new("eav").with_tables(&["universal_entities"]));
        let err = f.executor.execute(&f.plan, &fast()).unwrap_err();

        assert!(matches!(err, MigrationError::TargetSchemaMissing { ref missing } if missing.len() == 3));
        assert_eq!(f.target.write_calls(), 0);
        assert!(matches!(
            f.executor.status(&f.plan.migration_id),
            Err(MigrationError::MigrationNotFound { .. })
        ));
    }

    #[test]
    fn test_unreachable_source_is_connectivity_error() {
        let plan = plan_for(&shop(2, 2), 10);
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let executor = MigrationExecutor::new(
            Arc::new(MemorySource::unreachable("shop")),
            Arc::new(MemoryTarget::new("eav")),
            &db,
        )
        .unwrap();

        let err = executor.execute(&plan, &fast()).unwrap_err();
        assert!(matches!(err, MigrationError::Connectivity { .. }));
        assert!(err.is_preflight());
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let f = fixture(MemoryTarget::new("eav"));
        f.target.fail_batch("customers", 2, 2);

        let report = f.executor.execute(&f.plan, &fast()).unwrap();
        assert!(report.complete);
        assert_eq!(report.table("customers").unwrap().retries, 2);
        assert_eq!(f.target.entity_count(), 65);
    }

    #[test]
    fn test_escalated_failure_then_resume() {
        let f = fixture(MemoryTarget::new("eav"));
        f.target.fail_batch("orders", 3, 100);

        let options = fast().with_max_retries(1);
        let failed = f.executor.execute(&f.plan, &options).unwrap();
        assert_eq!(failed.status, MigrationStatus::Failed);
        assert!(!failed.complete);
        assert_eq!(failed.phase(PhaseKind::MasterData).unwrap().status, PhaseStatus::Complete);
        assert_eq!(
            failed.phase(PhaseKind::TransactionalData).unwrap().status,
            PhaseStatus::Failed
        );
        let orders = failed.table("orders").unwrap();
        assert_eq!(orders.batches_committed, 2);
        assert!(orders.error.as_deref().unwrap().contains("batch 3 of orders"));
        assert_eq!(f.target.entities_of_type("customer").len(), 25);

        f.target.clear_failures();
        let resumed = f.executor.execute(&f.plan, &options.with_resume(true)).unwrap();
        assert!(resumed.complete);
        assert_eq!(resumed.resumed_from_batch, Some(3));
        assert_eq!(resumed.table("orders").unwrap().rows_read, 40);
        assert_eq!(f.target.entity_count(), 65);
    }

    /// Cancels the run while the given batch of one table is being read.
    struct CancelDuring {
        inner: MemorySource,
        table: &'static str,
        batch: u64,
        reads: std::sync::atomic::AtomicU64,
        token: CancellationToken,
    }

    impl SourceReader for CancelDuring {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn ping(&self) -> Result<(), ConnectorError> {
            self.inner.ping()
        }

        fn list_tables(&self) -> Result<Vec<SourceTable>, ConnectorError> {
            self.inner.list_tables()
        }

        fn row_count(&self, table: &str) -> Result<u64, ConnectorError> {
            self.inner.row_count(table)
        }

        fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>, ConnectorError> {
            self.inner.sample_rows(table, limit)
        }

        fn read_batch(
            &self,
            table: &str,
            order_key: &[String],
            after: Option<&BatchCursor>,
            limit: usize,
        ) -> Result<Vec<Row>, ConnectorError> {
            if table == self.table && self.reads.fetch_add(1, Ordering::SeqCst) + 1 == self.batch {
                self.token.cancel();
            }
            self.inner.read_batch(table, order_key, after, limit)
        }
    }

    #[test]
    fn test_cancel_mid_table_resumes_after_last_batch() {
        let token = CancellationToken::new();
        let source = CancelDuring {
            inner: shop(25, 40),
            table: "customers",
            batch: 2,
            reads: std::sync::atomic::AtomicU64::new(0),
            token: token.clone(),
        };
        let plan = plan_for(&source.inner, 10);
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let target = Arc::new(MemoryTarget::new("eav"));
        let executor = MigrationExecutor::new(
            Arc::new(source),
            Arc::clone(&target) as Arc<dyn TargetWriter>,
            &db,
        )
        .unwrap();

        let cancelled = executor
            .execute(&plan, &fast().with_cancellation(token))
            .unwrap();
        assert_eq!(cancelled.status, MigrationStatus::Cancelled);
        let customers = cancelled.table("customers").unwrap();
        assert_eq!(customers.status, PhaseStatus::Cancelled);
        assert_eq!(customers.batches_committed, 2);
        assert_eq!(customers.rows_written, 20);
        assert_eq!(
            cancelled.phase(PhaseKind::MasterData).unwrap().status,
            PhaseStatus::Cancelled
        );
        assert_eq!(target.entity_count(), 20);
        assert!(executor.status(&plan.migration_id).unwrap().can_resume());

        let resumed = executor.execute(&plan, &fast().with_resume(true)).unwrap();
        assert!(resumed.complete, "{:?}", resumed.error);
        assert_eq!(resumed.resumed_from_batch, Some(3));
        let customers = resumed.table("customers").unwrap();
        assert_eq!(customers.batches_committed, 3);
        assert_eq!(customers.rows_read, 25);
        assert_eq!(customers.rows_written, 25);
        assert_eq!(target.entities_of_type("customer").len(), 25);
        assert_eq!(target.entity_count(), 65);
    }

    #[test]
    fn test_failed_pre_validation_stops_before_data() {
        let f = fixture(MemoryTarget::new("eav"));
        let blocking = ValidationFinding::failed(
            "data_quality",
            Impact::Critical,
            "customers.customer_name: null sentinel in a required column",
            "clean the source data",
        );

        let report = f
            .executor
            .execute(&f.plan, &fast().with_pre_validation(vec![blocking]))
            .unwrap();
        assert_eq!(report.status, MigrationStatus::Failed);
        assert_eq!(
            report.phase(PhaseKind::PreValidation).unwrap().status,
            PhaseStatus::Failed
        );
        assert!(report.error.as_deref().unwrap().contains("null sentinel"));
        assert!(report.failed_findings().any(|f| f.check == "data_quality"));
        assert!(report.tables.is_empty());
        assert_eq!(f.target.write_calls(), 0);

        let advisory = ValidationFinding::warning(
            "data_quality",
            Impact::Critical,
            "customers.customer_name: null sentinel in a required column",
            "clean the source data",
        );
        let report = f
            .executor
            .execute(&f.plan, &fast().with_pre_validation(vec![advisory]))
            .unwrap();
        assert!(report.complete, "{:?}", report.error);
        assert_eq!(f.target.entity_count(), 65);
    }

    #[test]
    fn test_cancellation_leaves_migration_resumable() {
        let f = fixture(MemoryTarget::new("eav"));
        let token = CancellationToken::new();
        token.cancel();

        let cancelled = f
            .executor
            .execute(&f.plan, &fast().with_cancellation(token))
            .unwrap();
        assert_eq!(cancelled.status, MigrationStatus::Cancelled);
        assert_eq!(f.target.entity_count(), 0);
        assert!(f.executor.status(&f.plan.migration_id).unwrap().can_resume());

        let resumed = f.executor.execute(&f.plan, &fast().with_resume(true)).unwrap();
        assert!(resumed.complete);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let f = fixture(MemoryTarget::new("eav"));
        let report = f.executor.execute(&f.plan, &fast().with_dry_run(true)).unwrap();

        assert!(report.dry_run);
        assert!(!report.complete);
        assert_eq!(report.table("customers").unwrap().rows_written, 25);
        assert_eq!(f.target.write_calls(), 0);
        assert!(f.executor.list_migrations().unwrap().is_empty());
    }

    #[test]
    fn test_phase_rollback_respects_dependents() {
        let f = fixture(MemoryTarget::new("eav"));
        f.executor.execute(&f.plan, &fast()).unwrap();

        let err = f
            .executor
            .rollback(&f.plan, RollbackScope::Phase(PhaseKind::MasterData), false)
            .unwrap_err();
        assert!(matches!(err, MigrationError::DependencyUnmet { .. }));

        let report = f
            .executor
            .rollback(&f.plan, RollbackScope::Phase(PhaseKind::Indexes), false)
            .unwrap();
        assert_eq!(report.phases, vec![PhaseKind::Indexes]);
        assert_eq!(f.target.index_count(), 0);
        assert_eq!(f.target.entity_count(), 65);
    }

    #[test]
    fn test_full_rollback_and_window() {
        let f = fixture(MemoryTarget::new("eav"));
        f.executor.execute(&f.plan, &fast()).unwrap();

        let mut state = f.executor.status(&f.plan.migration_id).unwrap();
        state.started_at = Some(1);
        f.executor.log().save_state(&state).unwrap();

        let err = f
            .executor
            .rollback(&f.plan, RollbackScope::Full, false)
            .unwrap_err();
        assert!(matches!(err, MigrationError::RollbackWindowExpired { .. }));

        let report = f.executor.rollback(&f.plan, RollbackScope::Full, true).unwrap();
        assert_eq!(report.records_remaining, 0);
        assert_eq!(f.target.entity_count(), 0);
        assert_eq!(f.target.relationship_count(), 0);
        assert_eq!(
            f.executor.status(&f.plan.migration_id).unwrap().status,
            MigrationStatus::RolledBack
        );
        assert!(f.executor.log().batches(&f.plan.migration_id).unwrap().is_empty());
    }
}
