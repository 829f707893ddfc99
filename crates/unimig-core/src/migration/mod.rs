//! Migration planning, execution, and rollback.
//!
//! The planner turns an analysis and its mapping into a [`MigrationPlan`];
//! the executor runs it against a [`SourceReader`](crate::connector::SourceReader)
//! and a [`TargetWriter`](crate::connector::TargetWriter), keeping a
//! resumable [`MigrationLog`] in sled.

pub mod error;
pub mod executor;
pub mod plan;
pub mod planner;
pub mod script;
pub mod state;
pub mod transform;

pub use crate::store::key::MigrationId;
pub use error::MigrationError;
pub use executor::{
    CancellationToken, ExecutionOptions, ExecutionReport, MigrationExecutor, PhaseReport,
    RollbackReport, RollbackScope, TableReport,
};
pub use plan::{
    ArtifactSpec, BatchPlan, CheckKind, Complexity, IndexSpec, LinkSpec, MigrationPhase,
    MigrationPlan, PhaseKind, PhaseRollback, PlanEstimate, RiskLevel, RollbackDescriptor,
    RollbackStep, TablePlan, ValidationCheck, WorkKind,
};
pub use planner::{MigrationPlanner, TargetConfig};
pub use script::{PhaseScript, ScriptSet};
pub use state::{
    BatchRecord, BatchStatus, MigrationLog, MigrationState, MigrationStatus, PhaseProgress,
    PhaseStatus, TableRecord,
};
