//! Migration plan model.
//!
//! A plan is data-movement only: seven phases in fixed order, each holding
//! per-table batch plans, artifacts, indexes or checks, plus a rollback
//! descriptor built from the same batch boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::MigrationError;
use super::planner::TargetConfig;
use crate::connector::RecordKind;
use crate::mapping::{FieldMapping, StorageTier};
use crate::schema::RelationshipKind;
use crate::store::key::MigrationId;

/// Ordered stage of a migration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    PreValidation,
    MasterData,
    TransactionalData,
    Relationships,
    BusinessLogic,
    Indexes,
    PostValidation,
}

impl PhaseKind {
    /// All phases in execution order.
    pub const ALL: [PhaseKind; 7] = [
        PhaseKind::PreValidation,
        PhaseKind::MasterData,
        PhaseKind::TransactionalData,
        PhaseKind::Relationships,
        PhaseKind::BusinessLogic,
        PhaseKind::Indexes,
        PhaseKind::PostValidation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::PreValidation => "pre_validation",
            PhaseKind::MasterData => "master_data",
            PhaseKind::TransactionalData => "transactional_data",
            PhaseKind::Relationships => "relationships",
            PhaseKind::BusinessLogic => "business_logic",
            PhaseKind::Indexes => "indexes",
            PhaseKind::PostValidation => "post_validation",
        }
    }

    /// Stable one-byte code used in log keys.
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Phases this one must wait for.
    pub fn default_dependencies(&self) -> Vec<PhaseKind> {
        use PhaseKind::*;
        match self {
            PreValidation => vec![],
            MasterData => vec![PreValidation],
            TransactionalData => vec![MasterData],
            Relationships => vec![MasterData, TransactionalData],
            BusinessLogic => vec![Relationships],
            Indexes => vec![MasterData, TransactionalData],
            PostValidation => vec![
                MasterData,
                TransactionalData,
                Relationships,
                BusinessLogic,
                Indexes,
            ],
        }
    }

    /// Whether the phase writes to the target.
    pub fn writes_data(&self) -> bool {
        !matches!(self, PhaseKind::PreValidation | PhaseKind::PostValidation)
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk of a phase or the whole plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Rough effort class of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Low => write!(f, "low"),
            Complexity::Medium => write!(f, "medium"),
            Complexity::High => write!(f, "high"),
        }
    }
}

/// Cursor-based pagination of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub batch_size: u64,
    /// `ceil(rows / batch_size)`.
    pub batch_count: u64,
    /// `rows % batch_size`, or `batch_size` when that is zero.
    pub last_batch_size: u64,
    /// Columns rows are ordered by; the checkpoint cursor holds their values.
    pub order_key: Vec<String>,
}

impl BatchPlan {
    pub fn new(row_count: u64, batch_size: u64, order_key: Vec<String>) -> Self {
        let batch_size = batch_size.max(1);
        let batch_count = row_count.div_ceil(batch_size);
        let last_batch_size = match row_count % batch_size {
            0 if row_count == 0 => 0,
            0 => batch_size,
            rem => rem,
        };
        Self {
            batch_size,
            batch_count,
            last_batch_size,
            order_key,
        }
    }

    /// Expected rows in a 1-based batch.
    pub fn batch_len(&self, batch_no: u64) -> u64 {
        if batch_no == 0 || batch_no > self.batch_count {
            0
        } else if batch_no == self.batch_count {
            self.last_batch_size
        } else {
            self.batch_size
        }
    }
}

/// What a table contributes in its phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    /// Upsert one entity per row.
    Entities,
    /// Derive relationship records from foreign-key columns.
    ReferenceLinks,
    /// Fold junction rows into relationship records.
    JunctionLinks,
}

impl fmt::Display for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkKind::Entities => write!(f, "entities"),
            WorkKind::ReferenceLinks => write!(f, "reference links"),
            WorkKind::JunctionLinks => write!(f, "junction links"),
        }
    }
}

/// How a foreign key becomes a relationship record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub column: String,
    pub target_table: String,
    pub target_column: String,
    pub target_entity_type: String,
    pub relationship_type: String,
    pub kind: RelationshipKind,
}

/// Work for one source table within a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePlan {
    pub source_table: String,
    pub entity_type: String,
    pub work: WorkKind,
    pub row_count: u64,
    pub batch: BatchPlan,
    pub natural_key: Vec<String>,
    pub fields: Vec<FieldMapping>,
    pub links: Vec<LinkSpec>,
    /// Tables in the same phase that must finish first.
    pub depends_on: Vec<String>,
}

impl TablePlan {
    /// Record kind this table writes.
    pub fn record_kind(&self) -> RecordKind {
        match self.work {
            WorkKind::Entities => RecordKind::Entity,
            WorkKind::ReferenceLinks | WorkKind::JunctionLinks => RecordKind::Relationship,
        }
    }

    /// Rows the table is expected to produce in the target.
    pub fn expected_records(&self) -> u64 {
        match self.work {
            WorkKind::Entities => self.row_count,
            WorkKind::ReferenceLinks => self.row_count * self.links.len() as u64,
            WorkKind::JunctionLinks => self.row_count,
        }
    }
}

/// An advisory business-logic artifact to store in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub name: String,
    pub source_table: String,
    pub entity_type: String,
    pub rule_kind: String,
    pub definition: String,
    pub enforcement: String,
}

/// A secondary index to create in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub source_table: String,
    pub entity_type: String,
    pub field: String,
    pub tier: StorageTier,
    pub unique: bool,
}

/// A check run in a validation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    SourceReachable,
    TargetSchema,
    /// Source rows against migrated records.
    RowCount,
    /// Every relationship endpoint exists.
    ReferentialIntegrity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: String,
    pub kind: CheckKind,
    pub table: Option<String>,
    pub description: String,
}

/// One phase of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPhase {
    pub kind: PhaseKind,
    pub name: String,
    pub tables: Vec<TablePlan>,
    pub artifacts: Vec<ArtifactSpec>,
    pub indexes: Vec<IndexSpec>,
    pub checks: Vec<ValidationCheck>,
    pub depends_on: Vec<PhaseKind>,
    pub risk: RiskLevel,
}

impl MigrationPhase {
    /// Sum of batch counts over the phase's tables.
    pub fn total_batches(&self) -> u64 {
        self.tables.iter().map(|t| t.batch.batch_count).sum()
    }

    /// Whether the phase has nothing to do.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
            && self.artifacts.is_empty()
            && self.indexes.is_empty()
            && self.checks.is_empty()
    }
}

/// Undo for one table or artifact group, in reverse phase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackStep {
    pub phase: PhaseKind,
    pub table: Option<String>,
    pub kind: RecordKind,
    /// Batch boundaries the delete follows, last batch first.
    pub batch_count: u64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRollback {
    pub phase: PhaseKind,
    pub steps: Vec<RollbackStep>,
}

/// Rollback paths of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackDescriptor {
    /// Per-phase undo, latest phase first.
    pub phases: Vec<PhaseRollback>,
    /// Seconds after start during which a full rollback is allowed.
    pub emergency_window_secs: u64,
    pub emergency_description: String,
}

impl RollbackDescriptor {
    pub fn for_phase(&self, phase: PhaseKind) -> Option<&PhaseRollback> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

/// Duration, complexity and risk of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEstimate {
    pub total_rows: u64,
    pub total_batches: u64,
    pub duration_secs: u64,
    pub complexity: Complexity,
    pub risk: RiskLevel,
}

/// An ordered, batched, rollback-capable migration plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub migration_id: MigrationId,
    pub source_name: String,
    pub schema_fingerprint: String,
    /// Microseconds since epoch.
    pub created_at: u64,
    pub target: TargetConfig,
    /// Always the seven phases in declared order.
    pub phases: Vec<MigrationPhase>,
    pub rollback: RollbackDescriptor,
    pub estimate: PlanEstimate,
}

impl MigrationPlan {
    pub fn phase(&self, kind: PhaseKind) -> Option<&MigrationPhase> {
        self.phases.iter().find(|p| p.kind == kind)
    }

    /// Find the plan for a table doing the given kind of work.
    pub fn table(&self, source_table: &str, work: WorkKind) -> Option<(&MigrationPhase, &TablePlan)> {
        self.phases.iter().find_map(|phase| {
            phase
                .tables
                .iter()
                .find(|t| t.work == work && t.source_table.eq_ignore_ascii_case(source_table))
                .map(|t| (phase, t))
        })
    }

    pub fn total_batches(&self) -> u64 {
        self.phases.iter().map(|p| p.total_batches()).sum()
    }

    /// Check structural consistency: phases in declared order, dependencies
    /// on earlier phases only, non-empty upsert keys, sane batch plans.
    pub fn validate(&self) -> Result<(), MigrationError> {
        let invalid = |message: String| Err(MigrationError::InvalidPlan { message });

        for (idx, phase) in self.phases.iter().enumerate() {
            if idx > 0 && self.phases[idx - 1].kind >= phase.kind {
                return invalid(format!("phase {} is out of order", phase.kind));
            }
            for dep in &phase.depends_on {
                let earlier = self.phases[..idx].iter().any(|p| p.kind == *dep);
                if !earlier {
                    return invalid(format!(
                        "phase {} depends on {}, which is missing or later",
                        phase.kind, dep
                    ));
                }
            }
            for table in &phase.tables {
                if table.work == WorkKind::Entities && table.natural_key.is_empty() {
                    return invalid(format!("table {} has no upsert key", table.source_table));
                }
                let expected = BatchPlan::new(
                    table.row_count,
                    table.batch.batch_size,
                    table.batch.order_key.clone(),
                );
                if expected != table.batch {
                    return invalid(format!(
                        "batch plan of {} does not match its row count",
                        table.source_table
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_boundary_law() {
        let plan = BatchPlan::new(2_500_000, 1_000, vec!["id".to_string()]);
        assert_eq!(plan.batch_count, 2_500);
        assert_eq!(plan.last_batch_size, 1_000);

        let plan = BatchPlan::new(2_500_001, 1_000, vec![]);
        assert_eq!(plan.batch_count, 2_501);
        assert_eq!(plan.last_batch_size, 1);
        assert_eq!(plan.batch_len(2_501), 1);
        assert_eq!(plan.batch_len(2_500), 1_000);
        assert_eq!(plan.batch_len(0), 0);

        let plan = BatchPlan::new(0, 1_000, vec![]);
        assert_eq!(plan.batch_count, 0);
        assert_eq!(plan.last_batch_size, 0);

        let plan = BatchPlan::new(999, 1_000, vec![]);
        assert_eq!(plan.batch_count, 1);
        assert_eq!(plan.last_batch_size, 999);
    }

    #[test]
    fn test_phase_order_and_dependencies() {
        for (idx, phase) in PhaseKind::ALL.iter().enumerate() {
            assert_eq!(phase.code() as usize, idx);
            for dep in phase.default_dependencies() {
                assert!(dep < *phase);
            }
        }
        assert!(!PhaseKind::PreValidation.writes_data());
        assert!(PhaseKind::Indexes.writes_data());
    }

    #[test]
    fn test_phase_kind_rkyv_round_trip() {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&PhaseKind::Relationships).unwrap();
        let back: PhaseKind = rkyv::from_bytes::<PhaseKind, rkyv::rancor::Error>(&bytes).unwrap();
        assert_eq!(back, PhaseKind::Relationships);
    }
}
