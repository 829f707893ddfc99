//! Migration plan generation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use super::error::MigrationError;
use super::plan::{
    ArtifactSpec, BatchPlan, CheckKind, Complexity, IndexSpec, LinkSpec, MigrationPhase,
    MigrationPlan, PhaseKind, PhaseRollback, PlanEstimate, RiskLevel, RollbackDescriptor,
    RollbackStep, TablePlan, ValidationCheck, WorkKind,
};
use crate::connector::RecordKind;
use crate::mapping::{EntityMapping, EntityMappingResult, Enforcement, StorageTier};
use crate::schema::{RelationshipKind, SchemaAnalysisResult, TableDescriptor};
use crate::store::key::{current_timestamp, MigrationId};
use crate::vocabulary::FALLBACK_ENTITY;

/// Target environment and execution sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Rows per batch.
    pub batch_size: u64,
    /// Tables migrated concurrently within a phase.
    pub parallel_workers: usize,
    /// Seconds after start during which a full rollback is allowed.
    pub emergency_rollback_window_secs: u64,
    /// Throughput used for duration estimates.
    pub rows_per_second: u64,
    pub entity_table: String,
    pub attribute_table: String,
    pub property_table: String,
    pub relationship_table: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            parallel_workers: 4,
            emergency_rollback_window_secs: 24 * 60 * 60,
            rows_per_second: 5000,
            entity_table: "universal_entities".to_string(),
            attribute_table: "entity_attributes".to_string(),
            property_table: "entity_properties".to_string(),
            relationship_table: "entity_relationships".to_string(),
        }
    }
}

impl TargetConfig {
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_parallel_workers(mut self, workers: usize) -> Self {
        self.parallel_workers = workers.max(1);
        self
    }

    pub fn with_rollback_window_secs(mut self, secs: u64) -> Self {
        self.emergency_rollback_window_secs = secs;
        self
    }

    pub fn with_rows_per_second(mut self, rows: u64) -> Self {
        self.rows_per_second = rows.max(1);
        self
    }

    /// Tables that must exist before any data is written.
    pub fn required_tables(&self) -> Vec<String> {
        vec![
            self.entity_table.clone(),
            self.attribute_table.clone(),
            self.property_table.clone(),
            self.relationship_table.clone(),
        ]
    }
}

/// Rows above which a table is considered large.
const LARGE_TABLE: u64 = 1_000_000;
const MEDIUM_TABLE: u64 = 100_000;

/// Builds [`MigrationPlan`]s from an analysis and its mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct MigrationPlanner;

impl MigrationPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Generate a plan for every mapped table.
    pub fn generate_migration_plan(
        &self,
        schema: &SchemaAnalysisResult,
        mapping: &EntityMappingResult,
        target: &TargetConfig,
    ) -> Result<MigrationPlan, MigrationError> {
        if mapping.schema_fingerprint != schema.fingerprint {
            return Err(MigrationError::InvalidPlan {
                message: "mapping was produced from a different schema snapshot".to_string(),
            });
        }

        let mut pairs: Vec<(&TableDescriptor, &EntityMapping)> = Vec::new();
        for table in &schema.tables {
            let m = mapping.mapping(&table.name).ok_or_else(|| MigrationError::InvalidPlan {
                message: format!("no mapping for table {}", table.name),
            })?;
            pairs.push((table, m));
        }

        let created_at = current_timestamp();
        let migration_id = MigrationId::derive(&[
            schema.source_name.as_bytes(),
            schema.fingerprint.as_bytes(),
            &created_at.to_be_bytes(),
        ]);

        let entity_types: HashMap<String, String> = pairs
            .iter()
            .map(|(t, m)| (t.name.to_ascii_lowercase(), m.entity_type.clone()))
            .collect();
        let master = master_tables(&pairs);

        let mut master_tables_plan = Vec::new();
        let mut transactional = Vec::new();
        let mut relationships = Vec::new();
        let mut artifacts = Vec::new();
        let mut indexes = Vec::new();

        for &(table, m) in order_by_dependencies(&pairs).iter() {
            let order_key = if table.primary_key.is_empty() {
                m.natural_key.clone()
            } else {
                table.primary_key.clone()
            };
            let batch = BatchPlan::new(table.row_count, target.batch_size, order_key);

            if table.is_junction {
                relationships.push(TablePlan {
                    source_table: table.name.clone(),
                    entity_type: m.entity_type.clone(),
                    work: WorkKind::JunctionLinks,
                    row_count: table.row_count,
                    batch,
                    natural_key: m.natural_key.clone(),
                    fields: m.field_mappings.clone(),
                    links: links(table, m, &entity_types),
                    depends_on: Vec::new(),
                });
                continue;
            }

            let is_master = master.contains(&table.name.to_ascii_lowercase());
            let bucket = if is_master {
                &master_tables_plan
            } else {
                &transactional
            };
            let depends_on = same_phase_dependencies(table, bucket);

            let entity_plan = TablePlan {
                source_table: table.name.clone(),
                entity_type: m.entity_type.clone(),
                work: WorkKind::Entities,
                row_count: table.row_count,
                batch: batch.clone(),
                natural_key: m.natural_key.clone(),
                fields: m.field_mappings.clone(),
                links: Vec::new(),
                depends_on,
            };
            if is_master {
                master_tables_plan.push(entity_plan);
            } else {
                transactional.push(entity_plan);
            }

            let table_links = links(table, m, &entity_types);
            if !table_links.is_empty() {
                relationships.push(TablePlan {
                    source_table: table.name.clone(),
                    entity_type: m.entity_type.clone(),
                    work: WorkKind::ReferenceLinks,
                    row_count: table.row_count,
                    batch,
                    natural_key: m.natural_key.clone(),
                    fields: Vec::new(),
                    links: table_links,
                    depends_on: Vec::new(),
                });
            }

            artifacts.extend(m.business_rules.iter().map(|rule| ArtifactSpec {
                name: rule.rule_name.clone(),
                source_table: table.name.clone(),
                entity_type: m.entity_type.clone(),
                rule_kind: rule.kind.to_string(),
                definition: rule.target_expression.clone(),
                enforcement: match rule.enforcement {
                    Enforcement::Advisory => "advisory".to_string(),
                    Enforcement::Manual => "manual".to_string(),
                },
            }));
            indexes.extend(index_specs(table, m));
        }

        let mut phases = Vec::with_capacity(PhaseKind::ALL.len());
        for kind in PhaseKind::ALL {
            let mut phase = MigrationPhase {
                kind,
                name: phase_name(kind).to_string(),
                tables: Vec::new(),
                artifacts: Vec::new(),
                indexes: Vec::new(),
                checks: Vec::new(),
                depends_on: kind.default_dependencies(),
                risk: RiskLevel::Low,
            };
            match kind {
                PhaseKind::PreValidation => phase.checks = pre_checks(),
                PhaseKind::MasterData => phase.tables = std::mem::take(&mut master_tables_plan),
                PhaseKind::TransactionalData => phase.tables = std::mem::take(&mut transactional),
                PhaseKind::Relationships => phase.tables = std::mem::take(&mut relationships),
                PhaseKind::BusinessLogic => phase.artifacts = std::mem::take(&mut artifacts),
                PhaseKind::Indexes => phase.indexes = std::mem::take(&mut indexes),
                PhaseKind::PostValidation => phase.checks = post_checks(&phases),
            }
            phase.risk = phase_risk(&phase, mapping);
            debug!(
                phase = %kind,
                tables = phase.tables.len(),
                batches = phase.total_batches(),
                risk = %phase.risk,
                "Planned phase"
            );
            phases.push(phase);
        }

        let rollback = rollback_descriptor(&phases, target);
        let estimate = estimate(&phases, schema, mapping, target);

        let plan = MigrationPlan {
            migration_id,
            source_name: schema.source_name.clone(),
            schema_fingerprint: schema.fingerprint.clone(),
            created_at,
            target: target.clone(),
            phases,
            rollback,
            estimate,
        };
        plan.validate()?;

        info!(
            migration_id = %plan.migration_id,
            batches = plan.estimate.total_batches,
            rows = plan.estimate.total_rows,
            risk = %plan.estimate.risk,
            "Generated migration plan"
        );
        Ok(plan)
    }
}

fn phase_name(kind: PhaseKind) -> &'static str {
    match kind {
        PhaseKind::PreValidation => "Pre-migration validation",
        PhaseKind::MasterData => "Master and reference data",
        PhaseKind::TransactionalData => "Transactional data",
        PhaseKind::Relationships => "Relationship records",
        PhaseKind::BusinessLogic => "Business-logic artifacts",
        PhaseKind::Indexes => "Secondary indexes",
        PhaseKind::PostValidation => "Post-migration validation",
    }
}

/// Master-category tables whose outgoing references all stay within master data.
fn master_tables(pairs: &[(&TableDescriptor, &EntityMapping)]) -> HashSet<String> {
    let known: HashSet<String> = pairs.iter().map(|(t, _)| t.name.to_ascii_lowercase()).collect();
    let mut master: HashSet<String> = pairs
        .iter()
        .filter(|(t, m)| !t.is_junction && m.category.is_master_data())
        .map(|(t, _)| t.name.to_ascii_lowercase())
        .collect();

    loop {
        let demoted: Vec<String> = pairs
            .iter()
            .filter(|(t, _)| master.contains(&t.name.to_ascii_lowercase()))
            .filter(|(t, _)| {
                t.outgoing_references().any(|fk| {
                    let target = fk.target_table.to_ascii_lowercase();
                    known.contains(&target) && !master.contains(&target)
                })
            })
            .map(|(t, _)| t.name.to_ascii_lowercase())
            .collect();
        if demoted.is_empty() {
            break;
        }
        for name in demoted {
            master.remove(&name);
        }
    }
    master
}

/// Referenced tables first; schema order otherwise.
fn order_by_dependencies<'a>(
    pairs: &[(&'a TableDescriptor, &'a EntityMapping)],
) -> Vec<(&'a TableDescriptor, &'a EntityMapping)> {
    let mut done: Vec<bool> = vec![false; pairs.len()];
    let mut out = Vec::with_capacity(pairs.len());
    let position: HashMap<String, usize> = pairs
        .iter()
        .enumerate()
        .map(|(i, (t, _))| (t.name.to_ascii_lowercase(), i))
        .collect();

    while out.len() < pairs.len() {
        let ready = (0..pairs.len())
            .find(|&i| {
                !done[i]
                    && pairs[i].0.outgoing_references().all(|fk| {
                        position
                            .get(&fk.target_table.to_ascii_lowercase())
                            .map(|&p| done[p])
                            .unwrap_or(true)
                    })
            })
            .or_else(|| (0..pairs.len()).find(|&i| !done[i]));
        match ready {
            Some(i) => {
                done[i] = true;
                out.push(pairs[i]);
            }
            None => break,
        }
    }
    out
}

fn same_phase_dependencies(table: &TableDescriptor, planned: &[TablePlan]) -> Vec<String> {
    let deps: BTreeSet<String> = table
        .outgoing_references()
        .filter_map(|fk| {
            planned
                .iter()
                .find(|p| p.source_table.eq_ignore_ascii_case(&fk.target_table))
                .map(|p| p.source_table.clone())
        })
        .collect();
    deps.into_iter().collect()
}

fn links(
    table: &TableDescriptor,
    m: &EntityMapping,
    entity_types: &HashMap<String, String>,
) -> Vec<LinkSpec> {
    table
        .foreign_keys
        .iter()
        .filter_map(|fk| {
            let target_entity_type = entity_types.get(&fk.target_table.to_ascii_lowercase())?;
            let kind = fk.semantics.unwrap_or(RelationshipKind::OneToMany);
            let shared_target = table
                .foreign_keys
                .iter()
                .filter(|other| other.target_table.eq_ignore_ascii_case(&fk.target_table))
                .count()
                > 1;
            let base = match kind {
                RelationshipKind::Hierarchical => format!("{}_parent", m.entity_type),
                RelationshipKind::SelfReferencing => format!("{}_related", m.entity_type),
                _ => format!("{}_{}", m.entity_type, target_entity_type),
            };
            // Several keys into one table: name each link after its column.
            let relationship_type = if shared_target {
                format!("{}_{}", base, fk.column.to_ascii_lowercase())
            } else {
                base
            };
            Some(LinkSpec {
                column: fk.column.clone(),
                target_table: fk.target_table.clone(),
                target_column: fk.target_column.clone(),
                target_entity_type: target_entity_type.clone(),
                relationship_type,
                kind,
            })
        })
        .collect()
}

fn index_specs(table: &TableDescriptor, m: &EntityMapping) -> Vec<IndexSpec> {
    let mut specs: Vec<IndexSpec> = Vec::new();
    let mut push = |field: &str, tier: StorageTier, unique: bool| {
        let name = format!("ix_{}_{}_{}", m.entity_type, table.name.to_ascii_lowercase(), field);
        if !specs.iter().any(|s| s.name == name) {
            specs.push(IndexSpec {
                name,
                source_table: table.name.clone(),
                entity_type: m.entity_type.clone(),
                field: field.to_string(),
                tier,
                unique,
            });
        }
    };

    if m.natural_key.len() == 1 {
        if let Some(f) = m.field(&m.natural_key[0]) {
            push(&f.target_field, f.tier, true);
        }
    }
    for idx in table.indexes.iter().filter(|i| i.columns.len() == 1) {
        if let Some(f) = m.field(&idx.columns[0]) {
            push(&f.target_field, f.tier, idx.unique);
        }
    }
    specs
}

fn pre_checks() -> Vec<ValidationCheck> {
    vec![
        ValidationCheck {
            name: "source_reachable".to_string(),
            kind: CheckKind::SourceReachable,
            table: None,
            description: "source database answers a connectivity check".to_string(),
        },
        ValidationCheck {
            name: "target_schema".to_string(),
            kind: CheckKind::TargetSchema,
            table: None,
            description: "universal EAV tables exist in the target".to_string(),
        },
    ]
}

fn post_checks(phases: &[MigrationPhase]) -> Vec<ValidationCheck> {
    phases
        .iter()
        .flat_map(|p| p.tables.iter())
        .map(|t| match t.work {
            WorkKind::Entities | WorkKind::JunctionLinks => ValidationCheck {
                name: format!("row_count:{}", t.source_table),
                kind: CheckKind::RowCount,
                table: Some(t.source_table.clone()),
                description: format!(
                    "source rows of {} equal migrated {} records",
                    t.source_table,
                    t.record_kind()
                ),
            },
            WorkKind::ReferenceLinks => ValidationCheck {
                name: format!("integrity:{}", t.source_table),
                kind: CheckKind::ReferentialIntegrity,
                table: Some(t.source_table.clone()),
                description: format!(
                    "relationship records of {} match the references read",
                    t.source_table
                ),
            },
        })
        .collect()
}

fn size_risk(rows: u64) -> RiskLevel {
    if rows > LARGE_TABLE {
        RiskLevel::High
    } else if rows > MEDIUM_TABLE {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn phase_risk(phase: &MigrationPhase, mapping: &EntityMappingResult) -> RiskLevel {
    let mut risk = phase
        .tables
        .iter()
        .map(|t| size_risk(t.row_count))
        .max()
        .unwrap_or(RiskLevel::Low);

    let uncertain = phase.tables.iter().any(|t| {
        t.work == WorkKind::Entities
            && mapping
                .mapping(&t.source_table)
                .map(|m| m.needs_review)
                .unwrap_or(false)
    });
    if uncertain {
        risk = risk.max(RiskLevel::High);
    }
    if phase
        .tables
        .iter()
        .any(|t| t.fields.iter().any(|f| f.transformation.is_some()))
    {
        risk = risk.max(RiskLevel::Medium);
    }
    if phase.artifacts.iter().any(|a| a.enforcement == "manual") {
        risk = risk.max(RiskLevel::Medium);
    }
    risk
}

fn rollback_descriptor(phases: &[MigrationPhase], target: &TargetConfig) -> RollbackDescriptor {
    let undo = phases
        .iter()
        .rev()
        .filter(|p| p.kind.writes_data())
        .map(|phase| {
            let mut steps: Vec<RollbackStep> = phase
                .tables
                .iter()
                .rev()
                .map(|t| RollbackStep {
                    phase: phase.kind,
                    table: Some(t.source_table.clone()),
                    kind: t.record_kind(),
                    batch_count: t.batch.batch_count,
                    description: format!(
                        "delete {} records of {} in reverse batch order ({} batches)",
                        t.record_kind(),
                        t.source_table,
                        t.batch.batch_count
                    ),
                })
                .collect();
            if !phase.artifacts.is_empty() {
                steps.push(RollbackStep {
                    phase: phase.kind,
                    table: None,
                    kind: RecordKind::Artifact,
                    batch_count: 0,
                    description: format!("remove {} business-logic artifacts", phase.artifacts.len()),
                });
            }
            if !phase.indexes.is_empty() {
                steps.push(RollbackStep {
                    phase: phase.kind,
                    table: None,
                    kind: RecordKind::Index,
                    batch_count: 0,
                    description: format!("drop {} secondary indexes", phase.indexes.len()),
                });
            }
            PhaseRollback {
                phase: phase.kind,
                steps,
            }
        })
        .collect();

    RollbackDescriptor {
        phases: undo,
        emergency_window_secs: target.emergency_rollback_window_secs,
        emergency_description: format!(
            "delete every target record tagged with the migration id; allowed for {}s after start",
            target.emergency_rollback_window_secs
        ),
    }
}

fn estimate(
    phases: &[MigrationPhase],
    schema: &SchemaAnalysisResult,
    mapping: &EntityMappingResult,
    target: &TargetConfig,
) -> PlanEstimate {
    let total_rows: u64 = phases
        .iter()
        .flat_map(|p| p.tables.iter())
        .map(|t| t.row_count)
        .sum();
    let total_batches = phases.iter().map(|p| p.total_batches()).sum();
    let duration_secs = total_rows.div_ceil(target.rows_per_second.max(1)) + phases.len() as u64;

    let foreign_keys: usize = schema.tables.iter().map(|t| t.foreign_keys.len()).sum();
    let transformations = mapping
        .mappings
        .iter()
        .flat_map(|m| m.field_mappings.iter())
        .filter(|f| f.transformation.is_some())
        .count();
    let review = mapping
        .mappings
        .iter()
        .filter(|m| m.needs_review && m.entity_type != FALLBACK_ENTITY)
        .count();
    let score = schema.tables.len() + 2 * foreign_keys + transformations + 3 * review;
    let complexity = match score {
        0..=19 => Complexity::Low,
        20..=59 => Complexity::Medium,
        _ => Complexity::High,
    };

    PlanEstimate {
        total_rows,
        total_batches,
        duration_secs,
        complexity,
        risk: phases
            .iter()
            .map(|p| p.risk)
            .max()
            .unwrap_or(RiskLevel::Low),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{MemorySource, SourceColumn, SourceForeignKey, SourceTable};
    use crate::mapping::EntityTypeMapper;
    use crate::schema::{AnalysisOptions, SchemaAnalyzer};
    use crate::vocabulary::Vocabulary;
    use std::sync::Arc;

    fn plan_for(source: &MemorySource, target: &TargetConfig) -> MigrationPlan {
        let vocab = Arc::new(Vocabulary::standard());
        let schema = SchemaAnalyzer::new(Arc::clone(&vocab))
            .analyze(source, &AnalysisOptions::default())
            .unwrap();
        let mapping = EntityTypeMapper::new(vocab).generate_mapping(&schema, None, None, None);
        MigrationPlanner::new()
            .generate_migration_plan(&schema, &mapping, target)
            .unwrap()
    }

    fn shop() -> MemorySource {
        let customers = SourceTable::new("customers")
            .with_column(SourceColumn::new("customer_id", "int").not_null())
            .with_column(SourceColumn::new("customer_name", "varchar(100)"))
            .with_primary_key(&["customer_id"]);
        let orders = SourceTable::new("orders")
            .with_column(SourceColumn::new("order_id", "int").not_null())
            .with_column(SourceColumn::new("customer_id", "int").not_null())
            .with_column(SourceColumn::new("order_date", "datetime"))
            .with_primary_key(&["order_id"])
            .with_foreign_key(SourceForeignKey::new("customer_id", "customers", "customer_id"));
        MemorySource::new("shop")
            .with_table(orders, Vec::new())
            .with_table(customers, Vec::new())
    }

    #[test]
    fn test_phases_in_declared_order() {
        let plan = plan_for(&shop(), &TargetConfig::default());
        let kinds: Vec<PhaseKind> = plan.phases.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, PhaseKind::ALL.to_vec());
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_master_before_transactional() {
        let plan = plan_for(&shop(), &TargetConfig::default());
        let master = plan.phase(PhaseKind::MasterData).unwrap();
        let trans = plan.phase(PhaseKind::TransactionalData).unwrap();
        assert_eq!(master.tables[0].source_table, "customers");
        assert_eq!(trans.tables[0].source_table, "orders");

        let links = plan.phase(PhaseKind::Relationships).unwrap();
        assert_eq!(links.tables.len(), 1);
        assert_eq!(links.tables[0].work, WorkKind::ReferenceLinks);
        assert_eq!(links.tables[0].links[0].kind, RelationshipKind::OneToMany);
    }

    #[test]
    fn test_rollback_is_reverse_order() {
        let plan = plan_for(&shop(), &TargetConfig::default());
        let order: Vec<PhaseKind> = plan.rollback.phases.iter().map(|p| p.phase).collect();
        assert_eq!(
            order,
            vec![
                PhaseKind::Indexes,
                PhaseKind::BusinessLogic,
                PhaseKind::Relationships,
                PhaseKind::TransactionalData,
                PhaseKind::MasterData,
            ]
        );
        assert_eq!(plan.rollback.emergency_window_secs, 24 * 60 * 60);
    }

    #[test]
    fn test_mapping_from_other_snapshot_rejected() {
        let vocab = Arc::new(Vocabulary::standard());
        let schema = SchemaAnalyzer::new(Arc::clone(&vocab))
            .analyze(&shop(), &AnalysisOptions::default())
            .unwrap();
        let mut mapping = EntityTypeMapper::new(vocab).generate_mapping(&schema, None, None, None);
        mapping.schema_fingerprint = "other".to_string();
        let err = MigrationPlanner::new()
            .generate_migration_plan(&schema, &mapping, &TargetConfig::default())
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidPlan { .. }));
    }

    #[test]
    fn test_keys_into_one_table_get_role_names() {
        let customers = SourceTable::new("customers")
            .with_column(SourceColumn::new("customer_id", "int").not_null())
            .with_column(SourceColumn::new("customer_name", "varchar(100)"))
            .with_primary_key(&["customer_id"]);
        let orders = SourceTable::new("orders")
            .with_column(SourceColumn::new("order_id", "int").not_null())
            .with_column(SourceColumn::new("bill_to_id", "int"))
            .with_column(SourceColumn::new("ship_to_id", "int"))
            .with_primary_key(&["order_id"])
            .with_foreign_key(SourceForeignKey::new("bill_to_id", "customers", "customer_id"))
            .with_foreign_key(SourceForeignKey::new("ship_to_id", "customers", "customer_id"));
        let source = MemorySource::new("shop")
            .with_table(orders, Vec::new())
            .with_table(customers, Vec::new());
        let plan = plan_for(&source, &TargetConfig::default());

        let links = plan.phase(PhaseKind::Relationships).unwrap();
        assert_eq!(links.tables.len(), 1);
        let table = &links.tables[0];
        assert_eq!(table.work, WorkKind::ReferenceLinks);
        let types: Vec<&str> = table
            .links
            .iter()
            .map(|l| l.relationship_type.as_str())
            .collect();
        assert_eq!(types.len(), 2);
        assert!(types[0].ends_with("_bill_to_id"));
        assert!(types[1].ends_with("_ship_to_id"));
    }

    #[test]
    fn test_post_validation_checks_every_table() {
        let plan = plan_for(&shop(), &TargetConfig::default());
        let post = plan.phase(PhaseKind::PostValidation).unwrap();
        let row_counts = post
            .checks
            .iter()
            .filter(|c| c.kind == CheckKind::RowCount)
            .count();
        assert_eq!(row_counts, 2);
        assert!(post
            .checks
            .iter()
            .any(|c| c.kind == CheckKind::ReferentialIntegrity));
    }
}
