//! Human-readable forward and rollback scripts.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::MigrationError;
use super::plan::{MigrationPhase, MigrationPlan, PhaseKind, TablePlan, WorkKind};
use crate::connector::RecordKind;
use crate::mapping::StorageTier;

/// Script text for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseScript {
    pub phase: PhaseKind,
    pub file_name: String,
    pub body: String,
}

/// Forward scripts grouped by phase plus matching rollback scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSet {
    pub forward: Vec<PhaseScript>,
    pub rollback: Vec<PhaseScript>,
}

impl ScriptSet {
    /// Render scripts for a plan.
    pub fn render(plan: &MigrationPlan) -> Self {
        let forward = plan
            .phases
            .iter()
            .enumerate()
            .map(|(idx, phase)| PhaseScript {
                phase: phase.kind,
                file_name: format!("{:02}_{}.sql", idx + 1, phase.kind),
                body: forward_script(plan, phase),
            })
            .collect();

        let rollback = plan
            .rollback
            .phases
            .iter()
            .enumerate()
            .map(|(idx, undo)| {
                let mut body = header(plan, &format!("ROLLBACK {}", undo.phase));
                for step in &undo.steps {
                    let _ = writeln!(body, "-- {}", step.description);
                    body.push_str(&delete_statement(plan, step.kind, step.table.as_deref(), step.batch_count));
                    body.push('\n');
                }
                PhaseScript {
                    phase: undo.phase,
                    file_name: format!("rollback_{:02}_{}.sql", idx + 1, undo.phase),
                    body,
                }
            })
            .collect();

        Self { forward, rollback }
    }

    /// Emergency full rollback script.
    pub fn emergency(plan: &MigrationPlan) -> String {
        let mut body = header(plan, "EMERGENCY FULL ROLLBACK");
        let _ = writeln!(body, "-- {}", plan.rollback.emergency_description);
        for table in [
            &plan.target.relationship_table,
            &plan.target.property_table,
            &plan.target.attribute_table,
            &plan.target.entity_table,
        ] {
            let _ = writeln!(
                body,
                "DELETE FROM {} WHERE migration_id = '{}';",
                table, plan.migration_id
            );
        }
        body
    }

    /// Write every script into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path, plan: &MigrationPlan) -> Result<Vec<PathBuf>, MigrationError> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for script in self.forward.iter().chain(self.rollback.iter()) {
            let path = dir.join(&script.file_name);
            fs::write(&path, &script.body)?;
            written.push(path);
        }
        let path = dir.join("rollback_emergency.sql");
        fs::write(&path, Self::emergency(plan))?;
        written.push(path);
        Ok(written)
    }
}

fn header(plan: &MigrationPlan, title: &str) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "-- {}", title);
    let _ = writeln!(s, "-- migration {} from {}", plan.migration_id, plan.source_name);
    let _ = writeln!(s, "-- schema fingerprint {}", plan.schema_fingerprint);
    s.push('\n');
    s
}

fn forward_script(plan: &MigrationPlan, phase: &MigrationPhase) -> String {
    let mut body = header(plan, &format!("PHASE {} ({})", phase.kind, phase.name));
    let _ = writeln!(body, "-- risk: {}", phase.risk);
    if !phase.depends_on.is_empty() {
        let deps: Vec<&str> = phase.depends_on.iter().map(|d| d.as_str()).collect();
        let _ = writeln!(body, "-- requires: {}", deps.join(", "));
    }
    body.push('\n');

    for check in &phase.checks {
        let _ = writeln!(body, "-- CHECK {}: {}", check.name, check.description);
    }
    for table in &phase.tables {
        body.push_str(&table_script(plan, table));
    }
    for artifact in &phase.artifacts {
        let _ = writeln!(
            body,
            "-- {} rule {} on {} ({})",
            artifact.rule_kind, artifact.name, artifact.entity_type, artifact.enforcement
        );
        let _ = writeln!(body, "--   {}", artifact.definition);
    }
    for index in &phase.indexes {
        let _ = writeln!(
            body,
            "CREATE {}INDEX {} ON {} ({}) WHERE entity_type = '{}';",
            if index.unique { "UNIQUE " } else { "" },
            index.name,
            tier_table(plan, index.tier),
            index.field,
            index.entity_type
        );
    }
    body
}

fn table_script(plan: &MigrationPlan, table: &TablePlan) -> String {
    let mut s = String::new();
    let order = table.batch.order_key.join(", ");
    let _ = writeln!(
        s,
        "-- {}: {} rows of {} as {} in {} batches of {} (last batch {})",
        table.work,
        table.row_count,
        table.source_table,
        table.entity_type,
        table.batch.batch_count,
        table.batch.batch_size,
        table.batch.last_batch_size
    );
    let cursor: Vec<String> = table
        .batch
        .order_key
        .iter()
        .map(|c| format!(":last_{}", c.to_ascii_lowercase()))
        .collect();
    let _ = writeln!(
        s,
        "-- batch source: SELECT * FROM {} WHERE ({}) > ({}) ORDER BY {} LIMIT {};",
        table.source_table,
        order,
        cursor.join(", "),
        order,
        table.batch.batch_size
    );

    match table.work {
        WorkKind::Entities => {
            let key = table.natural_key.join(" || '|' || ");
            let _ = writeln!(
                s,
                "INSERT INTO {} (entity_id, entity_type, natural_key, migration_id)\n  SELECT hash('{}', {}), '{}', {}, '{}' FROM batch\n  ON CONFLICT (entity_id) DO UPDATE SET natural_key = EXCLUDED.natural_key;",
                plan.target.entity_table,
                table.entity_type,
                key,
                table.entity_type,
                key,
                plan.migration_id
            );
            for field in &table.fields {
                let expr = field
                    .transformation
                    .map(|t| t.expression(&field.source_column))
                    .unwrap_or_else(|| field.source_column.clone());
                let _ = writeln!(
                    s,
                    "UPSERT {} SET {} = {}  -- {} tier",
                    tier_table(plan, field.tier),
                    field.target_field,
                    expr,
                    field.tier
                );
            }
        }
        WorkKind::ReferenceLinks | WorkKind::JunctionLinks => {
            for link in &table.links {
                let _ = writeln!(
                    s,
                    "INSERT INTO {} (relationship_type, from_entity, to_entity, migration_id)\n  SELECT '{}', entity_of('{}'), entity_of('{}', {}.{}), '{}' FROM batch WHERE {} IS NOT NULL\n  ON CONFLICT DO NOTHING;  -- {}",
                    plan.target.relationship_table,
                    link.relationship_type,
                    table.source_table,
                    link.target_table,
                    link.target_table,
                    link.target_column,
                    plan.migration_id,
                    link.column,
                    link.kind
                );
            }
        }
    }
    let _ = writeln!(s, "-- CHECKPOINT after each batch: ({}) , rows processed\n", order);
    s
}

fn tier_table(plan: &MigrationPlan, tier: StorageTier) -> &str {
    match tier {
        StorageTier::Identity => &plan.target.entity_table,
        StorageTier::AttributeMetadata => &plan.target.attribute_table,
        StorageTier::DynamicProperty => &plan.target.property_table,
    }
}

fn delete_statement(
    plan: &MigrationPlan,
    kind: RecordKind,
    table: Option<&str>,
    batch_count: u64,
) -> String {
    let target = match kind {
        RecordKind::Entity => plan.target.entity_table.as_str(),
        RecordKind::Relationship => plan.target.relationship_table.as_str(),
        RecordKind::Artifact => "business_logic_artifacts",
        RecordKind::Index => "entity_indexes",
    };
    let filter = table
        .map(|t| format!(" AND source_table = '{}'", t))
        .unwrap_or_default();
    if batch_count > 1 {
        format!(
            "-- for batch in {}..=1:\nDELETE FROM {} WHERE migration_id = '{}'{} AND batch_no = :batch;\n",
            batch_count, target, plan.migration_id, filter
        )
    } else {
        format!(
            "DELETE FROM {} WHERE migration_id = '{}'{};\n",
            target, plan.migration_id, filter
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{MemorySource, SourceColumn, SourceTable};
    use crate::mapping::EntityTypeMapper;
    use crate::migration::{MigrationPlanner, TargetConfig};
    use crate::schema::{AnalysisOptions, SchemaAnalyzer};
    use crate::vocabulary::Vocabulary;
    use std::sync::Arc;

    fn plan() -> MigrationPlan {
        let table = SourceTable::new("products")
            .with_column(SourceColumn::new("product_code", "varchar(20)").not_null())
            .with_column(SourceColumn::new("product_name", "varchar(100)"))
            .with_primary_key(&["product_code"]);
        let source = MemorySource::new("erp").with_table(table, Vec::new());
        let vocab = Arc::new(Vocabulary::standard());
        let schema = SchemaAnalyzer::new(Arc::clone(&vocab))
            .analyze(&source, &AnalysisOptions::default())
            .unwrap();
        let mapping = EntityTypeMapper::new(vocab).generate_mapping(&schema, None, None, None);
        MigrationPlanner::new()
            .generate_migration_plan(&schema, &mapping, &TargetConfig::default())
            .unwrap()
    }

    #[test]
    fn test_render_groups_by_phase() {
        let plan = plan();
        let scripts = ScriptSet::render(&plan);
        assert_eq!(scripts.forward.len(), 7);
        assert_eq!(scripts.forward[1].file_name, "02_master_data.sql");
        assert!(scripts.forward[1].body.contains("universal_entities"));
        assert_eq!(scripts.rollback.len(), 5);
        assert!(scripts.rollback[0].file_name.starts_with("rollback_01_indexes"));
    }

    #[test]
    fn test_write_to_directory() {
        let plan = plan();
        let dir = tempfile::tempdir().unwrap();
        let written = ScriptSet::render(&plan).write_to(dir.path(), &plan).unwrap();
        assert_eq!(written.len(), 13);
        let emergency = std::fs::read_to_string(dir.path().join("rollback_emergency.sql")).unwrap();
        assert!(emergency.contains(&plan.migration_id.to_string()));
    }
}
