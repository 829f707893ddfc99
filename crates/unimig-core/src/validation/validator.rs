//! Migration validation passes.
//!
//! Runs before execution over the analysis and mapping, and after execution
//! over the execution report. Data-quality findings are warnings unless
//! configured to block; classification findings never block.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::finding::{FindingStatus, Impact, ValidationFinding};
use crate::mapping::{Enforcement, EntityMappingResult};
use crate::migration::{ExecutionReport, MigrationId, MigrationStatus, WorkKind};
use crate::schema::SchemaAnalysisResult;

/// Validation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Turn data-quality findings at or above `blocking_impact` into failures.
    pub block_on_data_quality: bool,
    pub blocking_impact: Impact,
    /// Throughput below which the performance check warns.
    pub min_rows_per_second: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            block_on_data_quality: false,
            blocking_impact: Impact::High,
            min_rows_per_second: 100,
        }
    }
}

impl ValidationConfig {
    pub fn with_block_on_data_quality(mut self, block: bool) -> Self {
        self.block_on_data_quality = block;
        self
    }

    pub fn with_blocking_impact(mut self, impact: Impact) -> Self {
        self.blocking_impact = impact;
        self
    }

    pub fn with_min_rows_per_second(mut self, rows: u64) -> Self {
        self.min_rows_per_second = rows;
        self
    }
}

/// Structured validation report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub migration_id: Option<MigrationId>,
    pub source_name: String,
    pub findings: Vec<ValidationFinding>,
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
    /// Worst status across findings.
    pub status: FindingStatus,
    /// Whether the migration may be marked complete.
    pub complete: bool,
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    fn build(
        migration_id: Option<MigrationId>,
        source_name: &str,
        findings: Vec<ValidationFinding>,
        executed_ok: bool,
    ) -> Self {
        let count = |s: FindingStatus| findings.iter().filter(|f| f.status == s).count();
        let passed = count(FindingStatus::Passed);
        let warnings = count(FindingStatus::Warning);
        let failed = count(FindingStatus::Failed);
        let status = findings
            .iter()
            .map(|f| f.status)
            .max()
            .unwrap_or(FindingStatus::Passed);

        let mut recommendations: Vec<String> = Vec::new();
        let mut ranked: Vec<&ValidationFinding> = findings
            .iter()
            .filter(|f| f.status != FindingStatus::Passed && !f.recommendation.is_empty())
            .collect();
        ranked.sort_by(|a, b| b.status.cmp(&a.status).then(b.impact.cmp(&a.impact)));
        for f in ranked {
            if !recommendations.contains(&f.recommendation) {
                recommendations.push(f.recommendation.clone());
            }
        }

        Self {
            migration_id,
            source_name: source_name.to_string(),
            passed,
            warnings,
            failed,
            status,
            complete: executed_ok && failed == 0,
            recommendations,
            findings,
        }
    }

    /// Findings produced by a check.
    pub fn findings_for<'a>(&'a self, check: &'a str) -> impl Iterator<Item = &'a ValidationFinding> {
        self.findings.iter().filter(move |f| f.check == check)
    }

    /// Whether any finding blocks completion.
    pub fn is_blocking(&self) -> bool {
        self.failed > 0
    }
}

/// Runs validation passes.
#[derive(Debug, Clone, Default)]
pub struct MigrationValidator {
    config: ValidationConfig,
}

impl MigrationValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Checks that need only the analysis and the mapping.
    pub fn pre_validate(
        &self,
        schema: &SchemaAnalysisResult,
        mapping: &EntityMappingResult,
    ) -> ValidationReport {
        let findings = self.static_findings(schema, mapping);
        let report = ValidationReport::build(None, &schema.source_name, findings, false);
        info!(
            source = %schema.source_name,
            passed = report.passed,
            warnings = report.warnings,
            failed = report.failed,
            "Pre-migration validation finished"
        );
        report
    }

    /// Full validation of an executed migration.
    pub fn validate(
        &self,
        schema: &SchemaAnalysisResult,
        mapping: &EntityMappingResult,
        report: &ExecutionReport,
    ) -> ValidationReport {
        let mut findings = self.static_findings(schema, mapping);
        findings.extend(self.completeness(schema, report));
        findings.extend(
            report
                .findings
                .iter()
                .filter(|f| f.check != "completeness")
                .cloned(),
        );
        findings.push(self.performance(report));

        let executed_ok = report.status == MigrationStatus::Complete && !report.dry_run;
        let out = ValidationReport::build(
            Some(report.migration_id),
            &schema.source_name,
            findings,
            executed_ok,
        );
        if out.is_blocking() {
            warn!(
                migration_id = %report.migration_id,
                failed = out.failed,
                "Validation found blocking issues"
            );
        } else {
            info!(
                migration_id = %report.migration_id,
                passed = out.passed,
                warnings = out.warnings,
                "Validation finished"
            );
        }
        out
    }

    fn static_findings(
        &self,
        schema: &SchemaAnalysisResult,
        mapping: &EntityMappingResult,
    ) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        findings.extend(mapping_coverage(schema, mapping));
        findings.extend(integrity(schema));
        findings.extend(business_rules(mapping));
        findings.extend(classification(mapping));
        findings.extend(self.data_quality(schema));
        findings
    }

    fn data_quality(&self, schema: &SchemaAnalysisResult) -> Vec<ValidationFinding> {
        if schema.data_quality.issues.is_empty() {
            return vec![ValidationFinding::passed(
                "data_quality",
                format!("no data-quality issues; score {}", schema.data_quality.score),
            )];
        }
        schema
            .data_quality
            .issues
            .iter()
            .map(|issue| {
                let message = match &issue.column {
                    Some(column) => format!("{}.{}: {}", issue.table, column, issue.message),
                    None => format!("{}: {}", issue.table, issue.message),
                };
                let recommendation = "clean the source data or add a transformation before migrating";
                let blocks =
                    self.config.block_on_data_quality && issue.severity >= self.config.blocking_impact;
                let finding = if blocks {
                    ValidationFinding::failed("data_quality", issue.severity, message, recommendation)
                } else {
                    ValidationFinding::warning("data_quality", issue.severity, message, recommendation)
                };
                finding.for_table(issue.table.clone())
            })
            .collect()
    }

    fn completeness(
        &self,
        schema: &SchemaAnalysisResult,
        report: &ExecutionReport,
    ) -> Vec<ValidationFinding> {
        schema
            .tables
            .iter()
            .map(|table| {
                let work = if table.is_junction {
                    WorkKind::JunctionLinks
                } else {
                    WorkKind::Entities
                };
                let moved = report
                    .tables
                    .iter()
                    .find(|t| t.work == work && t.table.eq_ignore_ascii_case(&table.name));
                let finding = match moved {
                    None => ValidationFinding::warning(
                        "completeness",
                        Impact::High,
                        format!("{} was not migrated in this run", table.name),
                        "resume the migration to finish the remaining phases",
                    ),
                    Some(t) if t.rows_read < table.row_count => ValidationFinding::warning(
                        "completeness",
                        Impact::High,
                        format!(
                            "{} of {} rows of {} were read",
                            t.rows_read, table.row_count, table.name
                        ),
                        "resume the migration to finish the remaining batches",
                    ),
                    Some(t) if t.rows_rejected > 0 => ValidationFinding::warning(
                        "completeness",
                        Impact::Medium,
                        format!(
                            "{} rows of {} were rejected for a missing natural key",
                            t.rows_rejected, table.name
                        ),
                        "fix the missing keys in the source and re-run the table",
                    ),
                    Some(t) => ValidationFinding::passed(
                        "completeness",
                        format!("{} rows of {} read", t.rows_read, table.name),
                    ),
                };
                finding.for_table(table.name.clone())
            })
            .collect()
    }

    fn performance(&self, report: &ExecutionReport) -> ValidationFinding {
        let elapsed_micros = report.completed_at.saturating_sub(report.started_at).max(1);
        let rows = report.tables.iter().map(|t| t.rows_read).sum::<u64>();
        let per_second = rows.saturating_mul(1_000_000) / elapsed_micros;
        if rows > 0 && per_second < self.config.min_rows_per_second {
            ValidationFinding::warning(
                "performance",
                Impact::Low,
                format!("throughput {} rows/s is below {} rows/s", per_second, self.config.min_rows_per_second),
                "raise the batch size or the number of parallel workers",
            )
        } else {
            ValidationFinding::passed(
                "performance",
                format!("{} rows in {} ms", rows, elapsed_micros / 1000),
            )
        }
    }
}

fn mapping_coverage(
    schema: &SchemaAnalysisResult,
    mapping: &EntityMappingResult,
) -> Vec<ValidationFinding> {
    let missing: Vec<&str> = schema
        .tables
        .iter()
        .filter(|t| mapping.mapping(&t.name).is_none())
        .map(|t| t.name.as_str())
        .collect();
    if missing.is_empty() {
        vec![ValidationFinding::passed(
            "mapping_coverage",
            format!("all {} tables mapped", schema.tables.len()),
        )]
    } else {
        vec![ValidationFinding::failed(
            "mapping_coverage",
            Impact::Critical,
            format!("tables without a mapping: {}", missing.join(", ")),
            "re-run the mapper against the current analysis",
        )]
    }
}

/// Foreign keys pointing outside the analyzed schema.
fn integrity(schema: &SchemaAnalysisResult) -> Vec<ValidationFinding> {
    let mut findings: Vec<ValidationFinding> = schema
        .tables
        .iter()
        .flat_map(|t| t.foreign_keys.iter().map(move |fk| (t, fk)))
        .filter(|(_, fk)| schema.table(&fk.target_table).is_none())
        .map(|(t, fk)| {
            ValidationFinding::warning(
                "integrity",
                Impact::Medium,
                format!(
                    "{}.{} references {} which is not part of the migration",
                    t.name, fk.column, fk.target_table
                ),
                "include the referenced table or accept dangling references",
            )
            .for_table(t.name.clone())
        })
        .collect();
    if findings.is_empty() {
        findings.push(ValidationFinding::passed(
            "integrity",
            "every foreign key targets a migrated table",
        ));
    }
    findings
}

fn business_rules(mapping: &EntityMappingResult) -> Vec<ValidationFinding> {
    let mut findings: Vec<ValidationFinding> = mapping
        .mappings
        .iter()
        .flat_map(|m| m.business_rules.iter().map(move |r| (m, r)))
        .map(|(m, rule)| {
            let finding = match rule.enforcement {
                Enforcement::Advisory => ValidationFinding::warning(
                    "business_rule",
                    Impact::Low,
                    format!(
                        "{} ({}) restated as `{}`; advisory until confirmed",
                        rule.rule_name, rule.kind, rule.target_expression
                    ),
                    "review translated rules before enabling enforcement",
                ),
                Enforcement::Manual => ValidationFinding::warning(
                    "business_rule",
                    Impact::Medium,
                    format!("{} ({}) needs manual re-implementation", rule.rule_name, rule.kind),
                    "re-implement procedural logic in the target application",
                ),
            };
            finding.for_table(m.source_table.clone())
        })
        .collect();
    if findings.is_empty() {
        findings.push(ValidationFinding::passed(
            "business_rule",
            "no business rules to carry over",
        ));
    }
    findings
}

/// Classification uncertainty; warnings at most.
fn classification(mapping: &EntityMappingResult) -> Vec<ValidationFinding> {
    mapping
        .mappings
        .iter()
        .flat_map(|m| {
            m.validation.iter().map(move |f| {
                let mut f = f.clone();
                if f.status == FindingStatus::Failed {
                    f.status = FindingStatus::Warning;
                }
                if f.table.is_none() {
                    f.table = Some(m.source_table.clone());
                }
                f
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{MemorySource, Row, SourceColumn, SourceTable, Value};
    use crate::mapping::EntityTypeMapper;
    use crate::schema::{AnalysisOptions, SchemaAnalyzer};
    use crate::vocabulary::Vocabulary;
    use std::sync::Arc;

    fn analyze(source: &MemorySource) -> (SchemaAnalysisResult, EntityMappingResult) {
        let vocab = Arc::new(Vocabulary::standard());
        let schema = SchemaAnalyzer::new(Arc::clone(&vocab))
            .analyze(source, &AnalysisOptions::default())
            .unwrap();
        let mapping = EntityTypeMapper::new(vocab).generate_mapping(&schema, None, None, None);
        (schema, mapping)
    }

    fn dirty_source() -> MemorySource {
        let table = SourceTable::new("customers")
            .with_column(SourceColumn::new("customer_id", "int").not_null())
            .with_column(SourceColumn::new("customer_name", "varchar(50)").not_null())
            .with_primary_key(&["customer_id"]);
        let rows: Vec<Row> = (1..=20)
            .map(|i| {
                let name = if i == 3 {
                    Value::text("N/A")
                } else {
                    Value::text(format!("Customer {}", i))
                };
                Row::from([
                    ("customer_id".to_string(), Value::Int(i)),
                    ("customer_name".to_string(), name),
                ])
            })
            .collect();
        MemorySource::new("crm").with_table(table, rows)
    }

    #[test]
    fn test_data_quality_warns_by_default() {
        let (schema, mapping) = analyze(&dirty_source());
        let report = MigrationValidator::default().pre_validate(&schema, &mapping);

        let quality: Vec<_> = report.findings_for("data_quality").collect();
        assert!(!quality.is_empty());
        assert!(quality.iter().all(|f| f.status == FindingStatus::Warning));
        assert!(!report.is_blocking());
    }

    #[test]
    fn test_data_quality_can_block() {
        let (schema, mapping) = analyze(&dirty_source());
        let validator =
            MigrationValidator::new(ValidationConfig::default().with_block_on_data_quality(true));
        let report = validator.pre_validate(&schema, &mapping);

        assert!(report.is_blocking());
        assert_eq!(report.status, FindingStatus::Failed);
        assert!(report
            .findings_for("data_quality")
            .any(|f| f.status == FindingStatus::Failed && f.impact == Impact::Critical));
        assert!(!report.recommendations.is_empty());
    }

    #[test]
    fn test_unknown_fk_target_is_integrity_warning() {
        let table = SourceTable::new("orders")
            .with_column(SourceColumn::new("order_id", "int").not_null())
            .with_column(SourceColumn::new("warehouse_id", "int"))
            .with_primary_key(&["order_id"])
            .with_foreign_key(crate::connector::SourceForeignKey::new(
                "warehouse_id",
                "warehouses",
                "warehouse_id",
            ));
        let (schema, mapping) = analyze(&MemorySource::new("erp").with_table(table, Vec::new()));
        let report = MigrationValidator::default().pre_validate(&schema, &mapping);

        let integrity: Vec<_> = report.findings_for("integrity").collect();
        assert_eq!(integrity.len(), 1);
        assert_eq!(integrity[0].status, FindingStatus::Warning);
        assert!(integrity[0].message.contains("warehouses"));
    }
}
