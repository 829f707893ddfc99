//! Output formatters for command results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde::Serialize;
use unimig_core::migration::{MigrationState, RollbackReport, TableRecord};
use unimig_core::{
    EntityMappingResult, ExecutionReport, MigrationPlan, SchemaAnalysisResult, ValidationReport,
};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    fn format_schema(&self, schema: &SchemaAnalysisResult) -> String;

    fn format_mapping(&self, mapping: &EntityMappingResult) -> String;

    fn format_plan(&self, plan: &MigrationPlan) -> String;

    fn format_execution(&self, report: &ExecutionReport) -> String;

    fn format_rollback(&self, report: &RollbackReport) -> String;

    /// One migration with its per-table log.
    fn format_status(&self, state: &MigrationState, tables: &[TableRecord]) -> String;

    /// All migrations in the log.
    fn format_states(&self, states: &[MigrationState]) -> String;

    fn format_validation(&self, report: &ValidationReport) -> String;

    fn format_error(&self, error: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_schema(&self, schema: &SchemaAnalysisResult) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Table", "Rows", "Columns", "Foreign keys", "Purpose"]);
        for t in &schema.tables {
            table.add_row(vec![
                Cell::new(&t.name),
                Cell::new(t.row_count),
                Cell::new(t.columns.len()),
                Cell::new(t.foreign_keys.len()),
                Cell::new(&t.business_purpose),
            ]);
        }

        let mut output = format!(
            "Source: {}  fingerprint: {}\n",
            schema.source_name, schema.fingerprint
        );
        output.push_str(&table.to_string());
        output.push_str(&format!(
            "\nBusiness rules: {}  data quality score: {}  cleanup required: {}",
            schema.business_rules.len(),
            schema.data_quality.score,
            schema.data_quality.cleanup_required
        ));
        for issue in &schema.data_quality.issues {
            output.push_str(&format!("\n  [{}] {}", issue.severity, issue.message));
        }
        output
    }

    fn format_mapping(&self, mapping: &EntityMappingResult) -> String {
        let mut table = Table::new();
        table.set_header(vec![
            "Table",
            "Entity type",
            "Category",
            "Confidence",
            "Strategy",
            "Review",
        ]);
        for m in &mapping.mappings {
            table.add_row(vec![
                Cell::new(&m.source_table),
                Cell::new(&m.entity_type),
                Cell::new(m.category),
                Cell::new(format!("{:.2}", m.confidence)),
                Cell::new(m.strategy),
                Cell::new(if m.needs_review { "yes" } else { "" }),
            ]);
        }

        let mut output = table.to_string();
        output.push_str(&format!(
            "\nOverall confidence: {:.2} (threshold {:.2})",
            mapping.overall_confidence, mapping.confidence_threshold
        ));
        for warning in &mapping.warnings {
            output.push_str(&format!("\n  warning: {}", warning.message));
        }
        output
    }

    fn format_plan(&self, plan: &MigrationPlan) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Phase", "Tables", "Batches", "Depends on", "Risk"]);
        for phase in &plan.phases {
            let tables: Vec<String> = phase
                .tables
                .iter()
                .map(|t| format!("{} ({})", t.source_table, t.work))
                .collect();
            let deps: Vec<&str> = phase.depends_on.iter().map(|d| d.as_str()).collect();
            table.add_row(vec![
                Cell::new(phase.kind),
                Cell::new(tables.join("\n")),
                Cell::new(phase.total_batches()),
                Cell::new(deps.join(", ")),
                Cell::new(phase.risk),
            ]);
        }

        format!(
            "Migration {} from {}\n{}\nRows: {}  batches: {}  estimated: {}s  complexity: {}  risk: {}",
            plan.migration_id,
            plan.source_name,
            table,
            plan.estimate.total_rows,
            plan.estimate.total_batches,
            plan.estimate.duration_secs,
            plan.estimate.complexity,
            plan.estimate.risk
        )
    }

    fn format_execution(&self, report: &ExecutionReport) -> String {
        let mut table = Table::new();
        table.set_header(vec![
            "Phase", "Table", "Status", "Batches", "Read", "Written", "Rejected", "Retries",
        ]);
        for t in &report.tables {
            table.add_row(vec![
                Cell::new(t.phase),
                Cell::new(format!("{} ({})", t.table, t.work)),
                Cell::new(t.status),
                Cell::new(format!("{}/{}", t.batches_committed, t.batches_planned)),
                Cell::new(t.rows_read),
                Cell::new(t.rows_written),
                Cell::new(t.rows_rejected),
                Cell::new(t.retries),
            ]);
        }

        let mut output = format!(
            "Migration {}: {}{}\n",
            report.migration_id,
            report.status,
            if report.dry_run { " (dry run)" } else { "" }
        );
        output.push_str(&table.to_string());
        if let Some(batch) = report.resumed_from_batch {
            output.push_str(&format!("\nResumed from batch {}", batch));
        }
        if let Some(error) = &report.error {
            output.push_str(&format!("\nError: {}", error));
        }
        for finding in report.failed_findings() {
            output.push_str(&format!("\n  [{}] {}", finding.impact, finding.message));
        }
        output
    }

    fn format_rollback(&self, report: &RollbackReport) -> String {
        let phases: Vec<&str> = report.phases.iter().map(|p| p.as_str()).collect();
        format!(
            "Rolled back {} of migration {}: {} record(s) deleted, {} remaining\nPhases: {}",
            report.scope,
            report.migration_id,
            report.records_deleted,
            report.records_remaining,
            phases.join(", ")
        )
    }

    fn format_status(&self, state: &MigrationState, tables: &[TableRecord]) -> String {
        let mut phases = Table::new();
        phases.set_header(vec!["Phase", "Status", "Rows", "Batches", "Error"]);
        for p in &state.phases {
            phases.add_row(vec![
                Cell::new(p.phase),
                Cell::new(p.status),
                Cell::new(p.rows_processed),
                Cell::new(p.batches_committed),
                Cell::new(p.error.as_deref().unwrap_or("")),
            ]);
        }

        let mut output = format!(
            "Migration {} from {}: {} (runs: {}, resumable: {})\n{}",
            state.id(),
            state.source_name,
            state.status,
            state.runs,
            state.can_resume(),
            phases
        );

        if !tables.is_empty() {
            let mut detail = Table::new();
            detail.set_header(vec!["Phase", "Table", "Status", "Batches", "Written", "Rejected"]);
            for t in tables {
                detail.add_row(vec![
                    Cell::new(t.phase),
                    Cell::new(&t.table),
                    Cell::new(t.status),
                    Cell::new(t.batches_committed),
                    Cell::new(t.rows_written),
                    Cell::new(t.rows_rejected),
                ]);
            }
            output.push('\n');
            output.push_str(&detail.to_string());
        }
        output
    }

    fn format_states(&self, states: &[MigrationState]) -> String {
        if states.is_empty() {
            return "No migrations".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec!["Migration", "Source", "Status", "Runs", "Resumable"]);
        for state in states {
            table.add_row(vec![
                Cell::new(state.id()),
                Cell::new(&state.source_name),
                Cell::new(state.status),
                Cell::new(state.runs),
                Cell::new(state.can_resume()),
            ]);
        }
        table.to_string()
    }

    fn format_validation(&self, report: &ValidationReport) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Check", "Status", "Impact", "Table", "Message"]);
        for f in &report.findings {
            table.add_row(vec![
                Cell::new(&f.check),
                Cell::new(f.status),
                Cell::new(f.impact),
                Cell::new(f.table.as_deref().unwrap_or("")),
                Cell::new(&f.message),
            ]);
        }

        let mut output = table.to_string();
        output.push_str(&format!(
            "\n{} passed, {} warning(s), {} failed; complete: {}",
            report.passed, report.warnings, report.failed, report.complete
        ));
        for rec in &report.recommendations {
            output.push_str(&format!("\n  - {}", rec));
        }
        output
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn state_json(state: &MigrationState) -> serde_json::Value {
    let phases: Vec<serde_json::Value> = state
        .phases
        .iter()
        .map(|p| {
            serde_json::json!({
                "phase": p.phase,
                "status": p.status,
                "started_at": p.started_at,
                "completed_at": p.completed_at,
                "rows_processed": p.rows_processed,
                "batches_committed": p.batches_committed,
                "error": p.error,
            })
        })
        .collect();
    serde_json::json!({
        "migration_id": state.id().to_string(),
        "source_name": state.source_name,
        "status": state.status,
        "started_at": state.started_at,
        "completed_at": state.completed_at,
        "dry_run": state.dry_run,
        "runs": state.runs,
        "resumable": state.can_resume(),
        "error": state.error,
        "phases": phases,
    })
}

impl Formatter for JsonFormatter {
    fn format_schema(&self, schema: &SchemaAnalysisResult) -> String {
        pretty(schema)
    }

    fn format_mapping(&self, mapping: &EntityMappingResult) -> String {
        pretty(mapping)
    }

    fn format_plan(&self, plan: &MigrationPlan) -> String {
        pretty(plan)
    }

    fn format_execution(&self, report: &ExecutionReport) -> String {
        pretty(report)
    }

    fn format_rollback(&self, report: &RollbackReport) -> String {
        pretty(report)
    }

    fn format_status(&self, state: &MigrationState, tables: &[TableRecord]) -> String {
        let mut value = state_json(state);
        let tables: Vec<serde_json::Value> = tables
            .iter()
            .map(|t| {
                serde_json::json!({
                    "phase": t.phase,
                    "table": t.table,
                    "status": t.status,
                    "batches_committed": t.batches_committed,
                    "rows_read": t.rows_read,
                    "rows_written": t.rows_written,
                    "rows_rejected": t.rows_rejected,
                    "error": t.error,
                })
            })
            .collect();
        value["tables"] = serde_json::Value::Array(tables);
        pretty(&value)
    }

    fn format_states(&self, states: &[MigrationState]) -> String {
        let values: Vec<serde_json::Value> = states.iter().map(state_json).collect();
        pretty(&values)
    }

    fn format_validation(&self, report: &ValidationReport) -> String {
        pretty(report)
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({ "error": error }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unimig_core::migration::MigrationStatus;
    use unimig_core::MigrationId;

    fn state() -> MigrationState {
        let mut state = MigrationState::new(MigrationId::derive(&[b"crm"]), "crm", false);
        state.start();
        state.finish(MigrationStatus::Failed, Some("batch 3 of orders failed".to_string()));
        state
    }

    #[test]
    fn test_table_lists_states() {
        let output = TableFormatter.format_states(&[state()]);
        assert!(output.contains("crm"));
        assert!(output.contains("failed"));
        assert_eq!(TableFormatter.format_states(&[]), "No migrations");
    }

    #[test]
    fn test_json_state_is_parseable() {
        let output = JsonFormatter.format_status(&state(), &[]);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["resumable"], true);
        assert_eq!(value["runs"], 1);
        assert!(value["tables"].as_array().unwrap().is_empty());
    }
}
