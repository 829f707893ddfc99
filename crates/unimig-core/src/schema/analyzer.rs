//! Schema introspection and classification.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::connector::{ConnectorError, Row, SourceForeignKey, SourceReader, SourceTable};
use crate::vocabulary::{split_words, Vocabulary};

use super::classifier::{ColumnClassifier, KeyRole};
use super::quality;
use super::types::{
    BusinessRule, BusinessRuleKind, ColumnClassification, ColumnDescriptor, ConstraintKind,
    ForeignKeyDescriptor, RelationshipKind, SchemaAnalysisResult, TableDescriptor, TypeFamily,
};

/// Errors that abort an analysis run. No partial result is ever returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// The source cannot be reached.
    #[error("cannot connect to source {source_name}: {reason}")]
    Connectivity { source_name: String, reason: String },

    /// The source exposes no tables.
    #[error("unsupported schema: {0}")]
    UnsupportedSchema(String),

    /// Introspection failed after connecting.
    #[error("introspection failed: {0}")]
    Introspection(String),
}

impl AnalysisError {
    fn from_connector(source_name: &str, err: ConnectorError) -> Self {
        match err {
            ConnectorError::Unreachable { reason, .. } => AnalysisError::Connectivity {
                source_name: source_name.to_string(),
                reason,
            },
            other => AnalysisError::Introspection(other.to_string()),
        }
    }
}

/// Options for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Extract advisory business rules and triggers.
    pub include_business_logic: bool,
    /// Infer foreign-key semantics and junction tables.
    pub analyze_relationships: bool,
    /// Extract check, unique and default constraints.
    pub extract_constraints: bool,
    /// Rows sampled per table for profiling; 0 disables sampling.
    pub sample_data_rows: usize,
    pub industry_context: Option<String>,
    pub business_context: Option<String>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            include_business_logic: true,
            analyze_relationships: true,
            extract_constraints: true,
            sample_data_rows: 100,
            industry_context: None,
            business_context: None,
        }
    }
}

impl AnalysisOptions {
    pub fn with_business_logic(mut self, enabled: bool) -> Self {
        self.include_business_logic = enabled;
        self
    }

    pub fn with_relationships(mut self, enabled: bool) -> Self {
        self.analyze_relationships = enabled;
        self
    }

    pub fn with_constraints(mut self, enabled: bool) -> Self {
        self.extract_constraints = enabled;
        self
    }

    pub fn with_sample_rows(mut self, rows: usize) -> Self {
        self.sample_data_rows = rows;
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry_context = Some(industry.into());
        self
    }

    pub fn with_business_context(mut self, context: impl Into<String>) -> Self {
        self.business_context = Some(context.into());
        self
    }
}

/// Introspects a source into an immutable [`SchemaAnalysisResult`].
pub struct SchemaAnalyzer {
    vocabulary: Arc<Vocabulary>,
}

impl SchemaAnalyzer {
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        Self { vocabulary }
    }

    /// Analyze every table the source exposes.
    pub fn analyze(
        &self,
        source: &dyn SourceReader,
        options: &AnalysisOptions,
    ) -> Result<SchemaAnalysisResult, AnalysisError> {
        let source_name = source.name().to_string();
        let connector_err = |e| AnalysisError::from_connector(&source_name, e);

        source.ping().map_err(connector_err)?;
        let raw_tables = source.list_tables().map_err(connector_err)?;
        if raw_tables.is_empty() {
            return Err(AnalysisError::UnsupportedSchema(format!(
                "no tables discoverable in {}",
                source_name
            )));
        }

        info!(source = %source_name, tables = raw_tables.len(), "Analyzing schema");

        let classifier = ColumnClassifier::new(&self.vocabulary.columns);
        let mut tables = Vec::with_capacity(raw_tables.len());
        let mut business_rules = Vec::new();
        let mut issues = Vec::new();

        for raw in &raw_tables {
            let row_count = source.row_count(&raw.name).map_err(connector_err)?;
            let sample = if options.sample_data_rows > 0 {
                source
                    .sample_rows(&raw.name, options.sample_data_rows)
                    .map_err(connector_err)?
            } else {
                Vec::new()
            };

            let table = analyze_table(&classifier, raw, row_count, &sample, options);
            debug!(
                table = %table.name,
                columns = table.columns.len(),
                foreign_keys = table.foreign_keys.len(),
                junction = table.is_junction,
                "Analyzed table"
            );

            if options.include_business_logic {
                business_rules.extend(extract_rules(&table));
            }
            issues.extend(quality::table_issues(&table, &sample));
            tables.push(table);
        }

        let data_quality = quality::score(issues);
        if data_quality.cleanup_required {
            warn!(
                source = %source_name,
                score = data_quality.score,
                "Data cleanup required before migration"
            );
        }

        let fingerprint = fingerprint(&raw_tables)?;
        info!(
            source = %source_name,
            fingerprint = %fingerprint,
            quality = data_quality.score,
            rules = business_rules.len(),
            "Schema analysis complete"
        );

        Ok(SchemaAnalysisResult {
            source_name,
            fingerprint,
            vocabulary_version: self.vocabulary.version.clone(),
            tables,
            business_rules,
            data_quality,
            options: options.clone(),
        })
    }
}

fn analyze_table(
    classifier: &ColumnClassifier<'_>,
    raw: &SourceTable,
    row_count: u64,
    sample: &[Row],
    options: &AnalysisOptions,
) -> TableDescriptor {
    let sole_pk = |name: &str| raw.primary_key.len() == 1 && raw.primary_key[0].eq_ignore_ascii_case(name);

    let columns: Vec<ColumnDescriptor> = raw
        .columns
        .iter()
        .map(|col| {
            let role = KeyRole {
                primary_key: raw.primary_key.iter().any(|pk| pk.eq_ignore_ascii_case(&col.name)),
                foreign_key: raw.foreign_keys.iter().any(|fk| fk.column.eq_ignore_ascii_case(&col.name)),
                unique: col.unique || unique_index(raw, &col.name),
            };
            let class = classifier.classify(col, role);
            ColumnDescriptor {
                name: col.name.clone(),
                data_type: col.data_type.clone(),
                type_family: TypeFamily::from_declared(&col.data_type),
                nullable: col.nullable,
                default: col.default.clone(),
                max_length: col.max_length,
                precision: col.precision,
                scale: col.scale,
                is_identity: col.is_identity,
                computed: col.computed.clone(),
                unique: role.unique,
                classification: class.classification,
                business_meaning: class.business_meaning,
                suggested_field: class.suggested_field,
                confidence: class.confidence,
                manual_review: class.manual_review,
                stats: (!sample.is_empty()).then(|| quality::profile_column(&col.name, sample)),
            }
        })
        .collect();

    let data_patterns = columns
        .iter()
        .flat_map(|c| quality::detect_patterns(c, sole_pk(&c.name), sample))
        .collect();

    let is_junction = options.analyze_relationships && is_junction(raw, &columns);

    let mut table = TableDescriptor {
        schema: raw.schema.clone(),
        name: raw.name.clone(),
        columns,
        primary_key: raw.primary_key.clone(),
        foreign_keys: Vec::new(),
        indexes: raw.indexes.clone(),
        constraints: if options.extract_constraints {
            raw.constraints.clone()
        } else {
            Vec::new()
        },
        triggers: if options.include_business_logic {
            raw.triggers.clone()
        } else {
            Vec::new()
        },
        row_count,
        estimated_size_bytes: raw
            .estimated_size_bytes
            .unwrap_or_else(|| row_count * estimated_row_width(raw)),
        business_purpose: String::new(),
        data_patterns,
        is_junction,
    };

    table.foreign_keys = raw
        .foreign_keys
        .iter()
        .map(|fk| ForeignKeyDescriptor {
            name: fk.name.clone(),
            column: fk.column.clone(),
            target_table: fk.target_table.clone(),
            target_column: fk.target_column.clone(),
            on_delete: fk.on_delete,
            on_update: fk.on_update,
            semantics: options
                .analyze_relationships
                .then(|| relationship_kind(&table, fk)),
        })
        .collect();
    table.business_purpose = business_purpose(&table);
    table
}

fn unique_index(raw: &SourceTable, column: &str) -> bool {
    raw.indexes.iter().any(|idx| {
        idx.unique && idx.columns.len() == 1 && idx.columns[0].eq_ignore_ascii_case(column)
    }) || raw.constraints.iter().any(|c| {
        c.kind == ConstraintKind::Unique
            && c.columns.len() == 1
            && c.columns[0].eq_ignore_ascii_case(column)
    })
}

/// Exactly two foreign keys and nothing else but keys and audit columns.
fn is_junction(raw: &SourceTable, columns: &[ColumnDescriptor]) -> bool {
    let mut fk_columns: Vec<String> = raw
        .foreign_keys
        .iter()
        .map(|fk| fk.column.to_ascii_lowercase())
        .collect();
    fk_columns.sort();
    fk_columns.dedup();
    if fk_columns.len() != 2 {
        return false;
    }

    // Two keys into one table only pair rows when they are the whole key.
    let mut targets: Vec<String> = raw
        .foreign_keys
        .iter()
        .map(|fk| fk.target_table.to_ascii_lowercase())
        .collect();
    targets.sort();
    targets.dedup();
    if targets.len() < 2 {
        let mut pk: Vec<String> = raw
            .primary_key
            .iter()
            .map(|c| c.to_ascii_lowercase())
            .collect();
        pk.sort();
        if pk != fk_columns {
            return false;
        }
    }

    columns.iter().all(|c| {
        let lower = c.name.to_ascii_lowercase();
        fk_columns.contains(&lower)
            || (c.is_identity && raw.primary_key.iter().any(|pk| pk.eq_ignore_ascii_case(&c.name)))
            || (raw.primary_key.len() == 1
                && raw.primary_key[0].eq_ignore_ascii_case(&c.name)
                && c.classification == ColumnClassification::Identifier)
            || c.classification == ColumnClassification::Date
    })
}

fn relationship_kind(table: &TableDescriptor, fk: &SourceForeignKey) -> RelationshipKind {
    if fk.target_table.eq_ignore_ascii_case(&table.name) {
        let words = split_words(&fk.column);
        if words.iter().any(|w| w == "parent" || w == "father") {
            return RelationshipKind::Hierarchical;
        }
        return RelationshipKind::SelfReferencing;
    }
    if table.is_junction {
        return RelationshipKind::ManyToMany;
    }
    if table.is_unique(&fk.column) {
        return RelationshipKind::OneToOne;
    }
    RelationshipKind::OneToMany
}

fn business_purpose(table: &TableDescriptor) -> String {
    let subject = split_words(&table.name).join(" ");
    let targets: Vec<&str> = table
        .outgoing_references()
        .map(|fk| fk.target_table.as_str())
        .collect();

    if table.is_junction {
        return format!("links {} records", targets.join(" and "));
    }
    if table.foreign_keys.iter().any(|fk| {
        matches!(
            fk.semantics,
            Some(RelationshipKind::Hierarchical) | Some(RelationshipKind::SelfReferencing)
        )
    }) && targets.is_empty()
    {
        return format!("hierarchical {} records", subject);
    }
    if targets.is_empty() {
        format!("{} master or reference records", subject)
    } else {
        format!("{} records referencing {}", subject, targets.join(", "))
    }
}

fn estimated_row_width(raw: &SourceTable) -> u64 {
    raw.columns
        .iter()
        .map(|c| match TypeFamily::from_declared(&c.data_type) {
            TypeFamily::Integer => 8,
            TypeFamily::Decimal => 16,
            TypeFamily::Temporal => 8,
            TypeFamily::Boolean => 1,
            TypeFamily::Uuid => 16,
            TypeFamily::Text | TypeFamily::Other => c.max_length.map(u64::from).unwrap_or(64),
        })
        .sum()
}

fn extract_rules(table: &TableDescriptor) -> Vec<BusinessRule> {
    let rule = |name: String, kind, columns: Vec<String>, expression: String, description: String| {
        BusinessRule {
            table: table.name.clone(),
            name,
            kind,
            columns,
            expression,
            description,
        }
    };
    let mut rules = Vec::new();

    for c in &table.constraints {
        let expression = c.expression.clone().unwrap_or_default();
        let (kind, description) = match c.kind {
            ConstraintKind::Check => (
                BusinessRuleKind::CheckConstraint,
                format!("values must satisfy {}", expression),
            ),
            ConstraintKind::Unique => (
                BusinessRuleKind::Uniqueness,
                format!("{} must be unique", c.columns.join(", ")),
            ),
            ConstraintKind::Default => (
                BusinessRuleKind::DefaultValue,
                format!("defaults to {}", expression),
            ),
        };
        rules.push(rule(c.name.clone(), kind, c.columns.clone(), expression, description));
    }

    for col in &table.columns {
        if let Some(default) = &col.default {
            let already = table.constraints.iter().any(|c| {
                c.kind == ConstraintKind::Default
                    && c.columns.iter().any(|n| n.eq_ignore_ascii_case(&col.name))
            });
            if !already {
                rules.push(rule(
                    format!("DF_{}_{}", table.name, col.name),
                    BusinessRuleKind::DefaultValue,
                    vec![col.name.clone()],
                    default.clone(),
                    format!("{} defaults to {}", col.name, default),
                ));
            }
        }
        if let Some(expr) = &col.computed {
            rules.push(rule(
                format!("CC_{}_{}", table.name, col.name),
                BusinessRuleKind::ComputedColumn,
                vec![col.name.clone()],
                expr.clone(),
                format!("{} is derived as {}", col.name, expr),
            ));
        }
    }

    for trigger in &table.triggers {
        rules.push(rule(
            trigger.name.clone(),
            BusinessRuleKind::Trigger,
            Vec::new(),
            trigger.body.clone(),
            format!(
                "{} {} trigger on {}",
                trigger.timing,
                trigger.events.join("/"),
                table.name
            ),
        ));
    }

    rules
}

fn fingerprint(tables: &[SourceTable]) -> Result<String, AnalysisError> {
    let bytes = serde_json::to_vec(tables)
        .map_err(|e| AnalysisError::Introspection(format!("fingerprint: {}", e)))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{MemorySource, SourceColumn, Value};
    use crate::schema::IndexDescriptor;

    fn analyzer() -> SchemaAnalyzer {
        SchemaAnalyzer::new(Arc::new(Vocabulary::standard()))
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn shop() -> MemorySource {
        let customers = SourceTable::new("customers")
            .with_column(SourceColumn::new("customer_id", "int").not_null())
            .with_column(SourceColumn::new("customer_name", "varchar(100)").not_null())
            .with_primary_key(&["customer_id"]);
        let products = SourceTable::new("products")
            .with_column(SourceColumn::new("product_id", "int").not_null())
            .with_column(SourceColumn::new("product_name", "varchar(100)"))
            .with_primary_key(&["product_id"]);
        let orders = SourceTable::new("orders")
            .with_column(SourceColumn::new("order_id", "int").not_null())
            .with_column(SourceColumn::new("customer_id", "int").not_null())
            .with_column(SourceColumn::new("order_date", "datetime"))
            .with_primary_key(&["order_id"])
            .with_foreign_key(SourceForeignKey::new("customer_id", "customers", "customer_id"));
        let order_products = SourceTable::new("order_products")
            .with_column(SourceColumn::new("order_id", "int").not_null())
            .with_column(SourceColumn::new("product_id", "int").not_null())
            .with_primary_key(&["order_id", "product_id"])
            .with_foreign_key(SourceForeignKey::new("order_id", "orders", "order_id"))
            .with_foreign_key(SourceForeignKey::new("product_id", "products", "product_id"));
        let categories = SourceTable::new("categories")
            .with_column(SourceColumn::new("category_id", "int").not_null())
            .with_column(SourceColumn::new("parent_id", "int"))
            .with_primary_key(&["category_id"])
            .with_foreign_key(SourceForeignKey::new("parent_id", "categories", "category_id"));

        MemorySource::new("shop")
            .with_table(
                customers,
                vec![
                    row(&[("customer_id", Value::Int(1)), ("customer_name", Value::text("Ada"))]),
                    row(&[("customer_id", Value::Int(2)), ("customer_name", Value::text("N/A"))]),
                ],
            )
            .with_table(products, Vec::new())
            .with_table(orders, Vec::new())
            .with_table(order_products, Vec::new())
            .with_table(categories, Vec::new())
    }

    #[test]
    fn test_connectivity_error() {
        let err = analyzer()
            .analyze(&MemorySource::unreachable("erp"), &AnalysisOptions::default())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Connectivity { .. }));
    }

    #[test]
    fn test_empty_schema_is_unsupported() {
        let err = analyzer()
            .analyze(&MemorySource::new("empty"), &AnalysisOptions::default())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedSchema(_)));
    }

    #[test]
    fn test_relationship_shapes() {
        let result = analyzer()
            .analyze(&shop(), &AnalysisOptions::default())
            .unwrap();

        let orders = result.table("orders").unwrap();
        assert_eq!(
            orders.foreign_keys[0].semantics,
            Some(RelationshipKind::OneToMany)
        );
        assert!(!orders.is_junction);

        let link = result.table("order_products").unwrap();
        assert!(link.is_junction);
        assert!(link
            .foreign_keys
            .iter()
            .all(|fk| fk.semantics == Some(RelationshipKind::ManyToMany)));

        let categories = result.table("categories").unwrap();
        assert_eq!(
            categories.foreign_keys[0].semantics,
            Some(RelationshipKind::Hierarchical)
        );
    }

    #[test]
    fn test_two_keys_into_one_table_is_not_a_junction() {
        let customers = SourceTable::new("customers")
            .with_column(SourceColumn::new("customer_id", "int").not_null())
            .with_primary_key(&["customer_id"]);
        let orders = SourceTable::new("orders")
            .with_column(SourceColumn::new("order_id", "int").not_null())
            .with_column(SourceColumn::new("bill_to_id", "int"))
            .with_column(SourceColumn::new("ship_to_id", "int"))
            .with_primary_key(&["order_id"])
            .with_foreign_key(SourceForeignKey::new("bill_to_id", "customers", "customer_id"))
            .with_foreign_key(SourceForeignKey::new("ship_to_id", "customers", "customer_id"));
        let pairs = SourceTable::new("customer_pairs")
            .with_column(SourceColumn::new("left_id", "int").not_null())
            .with_column(SourceColumn::new("right_id", "int").not_null())
            .with_primary_key(&["left_id", "right_id"])
            .with_foreign_key(SourceForeignKey::new("left_id", "customers", "customer_id"))
            .with_foreign_key(SourceForeignKey::new("right_id", "customers", "customer_id"));
        let source = MemorySource::new("shop")
            .with_table(customers, Vec::new())
            .with_table(orders, Vec::new())
            .with_table(pairs, Vec::new());

        let result = analyzer().analyze(&source, &AnalysisOptions::default()).unwrap();
        let orders = result.table("orders").unwrap();
        assert!(!orders.is_junction);
        assert!(orders
            .foreign_keys
            .iter()
            .all(|fk| fk.semantics == Some(RelationshipKind::OneToMany)));
        assert!(result.table("customer_pairs").unwrap().is_junction);
    }

    #[test]
    fn test_relationships_disabled() {
        let options = AnalysisOptions::default().with_relationships(false);
        let result = analyzer().analyze(&shop(), &options).unwrap();
        let orders = result.table("orders").unwrap();
        assert_eq!(orders.foreign_keys[0].semantics, None);
        assert!(!result.table("order_products").unwrap().is_junction);
    }

    #[test]
    fn test_sentinel_in_required_column_is_critical() {
        let result = analyzer()
            .analyze(&shop(), &AnalysisOptions::default())
            .unwrap();
        assert!(result.data_quality.cleanup_required);
        assert_eq!(result.data_quality.count(crate::validation::Impact::Critical), 1);
        assert_eq!(result.data_quality.score, 75);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = analyzer().analyze(&shop(), &AnalysisOptions::default()).unwrap();
        let b = analyzer().analyze(&shop(), &AnalysisOptions::default()).unwrap();
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a, b);
    }

    #[test]
    fn test_business_rules_extracted() {
        let table = SourceTable::new("items")
            .with_column(SourceColumn::new("item_code", "varchar(20)").not_null())
            .with_column(SourceColumn::new("qty", "int").with_default("0"))
            .with_column(SourceColumn::new("total", "decimal(10,2)").computed("qty * price"))
            .with_primary_key(&["item_code"])
            .with_index(IndexDescriptor {
                name: "ux_items".to_string(),
                columns: vec!["item_code".to_string()],
                unique: true,
            });
        let source = MemorySource::new("inv").with_table(table, Vec::new());

        let result = analyzer().analyze(&source, &AnalysisOptions::default()).unwrap();
        let kinds: Vec<_> = result.rules_for("items").map(|r| r.kind).collect();
        assert!(kinds.contains(&BusinessRuleKind::DefaultValue));
        assert!(kinds.contains(&BusinessRuleKind::ComputedColumn));

        let without = analyzer()
            .analyze(&source, &AnalysisOptions::default().with_business_logic(false))
            .unwrap();
        assert!(without.business_rules.is_empty());
    }
}
