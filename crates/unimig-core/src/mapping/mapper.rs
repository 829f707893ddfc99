//! Entity-type mapping over an analyzed schema.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::schema::{
    BusinessRuleKind, ColumnClassification, ColumnDescriptor, PatternKind, RelationshipKind,
    SchemaAnalysisResult, TableDescriptor, TypeFamily,
};
use crate::validation::{Impact, ValidationFinding};
use crate::vocabulary::{
    split_words, EntityCategory, Vocabulary, ASSOCIATION_ENTITY, FALLBACK_ENTITY,
    FALLBACK_TRANSACTION,
};

use super::scoring::{self, Candidate, ReferencedEntity, CONFIDENT_REFERENCE};
use super::types::{
    AlternativeMapping, BusinessRuleMapping, Enforcement, EntityMapping, EntityMappingResult,
    FieldMapping, FieldValidation, MappingStrategy, MappingWarning, MappingWarningKind,
    RelationshipNote, SignalScores, StorageTier, Transformation,
};

/// Default review threshold.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;
/// Best candidates below this fall back to a generic type.
const MIN_CANDIDATE: f64 = 0.35;
const MAX_ALTERNATIVES: usize = 2;
const JUNCTION_CONFIDENCE: f64 = 0.85;
const TRANSACTION_FALLBACK: f64 = 0.3;
const GENERIC_FLOOR: f64 = 0.1;
const GENERIC_STEP: f64 = 0.05;
const GENERIC_CAP: f64 = 0.25;
/// Tables wider than this are split across attribute groups.
const SPLIT_COLUMNS: usize = 40;
/// Text columns up to this length are treated as stable codes.
const SHORT_CODE_LENGTH: u32 = 10;

/// Maps analyzed tables onto universal entity types.
pub struct EntityTypeMapper {
    vocabulary: Arc<Vocabulary>,
}

impl EntityTypeMapper {
    pub fn new(vocabulary: Arc<Vocabulary>) -> Self {
        Self { vocabulary }
    }

    /// Produce exactly one mapping per analyzed table.
    ///
    /// Contexts default to those recorded in the analysis options. Low
    /// confidence never fails the run; it is flagged for review.
    pub fn generate_mapping(
        &self,
        schema: &SchemaAnalysisResult,
        business_context: Option<&str>,
        industry_context: Option<&str>,
        confidence_threshold: Option<f64>,
    ) -> EntityMappingResult {
        let industry = industry_context.or(schema.options.industry_context.as_deref());
        let business = business_context.or(schema.options.business_context.as_deref());
        let threshold = confidence_threshold.unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);

        info!(
            source = %schema.source_name,
            tables = schema.tables.len(),
            industry = industry.unwrap_or("generic"),
            "Generating entity mapping"
        );

        let mut mapped: HashMap<String, ReferencedEntity> = HashMap::new();
        let mut by_table: HashMap<String, EntityMapping> = HashMap::new();
        let mut warnings = Vec::new();

        for idx in dependency_order(schema) {
            let table = &schema.tables[idx];
            let referenced: Vec<ReferencedEntity> = table
                .outgoing_references()
                .filter_map(|fk| mapped.get(&fk.target_table.to_ascii_lowercase()).cloned())
                .collect();

            let mapping =
                self.map_table(schema, table, &referenced, industry, business, threshold, &mut warnings);
            debug!(
                table = %table.name,
                entity_type = %mapping.entity_type,
                confidence = mapping.confidence,
                "Mapped table"
            );

            mapped.insert(
                table.name.to_ascii_lowercase(),
                ReferencedEntity {
                    table: table.name.clone(),
                    entity_type: mapping.entity_type.clone(),
                    category: mapping.category,
                    confidence: mapping.confidence,
                },
            );
            by_table.insert(table.name.to_ascii_lowercase(), mapping);
        }

        let mappings: Vec<EntityMapping> = schema
            .tables
            .iter()
            .filter_map(|t| by_table.remove(&t.name.to_ascii_lowercase()))
            .collect();

        let overall_confidence = if mappings.is_empty() {
            0.0
        } else {
            scoring::round(
                mappings.iter().map(|m| m.confidence).sum::<f64>() / mappings.len() as f64,
            )
        };

        let review = mappings.iter().filter(|m| m.needs_review).count();
        if review > 0 {
            warn!(tables = review, threshold, "Mappings need manual review");
        }

        EntityMappingResult {
            schema_fingerprint: schema.fingerprint.clone(),
            vocabulary_version: self.vocabulary.version.clone(),
            industry_context: industry.map(str::to_string),
            business_context: business.map(str::to_string),
            confidence_threshold: threshold,
            mappings,
            warnings,
            overall_confidence,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn map_table(
        &self,
        schema: &SchemaAnalysisResult,
        table: &TableDescriptor,
        referenced: &[ReferencedEntity],
        industry: Option<&str>,
        business: Option<&str>,
        threshold: f64,
        warnings: &mut Vec<MappingWarning>,
    ) -> EntityMapping {
        let (winner, alternatives) = if table.is_junction {
            (junction_candidate(table, referenced), Vec::new())
        } else {
            let ranked = scoring::rank(
                self.vocabulary
                    .candidates()
                    .filter_map(|p| scoring::score_candidate(table, p, referenced, industry, business))
                    .collect(),
                industry,
            );
            match ranked.first() {
                Some(best) if best.confidence >= MIN_CANDIDATE => {
                    let rest = ranked.iter().skip(1).take(MAX_ALTERNATIVES).map(alternative).collect();
                    (best.clone(), rest)
                }
                _ => {
                    let fallback = fallback_candidate(table, referenced);
                    warnings.push(MappingWarning {
                        table: table.name.clone(),
                        kind: MappingWarningKind::InsufficientSignal,
                        message: format!(
                            "no vocabulary entry fits {}; using fallback type '{}'",
                            table.name, fallback.entity_type
                        ),
                    });
                    let rest = ranked.iter().take(MAX_ALTERNATIVES).map(alternative).collect();
                    (fallback, rest)
                }
            }
        };

        let natural_key = natural_key(table);
        let keyless = table.primary_key.is_empty()
            && !table.columns.iter().any(|c| table.is_unique(&c.name));
        if keyless {
            warnings.push(MappingWarning {
                table: table.name.clone(),
                kind: MappingWarningKind::NoNaturalKey,
                message: format!(
                    "{} has no primary key or unique column; upserts key on every column",
                    table.name
                ),
            });
        }

        let field_mappings = field_mappings(table, &natural_key);
        let business_rules = rule_mappings(schema, table, &field_mappings);
        let relationships = relationship_notes(table, referenced);

        let strategy = if table.is_junction {
            MappingStrategy::Merge
        } else if table.columns.len() > SPLIT_COLUMNS {
            MappingStrategy::Split
        } else if field_mappings.iter().any(|f| f.transformation.is_some()) {
            MappingStrategy::Transform
        } else {
            MappingStrategy::Direct
        };

        let needs_review = winner.confidence < threshold;
        if needs_review && winner.entity_type != FALLBACK_ENTITY {
            warnings.push(MappingWarning {
                table: table.name.clone(),
                kind: MappingWarningKind::LowConfidence,
                message: format!(
                    "{} mapped to {} at {:.2}, below threshold {:.2}",
                    table.name, winner.entity_type, winner.confidence, threshold
                ),
            });
        }

        let mut validation = Vec::new();
        if needs_review {
            validation.push(
                ValidationFinding::warning(
                    "classification",
                    Impact::Medium,
                    format!(
                        "confidence {:.2} is below the review threshold {:.2}",
                        winner.confidence, threshold
                    ),
                    "confirm the entity type or pick an alternative",
                )
                .for_table(&table.name),
            );
        }
        let uncertain: Vec<&str> = table
            .columns
            .iter()
            .filter(|c| c.manual_review)
            .map(|c| c.name.as_str())
            .collect();
        if !uncertain.is_empty() {
            validation.push(
                ValidationFinding::warning(
                    "column_classification",
                    Impact::Low,
                    format!("name and type disagree for {}", uncertain.join(", ")),
                    "review the field mappings of these columns",
                )
                .for_table(&table.name),
            );
        }
        if validation.is_empty() {
            validation.push(
                ValidationFinding::passed("classification", "mapping is above the review threshold")
                    .for_table(&table.name),
            );
        }

        EntityMapping {
            source_table: table.name.clone(),
            entity_type: winner.entity_type,
            category: winner.category,
            confidence: winner.confidence,
            reasoning: winner.reasoning,
            strategy,
            natural_key,
            field_mappings,
            business_rules,
            relationships,
            alternatives,
            signals: winner.signals,
            needs_review,
            validation,
        }
    }
}

/// Table indexes ordered so referenced tables come first. Cycles fall back
/// to schema order.
fn dependency_order(schema: &SchemaAnalysisResult) -> Vec<usize> {
    let index: HashMap<String, usize> = schema
        .tables
        .iter()
        .enumerate()
        .map(|(i, t)| (t.name.to_ascii_lowercase(), i))
        .collect();

    let deps: Vec<HashSet<usize>> = schema
        .tables
        .iter()
        .map(|t| {
            t.outgoing_references()
                .filter_map(|fk| index.get(&fk.target_table.to_ascii_lowercase()).copied())
                .collect()
        })
        .collect();

    let mut done = vec![false; schema.tables.len()];
    let mut order = Vec::with_capacity(schema.tables.len());
    while order.len() < schema.tables.len() {
        let ready = (0..schema.tables.len())
            .find(|&i| !done[i] && deps[i].iter().all(|&d| done[d]))
            .or_else(|| (0..schema.tables.len()).find(|&i| !done[i]));
        match ready {
            Some(i) => {
                done[i] = true;
                order.push(i);
            }
            None => break,
        }
    }
    order
}

fn alternative(candidate: &Candidate) -> AlternativeMapping {
    AlternativeMapping {
        entity_type: candidate.entity_type.clone(),
        confidence: candidate.confidence,
        reasoning: candidate.reasoning.clone(),
    }
}

fn junction_candidate(table: &TableDescriptor, referenced: &[ReferencedEntity]) -> Candidate {
    let sides: Vec<String> = table
        .outgoing_references()
        .map(|fk| {
            referenced
                .iter()
                .find(|r| r.table.eq_ignore_ascii_case(&fk.target_table))
                .map(|r| r.entity_type.clone())
                .unwrap_or_else(|| fk.target_table.clone())
        })
        .collect();
    Candidate {
        entity_type: ASSOCIATION_ENTITY.to_string(),
        category: EntityCategory::Relationship,
        industry: None,
        signals: SignalScores::default(),
        confidence: JUNCTION_CONFIDENCE,
        matched_columns: Vec::new(),
        reasoning: format!(
            "junction table with two foreign keys and no business columns; links {}",
            sides.join(" and ")
        ),
    }
}

fn fallback_candidate(table: &TableDescriptor, referenced: &[ReferencedEntity]) -> Candidate {
    let master = referenced
        .iter()
        .find(|r| r.confidence >= CONFIDENT_REFERENCE && r.category.is_master_data());

    match master {
        Some(r) => Candidate {
            entity_type: FALLBACK_TRANSACTION.to_string(),
            category: EntityCategory::Transactional,
            industry: None,
            signals: SignalScores::default(),
            confidence: TRANSACTION_FALLBACK,
            matched_columns: Vec::new(),
            reasoning: format!(
                "no name or column signal; references {} mapped as {} so treated as a transaction",
                r.table, r.entity_type
            ),
        },
        None => {
            let confidence = scoring::round(
                (GENERIC_FLOOR + GENERIC_STEP * scoring::confident_columns(table) as f64)
                    .min(GENERIC_CAP),
            );
            Candidate {
                entity_type: FALLBACK_ENTITY.to_string(),
                category: EntityCategory::Reference,
                industry: None,
                signals: SignalScores::default(),
                confidence,
                matched_columns: Vec::new(),
                reasoning: format!(
                    "no vocabulary entry matched table or columns; generic fallback at {:.2}",
                    confidence
                ),
            }
        }
    }
}

/// Upsert key: a unique business code beats a surrogate integer key. Keyless
/// tables fall back to the full column list.
pub fn natural_key(table: &TableDescriptor) -> Vec<String> {
    let text_family = |c: &&ColumnDescriptor| matches!(c.type_family, TypeFamily::Text | TypeFamily::Uuid);

    if table.primary_key.len() == 1 {
        if let Some(pk) = table.column(&table.primary_key[0]) {
            if text_family(&pk) {
                return vec![pk.name.clone()];
            }
        }
    }

    let code = table.columns.iter().filter(text_family).find(|c| {
        c.classification == ColumnClassification::Identifier
            && !c.nullable
            && table.is_unique(&c.name)
            && !table.is_primary_key(&c.name)
    });
    if let Some(c) = code {
        return vec![c.name.clone()];
    }

    if !table.primary_key.is_empty() {
        return table.primary_key.clone();
    }

    table
        .columns
        .iter()
        .find(|c| table.is_unique(&c.name))
        .map(|c| vec![c.name.clone()])
        .unwrap_or_else(|| table.columns.iter().map(|c| c.name.clone()).collect())
}

fn field_mappings(table: &TableDescriptor, natural_key: &[String]) -> Vec<FieldMapping> {
    let mut used: HashSet<String> = HashSet::new();
    let mut name_taken = false;
    let low_cardinality: HashSet<String> = table
        .data_patterns
        .iter()
        .filter(|p| matches!(p.pattern, PatternKind::LowCardinality { .. }))
        .map(|p| p.column.to_ascii_lowercase())
        .collect();

    table
        .columns
        .iter()
        .map(|col| {
            let in_key = natural_key.iter().any(|k| k.eq_ignore_ascii_case(&col.name));
            let unique = table.is_unique(&col.name);

            let (tier, preferred) = if in_key && natural_key.len() == 1 {
                (StorageTier::Identity, "code".to_string())
            } else if in_key || table.is_primary_key(&col.name) || unique {
                (StorageTier::Identity, col.suggested_field.clone())
            } else if col.classification == ColumnClassification::Name && !name_taken {
                name_taken = true;
                (StorageTier::Identity, "name".to_string())
            } else if col.classification == ColumnClassification::Name {
                (StorageTier::Identity, col.suggested_field.clone())
            } else if is_stable_attribute(col, &low_cardinality) {
                (StorageTier::AttributeMetadata, col.suggested_field.clone())
            } else {
                (StorageTier::DynamicProperty, col.suggested_field.clone())
            };

            let mut validations = Vec::new();
            if in_key || unique {
                validations.push(FieldValidation::Unique);
            }
            if in_key || !col.nullable {
                validations.push(FieldValidation::NotNull);
            }
            if let Some(len) = col.max_length {
                validations.push(FieldValidation::MaxLength(len));
            }

            FieldMapping {
                source_column: col.name.clone(),
                target_field: unique_field(&mut used, preferred),
                tier,
                classification: col.classification,
                transformation: transformation(col),
                validations,
                confidence: col.confidence,
            }
        })
        .collect()
}

fn is_stable_attribute(col: &ColumnDescriptor, low_cardinality: &HashSet<String>) -> bool {
    match col.classification {
        ColumnClassification::Flag | ColumnClassification::Reference => true,
        _ if low_cardinality.contains(&col.name.to_ascii_lowercase()) => true,
        ColumnClassification::Identifier | ColumnClassification::Other => {
            col.type_family == TypeFamily::Text
                && col.max_length.map(|l| l <= SHORT_CODE_LENGTH).unwrap_or(false)
        }
        _ => false,
    }
}

fn unique_field(used: &mut HashSet<String>, preferred: String) -> String {
    let mut candidate = preferred.clone();
    let mut n = 2;
    while used.contains(&candidate) {
        candidate = format!("{}_{}", preferred, n);
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

fn transformation(col: &ColumnDescriptor) -> Option<Transformation> {
    let text = col.type_family == TypeFamily::Text;
    match col.classification {
        ColumnClassification::Flag if text => Some(Transformation::ToBoolean),
        ColumnClassification::Date if col.type_family != TypeFamily::Temporal => {
            Some(Transformation::ToIsoDate)
        }
        ColumnClassification::Amount if text => Some(Transformation::ToDecimal),
        _ if text && col.stats.as_ref().map(|s| s.untrimmed > 0).unwrap_or(false) => {
            Some(Transformation::Trim)
        }
        _ => None,
    }
}

fn rule_mappings(
    schema: &SchemaAnalysisResult,
    table: &TableDescriptor,
    fields: &[FieldMapping],
) -> Vec<BusinessRuleMapping> {
    schema
        .rules_for(&table.name)
        .map(|rule| {
            let target_fields: Vec<String> = rule
                .columns
                .iter()
                .filter_map(|c| fields.iter().find(|f| f.source_column.eq_ignore_ascii_case(c)))
                .map(|f| f.target_field.clone())
                .collect();
            let target_expression = rewrite_expression(&rule.expression, fields);
            let enforcement = if rule.kind == BusinessRuleKind::Trigger {
                Enforcement::Manual
            } else {
                Enforcement::Advisory
            };
            let note = match enforcement {
                Enforcement::Manual => "procedural logic; re-implement in the application layer",
                Enforcement::Advisory => "not auto-applied; confirm against migrated data",
            };
            BusinessRuleMapping {
                rule_name: rule.name.clone(),
                kind: rule.kind,
                source_expression: rule.expression.clone(),
                target_expression,
                target_fields,
                enforcement,
                note: note.to_string(),
            }
        })
        .collect()
}

/// Replace whole-word column references with target field names.
fn rewrite_expression(expression: &str, fields: &[FieldMapping]) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut word = String::new();
    let flush = |word: &mut String, out: &mut String| {
        if word.is_empty() {
            return;
        }
        let replaced = fields
            .iter()
            .find(|f| f.source_column.eq_ignore_ascii_case(word))
            .map(|f| f.target_field.as_str())
            .unwrap_or(word.as_str())
            .to_string();
        out.push_str(&replaced);
        word.clear();
    };

    for ch in expression.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            word.push(ch);
        } else {
            flush(&mut word, &mut out);
            out.push(ch);
        }
    }
    flush(&mut word, &mut out);
    out
}

fn relationship_notes(table: &TableDescriptor, referenced: &[ReferencedEntity]) -> Vec<RelationshipNote> {
    let subject = split_words(&table.name).join(" ");
    table
        .foreign_keys
        .iter()
        .map(|fk| {
            let kind = fk.semantics.unwrap_or(RelationshipKind::OneToMany);
            let target_entity_type = referenced
                .iter()
                .find(|r| r.table.eq_ignore_ascii_case(&fk.target_table))
                .map(|r| r.entity_type.clone());
            let target = target_entity_type
                .clone()
                .unwrap_or_else(|| fk.target_table.clone());
            let note = match kind {
                RelationshipKind::OneToMany => {
                    format!("many {} rows reference one {} ({})", subject, target, kind)
                }
                RelationshipKind::OneToOne => {
                    format!("each {} row extends exactly one {} ({})", subject, target, kind)
                }
                RelationshipKind::ManyToMany => format!("{} side of a {} link", target, kind),
                RelationshipKind::SelfReferencing | RelationshipKind::Hierarchical => {
                    format!("{} rows reference other {} rows ({})", subject, subject, kind)
                }
            };
            RelationshipNote {
                column: fk.column.clone(),
                target_table: fk.target_table.clone(),
                target_column: fk.target_column.clone(),
                target_entity_type,
                kind,
                note,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{MemorySource, SourceColumn, SourceForeignKey, SourceTable};
    use crate::schema::{AnalysisOptions, SchemaAnalyzer};

    fn analyze(source: &MemorySource, options: &AnalysisOptions) -> SchemaAnalysisResult {
        SchemaAnalyzer::new(Arc::new(Vocabulary::standard()))
            .analyze(source, options)
            .unwrap()
    }

    fn mapper() -> EntityTypeMapper {
        EntityTypeMapper::new(Arc::new(Vocabulary::standard()))
    }

    #[test]
    fn test_natural_key_prefers_business_code() {
        let table = SourceTable::new("customers")
            .with_column(SourceColumn::new("customer_id", "int").not_null())
            .with_column(
                SourceColumn::new("customer_code", "varchar(20)")
                    .not_null()
                    .unique(),
            )
            .with_column(SourceColumn::new("customer_name", "varchar(100)"))
            .with_primary_key(&["customer_id"]);
        let schema = analyze(
            &MemorySource::new("s").with_table(table, Vec::new()),
            &AnalysisOptions::default(),
        );
        let result = mapper().generate_mapping(&schema, None, None, None);
        let mapping = result.mapping("customers").unwrap();

        assert_eq!(mapping.natural_key, vec!["customer_code"]);
        let code = mapping.field("customer_code").unwrap();
        assert_eq!(code.target_field, "code");
        assert_eq!(code.tier, StorageTier::Identity);
        assert_eq!(mapping.field("customer_name").unwrap().target_field, "name");
        assert_eq!(mapping.field("customer_id").unwrap().tier, StorageTier::Identity);
    }

    #[test]
    fn test_junction_maps_to_association() {
        let a = SourceTable::new("students")
            .with_column(SourceColumn::new("student_id", "int").not_null())
            .with_primary_key(&["student_id"]);
        let b = SourceTable::new("courses")
            .with_column(SourceColumn::new("course_id", "int").not_null())
            .with_primary_key(&["course_id"]);
        let link = SourceTable::new("enrollments")
            .with_column(SourceColumn::new("student_id", "int").not_null())
            .with_column(SourceColumn::new("course_id", "int").not_null())
            .with_primary_key(&["student_id", "course_id"])
            .with_foreign_key(SourceForeignKey::new("student_id", "students", "student_id"))
            .with_foreign_key(SourceForeignKey::new("course_id", "courses", "course_id"));
        let source = MemorySource::new("school")
            .with_table(link, Vec::new())
            .with_table(a, Vec::new())
            .with_table(b, Vec::new());
        let schema = analyze(&source, &AnalysisOptions::default());
        let result = mapper().generate_mapping(&schema, None, None, None);

        assert_eq!(result.mappings.len(), 3);
        assert_eq!(result.mappings[0].source_table, "enrollments");
        let mapping = result.mapping("enrollments").unwrap();
        assert_eq!(mapping.entity_type, ASSOCIATION_ENTITY);
        assert_eq!(mapping.strategy, MappingStrategy::Merge);
        assert!(mapping
            .relationships
            .iter()
            .all(|r| r.kind == RelationshipKind::ManyToMany));
    }

    #[test]
    fn test_alternatives_are_bounded() {
        let table = SourceTable::new("customer_orders")
            .with_column(SourceColumn::new("order_id", "int").not_null())
            .with_column(SourceColumn::new("customer_name", "varchar(100)"))
            .with_column(SourceColumn::new("invoice_no", "varchar(20)"))
            .with_column(SourceColumn::new("payment_date", "date"))
            .with_primary_key(&["order_id"]);
        let schema = analyze(
            &MemorySource::new("s").with_table(table, Vec::new()),
            &AnalysisOptions::default(),
        );
        let result = mapper().generate_mapping(&schema, None, None, None);
        let mapping = &result.mappings[0];

        assert!(mapping.alternatives.len() <= MAX_ALTERNATIVES);
        assert!(mapping
            .alternatives
            .iter()
            .all(|a| a.entity_type != mapping.entity_type && a.confidence <= mapping.confidence));
        assert!((0.0..=1.0).contains(&mapping.confidence));
    }

    #[test]
    fn test_text_flag_gets_boolean_transform() {
        let table = SourceTable::new("products")
            .with_column(SourceColumn::new("product_code", "varchar(20)").not_null())
            .with_column(SourceColumn::new("product_name", "varchar(100)"))
            .with_column(SourceColumn::new("is_active", "char(1)").with_max_length(1))
            .with_primary_key(&["product_code"]);
        let schema = analyze(
            &MemorySource::new("s").with_table(table, Vec::new()),
            &AnalysisOptions::default(),
        );
        let result = mapper().generate_mapping(&schema, None, None, None);
        let mapping = result.mapping("products").unwrap();

        let flag = mapping.field("is_active").unwrap();
        assert_eq!(flag.transformation, Some(Transformation::ToBoolean));
        assert_eq!(flag.tier, StorageTier::AttributeMetadata);
        assert_eq!(mapping.strategy, MappingStrategy::Transform);
    }

    #[test]
    fn test_rewrite_expression() {
        let fields = vec![FieldMapping {
            source_column: "CreditLine".to_string(),
            target_field: "credit_line".to_string(),
            tier: StorageTier::DynamicProperty,
            classification: ColumnClassification::Amount,
            transformation: None,
            validations: Vec::new(),
            confidence: 0.9,
        }];
        assert_eq!(
            rewrite_expression("[CreditLine] >= 0 AND CreditLineX > 1", &fields),
            "[credit_line] >= 0 AND CreditLineX > 1"
        );
    }
}
