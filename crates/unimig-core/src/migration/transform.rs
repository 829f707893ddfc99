//! Row to target-record conversion.

use crate::connector::{EntityRecord, EntityRef, Provenance, RelationshipRecord, Row, Value};
use crate::schema::RelationshipKind;
use crate::store::key::MigrationId;

use super::plan::{LinkSpec, TablePlan};

/// Separator between components of a composite natural key.
const KEY_SEPARATOR: &str = "|";

/// Records produced from one batch of rows.
#[derive(Debug)]
pub struct BatchOutput<T> {
    pub records: Vec<T>,
    /// Rows that could not produce a record.
    pub rejected: u64,
}

impl<T> Default for BatchOutput<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            rejected: 0,
        }
    }
}

/// Look a column up exactly, then case-insensitively.
fn cell<'a>(row: &'a Row, column: &str) -> Option<&'a Value> {
    row.get(column).or_else(|| {
        row.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, v)| v)
    })
}

/// Natural key of a row; `None` when every component is null or blank.
pub fn natural_key(row: &Row, columns: &[String]) -> Option<String> {
    let parts: Vec<Option<String>> = columns
        .iter()
        .map(|c| cell(row, c).and_then(Value::key_string))
        .collect();
    if parts.iter().all(Option::is_none) {
        return None;
    }
    Some(
        parts
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect::<Vec<_>>()
            .join(KEY_SEPARATOR),
    )
}

/// Convert rows into entity records.
pub fn entities(
    table: &TablePlan,
    rows: &[Row],
    migration_id: &MigrationId,
    batch_no: u64,
) -> BatchOutput<EntityRecord> {
    let mut out = BatchOutput {
        records: Vec::with_capacity(rows.len()),
        rejected: 0,
    };
    for row in rows {
        let Some(key) = natural_key(row, &table.natural_key) else {
            out.rejected += 1;
            continue;
        };
        let provenance = Provenance {
            migration_id: *migration_id,
            source_table: table.source_table.clone(),
            source_key: key.clone(),
            batch_no,
        };
        let mut record = EntityRecord::new(&table.entity_type, &key, provenance);
        for field in &table.fields {
            let value = match cell(row, &field.source_column) {
                Some(v) if !v.is_null() => v,
                _ => continue,
            };
            let value = match &field.transformation {
                Some(t) => t.apply(value),
                None => value.clone(),
            };
            record.set(field.tier, field.target_field.clone(), value);
        }
        out.records.push(record);
    }
    out
}

fn target_ref(link: &LinkSpec, row: &Row) -> Option<EntityRef> {
    let key = cell(row, &link.column).and_then(Value::key_string)?;
    Some(EntityRef {
        entity_type: link.target_entity_type.clone(),
        source_table: link.target_table.clone(),
        key_field: link.target_column.clone(),
        key,
    })
}

/// Relationship records for the foreign-key columns of a row.
///
/// A null reference is not a link; a row whose own key is missing is
/// rejected once per link.
pub fn reference_links(
    table: &TablePlan,
    rows: &[Row],
    migration_id: &MigrationId,
    batch_no: u64,
) -> BatchOutput<RelationshipRecord> {
    let mut out = BatchOutput::default();
    let key_field = table.natural_key.join(KEY_SEPARATOR);
    for row in rows {
        let Some(key) = natural_key(row, &table.natural_key) else {
            out.rejected += table.links.len() as u64;
            continue;
        };
        for link in &table.links {
            let Some(to) = target_ref(link, row) else {
                continue;
            };
            let from = EntityRef {
                entity_type: table.entity_type.clone(),
                source_table: table.source_table.clone(),
                key_field: key_field.clone(),
                key: key.clone(),
            };
            let provenance = Provenance {
                migration_id: *migration_id,
                source_table: table.source_table.clone(),
                source_key: key.clone(),
                batch_no,
            };
            out.records.push(RelationshipRecord::new(
                link.relationship_type.clone(),
                link.kind,
                link.column.clone(),
                from,
                to,
                provenance,
            ));
        }
    }
    out
}

/// One many-to-many relationship per junction row.
///
/// The row's own natural key identifies the link when it has one, so
/// repeated pairs with distinct keys are all kept.
pub fn junction_links(
    table: &TablePlan,
    rows: &[Row],
    migration_id: &MigrationId,
    batch_no: u64,
) -> BatchOutput<RelationshipRecord> {
    let mut out = BatchOutput::default();
    let (Some(left), Some(right)) = (table.links.first(), table.links.get(1)) else {
        out.rejected = rows.len() as u64;
        return out;
    };
    let relationship_type = format!("{}_{}", left.target_entity_type, right.target_entity_type);
    let via = format!("{}{}{}", left.column, KEY_SEPARATOR, right.column);
    for row in rows {
        let (Some(from), Some(to)) = (target_ref(left, row), target_ref(right, row)) else {
            out.rejected += 1;
            continue;
        };
        let source_key = natural_key(row, &table.natural_key)
            .unwrap_or_else(|| format!("{}{}{}", from.key, KEY_SEPARATOR, to.key));
        let provenance = Provenance {
            migration_id: *migration_id,
            source_table: table.source_table.clone(),
            source_key,
            batch_no,
        };
        out.records.push(RelationshipRecord::new(
            relationship_type.clone(),
            RelationshipKind::ManyToMany,
            via.clone(),
            from,
            to,
            provenance,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{FieldMapping, StorageTier, Transformation};
    use crate::ColumnClassification;
    use crate::migration::plan::{BatchPlan, WorkKind};

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn field(col: &str, target: &str, tier: StorageTier, t: Option<Transformation>) -> FieldMapping {
        FieldMapping {
            source_column: col.to_string(),
            target_field: target.to_string(),
            tier,
            classification: ColumnClassification::Description,
            transformation: t,
            validations: Vec::new(),
            confidence: 0.9,
        }
    }

    fn table(work: WorkKind) -> TablePlan {
        TablePlan {
            source_table: "OCRD".to_string(),
            entity_type: "customer".to_string(),
            work,
            row_count: 2,
            batch: BatchPlan::new(2, 10, vec!["CardCode".to_string()]),
            natural_key: vec!["CardCode".to_string()],
            fields: vec![
                field("CardCode", "code", StorageTier::Identity, None),
                field("CardName", "name", StorageTier::Identity, Some(Transformation::Trim)),
                field("validFor", "valid_for", StorageTier::AttributeMetadata, Some(Transformation::ToBoolean)),
            ],
            links: vec![LinkSpec {
                column: "GroupCode".to_string(),
                target_table: "OCRG".to_string(),
                target_column: "GroupCode".to_string(),
                target_entity_type: "category".to_string(),
                relationship_type: "customer_category".to_string(),
                kind: RelationshipKind::OneToMany,
            }],
            depends_on: Vec::new(),
        }
    }

    #[test]
    fn test_entities_apply_tiers_and_transformations() {
        let id = MigrationId::from_bytes([1; 16]);
        let rows = vec![
            row(&[
                ("CardCode", Value::text("C001")),
                ("CardName", Value::text("  Acme ")),
                ("validFor", Value::text("Y")),
            ]),
            row(&[("CardCode", Value::Null), ("CardName", Value::text("Orphan"))]),
        ];
        let out = entities(&table(WorkKind::Entities), &rows, &id, 1);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.rejected, 1);

        let record = &out.records[0];
        assert_eq!(record.natural_key, "C001");
        assert_eq!(record.identity.get("name"), Some(&Value::text("Acme")));
        assert_eq!(record.attributes.get("valid_for"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_composite_key_tolerates_partial_nulls() {
        let r = row(&[("a", Value::Int(1)), ("b", Value::Null)]);
        let cols = vec!["a".to_string(), "b".to_string()];
        assert_eq!(natural_key(&r, &cols), Some("1|".to_string()));
        let empty = row(&[("a", Value::text(" ")), ("b", Value::Null)]);
        assert_eq!(natural_key(&empty, &cols), None);
    }

    #[test]
    fn test_reference_links_skip_null_references() {
        let id = MigrationId::from_bytes([1; 16]);
        let rows = vec![
            row(&[("CardCode", Value::text("C001")), ("GroupCode", Value::Int(100))]),
            row(&[("CardCode", Value::text("C002")), ("GroupCode", Value::Null)]),
        ];
        let out = reference_links(&table(WorkKind::ReferenceLinks), &rows, &id, 1);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.rejected, 0);
        assert_eq!(out.records[0].to.key, "100");
        assert_eq!(out.records[0].from.key, "C001");
    }

    #[test]
    fn test_junction_needs_both_ends() {
        let id = MigrationId::from_bytes([1; 16]);
        let mut plan = table(WorkKind::JunctionLinks);
        plan.links.push(LinkSpec {
            column: "ItemCode".to_string(),
            target_table: "OITM".to_string(),
            target_column: "ItemCode".to_string(),
            target_entity_type: "product".to_string(),
            relationship_type: "product".to_string(),
            kind: RelationshipKind::ManyToMany,
        });
        let rows = vec![
            row(&[("GroupCode", Value::Int(1)), ("ItemCode", Value::text("I1"))]),
            row(&[("GroupCode", Value::Int(1)), ("ItemCode", Value::Null)]),
        ];
        let out = junction_links(&plan, &rows, &id, 1);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.rejected, 1);
        assert_eq!(out.records[0].relationship_type, "category_product");
        assert_eq!(out.records[0].kind, RelationshipKind::ManyToMany);
    }

    #[test]
    fn test_two_foreign_keys_to_one_row_stay_distinct() {
        let id = MigrationId::from_bytes([1; 16]);
        let mut plan = table(WorkKind::ReferenceLinks);
        plan.links = ["BillTo", "ShipTo"]
            .iter()
            .map(|column| LinkSpec {
                column: column.to_string(),
                target_table: "OCRG".to_string(),
                target_column: "GroupCode".to_string(),
                target_entity_type: "category".to_string(),
                relationship_type: format!("customer_category_{}", column.to_ascii_lowercase()),
                kind: RelationshipKind::OneToMany,
            })
            .collect();
        let rows = vec![row(&[
            ("CardCode", Value::text("C001")),
            ("BillTo", Value::Int(1)),
            ("ShipTo", Value::Int(1)),
        ])];
        let out = reference_links(&plan, &rows, &id, 1);
        assert_eq!(out.records.len(), 2);
        assert_ne!(out.records[0].id, out.records[1].id);
        assert_eq!(out.records[0].via, "BillTo");
        assert_eq!(out.records[1].relationship_type, "customer_category_shipto");
    }

    #[test]
    fn test_junction_rows_with_same_pair_keep_their_keys() {
        let id = MigrationId::from_bytes([1; 16]);
        let mut plan = table(WorkKind::JunctionLinks);
        plan.natural_key = vec!["LineId".to_string()];
        plan.links.push(LinkSpec {
            column: "ItemCode".to_string(),
            target_table: "OITM".to_string(),
            target_column: "ItemCode".to_string(),
            target_entity_type: "product".to_string(),
            relationship_type: "product".to_string(),
            kind: RelationshipKind::ManyToMany,
        });
        let rows = vec![
            row(&[("LineId", Value::Int(1)), ("GroupCode", Value::Int(1)), ("ItemCode", Value::text("I1"))]),
            row(&[("LineId", Value::Int(2)), ("GroupCode", Value::Int(1)), ("ItemCode", Value::text("I1"))]),
        ];
        let out = junction_links(&plan, &rows, &id, 1);
        assert_eq!(out.records.len(), 2);
        assert_ne!(out.records[0].id, out.records[1].id);
        assert_eq!(out.records[1].provenance.source_key, "2");

        // Without a key of its own the pair identifies the row.
        plan.natural_key = vec!["Missing".to_string()];
        let out = junction_links(&plan, &rows[..1], &id, 1);
        assert_eq!(out.records[0].provenance.source_key, "1|I1");
    }
}
