//! Multi-signal fusion scoring.
//!
//! Each candidate entity pattern is scored on up to four signals. The fused
//! confidence is the weighted sum of the signals that apply to the table,
//! divided by the sum of their weights, so a table without foreign keys is
//! not penalized for lacking a relationship signal.

use crate::schema::{ColumnClassification, TableDescriptor};
use crate::vocabulary::{normalize, split_words, EntityCategory, EntityPattern};

use super::types::SignalScores;

pub const WEIGHT_TABLE: f64 = 0.30;
pub const WEIGHT_COLUMN: f64 = 0.35;
pub const WEIGHT_RELATIONSHIP: f64 = 0.15;
pub const WEIGHT_CONTEXT: f64 = 0.20;

pub const TABLE_EXACT: f64 = 0.95;
pub const TABLE_AFFIX: f64 = 0.85;
pub const TABLE_SUBSTRING: f64 = 0.75;

/// Per matched expected column.
const COLUMN_STEP: f64 = 0.45;
const SIGNAL_CAP: f64 = 0.95;

/// Minimum confidence for a referenced mapping to count as a core entity.
pub const CONFIDENT_REFERENCE: f64 = 0.7;

/// Shortest pattern allowed to match as a prefix, suffix or substring.
const MIN_PARTIAL: usize = 3;
/// Shortest expected column allowed to match by containment.
const MIN_CONTAINED: usize = 5;

/// A table the current one references, as already mapped.
#[derive(Debug, Clone)]
pub struct ReferencedEntity {
    pub table: String,
    pub entity_type: String,
    pub category: EntityCategory,
    pub confidence: f64,
}

/// A scored candidate entity type for one table.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub entity_type: String,
    pub category: EntityCategory,
    pub industry: Option<String>,
    pub signals: SignalScores,
    pub confidence: f64,
    pub matched_columns: Vec<String>,
    pub reasoning: String,
}

/// Table-name signal against one pattern, with the pattern that matched.
pub fn table_signal(table: &str, pattern: &EntityPattern) -> (f64, Option<String>) {
    let variants = name_variants(table);
    let mut best = (0.0, None);

    for raw in &pattern.table_patterns {
        let p = normalize(raw);
        if p.is_empty() {
            continue;
        }
        let score = variants
            .iter()
            .map(|v| {
                if *v == p {
                    TABLE_EXACT
                } else if p.len() >= MIN_PARTIAL && (v.starts_with(&p) || v.ends_with(&p)) {
                    TABLE_AFFIX
                } else if p.len() >= MIN_PARTIAL && v.contains(&p) {
                    TABLE_SUBSTRING
                } else {
                    0.0
                }
            })
            .fold(0.0, f64::max);
        if score > best.0 {
            best = (score, Some(raw.clone()));
        }
    }
    best
}

/// Normalized forms of a table name: as-is, without a `tbl` prefix, singular.
fn name_variants(table: &str) -> Vec<String> {
    let base = normalize(table);
    let mut out = vec![base.clone()];
    let mut push = |v: String| {
        if !v.is_empty() && !out.contains(&v) {
            out.push(v);
        }
    };

    let stripped = base
        .strip_prefix("tbl")
        .map(str::to_string)
        .unwrap_or_else(|| base.clone());
    push(stripped.clone());
    push(singular(&stripped));
    out
}

fn singular(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{}y", stem)
    } else if name.ends_with("ses") || name.ends_with("xes") {
        name[..name.len() - 2].to_string()
    } else if name.ends_with('s') && !name.ends_with("ss") {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

/// Column-name signal: expected columns present in the table.
pub fn column_signal(table: &TableDescriptor, pattern: &EntityPattern) -> (f64, Vec<String>) {
    let expected: Vec<String> = pattern
        .expected_columns
        .iter()
        .map(|c| normalize(c))
        .filter(|c| !c.is_empty())
        .collect();

    let matched: Vec<String> = table
        .columns
        .iter()
        .filter(|col| {
            let name = normalize(&col.name);
            expected
                .iter()
                .any(|e| *e == name || (e.len() >= MIN_CONTAINED && name.contains(e.as_str())))
        })
        .map(|col| col.name.clone())
        .collect();

    let score = (COLUMN_STEP * matched.len() as f64).min(SIGNAL_CAP);
    (score, matched)
}

/// Relationship signal. `None` when the table references nothing else.
pub fn relationship_signal(
    pattern: &EntityPattern,
    has_references: bool,
    referenced: &[ReferencedEntity],
) -> Option<f64> {
    if !has_references {
        return None;
    }
    let confident: Vec<&ReferencedEntity> = referenced
        .iter()
        .filter(|r| r.confidence >= CONFIDENT_REFERENCE)
        .collect();

    let score = if confident
        .iter()
        .any(|r| pattern.parents.iter().any(|p| *p == r.entity_type))
    {
        SIGNAL_CAP
    } else if pattern.category == EntityCategory::Transactional
        && confident.iter().any(|r| r.category.is_master_data())
    {
        TABLE_SUBSTRING
    } else {
        0.0
    };
    Some(score)
}

/// Business-context signal. `None` when no context was supplied.
pub fn context_signal(
    pattern: &EntityPattern,
    industry: Option<&str>,
    business: Option<&str>,
) -> Option<f64> {
    if industry.is_none() && business.is_none() {
        return None;
    }

    let mut score = match (&pattern.industry, industry) {
        (Some(own), Some(wanted)) if own.eq_ignore_ascii_case(wanted) => SIGNAL_CAP,
        _ => 0.5,
    };

    if let Some(text) = business {
        let words: Vec<String> = split_words(text);
        let type_words = split_words(&pattern.entity_type);
        let mentioned = type_words
            .iter()
            .all(|tw| words.iter().any(|w| w == tw || singular(w) == *tw));
        if mentioned {
            score = score.max(TABLE_SUBSTRING);
        }
    }
    Some(score)
}

/// Weighted sum over applied signals, normalized by the applied weights.
pub fn fuse(signals: &SignalScores) -> f64 {
    let mut weighted = WEIGHT_TABLE * signals.table + WEIGHT_COLUMN * signals.column;
    let mut weights = WEIGHT_TABLE + WEIGHT_COLUMN;
    if let Some(r) = signals.relationship {
        weighted += WEIGHT_RELATIONSHIP * r;
        weights += WEIGHT_RELATIONSHIP;
    }
    if let Some(c) = signals.context {
        weighted += WEIGHT_CONTEXT * c;
        weights += WEIGHT_CONTEXT;
    }
    (weighted / weights).clamp(0.0, 1.0)
}

/// Score one pattern against a table. `None` when neither name nor columns match.
pub fn score_candidate(
    table: &TableDescriptor,
    pattern: &EntityPattern,
    referenced: &[ReferencedEntity],
    industry: Option<&str>,
    business: Option<&str>,
) -> Option<Candidate> {
    let (table_score, matched_pattern) = table_signal(&table.name, pattern);
    let (column_score, matched_columns) = column_signal(table, pattern);
    if table_score <= 0.0 && column_score <= 0.0 {
        return None;
    }

    let has_references = table.outgoing_references().next().is_some();
    let signals = SignalScores {
        table: table_score,
        column: column_score,
        relationship: relationship_signal(pattern, has_references, referenced),
        context: context_signal(pattern, industry, business),
    };
    let confidence = round(fuse(&signals));

    let mut reasons = Vec::new();
    let source = pattern.industry.as_deref().unwrap_or("generic");
    if let Some(p) = matched_pattern {
        reasons.push(format!(
            "table name '{}' matches {} pattern '{}' ({:.2})",
            table.name, source, p, table_score
        ));
    }
    if !matched_columns.is_empty() {
        reasons.push(format!(
            "{} expected column(s) present: {} ({:.2})",
            matched_columns.len(),
            matched_columns.join(", "),
            column_score
        ));
    }
    if let Some(r) = signals.relationship {
        if r > 0.0 {
            let targets: Vec<String> = referenced
                .iter()
                .map(|e| format!("{} ({})", e.table, e.entity_type))
                .collect();
            reasons.push(format!("references {} ({:.2})", targets.join(", "), r));
        }
    }
    if let Some(c) = signals.context {
        reasons.push(format!("context fit {:.2}", c));
    }

    Some(Candidate {
        entity_type: pattern.entity_type.clone(),
        category: pattern.category,
        industry: pattern.industry.clone(),
        signals,
        confidence,
        matched_columns,
        reasoning: format!("{}; fused confidence {:.2}", reasons.join("; "), confidence),
    })
}

/// Best first, one candidate per entity type; on equal scores an
/// industry-specific match outranks a generic one.
pub fn rank(mut candidates: Vec<Candidate>, industry: Option<&str>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| preference(b, industry).cmp(&preference(a, industry)))
            .then_with(|| a.entity_type.cmp(&b.entity_type))
    });
    let mut seen = Vec::new();
    candidates.retain(|c| {
        if seen.contains(&c.entity_type) {
            false
        } else {
            seen.push(c.entity_type.clone());
            true
        }
    });
    candidates
}

/// Tie-break order: the requested industry, then any industry preset, then generic.
fn preference(candidate: &Candidate, industry: Option<&str>) -> u8 {
    match (candidate.industry.as_deref(), industry) {
        (Some(own), Some(wanted)) if own.eq_ignore_ascii_case(wanted) => 2,
        (Some(_), _) => 1,
        (None, _) => 0,
    }
}

/// Columns classified with high confidence, used to size the fallback score.
pub fn confident_columns(table: &TableDescriptor) -> usize {
    table
        .columns
        .iter()
        .filter(|c| c.confidence >= 0.8 && c.classification != ColumnClassification::Other)
        .count()
}

/// Round to four decimals so repeated runs compare equal.
pub fn round(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
