//! Sample profiling and data-quality scoring.

use std::collections::HashSet;

use crate::connector::{Row, Value};
use crate::validation::Impact;

use super::types::{
    ColumnDescriptor, ColumnStats, DataPattern, DataQualityIssue, DataQualityReport, PatternKind,
    QualityIssueKind, TableDescriptor, TypeFamily,
};

/// Minimum sample size before cardinality patterns are reported.
const MIN_PATTERN_SAMPLE: u64 = 10;
/// Maximum distinct values for a low-cardinality column.
const LOW_CARDINALITY: u64 = 5;
/// Null ratio above which a column is considered mostly empty.
const MOSTLY_NULL: f64 = 0.5;
/// High-severity issues tolerated before cleanup is required.
const MAX_HIGH_ISSUES: usize = 5;

/// Compute statistics for one column over sampled rows.
pub fn profile_column(column: &str, rows: &[Row]) -> ColumnStats {
    let mut stats = ColumnStats {
        sampled: rows.len() as u64,
        ..Default::default()
    };
    let mut seen: HashSet<String> = HashSet::new();

    for row in rows {
        match row.get(column).unwrap_or(&Value::Null) {
            Value::Null => stats.nulls += 1,
            value if value.is_null_equivalent() => stats.null_sentinels += 1,
            value => {
                if let Value::Text(s) = value {
                    if s.trim() != s {
                        stats.untrimmed += 1;
                    }
                }
                seen.insert(value.to_string());
            }
        }
    }

    stats.distinct = seen.len() as u64;
    stats
}

/// Patterns visible in the sample for one column.
pub fn detect_patterns(
    column: &ColumnDescriptor,
    is_sole_primary_key: bool,
    rows: &[Row],
) -> Vec<DataPattern> {
    let mut patterns = Vec::new();
    let Some(stats) = &column.stats else {
        return patterns;
    };

    if stats.sampled >= MIN_PATTERN_SAMPLE
        && stats.distinct > 0
        && stats.distinct <= LOW_CARDINALITY
        && !is_sole_primary_key
    {
        patterns.push(DataPattern {
            column: column.name.clone(),
            pattern: PatternKind::LowCardinality {
                distinct: stats.distinct,
            },
            detail: format!(
                "{} distinct values in {} sampled rows",
                stats.distinct, stats.sampled
            ),
        });
    }

    let ratio = stats.null_ratio();
    if stats.sampled > 0 && ratio > MOSTLY_NULL {
        patterns.push(DataPattern {
            column: column.name.clone(),
            pattern: PatternKind::MostlyNull { ratio },
            detail: format!("{:.0}% of sampled values are empty", ratio * 100.0),
        });
    }

    let values: Vec<&Value> = rows
        .iter()
        .filter_map(|r| r.get(&column.name))
        .filter(|v| !v.is_null_equivalent())
        .collect();

    if is_sole_primary_key && column.type_family == TypeFamily::Integer && values.len() >= 3 {
        let ints: Vec<i64> = values
            .iter()
            .filter_map(|v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        if ints.len() == values.len() && ints.windows(2).all(|w| w[1] == w[0] + 1) {
            patterns.push(DataPattern {
                column: column.name.clone(),
                pattern: PatternKind::SequentialKeys,
                detail: format!("keys increase by one from {}", ints[0]),
            });
        }
    }

    if column.type_family == TypeFamily::Text && values.len() >= 3 {
        let lengths: HashSet<usize> = values
            .iter()
            .filter_map(|v| match v {
                Value::Text(s) => Some(s.chars().count()),
                _ => None,
            })
            .collect();
        if lengths.len() == 1 {
            if let Some(&length) = lengths.iter().next() {
                patterns.push(DataPattern {
                    column: column.name.clone(),
                    pattern: PatternKind::UniformLength { length },
                    detail: format!("all sampled values are {} characters", length),
                });
            }
        }
    }

    patterns
}

/// Data-quality issues for one analyzed table.
pub fn table_issues(table: &TableDescriptor, rows: &[Row]) -> Vec<DataQualityIssue> {
    let mut issues = Vec::new();
    let issue = |column: Option<&str>, kind, severity, message: String| DataQualityIssue {
        table: table.name.clone(),
        column: column.map(str::to_string),
        kind,
        severity,
        message,
    };

    if table.primary_key.is_empty() {
        issues.push(issue(
            None,
            QualityIssueKind::MissingPrimaryKey,
            Impact::High,
            format!("table {} has no primary key", table.name),
        ));
    } else if !rows.is_empty() {
        let mut keys = HashSet::new();
        let duplicates = rows
            .iter()
            .filter(|row| {
                let key: Vec<String> = table
                    .primary_key
                    .iter()
                    .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
                    .collect();
                !keys.insert(key)
            })
            .count();
        if duplicates > 0 {
            issues.push(issue(
                None,
                QualityIssueKind::DuplicateKeyValues,
                Impact::High,
                format!(
                    "{} duplicate primary key values in sampled rows of {}",
                    duplicates, table.name
                ),
            ));
        }
    }

    for column in &table.columns {
        let Some(stats) = &column.stats else {
            continue;
        };
        if !column.nullable && stats.nulls + stats.null_sentinels > 0 {
            issues.push(issue(
                Some(&column.name),
                QualityIssueKind::NullSentinelInRequiredColumn,
                Impact::Critical,
                format!(
                    "non-nullable column {}.{} holds {} null-equivalent values",
                    table.name,
                    column.name,
                    stats.nulls + stats.null_sentinels
                ),
            ));
        } else if stats.sampled > 0 && stats.null_ratio() > MOSTLY_NULL {
            issues.push(issue(
                Some(&column.name),
                QualityIssueKind::MostlyNullColumn,
                Impact::Medium,
                format!(
                    "column {}.{} is {:.0}% empty",
                    table.name,
                    column.name,
                    stats.null_ratio() * 100.0
                ),
            ));
        }
        if stats.untrimmed > 0 {
            issues.push(issue(
                Some(&column.name),
                QualityIssueKind::UntrimmedText,
                Impact::Low,
                format!(
                    "column {}.{} has {} values with surrounding whitespace",
                    table.name, column.name, stats.untrimmed
                ),
            ));
        }
    }

    issues
}

/// Fold issues into a schema-wide report.
pub fn score(issues: Vec<DataQualityIssue>) -> DataQualityReport {
    let penalty: u32 = issues.iter().map(|i| i.severity.quality_penalty()).sum();
    let score = 100u32.saturating_sub(penalty) as u8;
    let critical = issues.iter().any(|i| i.severity == Impact::Critical);
    let high = issues.iter().filter(|i| i.severity == Impact::High).count();

    DataQualityReport {
        score,
        cleanup_required: critical || high > MAX_HIGH_ISSUES,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: Impact) -> DataQualityIssue {
        DataQualityIssue {
            table: "t".to_string(),
            column: None,
            kind: QualityIssueKind::MostlyNullColumn,
            severity,
            message: String::new(),
        }
    }

    fn rows(values: &[Value]) -> Vec<Row> {
        values
            .iter()
            .map(|v| {
                let mut row = Row::new();
                row.insert("c".to_string(), v.clone());
                row
            })
            .collect()
    }

    #[test]
    fn test_score_deductions() {
        let report = score(vec![
            issue(Impact::Critical),
            issue(Impact::High),
            issue(Impact::Medium),
            issue(Impact::Low),
        ]);
        assert_eq!(report.score, 100 - 25 - 10 - 5 - 1);
        assert!(report.cleanup_required);
    }

    #[test]
    fn test_score_floor_and_high_threshold() {
        let report = score((0..5).map(|_| issue(Impact::Critical)).collect());
        assert_eq!(report.score, 0);

        let five_high = score((0..5).map(|_| issue(Impact::High)).collect());
        assert!(!five_high.cleanup_required);
        let six_high = score((0..6).map(|_| issue(Impact::High)).collect());
        assert!(six_high.cleanup_required);
        assert_eq!(six_high.score, 40);
    }

    #[test]
    fn test_profile_column() {
        let sample = rows(&[
            Value::text("a"),
            Value::text(" b"),
            Value::text("N/A"),
            Value::Null,
            Value::text("a"),
        ]);
        let stats = profile_column("c", &sample);
        assert_eq!(stats.sampled, 5);
        assert_eq!(stats.nulls, 1);
        assert_eq!(stats.null_sentinels, 1);
        assert_eq!(stats.distinct, 2);
        assert_eq!(stats.untrimmed, 1);
    }
}
