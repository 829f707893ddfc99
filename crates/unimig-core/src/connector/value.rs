//! Cell values and rows exchanged with connectors.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A row keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// Text values treated as missing data in non-nullable columns.
const NULL_SENTINELS: &[&str] = &["", "NULL", "N/A", "NA", "NONE", "-", "?"];

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Create a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Whether this is a SQL null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, or a text sentinel commonly used in place of null.
    pub fn is_null_equivalent(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => {
                let trimmed = s.trim();
                NULL_SENTINELS
                    .iter()
                    .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
            }
            _ => false,
        }
    }

    /// Text rendering used for natural keys; `None` for nulls and blank text.
    pub fn key_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Total order used for cursor comparisons.
    ///
    /// Nulls sort first; numbers compare numerically across int/float;
    /// mixed kinds fall back to kind rank.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let a = self.as_f64().unwrap_or_default();
                let b = other.as_f64().unwrap_or_default();
                a.total_cmp(&b)
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Extract the ordering key of a row. Missing columns read as null.
pub fn row_key(row: &Row, order_key: &[String]) -> Vec<Value> {
    order_key
        .iter()
        .map(|col| row.get(col).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Lexicographic comparison of two keys.
pub fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.total_cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Read position in a table ordered by a possibly non-unique key.
///
/// `ties` counts the rows already returned whose order key equals `key`, so
/// rows sharing the last key of a batch are neither skipped nor repeated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCursor {
    pub key: Vec<Value>,
    #[serde(default)]
    pub ties: u64,
}

impl BatchCursor {
    /// Cursor past the last row of `rows`, continuing from `previous`.
    /// `None` for an empty batch.
    pub fn after(rows: &[Row], order_key: &[String], previous: Option<&BatchCursor>) -> Option<Self> {
        let key = row_key(rows.last()?, order_key);
        let trailing = rows
            .iter()
            .rev()
            .take_while(|row| compare_keys(&row_key(row, order_key), &key) == Ordering::Equal)
            .count();
        let ties = match previous {
            Some(prev) if trailing == rows.len() && compare_keys(&prev.key, &key) == Ordering::Equal => {
                prev.ties + trailing as u64
            }
            _ => trailing as u64,
        };
        Some(Self { key, ties })
    }

    /// Index of the first unread row in `rows`, sorted by `order_key`.
    pub fn position(&self, rows: &[Row], order_key: &[String]) -> usize {
        let first_tie = rows.partition_point(|row| {
            compare_keys(&row_key(row, order_key), &self.key) == Ordering::Less
        });
        let past_ties = rows.partition_point(|row| {
            compare_keys(&row_key(row, order_key), &self.key) != Ordering::Greater
        });
        first_tie
            .saturating_add(usize::try_from(self.ties).unwrap_or(usize::MAX))
            .min(past_ties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_counts_ties_across_batches() {
        let key = vec!["k".to_string()];
        let rows: Vec<Row> = [1, 2, 2, 2, 3]
            .iter()
            .map(|k| Row::from([("k".to_string(), Value::Int(*k))]))
            .collect();

        let first = BatchCursor::after(&rows[..2], &key, None).unwrap();
        assert_eq!(first.ties, 1);
        assert_eq!(first.position(&rows, &key), 2);

        let second = BatchCursor::after(&rows[2..3], &key, Some(&first)).unwrap();
        assert_eq!(second.ties, 2);
        assert_eq!(second.position(&rows, &key), 3);

        let third = BatchCursor::after(&rows[3..5], &key, Some(&second)).unwrap();
        assert_eq!(third.key, vec![Value::Int(3)]);
        assert_eq!(third.ties, 1);
        assert_eq!(third.position(&rows, &key), 5);
        assert!(BatchCursor::after(&[], &key, Some(&third)).is_none());
    }

    #[test]
    fn test_null_equivalents() {
        assert!(Value::Null.is_null_equivalent());
        assert!(Value::text("  ").is_null_equivalent());
        assert!(Value::text("n/a").is_null_equivalent());
        assert!(Value::text("NULL").is_null_equivalent());
        assert!(!Value::text("C001").is_null_equivalent());
        assert!(!Value::Int(0).is_null_equivalent());
    }

    #[test]
    fn test_key_string() {
        assert_eq!(Value::text(" C001 ").key_string(), Some("C001".to_string()));
        assert_eq!(Value::Int(42).key_string(), Some("42".to_string()));
        assert_eq!(Value::text("").key_string(), None);
        assert_eq!(Value::Null.key_string(), None);
    }

    #[test]
    fn test_total_cmp_numeric_across_kinds() {
        assert_eq!(Value::Int(2).total_cmp(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Null.total_cmp(&Value::Int(0)), Ordering::Less);
        assert_eq!(
            Value::text("b").total_cmp(&Value::text("a")),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_keys() {
        let a = vec![Value::Int(1), Value::text("b")];
        let b = vec![Value::Int(1), Value::text("c")];
        assert_eq!(compare_keys(&a, &b), Ordering::Less);
        assert_eq!(compare_keys(&b, &b), Ordering::Equal);
    }

    #[test]
    fn test_untagged_json() {
        let row: Row = serde_json::from_str(r#"{"a": null, "b": 3, "c": "x", "d": true, "e": 1.5}"#)
            .unwrap();
        assert_eq!(row["a"], Value::Null);
        assert_eq!(row["b"], Value::Int(3));
        assert_eq!(row["c"], Value::text("x"));
        assert_eq!(row["d"], Value::Bool(true));
        assert_eq!(row["e"], Value::Float(1.5));
    }
}
