//! In-memory hash join over two fetched row sets.
//!
//! The build side is the right row set; the probe side is the left. Key
//! equality is strict on type: an integer never matches a float or a string
//! rendering of the same number, and null never matches anything (SQL
//! semantics). On column-name collisions in a combined row the right side's
//! value wins.

use std::collections::HashMap;

use tracing::debug;

use crate::engine::error::{FederationError, FederationResult};
use crate::engine::types::{Row, Value};
use crate::federation::types::{JoinKeys, JoinType};

/// A hashable projection of the joinable value types.
///
/// Floats hash by bit pattern. Null, JSON, byte, and array values are not
/// joinable and produce no key at all, so rows carrying them never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JoinKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
}

impl JoinKey {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Int(i) => Some(Self::Int(*i)),
            Value::Float(f) if !f.is_nan() => Some(Self::Float(f.to_bits())),
            Value::Text(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

/// Fails when a non-empty row set has the join column in none of its rows.
/// Heterogeneous document rows may carry the column only sometimes; that is
/// fine, rows without it simply never match.
fn validate_key_presence(rows: &[Row], column: &str, side: &str) -> FederationResult<()> {
    if !rows.is_empty() && !rows.iter().any(|r| r.contains_column(column)) {
        return Err(FederationError::join_invalid_keys(format!(
            "join key '{column}' is present in no row of the {side} result"
        )));
    }
    Ok(())
}

/// Joins two row sets on the given key columns.
pub fn hash_join(
    left_rows: &[Row],
    right_rows: &[Row],
    keys: &JoinKeys,
    join_type: JoinType,
) -> FederationResult<Vec<Row>> {
    validate_key_presence(left_rows, &keys.left, "left")?;
    validate_key_presence(right_rows, &keys.right, "right")?;

    let mut build: HashMap<JoinKey, Vec<usize>> = HashMap::with_capacity(right_rows.len());
    for (idx, row) in right_rows.iter().enumerate() {
        if let Some(key) = row.get(&keys.right).and_then(JoinKey::from_value) {
            build.entry(key).or_default().push(idx);
        }
    }

    let mut joined = Vec::new();
    for left_row in left_rows {
        let matches = left_row
            .get(&keys.left)
            .and_then(JoinKey::from_value)
            .and_then(|key| build.get(&key));

        match matches {
            Some(indices) => {
                for &idx in indices {
                    joined.push(merge_rows(left_row, &right_rows[idx]));
                }
            }
            None => {
                if join_type == JoinType::Left {
                    joined.push(left_row.clone());
                }
            }
        }
    }

    debug!(
        left = left_rows.len(),
        right = right_rows.len(),
        joined = joined.len(),
        %join_type,
        "hash join complete"
    );
    Ok(joined)
}

/// Combines one matched pair; the right side wins column collisions.
fn merge_rows(left: &Row, right: &Row) -> Row {
    let mut merged = left.clone();
    for (column, value) in &right.fields {
        merged.insert(column.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn keys(left: &str, right: &str) -> JoinKeys {
        JoinKeys {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    #[test]
    fn inner_join_keeps_only_matches() {
        let left = vec![
            row(&[("id", Value::Int(1)), ("name", Value::Text("A".into()))]),
            row(&[("id", Value::Int(2)), ("name", Value::Text("B".into()))]),
        ];
        let right = vec![row(&[("custId", Value::Int(1)), ("score", Value::Int(90))])];

        let joined = hash_join(&left, &right, &keys("id", "custId"), JoinType::Inner)
            .expect("join succeeds");

        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].get("name"), Some(&Value::Text("A".into())));
        assert_eq!(joined[0].get("score"), Some(&Value::Int(90)));
    }

    #[test]
    fn left_join_keeps_unmatched_left_rows_as_is() {
        let left = vec![
            row(&[("id", Value::Int(1)), ("name", Value::Text("A".into()))]),
            row(&[("id", Value::Int(2)), ("name", Value::Text("B".into()))]),
        ];
        let right = vec![row(&[("custId", Value::Int(1)), ("score", Value::Int(90))])];

        let joined =
            hash_join(&left, &right, &keys("id", "custId"), JoinType::Left).expect("join succeeds");

        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].get("score"), Some(&Value::Int(90)));
        assert_eq!(joined[1].get("name"), Some(&Value::Text("B".into())));
        assert_eq!(joined[1].get("score"), None);
    }

    #[test]
    fn one_to_many_emits_one_row_per_match() {
        let left = vec![row(&[("id", Value::Int(1))])];
        let right = vec![
            row(&[("ref", Value::Int(1)), ("n", Value::Int(10))]),
            row(&[("ref", Value::Int(1)), ("n", Value::Int(20))]),
        ];

        let joined =
            hash_join(&left, &right, &keys("id", "ref"), JoinType::Inner).expect("join succeeds");
        assert_eq!(joined.len(), 2);
    }

    #[test]
    fn right_side_wins_column_collisions() {
        let left = vec![row(&[
            ("id", Value::Int(1)),
            ("status", Value::Text("stale".into())),
        ])];
        let right = vec![row(&[
            ("id", Value::Int(1)),
            ("status", Value::Text("fresh".into())),
        ])];

        let joined =
            hash_join(&left, &right, &keys("id", "id"), JoinType::Inner).expect("join succeeds");
        assert_eq!(joined[0].get("status"), Some(&Value::Text("fresh".into())));
    }

    #[test]
    fn mismatched_types_never_match() {
        let left = vec![row(&[("id", Value::Int(1))])];
        let right = vec![
            row(&[("id", Value::Text("1".into()))]),
            row(&[("id", Value::Float(1.0))]),
        ];

        let joined =
            hash_join(&left, &right, &keys("id", "id"), JoinType::Inner).expect("join succeeds");
        assert!(joined.is_empty());
    }

    #[test]
    fn null_keys_never_match() {
        let left = vec![row(&[("id", Value::Null)])];
        let right = vec![row(&[("id", Value::Null)])];

        let inner =
            hash_join(&left, &right, &keys("id", "id"), JoinType::Inner).expect("join succeeds");
        assert!(inner.is_empty());

        let outer =
            hash_join(&left, &right, &keys("id", "id"), JoinType::Left).expect("join succeeds");
        assert_eq!(outer.len(), 1);
    }

    #[test]
    fn missing_key_column_is_a_join_error() {
        let left = vec![row(&[("id", Value::Int(1))])];
        let right = vec![row(&[("other", Value::Int(1))])];

        let err = hash_join(&left, &right, &keys("id", "custId"), JoinType::Inner)
            .expect_err("must fail");
        assert!(err.to_string().contains("custId"));
    }

    #[test]
    fn left_join_with_no_matches_returns_every_left_row() {
        let left = vec![
            row(&[("id", Value::Int(1))]),
            row(&[("id", Value::Int(2))]),
            row(&[("id", Value::Int(3))]),
        ];
        let right = vec![row(&[("ref", Value::Int(99))])];

        let outer =
            hash_join(&left, &right, &keys("id", "ref"), JoinType::Left).expect("join succeeds");
        assert_eq!(outer.len(), 3);
        assert!(outer.iter().all(|r| !r.contains_column("ref")));

        let inner =
            hash_join(&left, &right, &keys("id", "ref"), JoinType::Inner).expect("join succeeds");
        assert!(inner.is_empty());
    }

    #[test]
    fn empty_sides_join_to_empty_without_error() {
        let joined = hash_join(&[], &[], &keys("id", "id"), JoinType::Inner)
            .expect("empty join succeeds");
        assert!(joined.is_empty());
    }

    #[test]
    fn heterogeneous_rows_missing_the_key_are_skipped_not_fatal() {
        let left = vec![
            row(&[("id", Value::Int(1))]),
            row(&[("name", Value::Text("no key".into()))]),
        ];
        let right = vec![row(&[("id", Value::Int(1)), ("score", Value::Int(5))])];

        let joined =
            hash_join(&left, &right, &keys("id", "id"), JoinType::Inner).expect("join succeeds");
        assert_eq!(joined.len(), 1);
    }
}
