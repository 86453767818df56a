//! Sort-Merge Join implementation.

use super::JoinKey;
use crate::ast::JoinType;
use crate::executor::{Relation, RelationEntry};
use quarry_core::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// Sort-Merge Join executor.
///
/// Both inputs are sorted on their keys (stable, so equal keys keep input
/// order) and merged run by run. Rows with a null key never match.
pub struct SortMergeJoin {
    join_type: JoinType,
}

impl SortMergeJoin {
    /// Creates a new sort-merge join executor.
    pub fn new(join_type: JoinType) -> Self {
        Self { join_type }
    }

    /// Creates an inner sort-merge join.
    pub fn inner() -> Self {
        Self::new(JoinType::Inner)
    }

    /// Creates a left outer sort-merge join.
    pub fn left_outer() -> Self {
        Self::new(JoinType::LeftOuter)
    }

    /// Creates a right outer sort-merge join.
    pub fn right_outer() -> Self {
        Self::new(JoinType::RightOuter)
    }

    /// Executes the sort-merge join.
    pub fn execute(&self, left: Relation, left_keys: &[JoinKey], right: Relation, right_keys: &[JoinKey]) -> Relation {
        let left_order = sorted_indices(left_keys);
        let right_order = sorted_indices(right_keys);

        let mut result = left.joined_layout(&right);
        let combined_sources = left.combined_sources(&right);
        let mut left_matched = vec![false; left.len()];
        let mut right_matched = vec![false; right.len()];

        let mut left_idx = 0;
        let mut right_idx = 0;
        while left_idx < left_order.len() && right_idx < right_order.len() {
            let left_key = key_at(left_keys, left_order[left_idx]);
            let right_key = key_at(right_keys, right_order[right_idx]);
            match compare_keys(left_key, right_key) {
                Ordering::Less => left_idx += 1,
                Ordering::Greater => right_idx += 1,
                Ordering::Equal => {
                    // Find the runs of equal keys on both sides
                    let left_end = run_end(&left_order, left_idx, left_keys);
                    let right_end = run_end(&right_order, right_idx, right_keys);
                    for &l in &left_order[left_idx..left_end] {
                        for &r in &right_order[right_idx..right_end] {
                            left_matched[l] = true;
                            right_matched[r] = true;
                            result.push(RelationEntry::combine(
                                &left.entries[l],
                                &right.entries[r],
                                Arc::clone(&combined_sources),
                            ));
                        }
                    }
                    left_idx = left_end;
                    right_idx = right_end;
                }
            }
        }

        match self.join_type {
            JoinType::LeftOuter => {
                let right_width = right.width();
                for (entry, matched) in left.entries.iter().zip(left_matched) {
                    if !matched {
                        result.push(RelationEntry::combine_with_null(
                            entry,
                            right_width,
                            Arc::clone(&combined_sources),
                        ));
                    }
                }
            }
            JoinType::RightOuter => {
                let left_width = left.width();
                for (entry, matched) in right.entries.iter().zip(right_matched) {
                    if !matched {
                        result.push(RelationEntry::combine_null_with(
                            left_width,
                            entry,
                            Arc::clone(&combined_sources),
                        ));
                    }
                }
            }
            JoinType::Inner => {}
        }

        result
    }
}

/// Indices of the entries with a non-null key, sorted by key.
fn sorted_indices(keys: &[JoinKey]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..keys.len()).filter(|&i| keys[i].is_some()).collect();
    indices.sort_by(|&a, &b| compare_keys(key_at(keys, a), key_at(keys, b)));
    indices
}

fn key_at(keys: &[JoinKey], index: usize) -> &[Value] {
    keys[index].as_deref().unwrap_or_default()
}

fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    a.cmp(b)
}

fn run_end(order: &[usize], start: usize, keys: &[JoinKey]) -> usize {
    let first = key_at(keys, order[start]);
    let mut end = start + 1;
    while end < order.len() && compare_keys(key_at(keys, order[end]), first) == Ordering::Equal {
        end += 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::super::join_key;
    use super::*;

    fn relation(name: &str, values: &[Option<i64>]) -> (Relation, Vec<JoinKey>) {
        let rows: Vec<Vec<Value>> = values
            .iter()
            .map(|v| vec![v.map_or(Value::Null, Value::Int64)])
            .collect();
        let keys = rows.iter().map(|r| join_key(r.clone())).collect();
        (Relation::from_rows(rows, name, 1), keys)
    }

    #[test]
    fn test_sort_merge_join_unsorted_inputs() {
        let (left, lk) = relation("left", &[Some(3), Some(1), Some(2)]);
        let (right, rk) = relation("right", &[Some(2), Some(3), Some(2), Some(5)]);

        let result = SortMergeJoin::inner().execute(left, &lk, right, &rk);

        assert_eq!(result.len(), 3);
        let pairs: Vec<&[Value]> = result.iter().map(|e| e.values()).collect();
        assert_eq!(pairs[0], &[Value::Int64(2), Value::Int64(2)]);
        assert_eq!(pairs[2], &[Value::Int64(3), Value::Int64(3)]);
    }

    #[test]
    fn test_sort_merge_join_outer() {
        let (left, lk) = relation("left", &[Some(1), None, Some(2)]);
        let (right, rk) = relation("right", &[Some(2), Some(7)]);

        let result = SortMergeJoin::left_outer().execute(left.clone(), &lk, right.clone(), &rk);
        assert_eq!(result.len(), 3);
        assert_eq!(result.entries[1].values(), &[Value::Int64(1), Value::Null]);
        assert_eq!(result.entries[2].values(), &[Value::Null, Value::Null]);

        let result = SortMergeJoin::right_outer().execute(left, &lk, right, &rk);
        assert_eq!(result.len(), 2);
        assert_eq!(result.entries[1].values(), &[Value::Null, Value::Int64(7)]);
    }
}
