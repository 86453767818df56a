//! Keyed set operations.
//!
//! Rows of the two branches are compared on the listed key columns only.
//! UNION keeps the first row of every key, left branch first. EXCEPT and
//! INTERSECT filter the left branch by key membership in the right one.

use crate::ast::SetOperator;
use crate::error::{ExecutionError, ExecutionResult};
use crate::executor::{Relation, RelationEntry};
use hashbrown::HashSet;
use quarry_core::Value;

/// Set operation executor.
pub struct SetOpExecutor<'a> {
    op: SetOperator,
    keys: &'a [String],
}

impl<'a> SetOpExecutor<'a> {
    pub fn new(op: SetOperator, keys: &'a [String]) -> Self {
        Self { op, keys }
    }

    /// Executes the set operation. `left_columns` and `right_columns` name
    /// the columns of each branch, in row order.
    pub fn execute(
        &self,
        left: Relation,
        right: Relation,
        left_columns: &[String],
        right_columns: &[String],
    ) -> ExecutionResult<Relation> {
        let left_keys = self.key_indices(left_columns, "left")?;
        let right_keys = self.key_indices(right_columns, "right")?;
        let key_of = |entry: &RelationEntry, indices: &[usize]| -> Vec<Value> {
            indices
                .iter()
                .map(|&i| entry.get_field(i).map_or(Value::Null, Value::key_normalized))
                .collect()
        };

        let entries: Vec<RelationEntry> = match self.op {
            SetOperator::UnionAll => left.iter().chain(right.iter()).cloned().collect(),
            SetOperator::Union => {
                let mut seen = HashSet::new();
                let left_rows = left.iter().map(|e| (e, left_keys.as_slice()));
                let right_rows = right.iter().map(|e| (e, right_keys.as_slice()));
                left_rows
                    .chain(right_rows)
                    .filter(|(e, keys)| seen.insert(key_of(*e, *keys)))
                    .map(|(e, _)| e.clone())
                    .collect()
            }
            SetOperator::Except | SetOperator::Intersect => {
                let right_set: HashSet<Vec<Value>> = right.iter().map(|e| key_of(e, &right_keys)).collect();
                let keep_members = self.op == SetOperator::Intersect;
                left.iter()
                    .filter(|e| right_set.contains(&key_of(*e, &left_keys)) == keep_members)
                    .cloned()
                    .collect()
            }
        };

        tracing::debug!(operator = self.op.name(), rows = entries.len(), "set operation finished");
        Ok(left.with_entries(entries))
    }

    fn key_indices(&self, columns: &[String], side: &'static str) -> ExecutionResult<Vec<usize>> {
        self.keys
            .iter()
            .map(|key| {
                columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(key))
                    .ok_or_else(|| ExecutionError::KeyColumnNotFound {
                        key: key.clone(),
                        side,
                        operator: self.op.name(),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(rows: &[(&str, i64)]) -> Relation {
        Relation::from_rows(
            rows.iter().map(|(n, v)| vec![Value::from(*n), Value::Int64(*v)]).collect(),
            "t",
            2,
        )
    }

    fn columns() -> Vec<String> {
        vec!["Name".to_string(), "Value".to_string()]
    }

    fn run(op: SetOperator, keys: &[&str]) -> ExecutionResult<Vec<(Value, Value)>> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let left = branch(&[("a", 1), ("b", 2), ("a", 3)]);
        let right = branch(&[("b", 20), ("c", 30)]);
        let result = SetOpExecutor::new(op, &keys).execute(left, right, &columns(), &columns())?;
        Ok(result
            .iter()
            .map(|e| (e.values()[0].clone(), e.values()[1].clone()))
            .collect())
    }

    fn names(rows: &[(Value, Value)]) -> Vec<Value> {
        rows.iter().map(|(n, _)| n.clone()).collect()
    }

    #[test]
    fn test_union_keeps_first_row_per_key() {
        let rows = run(SetOperator::Union, &["Name"]).unwrap();
        assert_eq!(names(&rows), vec![Value::from("a"), Value::from("b"), Value::from("c")]);
        assert_eq!(rows[1].1, Value::Int64(2));
    }

    #[test]
    fn test_union_all_concatenates() {
        assert_eq!(run(SetOperator::UnionAll, &["Name"]).unwrap().len(), 5);
    }

    #[test]
    fn test_except_and_intersect() {
        let except = run(SetOperator::Except, &["Name"]).unwrap();
        assert_eq!(names(&except), vec![Value::from("a"), Value::from("a")]);

        let intersect = run(SetOperator::Intersect, &["Name"]).unwrap();
        assert_eq!(intersect, vec![(Value::from("b"), Value::Int64(2))]);

        // Both columns as the key: nothing in common
        assert!(run(SetOperator::Intersect, &["Name", "Value"]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_key_column() {
        let err = run(SetOperator::Except, &["Missing"]).unwrap_err();
        match err {
            ExecutionError::KeyColumnNotFound { key, side, operator } => {
                assert_eq!(key, "Missing");
                assert_eq!(side, "left");
                assert_eq!(operator, SetOperator::Except.name());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
