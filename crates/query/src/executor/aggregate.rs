//! Aggregate executor.

use crate::executor::{Relation, RelationEntry};
use crate::functions::AggregateFunc;
use hashbrown::{HashMap, HashSet};
use quarry_core::Value;
use std::sync::Arc;

/// One aggregate over an input column. `column` is `None` for `Count(*)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregateSpec {
    pub func: AggregateFunc,
    pub column: Option<usize>,
    pub distinct: bool,
}

impl AggregateSpec {
    pub fn new(func: AggregateFunc, column: Option<usize>) -> Self {
        Self {
            func,
            column,
            distinct: false,
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

/// Aggregate executor - computes aggregate functions.
///
/// Groups are keyed by the first `group_count` columns of the input, with
/// integer widths normalized and nulls equal to each other. Groups are
/// emitted in order of first appearance. Without grouping columns the whole
/// input is one group, even when it is empty.
pub struct AggregateExecutor {
    group_count: usize,
    aggregates: Vec<AggregateSpec>,
}

impl AggregateExecutor {
    /// Creates a new aggregate executor.
    pub fn new(group_count: usize, aggregates: Vec<AggregateSpec>) -> Self {
        Self {
            group_count,
            aggregates,
        }
    }

    /// Creates an aggregate executor with no grouping.
    pub fn no_group(aggregates: Vec<AggregateSpec>) -> Self {
        Self::new(0, aggregates)
    }

    /// Executes the aggregation on the input relation.
    pub fn execute(&self, input: Relation) -> Relation {
        let sources = input.sources().to_vec();
        let shared_sources: Arc<[String]> = Arc::from(sources.as_slice());
        // After aggregation, the result has a new column structure
        let result_column_count = self.group_count + self.aggregates.len();
        let mut result = Relation::new(sources, vec![result_column_count]);

        if self.group_count == 0 {
            // No grouping - aggregate entire relation
            let entries: Vec<&RelationEntry> = input.iter().collect();
            let values = self.compute_aggregates(&entries);
            result.push(RelationEntry::from_values(values, shared_sources));
            return result;
        }

        // Group by the leading columns, keeping first-seen order
        let mut group_index: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<Vec<&RelationEntry>> = Vec::new();
        for entry in input.iter() {
            let key = self.make_group_key(entry);
            let next = groups.len();
            let index = *group_index.entry(key).or_insert(next);
            if index == next {
                groups.push(Vec::new());
            }
            groups[index].push(entry);
        }

        for group_entries in groups {
            let mut values = Vec::with_capacity(result_column_count);

            // Add group by values
            if let Some(first) = group_entries.first() {
                values.extend(first.values()[..self.group_count].iter().cloned());
            }

            // Add aggregate values
            values.extend(self.compute_aggregates(&group_entries));
            result.push(RelationEntry::from_values(values, Arc::clone(&shared_sources)));
        }

        result
    }

    fn make_group_key(&self, entry: &RelationEntry) -> Vec<Value> {
        (0..self.group_count)
            .map(|idx| entry.get_field(idx).map_or(Value::Null, Value::key_normalized))
            .collect()
    }

    fn compute_aggregates(&self, entries: &[&RelationEntry]) -> Vec<Value> {
        self.aggregates
            .iter()
            .map(|spec| self.compute_single_aggregate(spec, entries))
            .collect()
    }

    fn compute_single_aggregate(&self, spec: &AggregateSpec, entries: &[&RelationEntry]) -> Value {
        let idx = match spec.column {
            Some(idx) => idx,
            // COUNT(*) - count all rows
            None => return Value::Int64(entries.len() as i64),
        };

        // Non-null argument values, de-duplicated for DISTINCT
        let mut seen = HashSet::new();
        let values: Vec<&Value> = entries
            .iter()
            .filter_map(|e| e.get_field(idx))
            .filter(|v| !v.is_null())
            .filter(|v| !spec.distinct || seen.insert(v.key_normalized()))
            .collect();

        match spec.func {
            AggregateFunc::Count => Value::Int64(values.len() as i64),
            AggregateFunc::Sum => {
                if values.is_empty() {
                    return Value::Null;
                }
                if values.iter().all(|v| matches!(v, Value::Int32(_) | Value::Int64(_))) {
                    // Overflow yields null
                    values
                        .iter()
                        .try_fold(0i64, |acc, v| v.as_i64().and_then(|i| acc.checked_add(i)))
                        .map_or(Value::Null, Value::Int64)
                } else {
                    Value::Float64(values.iter().filter_map(|v| v.as_f64()).sum())
                }
            }
            AggregateFunc::Avg => {
                let numbers = numeric(&values);
                if numbers.is_empty() {
                    Value::Null
                } else {
                    let sum: f64 = numbers.iter().sum();
                    Value::Float64(sum / numbers.len() as f64)
                }
            }
            AggregateFunc::Min => values.iter().min().map_or(Value::Null, |v| (*v).clone()),
            AggregateFunc::Max => values.iter().max().map_or(Value::Null, |v| (*v).clone()),
            AggregateFunc::StdDev => {
                let numbers = numeric(&values);
                if numbers.is_empty() {
                    Value::Null
                } else {
                    let mean: f64 = numbers.iter().sum::<f64>() / numbers.len() as f64;
                    let variance: f64 =
                        numbers.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / numbers.len() as f64;
                    Value::Float64(variance.sqrt())
                }
            }
        }
    }
}

fn numeric(values: &[&Value]) -> Vec<f64> {
    values.iter().filter_map(|v| v.as_f64()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(rows: Vec<Vec<Value>>) -> Relation {
        let width = rows.first().map_or(0, Vec::len);
        Relation::from_rows(rows, "t", width)
    }

    fn single(rows: Vec<Vec<Value>>, spec: AggregateSpec) -> Value {
        let result = AggregateExecutor::no_group(vec![spec]).execute(input(rows));
        assert_eq!(result.len(), 1);
        result.entries[0].values()[0].clone()
    }

    fn column(values: &[Value]) -> Vec<Vec<Value>> {
        values.iter().map(|v| vec![v.clone()]).collect()
    }

    #[test]
    fn test_count_star_and_column() {
        let rows = column(&[Value::Int64(1), Value::Null, Value::Int64(3)]);
        assert_eq!(
            single(rows.clone(), AggregateSpec::new(AggregateFunc::Count, None)),
            Value::Int64(3)
        );
        // Should count only non-null values
        assert_eq!(
            single(rows, AggregateSpec::new(AggregateFunc::Count, Some(0))),
            Value::Int64(2)
        );
    }

    #[test]
    fn test_sum() {
        let rows = column(&[Value::Int32(1), Value::Null, Value::Int64(2)]);
        assert_eq!(single(rows, AggregateSpec::new(AggregateFunc::Sum, Some(0))), Value::Int64(3));

        let rows = column(&[Value::Int32(1), Value::Float64(0.5)]);
        assert_eq!(single(rows, AggregateSpec::new(AggregateFunc::Sum, Some(0))), Value::Float64(1.5));

        let rows = column(&[Value::Int64(i64::MAX), Value::Int64(1)]);
        assert_eq!(single(rows, AggregateSpec::new(AggregateFunc::Sum, Some(0))), Value::Null);

        let rows = column(&[Value::Null]);
        assert_eq!(single(rows, AggregateSpec::new(AggregateFunc::Sum, Some(0))), Value::Null);
    }

    #[test]
    fn test_avg_min_max() {
        let rows = column(&[Value::Int64(1), Value::Null, Value::Float64(4.0)]);
        assert_eq!(
            single(rows.clone(), AggregateSpec::new(AggregateFunc::Avg, Some(0))),
            Value::Float64(2.5)
        );
        assert_eq!(
            single(rows.clone(), AggregateSpec::new(AggregateFunc::Min, Some(0))),
            Value::Int64(1)
        );
        assert_eq!(single(rows, AggregateSpec::new(AggregateFunc::Max, Some(0))), Value::Float64(4.0));
    }

    #[test]
    fn test_stddev() {
        let rows = column(&[2, 4, 4, 4, 5, 5, 7, 9].map(Value::Int64));
        assert_eq!(
            single(rows, AggregateSpec::new(AggregateFunc::StdDev, Some(0))),
            Value::Float64(2.0)
        );
        assert_eq!(
            single(Vec::new(), AggregateSpec::new(AggregateFunc::StdDev, Some(0))),
            Value::Null
        );
    }

    #[test]
    fn test_distinct_aggregates() {
        let rows = column(&[Value::Int32(1), Value::Int64(1), Value::Int64(2), Value::Null]);
        assert_eq!(
            single(rows, AggregateSpec::new(AggregateFunc::Count, Some(0)).distinct()),
            Value::Int64(2)
        );
    }

    #[test]
    fn test_group_by_keeps_first_seen_order() {
        let rows = vec![
            vec![Value::from("b"), Value::Int64(1)],
            vec![Value::from("a"), Value::Int64(2)],
            vec![Value::from("b"), Value::Int64(3)],
            vec![Value::Null, Value::Int64(4)],
            vec![Value::Null, Value::Int64(5)],
        ];
        let executor = AggregateExecutor::new(
            1,
            vec![
                AggregateSpec::new(AggregateFunc::Count, None),
                AggregateSpec::new(AggregateFunc::Sum, Some(1)),
            ],
        );
        let result = executor.execute(input(rows));

        assert_eq!(result.width(), 3);
        let rows: Vec<&[Value]> = result.iter().map(|e| e.values()).collect();
        assert_eq!(rows[0], &[Value::from("b"), Value::Int64(2), Value::Int64(4)]);
        assert_eq!(rows[1], &[Value::from("a"), Value::Int64(1), Value::Int64(2)]);
        assert_eq!(rows[2], &[Value::Null, Value::Int64(2), Value::Int64(9)]);
    }

    #[test]
    fn test_group_keys_normalize_integer_widths() {
        let rows = vec![vec![Value::Int32(1)], vec![Value::Int64(1)]];
        let result = AggregateExecutor::new(1, vec![AggregateSpec::new(AggregateFunc::Count, None)]).execute(input(rows));
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries[0].values(), &[Value::Int32(1), Value::Int64(2)]);
    }

    #[test]
    fn test_empty_relation() {
        let result = AggregateExecutor::no_group(vec![AggregateSpec::new(AggregateFunc::Count, None)])
            .execute(input(Vec::new()));
        assert_eq!(result.entries[0].values(), &[Value::Int64(0)]);

        let result = AggregateExecutor::new(1, vec![AggregateSpec::new(AggregateFunc::Count, None)])
            .execute(input(Vec::new()));
        assert!(result.is_empty());
    }
}
