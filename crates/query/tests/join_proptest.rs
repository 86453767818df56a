//! Property-based tests for JOIN algorithms and predicate rewrites.
//!
//! These tests verify that all JOIN algorithms produce the same rows for
//! randomly generated inputs, and that BETWEEN filters like its expansion.

use proptest::prelude::*;
use quarry_core::schema::{Column, TableMetadata};
use quarry_core::{DataType, Value};
use quarry_query::ast::JoinType;
use quarry_query::executor::join::{join_key, HashJoin, JoinKey, NestedLoopJoin, SortMergeJoin};
use quarry_query::executor::Relation;
use quarry_query::memory::{InMemorySchema, InMemorySchemaProvider};
use quarry_query::{compile, CancellationToken, CompilerOptions, SchemaProvider};
use std::sync::Arc;

/// Strategy for generating keys in a narrow range so joins match often.
/// Roughly one key in eight is null.
fn key_strategy() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![
        1 => Just(None),
        7 => (-5i64..5i64).prop_map(Some),
    ]
}

/// Rows of `[key, position]`.
fn rows_strategy(max_rows: usize) -> impl Strategy<Value = Vec<Vec<Value>>> {
    prop::collection::vec(key_strategy(), 0..max_rows).prop_map(|keys| {
        keys.into_iter()
            .enumerate()
            .map(|(i, k)| vec![k.map_or(Value::Null, Value::Int64), Value::Int64(i as i64)])
            .collect()
    })
}

fn relation(rows: Vec<Vec<Value>>, alias: &str) -> Relation {
    Relation::from_rows(rows, alias, 2)
}

fn keys(relation: &Relation) -> Vec<JoinKey> {
    relation.iter().map(|e| join_key(vec![e.values()[0].clone()])).collect()
}

/// The joined rows as a sorted multiset of their values.
fn canonical(result: &Relation) -> Vec<Vec<Value>> {
    let mut rows: Vec<Vec<Value>> = result.iter().map(|e| e.values().to_vec()).collect();
    rows.sort();
    rows
}

fn run_all(left_rows: Vec<Vec<Value>>, right_rows: Vec<Vec<Value>>, join_type: JoinType) -> [Vec<Vec<Value>>; 3] {
    let left = relation(left_rows, "left");
    let right = relation(right_rows, "right");
    let (left_keys, right_keys) = (keys(&left), keys(&right));

    let hash = HashJoin::new(join_type).execute(left.clone(), &left_keys, right.clone(), &right_keys);
    let merge = SortMergeJoin::new(join_type).execute(left.clone(), &left_keys, right.clone(), &right_keys);
    let nested = NestedLoopJoin::new(join_type)
        .execute(left, right, |row| Ok(!row[0].is_null() && row[0] == row[2]))
        .unwrap();

    [canonical(&hash), canonical(&merge), canonical(&nested)]
}

proptest! {
    /// Property: All three join algorithms produce the same inner join.
    #[test]
    fn inner_joins_consistent(
        left_rows in rows_strategy(40),
        right_rows in rows_strategy(40),
    ) {
        let [hash, merge, nested] = run_all(left_rows, right_rows, JoinType::Inner);
        prop_assert_eq!(&hash, &nested);
        prop_assert_eq!(&merge, &nested);
    }

    /// Property: All three join algorithms produce the same left outer join.
    #[test]
    fn left_outer_joins_consistent(
        left_rows in rows_strategy(40),
        right_rows in rows_strategy(40),
    ) {
        let [hash, merge, nested] = run_all(left_rows, right_rows, JoinType::LeftOuter);
        prop_assert_eq!(&hash, &nested);
        prop_assert_eq!(&merge, &nested);
    }

    /// Property: All three join algorithms produce the same right outer join.
    #[test]
    fn right_outer_joins_consistent(
        left_rows in rows_strategy(40),
        right_rows in rows_strategy(40),
    ) {
        let [hash, merge, nested] = run_all(left_rows, right_rows, JoinType::RightOuter);
        prop_assert_eq!(&hash, &nested);
        prop_assert_eq!(&merge, &nested);
    }

    /// Property: Inner join result count equals the number of matching non-null pairs.
    #[test]
    fn inner_join_count_correct(
        left_rows in rows_strategy(30),
        right_rows in rows_strategy(30),
    ) {
        let mut expected_count = 0;
        for l in &left_rows {
            for r in &right_rows {
                if !l[0].is_null() && l[0] == r[0] {
                    expected_count += 1;
                }
            }
        }

        let [hash, _, _] = run_all(left_rows, right_rows, JoinType::Inner);
        prop_assert_eq!(hash.len(), expected_count);
    }

    /// Property: Left outer join keeps every left row at least once.
    #[test]
    fn left_outer_join_preserves_left(
        left_rows in rows_strategy(30),
        right_rows in rows_strategy(30),
    ) {
        let left_count = left_rows.len();
        let [hash, _, _] = run_all(left_rows, right_rows, JoinType::LeftOuter);

        let mut positions: Vec<i64> = hash.iter().filter_map(|r| r[1].as_i64()).collect();
        positions.sort();
        positions.dedup();
        prop_assert_eq!(positions.len(), left_count);
    }

    /// Property: `x BETWEEN a AND b` keeps the same rows as `x >= a AND x <= b`.
    #[test]
    fn between_equals_expanded_range(
        values in prop::collection::vec(prop::option::of(-20i64..20i64), 0..40),
        low in -20i64..20i64,
        high in -20i64..20i64,
    ) {
        let provider: Arc<dyn SchemaProvider> = numbers_provider(&values);
        let between = format!("select n.X from #mem.numbers() n where n.X between {} and {}", low, high);
        let expanded = format!("select n.X from #mem.numbers() n where n.X >= {} and n.X <= {}", low, high);

        let run = |text: &str| {
            compile(text, 1, Arc::clone(&provider), CompilerOptions::default())
                .unwrap()
                .run(&CancellationToken::new())
                .unwrap()
                .into_rows()
        };
        prop_assert_eq!(run(&between), run(&expanded));
    }
}

fn numbers_provider(values: &[Option<i64>]) -> Arc<InMemorySchemaProvider> {
    let metadata = TableMetadata::new("numbers", vec![Column::new("X", DataType::Int64)]);
    let rows = values.iter().map(|v| vec![v.map_or(Value::Null, Value::Int64)]).collect();
    Arc::new(InMemorySchemaProvider::new().with_schema("mem", InMemorySchema::new().with_table("numbers", metadata, rows)))
}
