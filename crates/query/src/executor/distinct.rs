//! Distinct executor.

use crate::executor::Relation;
use hashbrown::HashSet;
use quarry_core::Value;

/// Drops repeated rows, keeping the first occurrence. Integer widths are
/// normalized before comparing, nulls compare equal.
pub struct DistinctExecutor;

impl DistinctExecutor {
    pub fn execute(input: Relation) -> Relation {
        let mut seen: HashSet<Vec<Value>> = HashSet::with_capacity(input.len());
        let entries = input
            .iter()
            .filter(|entry| seen.insert(entry.values().iter().map(Value::key_normalized).collect()))
            .cloned()
            .collect();
        input.with_entries(entries)
    }
}
