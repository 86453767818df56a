//! Hash Join implementation.

use super::JoinKey;
use crate::ast::JoinType;
use crate::executor::{Relation, RelationEntry};
use hashbrown::HashMap;
use quarry_core::Value;
use std::sync::Arc;

/// Hash Join executor.
///
/// Implements the classic hash join algorithm:
/// 1. Build phase: Create a hash table from the right relation
/// 2. Probe phase: Scan the left relation in order and probe the hash table
///
/// Right rows that never matched are emitted last for right outer joins.
pub struct HashJoin {
    join_type: JoinType,
}

impl HashJoin {
    /// Creates a new hash join executor.
    pub fn new(join_type: JoinType) -> Self {
        Self { join_type }
    }

    /// Creates an inner hash join.
    pub fn inner() -> Self {
        Self::new(JoinType::Inner)
    }

    /// Creates a left outer hash join.
    pub fn left_outer() -> Self {
        Self::new(JoinType::LeftOuter)
    }

    /// Creates a right outer hash join.
    pub fn right_outer() -> Self {
        Self::new(JoinType::RightOuter)
    }

    /// Executes the hash join. `left_keys[i]` is the key of `left.entries[i]`,
    /// likewise for the right side.
    pub fn execute(&self, left: Relation, left_keys: &[JoinKey], right: Relation, right_keys: &[JoinKey]) -> Relation {
        // Build phase: create hash table mapping key values to entry indices
        let mut hash_table: HashMap<&[Value], Vec<u32>> = HashMap::with_capacity(right.len());
        for (idx, key) in right_keys.iter().enumerate() {
            if let Some(key) = key {
                hash_table.entry(key.as_slice()).or_default().push(idx as u32);
            }
        }

        let mut result = left.joined_layout(&right);
        let combined_sources = left.combined_sources(&right);
        let left_width = left.width();
        let right_width = right.width();
        let mut right_matched = vec![false; right.len()];

        // Probe phase
        for (entry, key) in left.entries.iter().zip(left_keys) {
            let matches = key.as_deref().and_then(|k| hash_table.get(k));
            match matches {
                Some(indices) => {
                    for &idx in indices {
                        let idx = idx as usize;
                        right_matched[idx] = true;
                        result.push(RelationEntry::combine(
                            entry,
                            &right.entries[idx],
                            Arc::clone(&combined_sources),
                        ));
                    }
                }
                None if self.join_type == JoinType::LeftOuter => {
                    result.push(RelationEntry::combine_with_null(
                        entry,
                        right_width,
                        Arc::clone(&combined_sources),
                    ));
                }
                None => {}
            }
        }

        if self.join_type == JoinType::RightOuter {
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

        result
    }
}
