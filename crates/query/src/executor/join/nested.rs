//! Nested Loop Join implementation.

use crate::ast::JoinType;
use crate::error::ExecutionResult;
use crate::executor::{Relation, RelationEntry};
use quarry_core::Value;
use std::sync::Arc;

/// Nested Loop Join executor.
///
/// The simplest join algorithm that compares every pair of rows.
/// Used for conditions that are not plain equalities.
pub struct NestedLoopJoin {
    join_type: JoinType,
}

impl NestedLoopJoin {
    /// Creates a new nested loop join executor.
    pub fn new(join_type: JoinType) -> Self {
        Self { join_type }
    }

    /// Creates an inner nested loop join.
    pub fn inner() -> Self {
        Self::new(JoinType::Inner)
    }

    /// Creates a left outer nested loop join.
    pub fn left_outer() -> Self {
        Self::new(JoinType::LeftOuter)
    }

    /// Creates a right outer nested loop join.
    pub fn right_outer() -> Self {
        Self::new(JoinType::RightOuter)
    }

    /// Executes the join. `predicate` receives the combined row of each
    /// candidate pair.
    pub fn execute<F>(&self, left: Relation, right: Relation, mut predicate: F) -> ExecutionResult<Relation>
    where
        F: FnMut(&[Value]) -> ExecutionResult<bool>,
    {
        let mut result = left.joined_layout(&right);
        let combined_sources = left.combined_sources(&right);
        let mut right_matched = vec![false; right.len()];

        // Block-based nested loop for better cache performance
        const BLOCK_SIZE: usize = 256;
        for (block_idx, block) in left.entries.chunks(BLOCK_SIZE).enumerate() {
            let mut block_rows: Vec<Vec<RelationEntry>> = vec![Vec::new(); block.len()];
            for (r, right_entry) in right.entries.iter().enumerate() {
                for (i, left_entry) in block.iter().enumerate() {
                    let combined = RelationEntry::combine(left_entry, right_entry, Arc::clone(&combined_sources));
                    if predicate(combined.values())? {
                        right_matched[r] = true;
                        block_rows[i].push(combined);
                    }
                }
            }
            // Emit in left order, right order within one left row
            for (i, rows) in block_rows.into_iter().enumerate() {
                let left_idx = block_idx * BLOCK_SIZE + i;
                if rows.is_empty() && self.join_type == JoinType::LeftOuter {
                    result.push(RelationEntry::combine_with_null(
                        &left.entries[left_idx],
                        right.width(),
                        Arc::clone(&combined_sources),
                    ));
                }
                for row in rows {
                    result.push(row);
                }
            }
        }

        if self.join_type == JoinType::RightOuter {
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

        Ok(result)
    }
}
