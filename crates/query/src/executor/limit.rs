//! Limit executor.

use crate::executor::Relation;

/// Limit executor - applies SKIP and TAKE to a relation. Negative counts
/// behave as zero.
pub struct LimitExecutor {
    skip: usize,
    take: Option<usize>,
}

impl LimitExecutor {
    /// Creates a new limit executor.
    pub fn new(skip: Option<i64>, take: Option<i64>) -> Self {
        Self {
            skip: clamp(skip.unwrap_or(0)),
            take: take.map(clamp),
        }
    }

    /// Executes the limit on the input relation.
    pub fn execute(&self, mut input: Relation) -> Relation {
        let len = input.entries.len();
        let start = self.skip.min(len);
        let end = match self.take {
            Some(take) => start.saturating_add(take).min(len),
            None => len,
        };

        // Truncate tail first (drops elements after end)
        input.entries.truncate(end);
        // Remove head elements (drops elements before start)
        if start > 0 {
            input.entries.drain(..start);
        }
        input
    }
}

fn clamp(n: i64) -> usize {
    usize::try_from(n.max(0)).unwrap_or(usize::MAX)
}
