//! Sort executor.

use crate::analyzer::BoundExpr;
use crate::ast::SortOrder;
use crate::error::ExecutionResult;
use crate::executor::{ExprEvaluator, Relation};
use quarry_core::Value;
use std::cmp::Ordering;

/// Sort executor - stable sort on evaluated keys. Nulls sort first in
/// ascending order and last in descending order.
pub struct SortExecutor<'a> {
    order_by: &'a [(BoundExpr, SortOrder)],
}

impl<'a> SortExecutor<'a> {
    /// Creates a new sort executor.
    pub fn new(order_by: &'a [(BoundExpr, SortOrder)]) -> Self {
        Self { order_by }
    }

    /// Executes the sort on the input relation.
    pub fn execute(&self, input: Relation, evaluator: &ExprEvaluator) -> ExecutionResult<Relation> {
        let mut keyed = Vec::with_capacity(input.len());
        for entry in input.iter() {
            let mut key = Vec::with_capacity(self.order_by.len());
            for (expr, _) in self.order_by {
                key.push(evaluator.eval(expr, entry.values())?);
            }
            keyed.push((key, entry.clone()));
        }
        keyed.sort_by(|(a, _), (b, _)| self.compare_keys(a, b));
        Ok(input.with_entries(keyed.into_iter().map(|(_, entry)| entry).collect()))
    }

    fn compare_keys(&self, a: &[Value], b: &[Value]) -> Ordering {
        for ((av, bv), (_, order)) in a.iter().zip(b).zip(self.order_by) {
            let cmp = av.cmp(bv);
            if cmp != Ordering::Equal {
                return match order {
                    SortOrder::Asc => cmp,
                    SortOrder::Desc => cmp.reverse(),
                };
            }
        }
        Ordering::Equal
    }
}
