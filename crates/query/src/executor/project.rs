//! Project executor.

use crate::analyzer::BoundExpr;
use crate::error::ExecutionResult;
use crate::executor::{ExprEvaluator, Relation, RelationEntry, SharedSources};

/// Project executor - evaluates the output columns of every row.
pub struct ProjectExecutor<'a> {
    columns: &'a [BoundExpr],
}

impl<'a> ProjectExecutor<'a> {
    /// Creates a new project executor.
    pub fn new(columns: &'a [BoundExpr]) -> Self {
        Self { columns }
    }

    /// Executes the projection on the input relation.
    pub fn execute(&self, input: Relation, evaluator: &ExprEvaluator) -> ExecutionResult<Relation> {
        let sources = input.sources().to_vec();
        let shared_sources: SharedSources = sources.clone().into();
        // After projection, we have a single combined result with projected columns
        let mut result = Relation::new(sources, vec![self.columns.len()]);
        for entry in input.iter() {
            let values = evaluator.eval_all(self.columns, entry.values())?;
            result.push(RelationEntry::from_values(values, shared_sources.clone()));
        }
        Ok(result)
    }
}
