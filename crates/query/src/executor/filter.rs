//! Filter executor.

use crate::analyzer::BoundExpr;
use crate::error::ExecutionResult;
use crate::executor::{ExprEvaluator, Relation};

/// Filter executor - keeps rows whose predicate evaluates to true.
pub struct FilterExecutor<'a> {
    predicate: &'a BoundExpr,
}

impl<'a> FilterExecutor<'a> {
    /// Creates a new filter executor.
    pub fn new(predicate: &'a BoundExpr) -> Self {
        Self { predicate }
    }

    /// Executes the filter on the input relation.
    pub fn execute(&self, input: Relation, evaluator: &ExprEvaluator) -> ExecutionResult<Relation> {
        let mut entries = Vec::with_capacity(input.len());
        for entry in input.iter() {
            if evaluator.eval_predicate(self.predicate, entry.values())? {
                entries.push(entry.clone());
            }
        }
        Ok(input.with_entries(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::BoundExprKind;
    use crate::ast::BinaryOp;
    use crate::diagnostics::Span;
    use quarry_core::{DataType, Value};

    #[test]
    fn test_filter_keeps_only_true() {
        let input = Relation::from_rows(
            vec![vec![Value::Int64(10)], vec![Value::Null], vec![Value::Int64(30)]],
            "t",
            1,
        );
        let predicate = BoundExpr::new(
            BoundExprKind::Binary {
                left: Box::new(BoundExpr::column(0, "Age", Some(DataType::Int64), Span::default())),
                op: BinaryOp::Gt,
                right: Box::new(BoundExpr::literal(Value::Int64(15), Span::default())),
            },
            Some(DataType::Boolean),
            Span::default(),
        );

        let result = FilterExecutor::new(&predicate)
            .execute(input, &ExprEvaluator::new())
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries[0].values(), &[Value::Int64(30)]);
        assert_eq!(result.sources(), &["t"]);
    }
}
