//! Splits aggregation out of a grouped block.
//!
//! Post-aggregation expressions (projection, HAVING, ORDER BY) are rewritten
//! over the aggregation output row: group keys first, then aggregates.

use super::bound::{BoundAggregate, BoundAggregation, BoundExpr, BoundExprKind};
use crate::diagnostics::{DiagnosticCode, DiagnosticContext};

pub(super) struct GroupingRewriter {
    group_by: Vec<BoundExpr>,
    aggregates: Vec<BoundAggregate>,
    /// Grouping synthesized from `SELECT DISTINCT`.
    from_distinct: bool,
}

impl GroupingRewriter {
    pub fn new(group_by: Vec<BoundExpr>) -> Self {
        Self {
            group_by,
            aggregates: Vec::new(),
            from_distinct: false,
        }
    }

    pub fn for_distinct(projection: Vec<BoundExpr>) -> Self {
        Self {
            from_distinct: true,
            ..Self::new(projection)
        }
    }

    /// Rewrites one expression, reporting bare columns that are neither
    /// grouped nor aggregated.
    pub fn rewrite(&mut self, expr: &BoundExpr, diagnostics: &mut DiagnosticContext) -> Option<BoundExpr> {
        if let Some(i) = self.group_by.iter().position(|g| g == expr) {
            return Some(BoundExpr::column(i, expr.to_string(), expr.ty, expr.span));
        }
        match &expr.kind {
            BoundExprKind::Literal(_) => Some(expr.clone()),
            BoundExprKind::Column { name, .. } => {
                let message = if self.from_distinct {
                    format!("ORDER BY column '{}' must appear in the SELECT DISTINCT list", name)
                } else {
                    format!(
                        "column '{}' must appear in GROUP BY or be used in an aggregate function",
                        name
                    )
                };
                diagnostics.error(DiagnosticCode::NonAggregatedColumn, expr.span, message);
                None
            }
            BoundExprKind::Aggregate { func, arg, distinct } => {
                let aggregate = BoundAggregate {
                    func: *func,
                    arg: arg.as_deref().cloned(),
                    distinct: *distinct,
                    ty: expr.ty,
                };
                let j = match self.aggregates.iter().position(|a| *a == aggregate) {
                    Some(j) => j,
                    None => {
                        self.aggregates.push(aggregate);
                        self.aggregates.len() - 1
                    }
                };
                Some(BoundExpr::column(
                    self.group_by.len() + j,
                    expr.to_string(),
                    expr.ty,
                    expr.span,
                ))
            }
            _ => {
                let children: Vec<Option<BoundExpr>> = expr
                    .children()
                    .into_iter()
                    .map(|c| self.rewrite(c, diagnostics))
                    .collect();
                let children: Vec<BoundExpr> = children.into_iter().collect::<Option<_>>()?;
                Some(expr.with_children(children))
            }
        }
    }

    /// Rewrites every expression, reporting all failures.
    pub fn rewrite_all(&mut self, exprs: &[BoundExpr], diagnostics: &mut DiagnosticContext) -> Option<Vec<BoundExpr>> {
        let out: Vec<Option<BoundExpr>> = exprs.iter().map(|e| self.rewrite(e, diagnostics)).collect();
        out.into_iter().collect()
    }

    pub fn finish(self) -> BoundAggregation {
        BoundAggregation {
            group_by: self.group_by,
            aggregates: self.aggregates,
        }
    }
}
