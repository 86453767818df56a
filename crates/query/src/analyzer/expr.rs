//! Expression binding and type checking.

use super::bound::{BoundExpr, BoundExprKind, FunctionHandle};
use super::Analyzer;
use crate::ast::{BinaryOp, Expr, ExprKind, Ident, Literal, UnaryOp};
use crate::diagnostics::suggest::did_you_mean;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Span};
use crate::functions::{AggregateFunc, ResolveError};
use crate::resolver::{ColumnLookupError, FrameId};
use quarry_core::{DataType, Value};

const AGGREGATE_NAMES: [&str; 6] = ["Count", "Sum", "Avg", "Min", "Max", "StdDev"];

/// Clause an expression is written in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Clause {
    SourceArgs,
    ApplyArgs,
    On,
    Where,
    GroupBy,
    Select,
    Having,
    OrderBy,
}

impl Clause {
    fn name(self) -> &'static str {
        match self {
            Clause::SourceArgs => "source arguments",
            Clause::ApplyArgs => "APPLY arguments",
            Clause::On => "ON",
            Clause::Where => "WHERE",
            Clause::GroupBy => "GROUP BY",
            Clause::Select => "SELECT",
            Clause::Having => "HAVING",
            Clause::OrderBy => "ORDER BY",
        }
    }

    fn allows_aggregates(self) -> bool {
        matches!(self, Clause::Select | Clause::Having | Clause::OrderBy)
    }

    /// Clauses evaluated before the projection, where SELECT aliases do not exist yet.
    fn precedes_projection(self) -> bool {
        matches!(self, Clause::Where | Clause::GroupBy | Clause::Having)
    }
}

/// Where and how an expression is bound.
#[derive(Clone, Copy)]
pub(super) struct ExprScope<'s> {
    pub frame: FrameId,
    pub clause: Clause,
    pub select_aliases: &'s [String],
    in_aggregate: bool,
}

impl<'s> ExprScope<'s> {
    pub fn new(frame: FrameId, clause: Clause, select_aliases: &'s [String]) -> Self {
        Self {
            frame,
            clause,
            select_aliases,
            in_aggregate: false,
        }
    }
}

pub(super) fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Int32(v) => Value::Int32(*v),
        Literal::Int64(v) => Value::Int64(*v),
        Literal::Decimal(v) => Value::Float64(*v),
        Literal::String(s) => Value::String(s.clone()),
    }
}

pub(super) fn type_name(ty: Option<DataType>) -> &'static str {
    ty.map_or("null", |t| t.name())
}

/// Result type of an arithmetic operator, `None` when the operands do not fit.
fn arithmetic_type(op: BinaryOp, left: Option<DataType>, right: Option<DataType>) -> Option<Option<DataType>> {
    let concat = |t: DataType| op == BinaryOp::Add && t == DataType::String;
    match (left, right) {
        (None, None) => Some(None),
        (Some(a), Some(b)) if a.is_numeric() && b.is_numeric() => Some(a.widen(b)),
        (Some(a), Some(b)) if a == b && concat(a) => Some(Some(a)),
        (Some(t), None) | (None, Some(t)) if t.is_numeric() || concat(t) => Some(Some(t)),
        _ => None,
    }
}

fn is_boolean(ty: Option<DataType>) -> bool {
    matches!(ty, None | Some(DataType::Boolean))
}

fn collect_all(items: Vec<Option<BoundExpr>>) -> Option<Vec<BoundExpr>> {
    items.into_iter().collect()
}

impl Analyzer<'_> {
    /// Binds an expression. Returns `None` once the failure has been reported.
    ///
    /// Every child is bound even after a sibling fails so that independent
    /// errors are all reported.
    pub(super) fn bind_expr(&mut self, expr: &Expr, scope: ExprScope<'_>) -> Option<BoundExpr> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Literal(literal) => Some(BoundExpr::literal(literal_value(literal), span)),
            ExprKind::Column { qualifier, name } => self.bind_column(qualifier.as_ref(), name, span, scope),
            ExprKind::Binary { left, op, right } => {
                let l = self.bind_expr(left, scope);
                let r = self.bind_expr(right, scope);
                self.bind_binary(l?, *op, r?, right, span)
            }
            ExprKind::Unary { op, expr: inner } => {
                let inner = self.bind_expr(inner, scope)?;
                let ty = match op {
                    UnaryOp::Not if is_boolean(inner.ty) => Some(DataType::Boolean),
                    UnaryOp::Neg if inner.ty.map_or(true, |t| t.is_numeric()) => inner.ty,
                    _ => {
                        let symbol = if *op == UnaryOp::Not { "not" } else { "-" };
                        self.diagnostics.error(
                            DiagnosticCode::InvalidOperandTypes,
                            span,
                            format!("operator '{}' cannot be applied to '{}'", symbol, type_name(inner.ty)),
                        );
                        return None;
                    }
                };
                Some(BoundExpr::new(
                    BoundExprKind::Unary {
                        op: *op,
                        expr: Box::new(inner),
                    },
                    ty,
                    span,
                ))
            }
            ExprKind::Between {
                expr: inner,
                low,
                high,
                negated,
            } => {
                let inner = self.bind_expr(inner, scope);
                let low = self.bind_expr(low, scope);
                let high = self.bind_expr(high, scope);
                Some(BoundExpr::new(
                    BoundExprKind::Between {
                        expr: Box::new(inner?),
                        low: Box::new(low?),
                        high: Box::new(high?),
                        negated: *negated,
                    },
                    Some(DataType::Boolean),
                    span,
                ))
            }
            ExprKind::InList {
                expr: inner,
                list,
                negated,
            } => {
                let inner = self.bind_expr(inner, scope);
                let list: Vec<Option<BoundExpr>> = list.iter().map(|e| self.bind_expr(e, scope)).collect();
                Some(BoundExpr::new(
                    BoundExprKind::InList {
                        expr: Box::new(inner?),
                        list: collect_all(list)?,
                        negated: *negated,
                    },
                    Some(DataType::Boolean),
                    span,
                ))
            }
            ExprKind::IsNull { expr: inner, negated } => {
                let inner = self.bind_expr(inner, scope)?;
                Some(BoundExpr::new(
                    BoundExprKind::IsNull {
                        expr: Box::new(inner),
                        negated: *negated,
                    },
                    Some(DataType::Boolean),
                    span,
                ))
            }
            ExprKind::Case { branches, else_expr } => self.bind_case(branches, else_expr.as_deref(), span, scope),
            ExprKind::Function {
                name,
                args,
                star,
                distinct,
            } => match AggregateFunc::from_name(name.as_str()) {
                Some(func) => self.bind_aggregate(func, args, *star, *distinct, span, scope),
                None => self.bind_function(name, args, *star || *distinct, span, scope),
            },
        }
    }

    /// Binds a condition that must evaluate to a boolean.
    pub(super) fn bind_condition(&mut self, expr: &Expr, scope: ExprScope<'_>) -> Option<BoundExpr> {
        let bound = self.bind_expr(expr, scope)?;
        if !is_boolean(bound.ty) {
            self.diagnostics.error(
                DiagnosticCode::NonBooleanCondition,
                expr.span,
                format!(
                    "{} condition must be boolean, found '{}'",
                    scope.clause.name(),
                    type_name(bound.ty)
                ),
            );
            return None;
        }
        Some(bound)
    }

    fn bind_column(
        &mut self,
        qualifier: Option<&Ident>,
        name: &Ident,
        span: Span,
        scope: ExprScope<'_>,
    ) -> Option<BoundExpr> {
        let lookup = self
            .scopes
            .resolve_column(scope.frame, qualifier.map(Ident::as_str), name.as_str());
        let diagnostic = match lookup {
            Ok(binding) => return Some(BoundExpr::column(binding.index, binding.name, binding.data_type, span)),
            Err(ColumnLookupError::UnknownAlias { aliases }) => {
                let qualifier = qualifier.unwrap_or(name);
                Diagnostic::error(
                    DiagnosticCode::UnknownAlias,
                    qualifier.span,
                    format!("unknown alias '{}'", qualifier),
                )
                .with_optional_hint(did_you_mean(qualifier.as_str(), aliases.iter().map(String::as_str)))
            }
            Err(ColumnLookupError::UnknownColumn { candidates }) => {
                let is_select_alias = qualifier.is_none()
                    && scope.clause.precedes_projection()
                    && scope.select_aliases.iter().any(|a| a == name.as_str());
                let hint = if is_select_alias {
                    Some(format!(
                        "'{}' is a SELECT alias; aliases can only be referenced in ORDER BY",
                        name
                    ))
                } else {
                    did_you_mean(name.as_str(), candidates.iter().map(String::as_str))
                };
                let message = match qualifier {
                    Some(q) => format!("source '{}' has no column '{}'", q, name),
                    None => format!("unknown column '{}'", name),
                };
                Diagnostic::error(DiagnosticCode::UnknownColumn, name.span, message).with_optional_hint(hint)
            }
            Err(ColumnLookupError::Ambiguous { aliases }) => Diagnostic::error(
                DiagnosticCode::AmbiguousColumn,
                name.span,
                format!("column '{}' is ambiguous", name),
            )
            .with_hint(format!("qualify it with one of: {}", aliases.join(", "))),
        };
        self.diagnostics.report(diagnostic);
        None
    }

    fn bind_binary(
        &mut self,
        left: BoundExpr,
        op: BinaryOp,
        right: BoundExpr,
        right_ast: &Expr,
        span: Span,
    ) -> Option<BoundExpr> {
        let ty = if op.is_arithmetic() {
            let zero_divisor = matches!(&right_ast.kind, ExprKind::Literal(l) if l.is_zero());
            if zero_divisor && matches!(op, BinaryOp::Div | BinaryOp::Mod) {
                self.diagnostics
                    .error(DiagnosticCode::DivisionByZero, right_ast.span, "division by zero");
                return None;
            }
            match arithmetic_type(op, left.ty, right.ty) {
                Some(ty) => ty,
                None => {
                    self.invalid_operands(op, left.ty, right.ty, span);
                    return None;
                }
            }
        } else if op.is_logical() {
            if !is_boolean(left.ty) || !is_boolean(right.ty) {
                self.invalid_operands(op, left.ty, right.ty, span);
                return None;
            }
            Some(DataType::Boolean)
        } else {
            Some(DataType::Boolean)
        };
        Some(BoundExpr::new(
            BoundExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            ty,
            span,
        ))
    }

    fn invalid_operands(&mut self, op: BinaryOp, left: Option<DataType>, right: Option<DataType>, span: Span) {
        self.diagnostics.error(
            DiagnosticCode::InvalidOperandTypes,
            span,
            format!(
                "operator '{}' cannot be applied to '{}' and '{}'",
                op.symbol(),
                type_name(left),
                type_name(right)
            ),
        );
    }

    fn bind_case(
        &mut self,
        branches: &[(Expr, Expr)],
        else_expr: Option<&Expr>,
        span: Span,
        scope: ExprScope<'_>,
    ) -> Option<BoundExpr> {
        let mut bound = Vec::with_capacity(branches.len());
        let mut failed = false;
        for (when, then) in branches {
            let when = self.bind_condition(when, scope);
            let then = self.bind_expr(then, scope);
            match (when, then) {
                (Some(w), Some(t)) => bound.push((w, t)),
                _ => failed = true,
            }
        }
        let else_bound = match else_expr {
            Some(e) => match self.bind_expr(e, scope) {
                Some(b) => Some(b),
                None => return None,
            },
            None => None,
        };
        if failed {
            return None;
        }

        let mut ty: Option<DataType> = None;
        let results = bound.iter().map(|(_, t)| t).chain(else_bound.iter());
        for result in results {
            match (ty, result.ty) {
                (_, None) => {}
                (None, Some(t)) => ty = Some(t),
                (Some(a), Some(b)) if a == b => {}
                (Some(a), Some(b)) => match a.widen(b) {
                    Some(w) => ty = Some(w),
                    None => {
                        self.diagnostics.error(
                            DiagnosticCode::CaseBranchTypeMismatch,
                            result.span,
                            format!("CASE branches have incompatible types '{}' and '{}'", a, b),
                        );
                        return None;
                    }
                },
            }
        }
        Some(BoundExpr::new(
            BoundExprKind::Case {
                branches: bound,
                else_expr: else_bound.map(Box::new),
            },
            ty,
            span,
        ))
    }

    fn bind_function(
        &mut self,
        name: &Ident,
        args: &[Expr],
        star_or_distinct: bool,
        span: Span,
        scope: ExprScope<'_>,
    ) -> Option<BoundExpr> {
        if star_or_distinct {
            self.diagnostics.error(
                DiagnosticCode::CannotResolveMethod,
                span,
                format!("'*' and DISTINCT are only accepted by aggregate functions, not '{}'", name),
            );
            return None;
        }
        let args: Vec<Option<BoundExpr>> = args.iter().map(|a| self.bind_expr(a, scope)).collect();
        let args = collect_all(args)?;
        let types: Vec<Option<DataType>> = args.iter().map(|a| a.ty).collect();

        let error = match self.functions.resolve(name.as_str(), &types) {
            Ok(resolved) => {
                return Some(BoundExpr::new(
                    BoundExprKind::Function {
                        function: FunctionHandle(resolved.function),
                        args,
                    },
                    resolved.return_type,
                    span,
                ))
            }
            Err(error) => error,
        };

        let call = format!(
            "{}({})",
            name,
            types.iter().map(|t| type_name(*t)).collect::<Vec<_>>().join(", ")
        );
        let diagnostic = match error {
            ResolveError::UnknownFunction => {
                let names = self.functions.names().chain(AGGREGATE_NAMES);
                Diagnostic::error(
                    DiagnosticCode::CannotResolveMethod,
                    name.span,
                    format!("cannot resolve method '{}'", call),
                )
                .with_optional_hint(did_you_mean(name.as_str(), names))
            }
            ResolveError::NoMatchingOverload { candidates } => Diagnostic::error(
                DiagnosticCode::CannotResolveMethod,
                span,
                format!("cannot resolve method '{}'", call),
            )
            .with_hint(format!("candidates: {}", candidates.join(", "))),
            ResolveError::Ambiguous { candidates } => Diagnostic::error(
                DiagnosticCode::AmbiguousMethodCall,
                span,
                format!("call '{}' matches several overloads", call),
            )
            .with_hint(format!("candidates: {}", candidates.join(", "))),
            ResolveError::AmbiguousNull { candidates } => Diagnostic::error(
                DiagnosticCode::AmbiguousMethodCall,
                span,
                format!("call '{}' matches several overloads because of a null argument", call),
            )
            .with_hint(format!("cast the null argument; candidates: {}", candidates.join(", "))),
        };
        self.diagnostics.report(diagnostic);
        None
    }

    fn bind_aggregate(
        &mut self,
        func: AggregateFunc,
        args: &[Expr],
        star: bool,
        distinct: bool,
        span: Span,
        scope: ExprScope<'_>,
    ) -> Option<BoundExpr> {
        if !scope.clause.allows_aggregates() {
            self.diagnostics.error(
                DiagnosticCode::AggregateNotAllowed,
                span,
                format!("aggregate function '{}' is not allowed in {}", func, scope.clause.name()),
            );
            return None;
        }
        if scope.in_aggregate {
            self.diagnostics.error(
                DiagnosticCode::NestedAggregate,
                span,
                format!("aggregate function '{}' cannot be nested inside another aggregate", func),
            );
            return None;
        }
        if star {
            if func != AggregateFunc::Count {
                self.diagnostics.error(
                    DiagnosticCode::CannotResolveMethod,
                    span,
                    format!("cannot resolve method '{}(*)'", func),
                );
                return None;
            }
            return Some(BoundExpr::new(
                BoundExprKind::Aggregate {
                    func,
                    arg: None,
                    distinct: false,
                },
                func.return_type(None),
                span,
            ));
        }
        let [arg] = args else {
            self.diagnostics.report(
                Diagnostic::error(
                    DiagnosticCode::CannotResolveMethod,
                    span,
                    format!("aggregate '{}' takes one argument, found {}", func, args.len()),
                )
                .with_hint(format!("use {}(expr)", func)),
            );
            return None;
        };

        let inner = ExprScope {
            in_aggregate: true,
            ..scope
        };
        let arg = self.bind_expr(arg, inner)?;
        if func.requires_numeric() && arg.ty.is_some_and(|t| !t.is_numeric()) {
            self.diagnostics.report(
                Diagnostic::error(
                    DiagnosticCode::CannotResolveMethod,
                    span,
                    format!("cannot resolve method '{}({})'", func, type_name(arg.ty)),
                )
                .with_hint(format!("{} accepts numeric arguments", func)),
            );
            return None;
        }
        let ty = func.return_type(arg.ty);
        Some(BoundExpr::new(
            BoundExprKind::Aggregate {
                func,
                arg: Some(Box::new(arg)),
                distinct,
            },
            ty,
            span,
        ))
    }
}
