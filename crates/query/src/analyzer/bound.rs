//! Resolved, typed query tree handed to the planner.

use crate::ast::{ApplyType, BinaryOp, JoinType, SetOperator, SortOrder, UnaryOp};
use crate::diagnostics::Span;
use crate::functions::{AggregateFunc, FunctionDef};
use crate::source::SchemaHandle;
use crate::table::OutputColumn;
use quarry_core::{DataType, Value};
use std::fmt;
use std::sync::Arc;

/// A scalar function chosen by overload resolution. Two handles are equal
/// when they point at the same overload.
#[derive(Clone)]
pub struct FunctionHandle(pub Arc<FunctionDef>);

impl PartialEq for FunctionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}

/// A typed expression over a row whose layout is fixed by the enclosing
/// plan node. Equality is structural and ignores spans.
#[derive(Clone, Debug)]
pub struct BoundExpr {
    pub kind: BoundExprKind,
    /// `None` when the type is unknown (a null literal).
    pub ty: Option<DataType>,
    pub span: Span,
}

impl PartialEq for BoundExpr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BoundExprKind {
    Literal(Value),
    Column {
        index: usize,
        name: String,
    },
    Binary {
        left: Box<BoundExpr>,
        op: BinaryOp,
        right: Box<BoundExpr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<BoundExpr>,
    },
    Between {
        expr: Box<BoundExpr>,
        low: Box<BoundExpr>,
        high: Box<BoundExpr>,
        negated: bool,
    },
    InList {
        expr: Box<BoundExpr>,
        list: Vec<BoundExpr>,
        negated: bool,
    },
    IsNull {
        expr: Box<BoundExpr>,
        negated: bool,
    },
    Case {
        branches: Vec<(BoundExpr, BoundExpr)>,
        else_expr: Option<Box<BoundExpr>>,
    },
    Function {
        function: FunctionHandle,
        args: Vec<BoundExpr>,
    },
    /// Only present before aggregation is split out of a block.
    Aggregate {
        func: AggregateFunc,
        arg: Option<Box<BoundExpr>>,
        distinct: bool,
    },
}

impl BoundExpr {
    pub fn new(kind: BoundExprKind, ty: Option<DataType>, span: Span) -> Self {
        Self { kind, ty, span }
    }

    pub fn literal(value: Value, span: Span) -> Self {
        let ty = value.data_type();
        Self::new(BoundExprKind::Literal(value), ty, span)
    }

    pub fn column(index: usize, name: impl Into<String>, ty: Option<DataType>, span: Span) -> Self {
        Self::new(
            BoundExprKind::Column {
                index,
                name: name.into(),
            },
            ty,
            span,
        )
    }

    /// Returns the immediate children.
    pub fn children(&self) -> Vec<&BoundExpr> {
        match &self.kind {
            BoundExprKind::Literal(_) | BoundExprKind::Column { .. } => Vec::new(),
            BoundExprKind::Binary { left, right, .. } => vec![&**left, &**right],
            BoundExprKind::Unary { expr, .. } | BoundExprKind::IsNull { expr, .. } => vec![&**expr],
            BoundExprKind::Between { expr, low, high, .. } => vec![&**expr, &**low, &**high],
            BoundExprKind::InList { expr, list, .. } => {
                let mut out: Vec<&BoundExpr> = vec![&**expr];
                out.extend(list.iter());
                out
            }
            BoundExprKind::Case { branches, else_expr } => {
                let mut out = Vec::new();
                for (when, then) in branches {
                    out.push(when);
                    out.push(then);
                }
                if let Some(e) = else_expr {
                    out.push(&**e);
                }
                out
            }
            BoundExprKind::Function { args, .. } => args.iter().collect(),
            BoundExprKind::Aggregate { arg, .. } => arg.iter().map(|a| &**a).collect(),
        }
    }

    /// Returns true if an aggregate call appears anywhere in the tree.
    pub fn contains_aggregate(&self) -> bool {
        matches!(self.kind, BoundExprKind::Aggregate { .. })
            || self.children().into_iter().any(BoundExpr::contains_aggregate)
    }

    /// Returns the column indices referenced by the tree.
    pub fn referenced_columns(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut Vec<usize>) {
        if let BoundExprKind::Column { index, .. } = self.kind {
            out.push(index);
        }
        for child in self.children() {
            child.collect_columns(out);
        }
    }

    /// Returns the expression with every column index shifted by `-by`.
    pub fn shift_columns(&self, by: usize) -> BoundExpr {
        self.map_columns(&|index| index - by)
    }

    /// Rebuilds the tree, renumbering column references.
    pub fn map_columns(&self, f: &dyn Fn(usize) -> usize) -> BoundExpr {
        let map = |e: &BoundExpr| Box::new(e.map_columns(f));
        let kind = match &self.kind {
            BoundExprKind::Literal(v) => BoundExprKind::Literal(v.clone()),
            BoundExprKind::Column { index, name } => BoundExprKind::Column {
                index: f(*index),
                name: name.clone(),
            },
            BoundExprKind::Binary { left, op, right } => BoundExprKind::Binary {
                left: map(&**left),
                op: *op,
                right: map(&**right),
            },
            BoundExprKind::Unary { op, expr } => BoundExprKind::Unary {
                op: *op,
                expr: map(&**expr),
            },
            BoundExprKind::Between {
                expr,
                low,
                high,
                negated,
            } => BoundExprKind::Between {
                expr: map(&**expr),
                low: map(&**low),
                high: map(&**high),
                negated: *negated,
            },
            BoundExprKind::InList { expr, list, negated } => BoundExprKind::InList {
                expr: map(&**expr),
                list: list.iter().map(|e| e.map_columns(f)).collect(),
                negated: *negated,
            },
            BoundExprKind::IsNull { expr, negated } => BoundExprKind::IsNull {
                expr: map(&**expr),
                negated: *negated,
            },
            BoundExprKind::Case { branches, else_expr } => BoundExprKind::Case {
                branches: branches
                    .iter()
                    .map(|(w, t)| (w.map_columns(f), t.map_columns(f)))
                    .collect(),
                else_expr: else_expr.as_deref().map(map),
            },
            BoundExprKind::Function { function, args } => BoundExprKind::Function {
                function: function.clone(),
                args: args.iter().map(|e| e.map_columns(f)).collect(),
            },
            BoundExprKind::Aggregate { func, arg, distinct } => BoundExprKind::Aggregate {
                func: *func,
                arg: arg.as_deref().map(map),
                distinct: *distinct,
            },
        };
        BoundExpr::new(kind, self.ty, self.span)
    }

    /// Rebuilds the node over new children given in [`children`](Self::children) order.
    pub fn with_children(&self, children: Vec<BoundExpr>) -> BoundExpr {
        let mut it = children.into_iter();
        let mut next = || Box::new(it.next().unwrap_or_else(|| BoundExpr::literal(Value::Null, self.span)));
        let kind = match &self.kind {
            BoundExprKind::Literal(_) | BoundExprKind::Column { .. } => self.kind.clone(),
            BoundExprKind::Binary { op, .. } => {
                let left = next();
                BoundExprKind::Binary {
                    left,
                    op: *op,
                    right: next(),
                }
            }
            BoundExprKind::Unary { op, .. } => BoundExprKind::Unary { op: *op, expr: next() },
            BoundExprKind::IsNull { negated, .. } => BoundExprKind::IsNull {
                expr: next(),
                negated: *negated,
            },
            BoundExprKind::Between { negated, .. } => {
                let expr = next();
                let low = next();
                BoundExprKind::Between {
                    expr,
                    low,
                    high: next(),
                    negated: *negated,
                }
            }
            BoundExprKind::InList { list, negated, .. } => {
                let expr = next();
                BoundExprKind::InList {
                    expr,
                    list: (0..list.len()).map(|_| *next()).collect(),
                    negated: *negated,
                }
            }
            BoundExprKind::Case { branches, else_expr } => {
                let branches = (0..branches.len()).map(|_| (*next(), *next())).collect();
                BoundExprKind::Case {
                    branches,
                    else_expr: else_expr.as_ref().map(|_| next()),
                }
            }
            BoundExprKind::Function { function, args } => BoundExprKind::Function {
                function: function.clone(),
                args: (0..args.len()).map(|_| *next()).collect(),
            },
            BoundExprKind::Aggregate { func, arg, distinct } => BoundExprKind::Aggregate {
                func: *func,
                arg: arg.as_ref().map(|_| next()),
                distinct: *distinct,
            },
        };
        BoundExpr::new(kind, self.ty, self.span)
    }
}

impl fmt::Display for BoundExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BoundExprKind::Literal(Value::String(s)) => write!(f, "'{}'", s),
            BoundExprKind::Literal(v) => write!(f, "{}", v),
            BoundExprKind::Column { index, name } => write!(f, "{}#{}", name, index),
            BoundExprKind::Binary { left, op, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            BoundExprKind::Unary { op: UnaryOp::Not, expr } => write!(f, "not {}", expr),
            BoundExprKind::Unary { op: UnaryOp::Neg, expr } => write!(f, "-{}", expr),
            BoundExprKind::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { "not " } else { "" };
                write!(f, "{} {}between {} and {}", expr, not, low, high)
            }
            BoundExprKind::InList { expr, list, negated } => {
                let not = if *negated { "not " } else { "" };
                let items: Vec<String> = list.iter().map(ToString::to_string).collect();
                write!(f, "{} {}in ({})", expr, not, items.join(", "))
            }
            BoundExprKind::IsNull { expr, negated } => {
                let not = if *negated { "not " } else { "" };
                write!(f, "{} is {}null", expr, not)
            }
            BoundExprKind::Case { branches, else_expr } => {
                f.write_str("case")?;
                for (when, then) in branches {
                    write!(f, " when {} then {}", when, then)?;
                }
                if let Some(e) = else_expr {
                    write!(f, " else {}", e)?;
                }
                f.write_str(" end")
            }
            BoundExprKind::Function { function, args } => {
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "{}({})", function.0.name(), args.join(", "))
            }
            BoundExprKind::Aggregate { func, arg, distinct } => {
                let distinct = if *distinct { "distinct " } else { "" };
                match arg {
                    Some(arg) => write!(f, "{}({}{})", func, distinct, arg),
                    None => write!(f, "{}(*)", func),
                }
            }
        }
    }
}

/// An aggregate computed by an aggregation step.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundAggregate {
    pub func: AggregateFunc,
    /// `None` for `Count(*)`.
    pub arg: Option<BoundExpr>,
    pub distinct: bool,
    pub ty: Option<DataType>,
}

/// Grouping of a block. Its output row is the group keys followed by the
/// aggregates.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundAggregation {
    pub group_by: Vec<BoundExpr>,
    pub aggregates: Vec<BoundAggregate>,
}

/// Where a bound source reads from.
#[derive(Clone, Debug)]
pub enum BoundSourceKind {
    /// A schema method, called directly or through `COUPLE`.
    Schema {
        schema: SchemaHandle,
        method: String,
        args: Vec<BoundExpr>,
        /// Provider column positions feeding the declared columns of a
        /// coupled source, in declared order.
        projection: Option<Vec<usize>>,
        /// Column count announced by the provider.
        provider_width: usize,
    },
    /// A materialized CTE.
    Cte { name: String },
}

/// A row source of a block.
#[derive(Clone, Debug)]
pub struct BoundSource {
    pub alias: String,
    pub kind: BoundSourceKind,
    pub columns: Vec<OutputColumn>,
    /// Position of the first column in the combined row.
    pub offset: usize,
}

/// How a source joins the sources before it.
#[derive(Clone, Debug)]
pub enum BoundJoinKind {
    Join { join_type: JoinType, on: BoundExpr },
    Apply { apply_type: ApplyType },
}

#[derive(Clone, Debug)]
pub struct BoundJoin {
    pub kind: BoundJoinKind,
    pub source: BoundSource,
}

/// One resolved query block.
///
/// Expressions in `filter` and in `aggregation` are over the combined row
/// of all sources. `having`, `order_by` and `projection` are over the
/// aggregation output when the block is grouped, over the combined row
/// otherwise.
#[derive(Clone, Debug)]
pub struct BoundSelect {
    pub from: BoundSource,
    pub joins: Vec<BoundJoin>,
    pub filter: Option<BoundExpr>,
    pub aggregation: Option<BoundAggregation>,
    pub having: Option<BoundExpr>,
    pub order_by: Vec<(BoundExpr, SortOrder)>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
    pub projection: Vec<BoundExpr>,
    /// `SELECT DISTINCT` as written.
    pub distinct: bool,
    /// De-duplicate projected rows; set when DISTINCT meets an explicit GROUP BY.
    pub distinct_after_projection: bool,
    /// An explicit GROUP BY clause was written.
    pub has_group_by: bool,
    pub columns: Vec<OutputColumn>,
}

/// A select block or a set operation over two of them.
#[derive(Clone, Debug)]
pub enum BoundSetExpr {
    Select(Box<BoundSelect>),
    SetOperation {
        op: SetOperator,
        keys: Vec<String>,
        left: Box<BoundSetExpr>,
        right: Box<BoundSetExpr>,
        columns: Vec<OutputColumn>,
    },
}

impl BoundSetExpr {
    pub fn columns(&self) -> &[OutputColumn] {
        match self {
            BoundSetExpr::Select(s) => &s.columns,
            BoundSetExpr::SetOperation { columns, .. } => columns,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BoundCte {
    pub name: String,
    pub body: BoundSetExpr,
}

/// A fully analyzed query.
#[derive(Clone, Debug)]
pub struct BoundQuery {
    /// CTEs in declaration order.
    pub ctes: Vec<BoundCte>,
    pub body: BoundSetExpr,
}

impl BoundQuery {
    pub fn columns(&self) -> &[OutputColumn] {
        self.body.columns()
    }
}
