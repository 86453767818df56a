//! Expression AST definitions.

use crate::diagnostics::Span;
use std::fmt;

/// An identifier with its position in the query text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Ident {
    /// Identifier text as written (identifiers are case-sensitive).
    pub value: String,
    /// Position in the query text.
    pub span: Span,
}

impl Ident {
    /// Creates a new identifier.
    pub fn new(value: impl Into<String>, span: Span) -> Self {
        Self {
            value: value.into(),
            span,
        }
    }

    /// Returns the identifier text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Literal values.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Decimal(f64),
    String(String),
}

impl Literal {
    /// Returns true for a numeric literal equal to zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Literal::Int32(v) => *v == 0,
            Literal::Int64(v) => *v == 0,
            Literal::Decimal(v) => *v == 0.0,
            _ => false,
        }
    }
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // String/Pattern
    Like,
    NotLike,
    Rlike,
    NotRlike,
    Contains,
}

impl BinaryOp {
    /// Returns true for `+ - * / %`.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    /// Returns true for `AND` and `OR`.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Returns true for comparison operators.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// Returns true for LIKE, RLIKE and CONTAINS in all their forms.
    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            BinaryOp::Like | BinaryOp::NotLike | BinaryOp::Rlike | BinaryOp::NotRlike | BinaryOp::Contains
        )
    }

    /// Operator text as written in queries.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Like => "like",
            BinaryOp::NotLike => "not like",
            BinaryOp::Rlike => "rlike",
            BinaryOp::NotRlike => "not rlike",
            BinaryOp::Contains => "contains",
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Sort order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Expression AST node.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    /// Expression kind.
    pub kind: ExprKind,
    /// Position in the query text.
    pub span: Span,
}

/// Expression kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    /// Literal value.
    Literal(Literal),
    /// Column reference, optionally qualified by an alias.
    Column {
        qualifier: Option<Ident>,
        name: Ident,
    },
    /// Binary operation.
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    /// Unary operation.
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// `expr [NOT] BETWEEN low AND high`.
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// `expr [NOT] IN (list)`.
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// `expr IS [NOT] NULL`.
    IsNull { expr: Box<Expr>, negated: bool },
    /// `CASE WHEN .. THEN .. [ELSE ..] END`.
    Case {
        branches: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    /// Function or aggregate call. `star` marks `Count(*)`.
    Function {
        name: Ident,
        args: Vec<Expr>,
        star: bool,
        distinct: bool,
    },
}

impl Expr {
    /// Creates a new expression node.
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Creates a binary expression spanning both operands.
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        let span = left.span.merge(right.span);
        Self::new(
            ExprKind::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            span,
        )
    }

    /// Returns the immediate child expressions.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Column { .. } => Vec::new(),
            ExprKind::Binary { left, right, .. } => vec![&**left, &**right],
            ExprKind::Unary { expr, .. } | ExprKind::IsNull { expr, .. } => vec![&**expr],
            ExprKind::Between { expr, low, high, .. } => vec![&**expr, &**low, &**high],
            ExprKind::InList { expr, list, .. } => {
                let mut out: Vec<&Expr> = vec![&**expr];
                out.extend(list.iter());
                out
            }
            ExprKind::Case { branches, else_expr } => {
                let mut out = Vec::new();
                for (when, then) in branches {
                    out.push(when);
                    out.push(then);
                }
                if let Some(e) = else_expr {
                    out.push(e);
                }
                out
            }
            ExprKind::Function { args, .. } => args.iter().collect(),
        }
    }
}
