//! Statement AST definitions.

use super::expr::{Expr, Ident, SortOrder};
use crate::diagnostics::Span;

/// A parsed script: declarations followed by one query.
#[derive(Clone, Debug, PartialEq)]
pub struct Script {
    /// `TABLE`, `COUPLE`, `binary` and `text` declarations in source order.
    pub definitions: Vec<Definition>,
    /// The query.
    pub query: Query,
}

/// A declaration preceding the query.
#[derive(Clone, Debug, PartialEq)]
pub enum Definition {
    Table(TableDefinition),
    Couple(CoupleDefinition),
    Record(RecordDefinition),
}

/// `TABLE Name { Col type, ... }`: a typed row shape.
#[derive(Clone, Debug, PartialEq)]
pub struct TableDefinition {
    pub name: Ident,
    pub columns: Vec<ColumnDefinition>,
    pub span: Span,
}

/// One typed column of a `TABLE` declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDefinition {
    pub name: Ident,
    pub type_name: Ident,
}

/// `COUPLE #schema.method WITH TABLE Name AS Alias`: binds a schema method to
/// a declared row shape under a callable alias.
#[derive(Clone, Debug, PartialEq)]
pub struct CoupleDefinition {
    pub schema: Ident,
    pub method: Ident,
    pub table: Ident,
    pub alias: Ident,
    pub span: Span,
}

/// Flavor of a record layout declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Fixed byte layout.
    Binary,
    /// Line or delimiter based text layout.
    Text,
}

/// Byte order of a binary field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

/// `binary Name { ... }` or `text Name { ... }`: a record layout handed to
/// schema providers. The planner never interprets it.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordDefinition {
    pub kind: RecordKind,
    pub name: Ident,
    pub fields: Vec<FieldDefinition>,
    pub span: Span,
}

/// One field of a record layout.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefinition {
    /// Field name; keywords are allowed.
    pub name: Ident,
    /// Primitive or record type name.
    pub type_name: Ident,
    /// `[len]` length or element count.
    pub length: Option<Expr>,
    /// `le` / `be`.
    pub endianness: Option<Endianness>,
    /// `at expr` absolute offset.
    pub offset: Option<Expr>,
    /// `until 'x'` delimiter for text fields.
    pub until: Option<String>,
    /// `when expr` presence condition.
    pub condition: Option<Expr>,
}

/// A query with optional CTEs.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub ctes: Vec<Cte>,
    pub body: SetExpr,
    pub span: Span,
}

/// `name AS (query)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Cte {
    pub name: Ident,
    pub body: SetExpr,
    pub span: Span,
}

/// Set operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SetOperator {
    Union,
    UnionAll,
    Except,
    Intersect,
}

impl SetOperator {
    /// Operator text as written in queries.
    pub fn name(&self) -> &'static str {
        match self {
            SetOperator::Union => "UNION",
            SetOperator::UnionAll => "UNION ALL",
            SetOperator::Except => "EXCEPT",
            SetOperator::Intersect => "INTERSECT",
        }
    }
}

/// A select block or a left-associative chain of set operations.
#[derive(Clone, Debug, PartialEq)]
pub enum SetExpr {
    Select(Box<Select>),
    SetOperation {
        op: SetOperator,
        /// Parenthesized key columns; may be empty, which the analyzer rejects.
        keys: Vec<Ident>,
        left: Box<SetExpr>,
        right: Box<SetExpr>,
        span: Span,
    },
}

impl SetExpr {
    /// Returns the span of the whole expression.
    pub fn span(&self) -> Span {
        match self {
            SetExpr::Select(s) => s.span,
            SetExpr::SetOperation { span, .. } => *span,
        }
    }
}

/// One `SELECT ... FROM ...` block.
#[derive(Clone, Debug, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: FromItem,
    pub joins: Vec<JoinClause>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
    pub span: Span,
}

/// An item of the select list.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    /// `*`
    Wildcard(Span),
    /// `alias.*`
    QualifiedWildcard(Ident),
    /// `expr [AS alias]`
    Expr { expr: Expr, alias: Option<Ident> },
}

/// A row source in FROM, JOIN or APPLY position.
#[derive(Clone, Debug, PartialEq)]
pub struct FromItem {
    pub source: FromSource,
    pub alias: Option<Ident>,
    pub span: Span,
}

/// What a [`FromItem`] reads from.
#[derive(Clone, Debug, PartialEq)]
pub enum FromSource {
    /// `#schema.method(args)` or `schema.method(args)`.
    SchemaCall {
        schema: Ident,
        method: Ident,
        args: Vec<Expr>,
    },
    /// `Alias(args)` declared by `COUPLE`.
    Coupled { name: Ident, args: Vec<Expr> },
    /// A CTE by name.
    Reference { name: Ident },
}

/// Join kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
}

/// Apply kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApplyType {
    /// Drops left rows without right rows.
    Cross,
    /// Keeps left rows without right rows, nulling the right columns.
    Outer,
}

/// A JOIN or APPLY following the FROM item.
#[derive(Clone, Debug, PartialEq)]
pub enum JoinClause {
    Join {
        join_type: JoinType,
        item: FromItem,
        on: Expr,
    },
    Apply {
        apply_type: ApplyType,
        item: FromItem,
    },
}

/// `expr [ASC|DESC]`.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub order: SortOrder,
}
