//! AST module for queries, declarations and expressions.
//!
//! The tree is produced by the parser and is immutable afterwards. Every node
//! that can be the subject of a diagnostic carries a [`Span`](crate::diagnostics::Span).

mod expr;
mod statement;

pub use expr::{BinaryOp, Expr, ExprKind, Ident, Literal, SortOrder, UnaryOp};
pub use statement::{
    ApplyType, ColumnDefinition, CoupleDefinition, Cte, Definition, Endianness, FieldDefinition,
    FromItem, FromSource, JoinClause, JoinType, OrderByExpr, Query, RecordDefinition, RecordKind,
    Script, Select, SelectItem, SetExpr, SetOperator, TableDefinition,
};
