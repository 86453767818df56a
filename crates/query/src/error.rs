//! Error types for compilation and execution.
//!
//! Errors come in three layers that are never merged:
//!
//! - [`QueryError::Validation`] wraps the single [`SyntaxError`] raised by the
//!   parser; the syntax error is exposed as the wrapper's `source()`.
//! - [`QueryError::Semantic`] carries every diagnostic produced by name
//!   resolution and analysis.
//! - [`QueryError::Execution`] carries failures only detectable with data.

use crate::context::QueryId;
use crate::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, Span};
use thiserror::Error;

/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Result type for plan execution.
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// A syntax error with its originating diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{diagnostic}")]
pub struct SyntaxError {
    diagnostic: Diagnostic,
}

impl SyntaxError {
    /// Creates a syntax error.
    pub fn new(code: DiagnosticCode, span: Span, message: impl Into<String>) -> Self {
        Self {
            diagnostic: Diagnostic::error(code, span, message),
        }
    }

    /// Attaches a hint to the underlying diagnostic.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.diagnostic.hint = Some(hint.into());
        self
    }

    /// Returns the underlying diagnostic.
    pub fn diagnostic(&self) -> &Diagnostic {
        &self.diagnostic
    }

    /// Returns the diagnostic code.
    pub fn code(&self) -> DiagnosticCode {
        self.diagnostic.code
    }

    /// Returns the offending span.
    pub fn span(&self) -> Span {
        self.diagnostic.span
    }
}

/// Error type for plan execution.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The cancellation token fired.
    #[error("query {0} was cancelled")]
    Cancelled(QueryId),
    /// A regular expression supplied to RLIKE failed to compile.
    #[error("invalid regular expression '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    /// A set operation key names no column of a branch.
    #[error("key column '{key}' not found in {side} branch of {operator}")]
    KeyColumnNotFound {
        key: String,
        side: &'static str,
        operator: &'static str,
    },
    /// A schema provider failed.
    #[error("source '{alias}' failed: {source}")]
    Source {
        alias: String,
        #[source]
        source: quarry_core::Error,
    },
    /// A source produced a row that does not match its metadata.
    #[error("source '{alias}' produced a row with {actual} values, expected {expected}")]
    RowShape {
        alias: String,
        expected: usize,
        actual: usize,
    },
    /// A CTE was read before it was materialized.
    #[error("common table expression '{0}' is not materialized")]
    MissingCte(String),
    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl ExecutionError {
    /// Creates a source error.
    pub fn provider(alias: impl Into<String>, source: quarry_core::Error) -> Self {
        ExecutionError::Source {
            alias: alias.into(),
            source,
        }
    }
}

/// Top-level error returned by compilation and execution.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The query text is not well formed.
    #[error("query validation failed: {0}")]
    Validation(#[source] SyntaxError),
    /// The query is well formed but semantically invalid.
    #[error("query compilation failed: {0}")]
    Semantic(Diagnostics),
    /// The query failed while running.
    #[error("query execution failed: {0}")]
    Execution(#[from] ExecutionError),
}

impl QueryError {
    /// Returns every compile-time diagnostic carried by this error.
    pub fn diagnostics(&self) -> Vec<&Diagnostic> {
        match self {
            QueryError::Validation(e) => vec![e.diagnostic()],
            QueryError::Semantic(d) => d.as_slice().iter().collect(),
            QueryError::Execution(_) => Vec::new(),
        }
    }

    /// Returns true if a diagnostic with the given code is carried.
    pub fn has_code(&self, code: DiagnosticCode) -> bool {
        self.diagnostics().iter().any(|d| d.code == code)
    }

    /// Returns the syntax error cause, if this is a validation error.
    pub fn syntax_error(&self) -> Option<&SyntaxError> {
        match self {
            QueryError::Validation(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true when execution stopped because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryError::Execution(ExecutionError::Cancelled(_)))
    }
}

impl From<SyntaxError> for QueryError {
    fn from(e: SyntaxError) -> Self {
        QueryError::Validation(e)
    }
}

impl From<Diagnostics> for QueryError {
    fn from(d: Diagnostics) -> Self {
        QueryError::Semantic(d)
    }
}
