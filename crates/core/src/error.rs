//! Error types shared by the engine and schema providers.

use crate::types::DataType;
use thiserror::Error;

/// Result type alias for core and provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by schema providers and metadata construction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Type mismatch error.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: DataType, got: DataType },
    /// Invalid schema or table definition.
    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
    /// Column not found.
    #[error("column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },
    /// Table not found.
    #[error("table not found: {name}")]
    TableNotFound { name: String },
    /// A table was called with arguments it cannot accept.
    #[error("invalid arguments for {table}: {message}")]
    InvalidArguments { table: String, message: String },
    /// The data source failed while producing rows.
    #[error("data source failure: {message}")]
    SourceFailure { message: String },
    /// Invalid operation.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },
}

impl Error {
    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: DataType, got: DataType) -> Self {
        Error::TypeMismatch { expected, got }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates an invalid arguments error.
    pub fn invalid_arguments(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidArguments {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a source failure error.
    pub fn source_failure(message: impl Into<String>) -> Self {
        Error::SourceFailure {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }
}
