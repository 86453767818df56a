//! Quarry Query - compiler, planner and executor for the Quarry query engine.
//!
//! This crate turns query text into rows:
//!
//! - `parser`: Lexer and recursive descent parser producing the `ast`
//! - `resolver`: Scope arena, alias bindings and declarations
//! - `analyzer`: Name and type resolution, aggregation legality, bound query tree
//! - `planner`: Physical plans with join algorithm selection and scan hints
//! - `executor`: Operators (scan, filter, project, join, apply, aggregate, sort, limit, set operations)
//! - `source`: The schema and row source contracts providers implement
//! - `compile`: The entry point tying the stages together
//!
//! # Example
//!
//! ```rust
//! use quarry_core::schema::{Column, TableMetadata};
//! use quarry_core::{DataType, Value};
//! use quarry_query::memory::{InMemorySchema, InMemorySchemaProvider};
//! use quarry_query::{compile, CancellationToken, CompilerOptions};
//! use std::sync::Arc;
//!
//! let cities = TableMetadata::new(
//!     "cities",
//!     vec![Column::new("Name", DataType::String), Column::new("Population", DataType::Int64)],
//! );
//! let rows = vec![
//!     vec![Value::from("Warsaw"), Value::Int64(1_800_000)],
//!     vec![Value::from("Gdansk"), Value::Int64(470_000)],
//! ];
//! let provider = InMemorySchemaProvider::new()
//!     .with_schema("geo", InMemorySchema::new().with_table("cities", cities, rows));
//!
//! let query = compile(
//!     "select c.Name from #geo.cities() c where c.Population > 1000000",
//!     1,
//!     Arc::new(provider),
//!     CompilerOptions::default(),
//! )
//! .unwrap();
//! let table = query.run(&CancellationToken::new()).unwrap();
//! assert_eq!(table.value(0, "Name"), Some(&Value::from("Warsaw")));
//! ```

pub mod analyzer;
pub mod ast;
mod compile;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod functions;
pub mod memory;
pub mod parser;
pub mod planner;
pub mod progress;
pub mod resolver;
pub mod source;
pub mod table;

pub use compile::{compile, CompiledQuery, QueryCompiler};
pub use config::CompilerOptions;
pub use context::{CancellationToken, Environment, QueryHints, QueryId, RuntimeContext, SchemaContext};
pub use diagnostics::{Diagnostic, DiagnosticCode, Diagnostics, Span};
pub use error::{ExecutionError, QueryError, Result, SyntaxError};
pub use functions::FunctionDef;
pub use progress::{ProgressEvent, ProgressLog, ProgressPhase, ProgressSink};
pub use source::{RowSource, Schema, SchemaHandle, SchemaProvider, VecRowSource};
pub use table::{OutputColumn, Table};
