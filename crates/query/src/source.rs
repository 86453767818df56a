//! Pluggable schema abstraction.
//!
//! A [`SchemaProvider`] maps schema names (the `os` in `#os.files()`) to
//! [`Schema`]s. A schema describes its methods at compile time and opens a
//! [`RowSource`] for each of them at run time.

use crate::context::{RuntimeContext, SchemaContext};
use crate::functions::FunctionDef;
use quarry_core::schema::TableMetadata;
use quarry_core::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// A pull-based, finite sequence of rows. Not restartable.
pub trait RowSource {
    /// Number of rows the source will produce, when known up front.
    fn total_rows(&self) -> Option<u64> {
        None
    }

    /// Returns the next row, or `None` when the source is exhausted.
    fn next_row(&mut self) -> quarry_core::Result<Option<Vec<Value>>>;
}

/// A named collection of callable table methods.
pub trait Schema: Send + Sync {
    /// Describes the rows produced by `method`. Arguments that are literals
    /// are passed as `Some`, anything computed at run time as `None`.
    fn table_metadata(
        &self,
        method: &str,
        ctx: &SchemaContext<'_>,
        args: &[Option<Value>],
    ) -> quarry_core::Result<TableMetadata>;

    /// Opens the rows produced by `method` for evaluated arguments.
    fn row_source(
        &self,
        method: &str,
        ctx: &RuntimeContext,
        args: &[Value],
    ) -> quarry_core::Result<Box<dyn RowSource>>;

    /// Scalar functions contributed by this schema.
    fn functions(&self) -> Vec<FunctionDef> {
        Vec::new()
    }
}

/// Catalog of schemas, shared by every compilation.
pub trait SchemaProvider: Send + Sync {
    fn schema(&self, name: &str) -> Option<Arc<dyn Schema>>;

    /// Names offered as suggestions when a schema is not found.
    fn schema_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A resolved schema kept by the plan.
#[derive(Clone)]
pub struct SchemaHandle {
    pub name: String,
    pub schema: Arc<dyn Schema>,
}

impl fmt::Debug for SchemaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaHandle").field("name", &self.name).finish()
    }
}

/// A row source over rows already in memory.
#[derive(Debug)]
pub struct VecRowSource {
    rows: VecDeque<Vec<Value>>,
    total: Option<u64>,
}

impl VecRowSource {
    /// A source that announces its row count up front.
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        let total = Some(rows.len() as u64);
        Self {
            rows: rows.into(),
            total,
        }
    }

    /// A source that only learns its size by being drained.
    pub fn unsized_rows(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows: rows.into(),
            total: None,
        }
    }
}

impl RowSource for VecRowSource {
    fn total_rows(&self) -> Option<u64> {
        self.total
    }

    fn next_row(&mut self) -> quarry_core::Result<Option<Vec<Value>>> {
        Ok(self.rows.pop_front())
    }
}
