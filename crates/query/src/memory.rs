//! In-memory schemas for embedding and tests.

use crate::context::{RuntimeContext, SchemaContext};
use crate::functions::FunctionDef;
use crate::source::{RowSource, Schema, SchemaProvider, VecRowSource};
use quarry_core::schema::TableMetadata;
use quarry_core::{Error, Result, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

type MethodFn = Arc<dyn Fn(&[Value]) -> Result<Vec<Vec<Value>>> + Send + Sync>;

struct Method {
    metadata: TableMetadata,
    rows: MethodFn,
    /// Whether the row source announces its total up front.
    sized: bool,
}

/// A schema whose methods return rows held in memory.
#[derive(Default)]
pub struct InMemorySchema {
    methods: BTreeMap<String, Method>,
    functions: Vec<FunctionDef>,
}

impl InMemorySchema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method taking no arguments that returns fixed rows.
    pub fn with_table(mut self, name: impl Into<String>, metadata: TableMetadata, rows: Vec<Vec<Value>>) -> Self {
        let name = name.into();
        let method = name.clone();
        self.methods.insert(
            name,
            Method {
                metadata,
                rows: Arc::new(move |args: &[Value]| {
                    if args.is_empty() {
                        Ok(rows.clone())
                    } else {
                        Err(Error::invalid_arguments(&method, format!("expected no arguments, got {}", args.len())))
                    }
                }),
                sized: true,
            },
        );
        self
    }

    /// Adds a method computing its rows from the call arguments.
    pub fn with_method<F>(mut self, name: impl Into<String>, metadata: TableMetadata, rows: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Vec<Vec<Value>>> + Send + Sync + 'static,
    {
        self.methods.insert(
            name.into(),
            Method {
                metadata,
                rows: Arc::new(rows),
                sized: true,
            },
        );
        self
    }

    /// Makes a method's row source report no total, so readers must drain it.
    pub fn unsized_method(mut self, name: &str) -> Self {
        if let Some(method) = self.methods.get_mut(name) {
            method.sized = false;
        }
        self
    }

    /// Contributes a scalar function to every query using this schema.
    pub fn with_function(mut self, function: FunctionDef) -> Self {
        self.functions.push(function);
        self
    }

    fn method(&self, name: &str) -> Result<&Method> {
        self.methods.get(name).ok_or_else(|| Error::table_not_found(name))
    }
}

impl fmt::Debug for InMemorySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySchema")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Schema for InMemorySchema {
    fn table_metadata(&self, method: &str, _ctx: &SchemaContext<'_>, _args: &[Option<Value>]) -> Result<TableMetadata> {
        self.method(method).map(|m| m.metadata.clone())
    }

    fn row_source(&self, method: &str, _ctx: &RuntimeContext, args: &[Value]) -> Result<Box<dyn RowSource>> {
        let m = self.method(method)?;
        let rows = (m.rows)(args)?;
        Ok(Box::new(if m.sized {
            VecRowSource::new(rows)
        } else {
            VecRowSource::unsized_rows(rows)
        }))
    }

    fn functions(&self) -> Vec<FunctionDef> {
        self.functions.clone()
    }
}

/// A provider over a fixed set of schemas.
#[derive(Default)]
pub struct InMemorySchemaProvider {
    schemas: BTreeMap<String, Arc<dyn Schema>>,
}

impl InMemorySchemaProvider {
    /// Creates a new empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema under `name`, replacing any previous one.
    pub fn with_schema(mut self, name: impl Into<String>, schema: impl Schema + 'static) -> Self {
        self.add_schema(name, Arc::new(schema));
        self
    }

    pub fn add_schema(&mut self, name: impl Into<String>, schema: Arc<dyn Schema>) {
        self.schemas.insert(name.into(), schema);
    }
}

impl SchemaProvider for InMemorySchemaProvider {
    fn schema(&self, name: &str) -> Option<Arc<dyn Schema>> {
        self.schemas.get(name).cloned()
    }

    fn schema_names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }
}
