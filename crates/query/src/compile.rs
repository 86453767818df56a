//! Compilation entry point.
//!
//! [`compile`] takes query text through parsing, analysis and planning and
//! returns a [`CompiledQuery`] that can be run any number of times. Every
//! run gets its own [`RuntimeContext`], so a compiled query can move between
//! threads.

use crate::analyzer::analyze;
use crate::config::CompilerOptions;
use crate::context::{CancellationToken, Environment, QueryHints, QueryId, RuntimeContext};
use crate::error::Result;
use crate::executor::PlanRunner;
use crate::parser::parse;
use crate::planner::{PhysicalPlan, QueryPlan, QueryPlanner};
use crate::progress::ProgressSink;
use crate::source::SchemaProvider;
use crate::table::{OutputColumn, Table};
use std::fmt;
use std::sync::Arc;

/// Compiles `text` with default environment and no progress sink.
pub fn compile(
    text: &str,
    query_id: QueryId,
    provider: Arc<dyn SchemaProvider>,
    options: CompilerOptions,
) -> Result<CompiledQuery> {
    QueryCompiler::new(provider).options(options).compile(text, query_id)
}

/// Builder for compilations sharing a provider, options, environment
/// variables and a progress sink.
#[derive(Clone)]
pub struct QueryCompiler {
    provider: Arc<dyn SchemaProvider>,
    options: CompilerOptions,
    environment: Environment,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl QueryCompiler {
    pub fn new(provider: Arc<dyn SchemaProvider>) -> Self {
        Self {
            provider,
            options: CompilerOptions::default(),
            environment: Environment::new(),
            progress: None,
        }
    }

    pub fn options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    /// Adds one environment variable visible to schemas.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Replaces all environment variables.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Receives the progress of every source of every run.
    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn compile(&self, text: &str, query_id: QueryId) -> Result<CompiledQuery> {
        let span = tracing::debug_span!("compile", query_id);
        let _entered = span.enter();

        let script = parse(text)?;
        tracing::debug!(query_id, definitions = script.definitions.len(), "parsed");

        let query = analyze(
            &script,
            text,
            query_id,
            self.provider.as_ref(),
            &self.environment,
            &self.options,
        )?;
        tracing::debug!(query_id, ctes = query.ctes.len(), columns = query.columns().len(), "analyzed");

        let plan = QueryPlanner::new(self.options).plan(&query);
        tracing::debug!(query_id, plan = %plan, "planned");

        Ok(CompiledQuery {
            query_id,
            plan,
            options: self.options,
            environment: Arc::new(self.environment.clone()),
            progress: self.progress.clone(),
        })
    }
}

impl fmt::Debug for QueryCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCompiler")
            .field("options", &self.options)
            .field("environment", &self.environment)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// A planned query. Holds the schemas it reads from.
#[derive(Clone)]
pub struct CompiledQuery {
    query_id: QueryId,
    plan: QueryPlan,
    options: CompilerOptions,
    environment: Arc<Environment>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl CompiledQuery {
    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    /// Output columns of the query.
    pub fn columns(&self) -> &[OutputColumn] {
        &self.plan.columns
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Renders the physical plan as an indented tree.
    pub fn explain(&self) -> String {
        self.plan.explain()
    }

    /// Hints handed to each schema scan, by alias, in plan order.
    pub fn hints(&self) -> Vec<(String, QueryHints)> {
        self.plan
            .scans()
            .into_iter()
            .filter_map(|node| match node {
                PhysicalPlan::Scan { alias, hints, .. } => Some((alias.clone(), *hints)),
                _ => None,
            })
            .collect()
    }

    /// Executes the query. Cancelling `token` stops the run at the next
    /// source row or operator boundary.
    pub fn run(&self, token: &CancellationToken) -> Result<Table> {
        let ctx = RuntimeContext::new(
            self.query_id,
            token.clone(),
            Arc::clone(&self.environment),
            self.progress.clone(),
        );
        let _entered = ctx.span().enter();
        tracing::debug!(query_id = self.query_id, "run started");

        let table = PlanRunner::new(&ctx, self.options).run(&self.plan)?;
        tracing::debug!(query_id = self.query_id, rows = table.len(), "run finished");
        Ok(table)
    }
}

impl fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("query_id", &self.query_id)
            .field("columns", &self.plan.columns)
            .field("options", &self.options)
            .finish()
    }
}
