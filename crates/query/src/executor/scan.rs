//! Schema method scans.

use crate::context::{QueryHints, RuntimeContext};
use crate::error::{ExecutionError, ExecutionResult};
use crate::executor::Relation;
use crate::progress::ProgressPhase;
use crate::source::{RowSource, SchemaHandle};
use quarry_core::Value;

/// Scan executor - pulls every row of a schema method and reports its
/// progress under the source alias.
pub struct ScanExecutor<'a> {
    alias: &'a str,
    schema: &'a SchemaHandle,
    method: &'a str,
    provider_width: usize,
    projection: Option<&'a [usize]>,
    hints: QueryHints,
    progress_interval: u64,
}

impl<'a> ScanExecutor<'a> {
    /// Creates a scan over rows of `provider_width` values.
    pub fn new(alias: &'a str, schema: &'a SchemaHandle, method: &'a str, provider_width: usize) -> Self {
        Self {
            alias,
            schema,
            method,
            provider_width,
            projection: None,
            hints: QueryHints::none(),
            progress_interval: 1000,
        }
    }

    /// Keeps only the given provider columns, in that order.
    pub fn with_projection(mut self, projection: Option<&'a [usize]>) -> Self {
        self.projection = projection;
        self
    }

    /// Hints handed to the provider through the runtime context.
    pub fn with_hints(mut self, hints: QueryHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Number of values of every output row.
    pub fn output_width(&self) -> usize {
        self.projection.map_or(self.provider_width, <[usize]>::len)
    }

    /// Executes the scan with evaluated method arguments.
    pub fn execute(&self, ctx: &RuntimeContext, args: &[Value]) -> ExecutionResult<Relation> {
        let _entered = ctx.span().enter();
        ctx.check_cancelled()?;

        let scoped = ctx.with_hints(self.hints);
        let mut source = self
            .schema
            .schema
            .row_source(self.method, &scoped, args)
            .map_err(|e| self.provider_error(e))?;

        ctx.report(self.alias, ProgressPhase::Begin);
        let mut rows = Vec::new();
        match source.total_rows() {
            Some(total) => {
                ctx.report(self.alias, ProgressPhase::RowsKnown { total });
                while let Some(row) = self.pull(source.as_mut(), ctx)? {
                    rows.push(row);
                    self.tick(ctx, rows.len() as u64);
                }
            }
            None => {
                while let Some(row) = self.pull(source.as_mut(), ctx)? {
                    rows.push(row);
                }
                ctx.report(self.alias, ProgressPhase::RowsKnown { total: rows.len() as u64 });
                for read in 1..=rows.len() as u64 {
                    self.tick(ctx, read);
                }
            }
        }

        let read = rows.len() as u64;
        if read % self.progress_interval != 0 {
            ctx.report(self.alias, ProgressPhase::RowsRead { read });
        }
        ctx.report(self.alias, ProgressPhase::End { total: read });
        tracing::debug!(query_id = ctx.query_id(), alias = self.alias, rows = read, "scan finished");

        Ok(Relation::from_rows(rows, self.alias, self.output_width()))
    }

    fn pull(&self, source: &mut dyn RowSource, ctx: &RuntimeContext) -> ExecutionResult<Option<Vec<Value>>> {
        ctx.check_cancelled()?;
        let row = match source.next_row().map_err(|e| self.provider_error(e))? {
            Some(row) => row,
            None => return Ok(None),
        };
        if row.len() != self.provider_width {
            return Err(ExecutionError::RowShape {
                alias: self.alias.to_string(),
                expected: self.provider_width,
                actual: row.len(),
            });
        }
        Ok(Some(match self.projection {
            Some(indices) => indices.iter().map(|&i| row[i].clone()).collect(),
            None => row,
        }))
    }

    fn tick(&self, ctx: &RuntimeContext, read: u64) {
        if read % self.progress_interval == 0 {
            ctx.report(self.alias, ProgressPhase::RowsRead { read });
        }
    }

    fn provider_error(&self, e: quarry_core::Error) -> ExecutionError {
        tracing::warn!(alias = self.alias, method = self.method, error = %e, "row source failed");
        ExecutionError::provider(self.alias, e)
    }
}
