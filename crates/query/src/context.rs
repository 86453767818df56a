//! Compile-time and run-time contexts handed to schema providers.

use crate::ast::RecordDefinition;
use crate::error::{ExecutionError, ExecutionResult};
use crate::progress::{ProgressEvent, ProgressPhase, ProgressSink};
use quarry_core::DataType;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identifier of one compiled query, chosen by the host.
pub type QueryId = u64;

/// Environment variables visible to providers.
pub type Environment = HashMap<String, String>;

/// Cooperative cancellation flag shared between the host and a running query.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once [`cancel`](Self::cancel) was called.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Per-block hints passed to row sources.
///
/// Hints are advisory: the engine always applies SKIP, TAKE and DISTINCT
/// itself, so a source that ignores them stays correct.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryHints {
    pub skip: Option<i64>,
    pub take: Option<i64>,
    pub is_distinct: bool,
    /// True iff the block reads exactly one source and has no ORDER BY,
    /// GROUP BY or DISTINCT.
    pub has_optimization_hints: bool,
}

impl QueryHints {
    /// Hints that promise nothing.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Context available to a schema while the query is compiled.
#[derive(Clone, Copy)]
pub struct SchemaContext<'a> {
    pub query_id: QueryId,
    pub environment: &'a Environment,
    /// `binary` / `text` record layouts declared by the script.
    pub records: &'a [RecordDefinition],
    /// Declared columns when the method is bound through `COUPLE`.
    pub declared_columns: Option<&'a [(String, DataType)]>,
}

impl<'a> SchemaContext<'a> {
    /// Looks up a record layout by name.
    pub fn record(&self, name: &str) -> Option<&'a RecordDefinition> {
        self.records.iter().find(|r| r.name.as_str() == name)
    }
}

/// Context of one running query. Sources receive a per-block view carrying
/// that block's hints; everything else is shared by the whole run.
#[derive(Clone)]
pub struct RuntimeContext {
    query_id: QueryId,
    token: CancellationToken,
    environment: Arc<Environment>,
    hints: QueryHints,
    span: tracing::Span,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl RuntimeContext {
    /// Creates a context for one run.
    pub fn new(
        query_id: QueryId,
        token: CancellationToken,
        environment: Arc<Environment>,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Self {
        Self {
            query_id,
            token,
            environment,
            hints: QueryHints::none(),
            span: tracing::info_span!("query", query_id),
            progress,
        }
    }

    /// Returns a view carrying the hints of one query block.
    pub fn with_hints(&self, hints: QueryHints) -> Self {
        Self {
            hints,
            ..self.clone()
        }
    }

    #[inline]
    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    #[inline]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[inline]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Returns the value of an environment variable.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment.get(key).map(String::as_str)
    }

    #[inline]
    pub fn hints(&self) -> QueryHints {
        self.hints
    }

    /// The query's tracing span; providers may enter it.
    #[inline]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Fails with [`ExecutionError::Cancelled`] once the token fired.
    #[inline]
    pub fn check_cancelled(&self) -> ExecutionResult<()> {
        if self.token.is_cancelled() {
            Err(ExecutionError::Cancelled(self.query_id))
        } else {
            Ok(())
        }
    }

    /// Sends a progress event for the given source alias.
    pub fn report(&self, source: &str, phase: ProgressPhase) {
        tracing::trace!(query_id = self.query_id, source, ?phase, "progress");
        if let Some(sink) = &self.progress {
            sink.report(&ProgressEvent {
                query_id: self.query_id,
                source: source.to_string(),
                phase,
            });
        }
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("query_id", &self.query_id)
            .field("cancelled", &self.token.is_cancelled())
            .field("environment", &self.environment)
            .field("hints", &self.hints)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());

        let ctx = RuntimeContext::new(9, clone, Arc::default(), None);
        assert!(matches!(ctx.check_cancelled(), Err(ExecutionError::Cancelled(9))));
    }

    #[test]
    fn test_with_hints_keeps_shared_state() {
        let mut env = Environment::new();
        env.insert("HOME".into(), "/home/q".into());
        let ctx = RuntimeContext::new(1, CancellationToken::new(), Arc::new(env), None);
        let hints = QueryHints {
            skip: Some(2),
            take: Some(3),
            is_distinct: false,
            has_optimization_hints: true,
        };
        let view = ctx.with_hints(hints);
        assert_eq!(view.hints(), hints);
        assert_eq!(ctx.hints(), QueryHints::none());
        assert_eq!(view.env("HOME"), Some("/home/q"));
        assert_eq!(view.query_id(), 1);
    }

    #[test]
    fn test_report_reaches_sink() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let events = Arc::clone(&events);
            move |event: &ProgressEvent| events.lock().unwrap().push(event.clone())
        };
        let ctx = RuntimeContext::new(4, CancellationToken::new(), Arc::default(), Some(Arc::new(sink)));
        ctx.report("e", ProgressPhase::Begin);
        ctx.report("e", ProgressPhase::RowsKnown { total: 3 });

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].query_id, 4);
        assert_eq!(events[1].source, "e");
        assert_eq!(events[1].phase, ProgressPhase::RowsKnown { total: 3 });
    }
}
