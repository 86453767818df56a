//! Per-source progress reporting.
//!
//! Each source of a running query reports, in this order:
//! `Begin`, `RowsKnown(total)`, zero or more `RowsRead(n)`, `End(total)`.
//! `End` is not reported when the run is cancelled.

use crate::context::QueryId;
use std::sync::Mutex;

/// Lifecycle phase of one source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgressPhase {
    Begin,
    RowsKnown { total: u64 },
    RowsRead { read: u64 },
    End { total: u64 },
}

/// A progress report for one source of one query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub query_id: QueryId,
    /// Alias of the source in the query.
    pub source: String,
    pub phase: ProgressPhase,
}

/// Receiver of progress events. Called on the thread running the query.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn report(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// A sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct ProgressLog {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the events received so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the phases reported for one source, in order.
    pub fn phases_of(&self, source: &str) -> Vec<ProgressPhase> {
        self.events()
            .into_iter()
            .filter(|e| e.source == source)
            .map(|e| e.phase)
            .collect()
    }
}

impl ProgressSink for ProgressLog {
    fn report(&self, event: &ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_log_filters_by_source() {
        let log = ProgressLog::new();
        for (source, phase) in [
            ("a", ProgressPhase::Begin),
            ("b", ProgressPhase::Begin),
            ("a", ProgressPhase::RowsKnown { total: 0 }),
            ("a", ProgressPhase::End { total: 0 }),
        ] {
            log.report(&ProgressEvent {
                query_id: 1,
                source: source.into(),
                phase,
            });
        }
        assert_eq!(
            log.phases_of("a"),
            vec![
                ProgressPhase::Begin,
                ProgressPhase::RowsKnown { total: 0 },
                ProgressPhase::End { total: 0 },
            ]
        );
        assert_eq!(log.events().len(), 4);
    }
}
