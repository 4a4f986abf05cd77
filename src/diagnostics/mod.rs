//! Diagnostic channel — where task failures on the background thread are reported.
//!
//! Nothing on the background scheduler can hand an error back to the host
//! thread, so failures are written to a [`DiagnosticSink`] instead. The sink is
//! write-only: the bridge never reads back what it reported.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A single failure report produced at a task boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Which adapter (or plain dispatcher submission) the task came from.
    pub origin: &'static str,
    /// Scheduler-wide task id.
    pub task_id: u64,
    /// Formatted error, including its `source()` chain.
    pub message: String,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} task {}] {}", self.origin, self.task_id, self.message)
    }
}

/// An append-only sink for failure reports.
///
/// Implementations must be cheap and non-blocking: `report` is called on the
/// background scheduler thread.
pub trait DiagnosticSink: Send + Sync {
    /// Record one failure report.
    fn report(&self, report: Report);
}

/// Shared, type-erased diagnostic sink.
pub type SharedSink = Arc<dyn DiagnosticSink>;

/// Default sink: emits every report as a `tracing::error!` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, report: Report) {
        tracing::error!(
            origin = report.origin,
            task_id = report.task_id,
            "task failed: {}",
            report.message
        );
    }
}

/// Sink that keeps every report in memory.
///
/// Useful for hosts that surface plugin failures in their own UI, and for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Report>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every report received so far, oldest first.
    pub fn reports(&self) -> Vec<Report> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Report>> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, report: Report) {
        self.lock().push(report);
    }
}

/// Formats an error together with every error in its `source()` chain.
pub fn format_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
