//! Thread-safe submission of work to the background scheduler.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::task::{HandlerError, TaskHandle, TaskOutcome, TaskPanicked, TaskStatus};
use super::{BackgroundScheduler, SchedulerError};
use crate::diagnostics::{Report, SharedSink, format_chain};

/// Origin label used for plain dispatcher submissions.
pub const DEFAULT_ORIGIN: &str = "task";

/// Hands futures to the [`BackgroundScheduler`] from any thread.
///
/// Cheap to clone. The `origin` label is attached to every log record and
/// failure report for tasks submitted through this dispatcher.
#[derive(Clone)]
pub struct Dispatcher {
    scheduler: Arc<BackgroundScheduler>,
    origin: &'static str,
}

impl Dispatcher {
    /// Creates a dispatcher for `scheduler`.
    pub fn new(scheduler: Arc<BackgroundScheduler>) -> Self {
        Self {
            scheduler,
            origin: DEFAULT_ORIGIN,
        }
    }

    /// Sets the origin label used in logs and failure reports.
    #[must_use]
    pub fn with_origin(mut self, origin: &'static str) -> Self {
        self.origin = origin;
        self
    }

    /// The scheduler this dispatcher submits to.
    pub fn scheduler(&self) -> &Arc<BackgroundScheduler> {
        &self.scheduler
    }

    /// Submits `future` and returns immediately.
    ///
    /// The future runs on the background thread, never on the caller's.
    /// `on_settle` runs on the background thread exactly once, with the
    /// task's outcome, before the handle reports the task as settled.
    /// Failures (an `Err` result or a panic) are reported to the diagnostic
    /// channel; cancellations are not.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoSchedulerRunning`] if the scheduler is
    /// stopped. Neither `future` nor `on_settle` is run in that case.
    pub fn submit<T, F, S>(&self, future: F, on_settle: S) -> Result<TaskHandle, SchedulerError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, HandlerError>> + Send + 'static,
        S: FnOnce(TaskOutcome<T>) + Send + 'static,
    {
        let id = self.scheduler.next_task_id();
        let origin = self.origin;
        let sink = Arc::clone(self.scheduler.sink());
        let (status_tx, status_rx) = watch::channel(TaskStatus::Scheduled);

        let token = self.scheduler.spawn_with(move |token| {
            run_task(id, origin, token, future, on_settle, status_tx, sink)
        })?;

        trace!(task_id = id, origin, "task submitted");
        Ok(TaskHandle::new(id, token, status_rx))
    }

    /// Submits `future` without a settle continuation.
    ///
    /// Use this to start async work from synchronous code when nothing needs
    /// to observe the result beyond the returned handle.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoSchedulerRunning`] if the scheduler is stopped.
    pub fn spawn<T, F>(&self, future: F) -> Result<TaskHandle, SchedulerError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, HandlerError>> + Send + 'static,
    {
        self.submit(future, |_| {})
    }
}

/// Drives one submitted task on the background thread.
///
/// The body runs as its own Tokio task so that a panic is caught at the
/// task boundary and an abort takes effect at the body's next `.await`.
/// Cancellation wins over a result that has not been handed to `on_settle`
/// yet. A cancel that arrives once `on_settle` is running has no effect.
async fn run_task<T, F, S>(
    id: u64,
    origin: &'static str,
    token: CancellationToken,
    future: F,
    on_settle: S,
    status: watch::Sender<TaskStatus>,
    sink: SharedSink,
) where
    T: Send + 'static,
    F: Future<Output = Result<T, HandlerError>> + Send + 'static,
    S: FnOnce(TaskOutcome<T>),
{
    let mut body = tokio::spawn(future);

    let joined = tokio::select! {
        biased;
        () = token.cancelled() => None,
        joined = &mut body => Some(joined),
    };

    let outcome = match joined {
        None => {
            body.abort();
            // Wait for the body to be dropped so nothing of it outlives settlement.
            let _ = body.await;
            TaskOutcome::Cancelled
        }
        // Cancelled between the body finishing and now; the value is stale.
        Some(Ok(Ok(_))) if token.is_cancelled() => TaskOutcome::Cancelled,
        Some(Ok(Ok(value))) => TaskOutcome::Completed(value),
        Some(Ok(Err(error))) => TaskOutcome::Failed(error),
        Some(Err(join_error)) if join_error.is_panic() => {
            TaskOutcome::Failed(Box::new(TaskPanicked::from_payload(join_error.into_panic())))
        }
        Some(Err(_)) => TaskOutcome::Cancelled,
    };

    let settled = outcome.status();
    match &outcome {
        TaskOutcome::Completed(_) => debug!(task_id = id, origin, "task completed"),
        TaskOutcome::Cancelled => debug!(task_id = id, origin, "task cancelled"),
        TaskOutcome::Failed(error) => sink.report(Report {
            origin,
            task_id: id,
            message: format_chain(error.as_ref()),
        }),
    }

    on_settle(outcome);
    status.send_replace(settled);
}
