//! Task handles and task outcomes.
//!
//! Every unit of work handed to the [`Dispatcher`](super::Dispatcher) gets a
//! [`TaskHandle`] back. The handle owns a cancellation token and a completion
//! notification; it never owns the work itself, which lives on the background
//! scheduler thread.

use std::any::Any;
use std::fmt;

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Error type handler bodies may fail with.
///
/// Boxed so plugin code can use `?` on any error type.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Raised in place of a handler result when the handler body panics.
#[derive(Debug, Error)]
#[error("task panicked: {message}")]
pub struct TaskPanicked {
    message: String,
}

impl TaskPanicked {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_owned()
        };
        Self { message }
    }

    /// The panic message, when the payload was a string.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Lifecycle state of a submitted task.
///
/// A task is `Scheduled` from the moment [`Dispatcher::submit`](super::Dispatcher::submit)
/// returns until it enters exactly one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Scheduled,
    Completed,
    Cancelled,
    Failed,
}

impl TaskStatus {
    /// Returns `true` for the terminal states.
    pub fn is_settled(self) -> bool {
        !matches!(self, TaskStatus::Scheduled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How a task settled, as seen by its settle continuation.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    /// The body ran to completion and returned `Ok`.
    Completed(T),
    /// Cancellation was observed before the body produced a result.
    Cancelled,
    /// The body returned `Err` or panicked.
    Failed(HandlerError),
}

impl<T> TaskOutcome<T> {
    /// The terminal [`TaskStatus`] matching this outcome.
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Completed(_) => TaskStatus::Completed,
            TaskOutcome::Cancelled => TaskStatus::Cancelled,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
        }
    }
}

/// Handle to a task running on the background scheduler.
///
/// Cloning the handle is cheap; all clones observe the same task.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use plugbridge::runtime::{BackgroundScheduler, Dispatcher, TaskStatus};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let scheduler = Arc::new(BackgroundScheduler::default());
/// scheduler.setup()?;
///
/// let handle = Dispatcher::new(Arc::clone(&scheduler)).spawn(async {
///     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
///     Ok(())
/// })?;
/// handle.cancel();
/// assert_eq!(handle.settled().await, TaskStatus::Cancelled);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    token: CancellationToken,
    status: watch::Receiver<TaskStatus>,
}

impl TaskHandle {
    pub(crate) fn new(
        id: u64,
        token: CancellationToken,
        status: watch::Receiver<TaskStatus>,
    ) -> Self {
        Self { id, token, status }
    }

    /// Scheduler-wide id of this task.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Requests cooperative cancellation.
    ///
    /// The body observes the request at its next suspension point. Cancelling
    /// a task that has already settled does nothing.
    pub fn cancel(&self) {
        if !self.is_settled() {
            self.token.cancel();
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been requested, either
    /// directly or by scheduler shutdown.
    pub fn is_cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Current lifecycle state.
    pub fn status(&self) -> TaskStatus {
        *self.status.borrow()
    }

    pub fn is_settled(&self) -> bool {
        self.status().is_settled()
    }

    /// Waits until the task settles and returns its terminal state.
    ///
    /// The task's settle continuation (for queries: the placeholder write)
    /// has run by the time this resolves.
    pub async fn settled(&self) -> TaskStatus {
        let mut status = self.status.clone();
        // An error means the scheduler dropped the task without settling it;
        // the last published state is returned either way.
        let _ = status.wait_for(|s| s.is_settled()).await;
        let last = *status.borrow();
        last
    }
}
