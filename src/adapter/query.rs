//! Completion queries with last-request-wins coalescing.
//!
//! The host asks for completions on every keystroke and expects an answer
//! immediately. [`QueryDispatch::query`] returns an unresolved
//! [`CompletionList`] at once, cancels whatever query is still outstanding for
//! the same view, and runs the handler on the background scheduler. Only the
//! newest query for a view can ever fill its list with items; superseded
//! queries resolve to an empty list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use super::{HostCallback, QueryHandler};
use crate::host::{CompletionFlags, CompletionItem, CompletionList, QueryRequest, ViewId};
use crate::runtime::{BackgroundScheduler, Dispatcher, SchedulerError, TaskHandle, TaskOutcome};

/// Origin label attached to query tasks in logs and failure reports.
pub const QUERY_ORIGIN: &str = "query";

// Newest unsettled query of one view.
struct Slot {
    seq: u64,
    handle: TaskHandle,
}

// Views with an unsettled query. A view's slot is dropped when its newest
// query settles, so the map only ever holds live work.
#[derive(Default)]
struct Registry {
    next_seq: u64,
    slots: HashMap<ViewId, Slot>,
}

impl Registry {
    // Forgets `view` if `seq` is still its newest query. Returns whether it was.
    fn release(&mut self, view: ViewId, seq: u64) -> bool {
        if self.slots.get(&view).is_some_and(|slot| slot.seq == seq) {
            self.slots.remove(&view);
            true
        } else {
            false
        }
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Adapter that turns an async [`QueryHandler`] into the host's synchronous
/// completion callback.
///
/// Queries are coalesced per `(adapter, view)` pair: two views never cancel
/// each other, and two `QueryDispatch` instances never cancel each other.
/// A view is tracked only while it has a query in flight, so views the host
/// has closed cost nothing once their last query settles.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use plugbridge::adapter::QueryDispatch;
/// use plugbridge::host::{QueryRequest, ViewId};
/// use plugbridge::runtime::{BackgroundScheduler, HandlerError};
///
/// let scheduler = Arc::new(BackgroundScheduler::default());
/// scheduler.setup().unwrap();
///
/// let completions = QueryDispatch::new(Arc::clone(&scheduler), |_req: QueryRequest| async {
///     Ok::<_, HandlerError>(vec!["foo", "bar"])
/// });
///
/// // Returns at once; the list fills in later on the background thread.
/// let list = completions.query(QueryRequest::new(ViewId(1), "fo", vec![2])).unwrap();
/// # let _ = list;
/// ```
pub struct QueryDispatch {
    dispatcher: Dispatcher,
    handler: Arc<dyn QueryHandler>,
    registry: Arc<Mutex<Registry>>,
}

impl QueryDispatch {
    /// Wraps `handler`, submitting its work to `scheduler`.
    pub fn new<H>(scheduler: Arc<BackgroundScheduler>, handler: H) -> Self
    where
        H: QueryHandler,
    {
        Self {
            dispatcher: Dispatcher::new(scheduler).with_origin(QUERY_ORIGIN),
            handler: Arc::new(handler),
            registry: Arc::default(),
        }
    }

    /// Issues a completion query and returns its placeholder immediately.
    ///
    /// Any query still outstanding for `request.view` is cancelled first; its
    /// placeholder resolves to an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoSchedulerRunning`] if the background
    /// scheduler is stopped. No placeholder is produced in that case.
    pub fn query(&self, request: QueryRequest) -> Result<CompletionList, SchedulerError> {
        let view = request.view;

        // Cancel-then-replace must be atomic per view, or two concurrent
        // host calls could each miss the other's task. Holding the lock until
        // the new slot is stored also keeps its settle from running first.
        let mut registry = lock(&self.registry);
        registry.next_seq += 1;
        let seq = registry.next_seq;

        if let Some(previous) = registry.slots.remove(&view) {
            if !previous.handle.is_settled() {
                debug!(
                    %view,
                    seq,
                    superseded = previous.handle.id(),
                    "cancelling superseded query"
                );
            }
            previous.handle.cancel();
        }

        let list = CompletionList::new();
        let placeholder = list.clone();
        let handler = Arc::clone(&self.handler);
        let tracked = Arc::downgrade(&self.registry);
        let handle = self.dispatcher.submit(
            async move { handler.query(request).await },
            move |outcome| settle(outcome, &placeholder, &tracked, view, seq),
        )?;

        debug!(%view, seq, task_id = handle.id(), "new query");
        registry.slots.insert(view, Slot { seq, handle });
        Ok(list)
    }

    /// Cancels the outstanding query for `view`, if any, and forgets the view.
    ///
    /// The view would be forgotten anyway once its query settles; this only
    /// stops the work early, e.g. when the host closes the view.
    pub fn cancel_view(&self, view: ViewId) {
        let removed = lock(&self.registry).slots.remove(&view);
        if let Some(slot) = removed {
            debug!(%view, task_id = slot.handle.id(), "view closed; cancelling query");
            slot.handle.cancel();
        }
    }

    /// Number of views whose newest query has not resolved its placeholder yet.
    ///
    /// A view stops counting before its placeholder is written, so this is
    /// already zero when the host observes the last list as resolved.
    pub fn in_flight(&self) -> usize {
        lock(&self.registry).slots.len()
    }
}

impl HostCallback<QueryRequest> for QueryDispatch {
    type Return = CompletionList;

    fn invoke(&self, args: QueryRequest) -> Result<CompletionList, SchedulerError> {
        self.query(args)
    }
}

/// Applies a settled query to its placeholder. Runs on the background thread.
///
/// The registry lock is held while the placeholder is written. A newer query
/// for the same view either landed before, in which case this result is stale
/// and dropped, or lands after and finds this query already finished.
fn settle(
    outcome: TaskOutcome<Vec<CompletionItem>>,
    list: &CompletionList,
    registry: &Weak<Mutex<Registry>>,
    view: ViewId,
    seq: u64,
) {
    let registry = registry.upgrade();
    let mut guard = registry.as_deref().map(lock);
    // With the adapter gone no newer query can exist.
    let newest = guard.as_mut().is_none_or(|tracked| tracked.release(view, seq));

    match outcome {
        TaskOutcome::Completed(_) if !newest => {
            debug!(%view, seq, "query superseded after completing");
            list.resolve_empty();
        }
        TaskOutcome::Completed(items) if !items.is_empty() => {
            debug!(%view, seq, count = items.len(), "query completed");
            list.resolve(items, CompletionFlags::SuppressDefaultFiltering);
        }
        TaskOutcome::Completed(_) => {
            debug!(%view, seq, "query completed (empty)");
            list.resolve_empty();
        }
        TaskOutcome::Cancelled => {
            debug!(%view, seq, "query cancelled");
            list.resolve_empty();
        }
        // Already reported to the diagnostic channel by the dispatcher.
        TaskOutcome::Failed(_) => {
            list.resolve_empty();
        }
    }
}
