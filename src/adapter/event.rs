//! Fire-and-forget dispatch for host notifications and commands.

use std::sync::Arc;

use tracing::trace;

use super::{EventHandler, HostCallback};
use crate::runtime::{BackgroundScheduler, Dispatcher, SchedulerError};

/// Origin label attached to event tasks in logs and failure reports.
pub const EVENT_ORIGIN: &str = "event";

/// Adapter that runs an async [`EventHandler`] in response to a synchronous
/// host notification, such as a content-modified callback or a command run.
///
/// Every notification runs; there is no coalescing. Results are discarded and
/// failures only reach the diagnostic channel.
pub struct EventDispatch<A> {
    dispatcher: Dispatcher,
    handler: Arc<dyn EventHandler<A>>,
}

impl<A> EventDispatch<A>
where
    A: Send + 'static,
{
    /// Wraps `handler`, submitting its work to `scheduler`.
    pub fn new<H>(scheduler: Arc<BackgroundScheduler>, handler: H) -> Self
    where
        H: EventHandler<A>,
    {
        Self {
            dispatcher: Dispatcher::new(scheduler).with_origin(EVENT_ORIGIN),
            handler: Arc::new(handler),
        }
    }

    /// Schedules the handler for `args` and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoSchedulerRunning`] if the background
    /// scheduler is stopped.
    pub fn notify(&self, args: A) -> Result<(), SchedulerError> {
        let handler = Arc::clone(&self.handler);
        let handle = self
            .dispatcher
            .spawn(async move { handler.handle(args).await })?;
        trace!(task_id = handle.id(), "event dispatched");
        Ok(())
    }
}

impl<A> HostCallback<A> for EventDispatch<A>
where
    A: Send + 'static,
{
    type Return = ();

    fn invoke(&self, args: A) -> Result<(), SchedulerError> {
        self.notify(args)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::config::SchedulerConfig;
    use crate::diagnostics::MemorySink;
    use crate::runtime::HandlerError;

    fn running(sink: Arc<MemorySink>) -> Arc<BackgroundScheduler> {
        let scheduler = Arc::new(BackgroundScheduler::with_sink(SchedulerConfig::default(), sink));
        scheduler.setup().unwrap();
        scheduler
    }

    #[test]
    fn notify_without_scheduler_fails() {
        let events = EventDispatch::new(
            Arc::new(BackgroundScheduler::default()),
            |_n: u32| async { Ok::<(), HandlerError>(()) },
        );
        assert!(matches!(
            events.notify(1),
            Err(SchedulerError::NoSchedulerRunning)
        ));
    }

    #[tokio::test]
    async fn every_notification_runs_in_order() {
        let scheduler = running(Arc::new(MemorySink::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = EventDispatch::new(Arc::clone(&scheduler), move |n: u32| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(n);
                Ok::<(), HandlerError>(())
            }
        });

        for n in 0..5 {
            events.notify(n).unwrap();
        }
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(rx.recv().await.unwrap());
        }
        assert_eq!(seen, [0, 1, 2, 3, 4]);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn failure_is_reported_and_later_events_still_run() {
        let sink = Arc::new(MemorySink::new());
        let scheduler = running(Arc::clone(&sink));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = EventDispatch::new(Arc::clone(&scheduler), move |n: u32| {
            let tx = tx.clone();
            async move {
                if n == 0 {
                    return Err::<(), HandlerError>("bad event".into());
                }
                let _ = tx.send(n);
                Ok(())
            }
        });

        events.notify(0).unwrap();
        events.invoke(7).unwrap();

        assert_eq!(rx.recv().await, Some(7));
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.reports()[0].origin, EVENT_ORIGIN);
        assert!(scheduler.is_running());
        scheduler.shutdown();
    }

    #[test]
    fn shutdown_cancels_pending_events() {
        let sink = Arc::new(MemorySink::new());
        let scheduler = running(Arc::clone(&sink));
        let events = EventDispatch::new(Arc::clone(&scheduler), |_: ()| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<(), HandlerError>(())
        });

        events.notify(()).unwrap();
        events.notify(()).unwrap();
        scheduler.shutdown();

        assert!(sink.is_empty());
        assert!(events.notify(()).is_err());
    }
}
