//! Background scheduler — one dedicated thread driving one Tokio current-thread runtime.
//!
//! The host calls plugin callbacks on its own threads and expects them to
//! return immediately. All async plugin work therefore runs on a single
//! background thread owned by [`BackgroundScheduler`]; work reaches it through
//! the thread-safe [`Dispatcher`].
//!
//! Tasks on the background thread interleave only at `.await` points. A
//! handler that never yields blocks every other task, and [`shutdown`] waits
//! for it indefinitely.
//!
//! [`shutdown`]: BackgroundScheduler::shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::diagnostics::{SharedSink, TracingSink};

pub mod dispatcher;
pub mod task;

pub use dispatcher::Dispatcher;
pub use task::{HandlerError, TaskHandle, TaskOutcome, TaskPanicked, TaskStatus};

/// Errors produced by the background scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no background scheduler is running")]
    NoSchedulerRunning,

    #[error("failed to start background scheduler: {0}")]
    Startup(#[source] std::io::Error),

    #[error("background scheduler thread exited during startup")]
    ThreadExited,
}

// Everything that exists only while the scheduler is running.
struct Running {
    handle: Handle,
    // Parent of every task's cancellation token.
    tasks: CancellationToken,
    // Tells the run loop to stop accepting work and drain.
    stop: CancellationToken,
    tracker: TaskTracker,
    thread: JoinHandle<()>,
}

/// The process-wide background scheduler.
///
/// Construct it once at plugin load, share it by [`Arc`], and drive its
/// lifecycle with [`setup`](Self::setup) and [`shutdown`](Self::shutdown).
/// Both are idempotent.
///
/// # Examples
///
/// ```
/// use plugbridge::runtime::BackgroundScheduler;
///
/// let scheduler = BackgroundScheduler::default();
/// scheduler.setup().unwrap();
/// scheduler.setup().unwrap(); // no-op
/// assert!(scheduler.is_running());
///
/// scheduler.shutdown();
/// scheduler.shutdown(); // no-op
/// assert!(!scheduler.is_running());
/// ```
pub struct BackgroundScheduler {
    config: SchedulerConfig,
    sink: SharedSink,
    state: Mutex<Option<Running>>,
    next_task_id: AtomicU64,
}

impl Default for BackgroundScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl BackgroundScheduler {
    /// Creates a stopped scheduler that reports failures through [`TracingSink`].
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Creates a stopped scheduler that reports failures to `sink`.
    pub fn with_sink(config: SchedulerConfig, sink: SharedSink) -> Self {
        Self {
            config,
            sink,
            state: Mutex::new(None),
            next_task_id: AtomicU64::new(1),
        }
    }

    /// Starts the background thread and its runtime.
    ///
    /// Does nothing if the scheduler is already running. Blocks only until
    /// the new thread has built its runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Startup`] if the thread cannot be spawned or
    /// the runtime cannot be built.
    pub fn setup(&self) -> Result<(), SchedulerError> {
        let mut state = self.lock_state();
        if state.is_some() {
            debug!("background scheduler already running");
            return Ok(());
        }

        let tasks = CancellationToken::new();
        let stop = CancellationToken::new();
        let tracker = TaskTracker::new();

        let mut builder = thread::Builder::new().name(self.config.name().to_owned());
        if let Some(size) = self.config.stack_size() {
            builder = builder.stack_size(size);
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let loop_stop = stop.clone();
        let loop_tracker = tracker.clone();
        let thread = builder
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(runtime.handle().clone()));
                run_loop(runtime, loop_stop, loop_tracker);
            })
            .map_err(SchedulerError::Startup)?;

        let handle = match ready_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(SchedulerError::Startup(e));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(SchedulerError::ThreadExited);
            }
        };

        info!(thread = self.config.name(), "background scheduler started");
        *state = Some(Running {
            handle,
            tasks,
            stop,
            tracker,
            thread,
        });
        Ok(())
    }

    /// Stops the scheduler and joins its thread.
    ///
    /// Cancels every outstanding task, lets each settle through its cancelled
    /// path, then waits for the background thread to exit. Does nothing if
    /// the scheduler is not running. The join has no timeout.
    pub fn shutdown(&self) {
        let Some(running) = self.lock_state().take() else {
            debug!("background scheduler not running; nothing to shut down");
            return;
        };

        info!(
            outstanding = running.tracker.len(),
            "stopping background scheduler"
        );
        running.tasks.cancel();
        running.stop.cancel();

        if running.thread.thread().id() == thread::current().id() {
            // Joining ourselves would deadlock; the loop exits once this task yields.
            warn!("shutdown requested from the scheduler thread; not joining");
            return;
        }

        if running.thread.join().is_err() {
            error!("background scheduler thread panicked");
        }
        info!("background scheduler stopped");
    }

    /// Returns `true` between a successful [`setup`](Self::setup) and the next
    /// [`shutdown`](Self::shutdown).
    pub fn is_running(&self) -> bool {
        self.lock_state().is_some()
    }

    /// Identity of the background thread while running.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.lock_state()
            .as_ref()
            .map(|running| running.thread.thread().id())
    }

    /// The configuration this scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub(crate) fn sink(&self) -> &SharedSink {
        &self.sink
    }

    pub(crate) fn next_task_id(&self) -> u64 {
        self.next_task_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Spawns `make(token)` on the background runtime, where `token` is a new
    /// child of the scheduler-wide task token.
    ///
    /// The state lock is held while spawning so a concurrent shutdown cannot
    /// miss the new task.
    pub(crate) fn spawn_with<F, Fut>(&self, make: F) -> Result<CancellationToken, SchedulerError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let state = self.lock_state();
        let running = state.as_ref().ok_or(SchedulerError::NoSchedulerRunning)?;
        let token = running.tasks.child_token();
        running.tracker.spawn_on(make(token.clone()), &running.handle);
        Ok(token)
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<Running>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Body of the background thread: drive the runtime until asked to stop,
/// then wait for every tracked task to settle.
fn run_loop(runtime: Runtime, stop: CancellationToken, tracker: TaskTracker) {
    runtime.block_on(async move {
        stop.cancelled().await;
        tracker.close();
        tracker.wait().await;
    });
    // Dropping the runtime here, off any async context, releases whatever
    // the handlers spawned on their own.
    drop(runtime);
    debug!("background scheduler loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_stopped() {
        let scheduler = BackgroundScheduler::default();
        assert!(!scheduler.is_running());
        assert!(scheduler.thread_id().is_none());
    }

    #[test]
    fn shutdown_without_setup_is_noop() {
        let scheduler = BackgroundScheduler::default();
        scheduler.shutdown();
        assert!(!scheduler.is_running());
    }

    #[test]
    fn setup_twice_keeps_single_thread() {
        let scheduler = BackgroundScheduler::default();
        scheduler.setup().unwrap();
        let first = scheduler.thread_id().unwrap();

        scheduler.setup().unwrap();
        assert_eq!(scheduler.thread_id(), Some(first));
        assert_ne!(first, thread::current().id());

        scheduler.shutdown();
    }

    #[test]
    fn shutdown_twice_is_noop() {
        let scheduler = BackgroundScheduler::default();
        scheduler.setup().unwrap();
        scheduler.shutdown();
        scheduler.shutdown();
        assert!(!scheduler.is_running());
        assert!(scheduler.thread_id().is_none());
    }

    #[test]
    fn restart_spawns_fresh_thread() {
        let scheduler = BackgroundScheduler::default();
        scheduler.setup().unwrap();
        let first = scheduler.thread_id().unwrap();
        scheduler.shutdown();

        scheduler.setup().unwrap();
        let second = scheduler.thread_id().unwrap();
        assert_ne!(first, second);
        scheduler.shutdown();
    }

    #[test]
    fn spawn_with_fails_when_stopped() {
        let scheduler = BackgroundScheduler::default();
        let err = scheduler.spawn_with(|_token| async {}).unwrap_err();
        assert!(matches!(err, SchedulerError::NoSchedulerRunning));
    }

    #[test]
    fn shutdown_cancels_spawned_tokens() {
        let scheduler = BackgroundScheduler::default();
        scheduler.setup().unwrap();
        let token = scheduler
            .spawn_with(|token| async move { token.cancelled().await })
            .unwrap();
        assert!(!token.is_cancelled());

        scheduler.shutdown();
        assert!(token.is_cancelled());
    }

    #[test]
    fn task_ids_increase() {
        let scheduler = BackgroundScheduler::default();
        let a = scheduler.next_task_id();
        let b = scheduler.next_task_id();
        assert!(b > a);
    }

    #[test]
    fn drop_stops_running_scheduler() {
        let scheduler = BackgroundScheduler::default();
        scheduler.setup().unwrap();
        drop(scheduler);
    }
}
