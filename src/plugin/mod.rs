//! Plugin lifecycle — the hooks the host calls on load and unload.
//!
//! [`PluginBridge`] owns the shared [`BackgroundScheduler`] and hands out
//! adapters bound to it, so plugin code never touches the scheduler directly.

use std::sync::Arc;

use tracing::info;

use crate::adapter::{EventDispatch, EventHandler, QueryDispatch, QueryHandler};
use crate::config::SchedulerConfig;
use crate::diagnostics::SharedSink;
use crate::runtime::{BackgroundScheduler, Dispatcher, SchedulerError};

/// Entry point for a plugin: lifecycle hooks plus adapter construction.
///
/// # Examples
///
/// ```rust,no_run
/// use plugbridge::host::QueryRequest;
/// use plugbridge::plugin::PluginBridge;
/// use plugbridge::runtime::HandlerError;
///
/// let bridge = PluginBridge::default();
/// bridge.on_load().unwrap();
///
/// let completions = bridge.query(|_req: QueryRequest| async {
///     Ok::<_, HandlerError>(vec!["foo", "bar"])
/// });
/// let on_modified = bridge.event(|view: u64| async move {
///     tracing::info!(view, "modified");
///     Ok::<(), HandlerError>(())
/// });
///
/// on_modified.notify(1).unwrap();
/// # let _ = completions;
/// bridge.on_unload();
/// ```
#[derive(Clone)]
pub struct PluginBridge {
    scheduler: Arc<BackgroundScheduler>,
}

impl Default for PluginBridge {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl PluginBridge {
    /// Creates a bridge whose failures are reported through `tracing`.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::from_scheduler(Arc::new(BackgroundScheduler::new(config)))
    }

    /// Creates a bridge whose failures are reported to `sink`.
    pub fn with_sink(config: SchedulerConfig, sink: SharedSink) -> Self {
        Self::from_scheduler(Arc::new(BackgroundScheduler::with_sink(config, sink)))
    }

    /// Wraps an existing scheduler.
    pub fn from_scheduler(scheduler: Arc<BackgroundScheduler>) -> Self {
        Self { scheduler }
    }

    /// Host hook: the plugin was loaded. Starts the background scheduler.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Startup`] if the background thread cannot start.
    pub fn on_load(&self) -> Result<(), SchedulerError> {
        info!("plugin loaded");
        self.scheduler.setup()
    }

    /// Host hook: the plugin is being unloaded. Cancels all outstanding work
    /// and joins the background thread.
    pub fn on_unload(&self) {
        info!("plugin unloading");
        self.scheduler.shutdown();
    }

    pub fn scheduler(&self) -> &Arc<BackgroundScheduler> {
        &self.scheduler
    }

    /// A plain dispatcher for running async code from synchronous plugin code.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.scheduler))
    }

    /// Wraps a completion handler.
    pub fn query<H>(&self, handler: H) -> QueryDispatch
    where
        H: QueryHandler,
    {
        QueryDispatch::new(Arc::clone(&self.scheduler), handler)
    }

    /// Wraps a notification or command handler.
    pub fn event<A, H>(&self, handler: H) -> EventDispatch<A>
    where
        A: Send + 'static,
        H: EventHandler<A>,
    {
        EventDispatch::new(Arc::clone(&self.scheduler), handler)
    }
}
