//! # plugbridge
//!
//! Run async plugin handlers behind a synchronous, callback-driven editor host.
//!
//! The host invokes plugin callbacks on its own threads and wants an answer
//! right away. plugbridge runs the real work on one dedicated background
//! thread and hands the host either a placeholder that fills in later
//! (completion queries) or nothing at all (notifications).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plugbridge::host::{QueryRequest, ViewId};
//! use plugbridge::plugin::PluginBridge;
//! use plugbridge::runtime::HandlerError;
//!
//! let bridge = PluginBridge::default();
//! bridge.on_load().unwrap();
//!
//! let completions = bridge.query(|_req: QueryRequest| async {
//!     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     Ok::<_, HandlerError>(vec!["foo", "bar"])
//! });
//!
//! // Called from a host thread; never blocks.
//! let list = completions.query(QueryRequest::new(ViewId(1), "f", vec![1])).unwrap();
//! assert!(!list.is_resolved());
//!
//! bridge.on_unload();
//! ```

pub mod adapter;
pub mod config;
pub mod diagnostics;
pub mod host;
pub mod plugin;
pub mod runtime;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use adapter::{EventDispatch, HostCallback, QueryDispatch};
pub use host::{CompletionFlags, CompletionItem, CompletionList, QueryRequest, ViewId};
pub use plugin::PluginBridge;
pub use runtime::{BackgroundScheduler, Dispatcher, HandlerError, SchedulerError, TaskHandle};
