//! Dispatch adapters — synchronous host callbacks wrapped around async handlers.
//!
//! Each adapter is composed around a user handler at construction time and
//! exposes a synchronous entry point the host can call from any thread:
//!
//! | Adapter           | Host call                         | Returns                      |
//! |-------------------|-----------------------------------|------------------------------|
//! | [`QueryDispatch`] | [`query`](QueryDispatch::query)   | a [`CompletionList`] placeholder |
//! | [`EventDispatch`] | [`notify`](EventDispatch::notify) | nothing                      |
//!
//! Both implement [`HostCallback`], so host glue code can treat them uniformly.
//!
//! [`CompletionList`]: crate::host::CompletionList

use std::pin::Pin;

use crate::host::{CompletionItem, QueryRequest};
use crate::runtime::{HandlerError, SchedulerError};

pub mod event;
pub mod query;

pub use event::EventDispatch;
pub use query::QueryDispatch;

/// Heap-allocated, `Send` future returned by handlers.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A synchronous host entry point backed by async work.
///
/// Implementations must return without waiting on the background scheduler.
pub trait HostCallback<A> {
    /// What the host gets back immediately.
    type Return;

    /// Hand `args` to the background scheduler and return at once.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoSchedulerRunning`] if the background
    /// scheduler is stopped.
    fn invoke(&self, args: A) -> Result<Self::Return, SchedulerError>;
}

/// An async completion handler.
///
/// Any `Fn(QueryRequest) -> impl Future<Output = Result<Vec<I>, HandlerError>>`
/// where `I: Into<CompletionItem>` implements this trait via the blanket impl
/// below.
pub trait QueryHandler: Send + Sync + 'static {
    /// Produce completions for `request`, boxing the returned future.
    fn query(&self, request: QueryRequest) -> BoxFuture<Result<Vec<CompletionItem>, HandlerError>>;
}

impl<T, F, I> QueryHandler for T
where
    T: Fn(QueryRequest) -> F + Send + Sync + 'static,
    F: Future<Output = Result<Vec<I>, HandlerError>> + Send + 'static,
    I: Into<CompletionItem> + Send + 'static,
{
    fn query(&self, request: QueryRequest) -> BoxFuture<Result<Vec<CompletionItem>, HandlerError>> {
        let future = (self)(request);
        Box::pin(async move {
            let items = future.await?;
            Ok(items.into_iter().map(Into::into).collect())
        })
    }
}

/// An async fire-and-forget handler for host notifications or commands.
///
/// Implemented for every `Fn(A) -> impl Future<Output = Result<(), HandlerError>>`.
pub trait EventHandler<A>: Send + Sync + 'static {
    /// Handle one notification, boxing the returned future.
    fn handle(&self, args: A) -> BoxFuture<Result<(), HandlerError>>;
}

impl<T, F, A> EventHandler<A> for T
where
    T: Fn(A) -> F + Send + Sync + 'static,
    F: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&self, args: A) -> BoxFuture<Result<(), HandlerError>> {
        Box::pin((self)(args))
    }
}
