//! The middleware pipeline.
//!
//! Middleware are async gates run in registration order before a handler:
//!
//! | Returns     | Effect                                                  |
//! |-------------|---------------------------------------------------------|
//! | `Ok(true)`  | continue with the next middleware, then the handler      |
//! | `Ok(false)` | stop silently: no handler, no event, no error            |
//! | `Err(e)`    | stop; `e` becomes a non-fatal [`CommandError`]           |
//!
//! A middleware that panics is treated like one that returned `Err`.
//!
//! # Example
//!
//! ```rust,ignore
//! dispatcher.add_middleware(|ctx: Arc<CommandContext>| async move {
//!     Ok::<_, BoxError>(!ctx.message().is_direct())
//! });
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, trace};

use crate::context::CommandContext;
use crate::error::{CommandError, panic_message};
use herald_core::BoxError;

/// A gate run before every command handler.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn check(&self, ctx: Arc<CommandContext>) -> Result<bool, BoxError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

#[async_trait]
impl<F, Fut, E> Middleware for F
where
    F: Fn(Arc<CommandContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    async fn check(&self, ctx: Arc<CommandContext>) -> Result<bool, BoxError> {
        (self)(ctx).await.map_err(Into::into)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

/// How a pipeline run ended without failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineFlow {
    /// Every middleware returned `Ok(true)`.
    Continue,
    /// The middleware at `index` returned `Ok(false)`.
    Halted { index: usize },
}

/// An ordered, cheaply clonable list of middleware.
///
/// Uses copy-on-write: [`push`](Self::push) on a pipeline that is shared with
/// an in-flight dispatch leaves that dispatch's copy untouched.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    layers: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware.
    pub fn push<M: Middleware>(&mut self, middleware: M) {
        Arc::make_mut(&mut self.layers).push(Arc::new(middleware));
    }

    /// Appends a middleware (builder pattern).
    pub fn with<M: Middleware>(mut self, middleware: M) -> Self {
        self.push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Runs every middleware in order, awaiting each before the next.
    pub async fn run(&self, ctx: &Arc<CommandContext>) -> Result<PipelineFlow, CommandError> {
        for (index, middleware) in self.layers.iter().enumerate() {
            let verdict = match AssertUnwindSafe(middleware.check(Arc::clone(ctx)))
                .catch_unwind()
                .await
            {
                Ok(verdict) => verdict,
                Err(payload) => Err(format!(
                    "middleware panicked: {}",
                    panic_message(payload.as_ref())
                )
                .into()),
            };
            match verdict {
                Ok(true) => {
                    trace!(index, middleware = middleware.name(), "Middleware passed");
                }
                Ok(false) => {
                    debug!(index, middleware = middleware.name(), "Middleware halted dispatch");
                    return Ok(PipelineFlow::Halted { index });
                }
                Err(e) => {
                    debug!(index, middleware = middleware.name(), error = %e, "Middleware failed");
                    return Err(CommandError::middleware(e));
                }
            }
        }
        Ok(PipelineFlow::Continue)
    }
}

impl std::fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.layers.iter().map(|m| m.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::command::CommandDefinition;
    use crate::context::test_support::{MockBot, context};
    use crate::error::FailureKind;
    use herald_core::Author;

    async fn noop(_ctx: Arc<CommandContext>) -> Result<(), BoxError> {
        Ok(())
    }

    fn ctx() -> Arc<CommandContext> {
        let def = CommandDefinition::builder("x", noop).build().unwrap();
        context(def, Arc::new(MockBot::new()), Author::new("u", "u"))
    }

    fn counting(counter: &Arc<AtomicUsize>, verdict: bool) -> impl Middleware {
        let counter = Arc::clone(counter);
        move |_ctx: Arc<CommandContext>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(verdict)
            }
        }
    }

    #[tokio::test]
    async fn test_all_pass() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pipeline = MiddlewarePipeline::new()
            .with(counting(&counter, true))
            .with(counting(&counter, true));
        assert_eq!(pipeline.run(&ctx()).await.unwrap(), PipelineFlow::Continue);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_false_halts_chain() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pipeline = MiddlewarePipeline::new()
            .with(counting(&counter, false))
            .with(counting(&counter, true));
        assert_eq!(
            pipeline.run(&ctx()).await.unwrap(),
            PipelineFlow::Halted { index: 0 }
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_is_non_fatal_and_stops() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pipeline = MiddlewarePipeline::new()
            .with(counting(&counter, true))
            .with(|_ctx: Arc<CommandContext>| async { Err::<bool, _>("denied") })
            .with(counting(&counter, true));

        let err = pipeline.run(&ctx()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Middleware);
        assert!(err.is_non_fatal());
        assert_eq!(err.message(), "denied");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_middleware_failure() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pipeline = MiddlewarePipeline::new()
            .with(|_ctx: Arc<CommandContext>| async {
                if true {
                    panic!("gate exploded");
                }
                Ok::<_, BoxError>(true)
            })
            .with(counting(&counter, true));

        let err = pipeline.run(&ctx()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Middleware);
        assert!(err.is_non_fatal());
        assert!(err.message().contains("gate exploded"));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_copy_on_write() {
        let a = MiddlewarePipeline::new().with(counting(&Arc::new(AtomicUsize::new(0)), true));
        let mut b = a.clone();
        b.push(counting(&Arc::new(AtomicUsize::new(0)), true));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);
    }
}
