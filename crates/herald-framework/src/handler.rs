//! Command handler and lifecycle hook traits.
//!
//! A handler is anything that turns an `Arc<CommandContext>` into a
//! `Result<Value, BoxError>`. Plain async functions and closures qualify
//! through blanket impls, as long as their success type converts into a
//! [`serde_json::Value`] (`()`, strings, numbers, ...) and their error type
//! converts into a [`BoxError`].
//!
//! # Example
//!
//! ```rust,ignore
//! async fn ping(_ctx: Arc<CommandContext>) -> Result<&'static str, BoxError> {
//!     Ok("pong")
//! }
//!
//! let def = CommandDefinition::builder("ping", ping)
//!     .on_run(|ctx: Arc<CommandContext>, result: Value| async move {
//!         ctx.reply(&result.to_string()).await?;
//!         Ok(())
//!     })
//!     .build()?;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::CommandContext;
use crate::error::CommandError;
use herald_core::BoxError;

/// The body of a command.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    /// Runs the command. The returned value is published with the
    /// `CommandRan` event and handed to the `on_run` hook.
    async fn exec(&self, ctx: Arc<CommandContext>) -> Result<Value, BoxError>;
}

/// A shared, type-erased command handler.
pub type BoxedCommandHandler = Arc<dyn CommandHandler>;

#[async_trait]
impl<F, Fut, R, E> CommandHandler for F
where
    F: Fn(Arc<CommandContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Into<Value> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    async fn exec(&self, ctx: Arc<CommandContext>) -> Result<Value, BoxError> {
        (self)(ctx).await.map(Into::into).map_err(Into::into)
    }
}

// ============================================================================
// Lifecycle hooks
// ============================================================================

/// Runs after a handler succeeded, before `CommandRan` is emitted.
///
/// Errors and panics are logged at debug level and otherwise ignored.
#[async_trait]
pub trait RunHook: Send + Sync + 'static {
    async fn on_run(&self, ctx: Arc<CommandContext>, result: Value) -> Result<(), BoxError>;
}

#[async_trait]
impl<F, Fut> RunHook for F
where
    F: Fn(Arc<CommandContext>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn on_run(&self, ctx: Arc<CommandContext>, result: Value) -> Result<(), BoxError> {
        (self)(ctx, result).await
    }
}

/// Runs after a handler failed and `CommandError` was emitted, before the
/// error reporter.
///
/// Errors and panics are logged at debug level and otherwise ignored.
#[async_trait]
pub trait ErrorHook: Send + Sync + 'static {
    async fn on_error(&self, ctx: Arc<CommandContext>, error: CommandError) -> Result<(), BoxError>;
}

#[async_trait]
impl<F, Fut> ErrorHook for F
where
    F: Fn(Arc<CommandContext>, CommandError) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn on_error(&self, ctx: Arc<CommandContext>, error: CommandError) -> Result<(), BoxError> {
        (self)(ctx, error).await
    }
}
