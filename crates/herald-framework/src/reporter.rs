//! User-facing error reporting.
//!
//! The dispatcher hands every middleware and handler failure to an
//! [`ErrorReporter`]. The [`DefaultErrorReporter`] replies in the origin
//! channel and logs fatal failures; hosts replace it wholesale with
//! `Dispatcher::set_error_reporter`.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::context::CommandContext;
use crate::error::CommandError;
use herald_core::{DeliveryError, ERROR_COLOR, Embed};

/// Title of the default error embed.
pub const ERROR_TITLE: &str = "An Error Occurred";

/// Presents a command failure.
///
/// Implementations must not fail; delivery problems are theirs to swallow.
#[async_trait]
pub trait ErrorReporter: Send + Sync + 'static {
    async fn report(&self, ctx: Arc<CommandContext>, error: CommandError);
}

#[async_trait]
impl<F, Fut> ErrorReporter for F
where
    F: Fn(Arc<CommandContext>, CommandError) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn report(&self, ctx: Arc<CommandContext>, error: CommandError) {
        (self)(ctx, error).await
    }
}

/// Replies with a red error embed, falling back to plain text where embeds
/// are unsupported, then logs fatal failures at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorReporter;

impl DefaultErrorReporter {
    /// The embed sent for `error`.
    pub fn embed(error: &CommandError) -> Embed {
        Embed::new()
            .title(ERROR_TITLE)
            .color(ERROR_COLOR)
            .description(format!("```xl\n{}```", error.message()))
    }
}

#[async_trait]
impl ErrorReporter for DefaultErrorReporter {
    async fn report(&self, ctx: Arc<CommandContext>, error: CommandError) {
        let bot = ctx.bot();
        let message = ctx.message();

        if bot.can_send(message).await {
            let embed = Self::embed(&error);
            let delivered = match bot.send_embed(message, &embed).await {
                Err(DeliveryError::Unsupported) => {
                    bot.send_text(message, &embed.to_plain_text()).await
                }
                other => other,
            };
            if let Err(e) = delivered {
                debug!(error = %e, "Failed to deliver error reply");
            }
        }

        if error.is_non_fatal() {
            return;
        }
        error!(
            command = %ctx.command().key(),
            kind = %error.kind(),
            "{} (while running command: {})",
            error.message(),
            ctx.command().key()
        );
    }
}
