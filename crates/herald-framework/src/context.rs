//! Per-dispatch command context.
//!
//! One [`CommandContext`] is created for every message that resolved to a
//! command. It is shared as `Arc<CommandContext>` between the middleware
//! chain, the handler, the hooks, the reporter and event subscribers, and is
//! never reused across dispatches.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::command::{CommandDefinition, shell_split};
use crate::matcher::Invocation;
use herald_core::{Author, BoxedBot, Bot, DeliveryResult, Embed, InboundMessage, downcast_bot};

/// The context handed to middleware, handlers and hooks.
///
/// # Example
///
/// ```rust,ignore
/// async fn echo(ctx: Arc<CommandContext>) -> Result<(), BoxError> {
///     if ctx.args().is_empty() {
///         return Err(format!("usage: {}echo <text>", ctx.prefix()).into());
///     }
///     ctx.reply(ctx.raw_args()).await?;
///     Ok(())
/// }
/// ```
pub struct CommandContext {
    message: Arc<InboundMessage>,
    command: Arc<CommandDefinition>,
    invocation: Invocation,
    bot: BoxedBot,
    state: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl CommandContext {
    pub fn new(
        message: Arc<InboundMessage>,
        command: Arc<CommandDefinition>,
        invocation: Invocation,
        bot: BoxedBot,
    ) -> Self {
        Self {
            message,
            command,
            invocation,
            bot,
            state: Mutex::new(HashMap::new()),
        }
    }

    // ─── Invocation ──────────────────────────────────────────────────────────

    /// The message that triggered this dispatch.
    pub fn message(&self) -> &InboundMessage {
        &self.message
    }

    pub fn message_arc(&self) -> Arc<InboundMessage> {
        Arc::clone(&self.message)
    }

    pub fn author(&self) -> &Author {
        &self.message.author
    }

    /// The matched definition.
    pub fn command(&self) -> &Arc<CommandDefinition> {
        &self.command
    }

    /// The prefix as it appeared in the message, plus a trailing space if the
    /// command was separated from it by whitespace.
    pub fn prefix(&self) -> &str {
        &self.invocation.prefix
    }

    /// The command token exactly as typed.
    pub fn invoked_as(&self) -> &str {
        &self.invocation.command
    }

    /// Whitespace-separated arguments after the command token.
    pub fn args(&self) -> &[String] {
        &self.invocation.args
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.invocation.args.get(index).map(String::as_str)
    }

    /// Everything after the command token, leading whitespace removed.
    pub fn raw_args(&self) -> &str {
        &self.invocation.rest
    }

    /// Arguments split with shell quoting rules.
    pub fn quoted_args(&self) -> Vec<String> {
        shell_split(&self.invocation.rest)
    }

    // ─── Bot ─────────────────────────────────────────────────────────────────

    pub fn bot(&self) -> &BoxedBot {
        &self.bot
    }

    /// Returns the bot as a concrete type.
    pub fn bot_as<T: Bot>(&self) -> Option<Arc<T>> {
        downcast_bot::<T>(Arc::clone(&self.bot))
    }

    /// Sends a plain-text reply to the origin channel.
    pub async fn reply(&self, text: &str) -> DeliveryResult<String> {
        self.bot.send_text(&self.message, text).await
    }

    /// Sends an embed to the origin channel.
    pub async fn reply_embed(&self, embed: &Embed) -> DeliveryResult<String> {
        self.bot.send_embed(&self.message, embed).await
    }

    /// Sends the definition's fixed response, if it has one.
    pub async fn respond(&self) -> DeliveryResult<Option<String>> {
        let Some(template) = &self.command.meta().response else {
            return Ok(None);
        };

        let mut embed = Embed::new();
        if let Some(title) = &template.title {
            embed = embed.title(title.clone());
        }
        if let Some(body) = &template.body {
            embed = embed.description(body.clone());
        }
        if let Some(color) = template.color {
            embed = embed.color(color);
        }
        self.reply_embed(&embed).await.map(Some)
    }

    // ─── State ───────────────────────────────────────────────────────────────

    /// Stores a value for later middleware or the handler.
    ///
    /// Only one value per type can be stored; subsequent calls overwrite.
    pub fn set_state<T: Send + Sync + 'static>(&self, value: T) {
        self.state.lock().insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a cloned value from the state map.
    pub fn get_state<T: Clone + 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn has_state<T: 'static>(&self) -> bool {
        self.state.lock().contains_key(&TypeId::of::<T>())
    }

    /// Removes and returns a value from the state map.
    pub fn take_state<T: 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("message_id", &self.message.id)
            .field("command", &self.command.key())
            .field("invocation", &self.invocation)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::test_support::{MockBot, Sent, context};
    use super::*;
    use crate::command::ResponseTemplate;
    use herald_core::BoxError;

    async fn noop(_ctx: Arc<CommandContext>) -> Result<(), BoxError> {
        Ok(())
    }

    #[test]
    fn test_state_roundtrip() {
        let def = CommandDefinition::builder("x", noop).build().unwrap();
        let ctx = context(def, Arc::new(MockBot::new()), Author::new("u", "u"));

        assert!(!ctx.has_state::<u32>());
        ctx.set_state(7u32);
        assert_eq!(ctx.get_state::<u32>(), Some(7));
        assert_eq!(ctx.take_state::<u32>(), Some(7));
        assert!(ctx.get_state::<u32>().is_none());
    }

    #[tokio::test]
    async fn test_respond_uses_template() {
        let def = CommandDefinition::builder("x", noop)
            .response(ResponseTemplate {
                title: Some("Hi".into()),
                color: Some(0x00FF00),
                body: Some("there".into()),
            })
            .build()
            .unwrap();
        let bot = Arc::new(MockBot::new());
        let ctx = context(def, bot.clone(), Author::new("u", "u"));

        assert_eq!(ctx.respond().await.unwrap().as_deref(), Some("sent"));
        assert_eq!(
            bot.sent(),
            vec![Sent::Embed(Embed::new().title("Hi").description("there").color(0x00FF00))]
        );
        assert!(ctx.bot_as::<MockBot>().is_some());
    }
}
