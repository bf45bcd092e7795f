//! Bot trait and related types.
//!
//! The [`Bot`] is the dispatch core's handle on the chat platform. It knows
//! its own user id (for mention prefixes) and how to answer the channel a
//! message came from. Gateway sessions, rate limits and caching live behind
//! this trait and are out of the core's reach.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::embed::Embed;
use crate::error::DeliveryResult;
use crate::message::InboundMessage;

/// The core Bot trait.
///
/// # API Design
///
/// - `can_send`: permission check for the origin channel of a message
/// - `send_embed`: rich reply; returns `DeliveryError::Unsupported` when the
///   channel cannot render embeds
/// - `send_text`: plain reply, supported everywhere the bot can post
///
/// Concrete implementations should expose their platform-specific APIs on
/// the concrete type; handlers reach them through [`downcast_bot`].
#[async_trait]
pub trait Bot: Send + Sync + 'static {
    /// Returns the bot's own user id.
    fn id(&self) -> &str;

    /// Returns `true` if the bot may post in the channel `origin` came from.
    async fn can_send(&self, origin: &InboundMessage) -> bool;

    /// Sends a rich reply to the channel `origin` came from.
    ///
    /// Returns the id of the created message.
    async fn send_embed(&self, origin: &InboundMessage, embed: &Embed) -> DeliveryResult<String>;

    /// Sends a plain-text reply to the channel `origin` came from.
    ///
    /// Returns the id of the created message.
    async fn send_text(&self, origin: &InboundMessage, text: &str) -> DeliveryResult<String>;

    /// Returns self as an `Arc<dyn Any>` for safe downcasting.
    ///
    /// Implementors should simply return `self`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A boxed Bot trait object.
pub type BoxedBot = Arc<dyn Bot>;

/// Downcasts a [`BoxedBot`] to a concrete bot type.
pub fn downcast_bot<T: Bot>(bot: BoxedBot) -> Option<Arc<T>> {
    bot.as_any().downcast::<T>().ok()
}

/// Renders the plain mention form of a user id (`<@id>`).
pub fn mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

/// Renders the nickname mention form of a user id (`<@!id>`).
pub fn nickname_mention(user_id: &str) -> String {
    format!("<@!{user_id}>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;

    struct SilentBot;

    #[async_trait]
    impl Bot for SilentBot {
        fn id(&self) -> &str {
            "42"
        }

        async fn can_send(&self, _origin: &InboundMessage) -> bool {
            false
        }

        async fn send_embed(&self, _origin: &InboundMessage, _embed: &Embed) -> DeliveryResult<String> {
            Err(DeliveryError::Unsupported)
        }

        async fn send_text(&self, _origin: &InboundMessage, _text: &str) -> DeliveryResult<String> {
            Err(DeliveryError::transport("offline"))
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    #[test]
    fn test_mention_forms() {
        assert_eq!(mention("42"), "<@42>");
        assert_eq!(nickname_mention("42"), "<@!42>");
    }

    #[tokio::test]
    async fn test_downcast_bot() {
        let bot: BoxedBot = Arc::new(SilentBot);
        assert!(!bot.can_send(&InboundMessage::default()).await);
        let concrete = downcast_bot::<SilentBot>(bot).expect("downcast");
        assert_eq!(concrete.id(), "42");
    }
}
