//! Inbound message model.
//!
//! [`InboundMessage`] is the only shape the dispatch core needs from a chat
//! gateway: who wrote it, whether the author is a bot, what kind of message it
//! is, and its body text. Adapters translate their protocol payloads into this
//! struct before handing them to the dispatcher.

use serde::{Deserialize, Serialize};

/// Classification of an inbound message.
///
/// Only [`MessageKind::Default`] and [`MessageKind::Reply`] are eligible for
/// command dispatch; everything else (joins, pins, thread notices, ...) is
/// dropped before prefix resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A regular user message.
    #[default]
    Default,
    /// A message sent as a reply to another message.
    Reply,
    /// Any system or service message.
    Other,
}

impl MessageKind {
    /// Returns `true` if messages of this kind may carry commands.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, MessageKind::Default | MessageKind::Reply)
    }
}

/// The author of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Author {
    /// Platform user identifier.
    pub id: String,
    /// Display name, used only for logging and replies.
    #[serde(default)]
    pub username: String,
    /// Whether the author is an automated account.
    #[serde(default)]
    pub bot: bool,
}

impl Author {
    /// Creates a human author with the given id and name.
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            bot: false,
        }
    }

    /// Marks this author as a bot account.
    pub fn bot(mut self, bot: bool) -> Self {
        self.bot = bot;
        self
    }
}

/// A chat message as seen by the dispatch core.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform message identifier.
    pub id: String,
    /// Channel the message was posted in.
    pub channel_id: String,
    /// Guild / server the channel belongs to, if any.
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Who sent the message.
    pub author: Author,
    /// Raw body text.
    #[serde(default)]
    pub content: String,
    /// Message classification.
    #[serde(default)]
    pub kind: MessageKind,
}

impl InboundMessage {
    /// Creates a default-kind message in `channel_id` from `author`.
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        author: Author,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            guild_id: None,
            author,
            content: content.into(),
            kind: MessageKind::Default,
        }
    }

    /// Sets the guild this message was sent in.
    pub fn in_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    /// Overrides the message kind.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns `true` if the message was sent outside any guild.
    pub fn is_direct(&self) -> bool {
        self.guild_id.is_none()
    }
}
