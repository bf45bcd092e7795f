//! Error types shared by every Herald crate.

use thiserror::Error;

/// A type-erased error, the currency of handler and middleware failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by a [`Bot`](crate::bot::Bot) when a reply cannot be
/// delivered.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// The target channel cannot render this kind of payload.
    #[error("channel does not support this message type")]
    Unsupported,

    /// The bot lacks permission to post in the target channel.
    #[error("missing permission to send to channel '{channel_id}'")]
    Forbidden {
        /// The channel that rejected the message.
        channel_id: String,
    },

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Creates a transport error from any displayable value.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Result type for reply delivery.
pub type DeliveryResult<T> = Result<T, DeliveryError>;
