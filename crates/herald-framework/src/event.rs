//! Dispatch outcome events.
//!
//! At most one [`DispatchEvent`] is published per dispatch. Silent halts and
//! ignored messages publish nothing.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use crate::context::CommandContext;
use crate::error::CommandError;
use herald_core::InboundMessage;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// The observable result of a dispatch.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// The handler succeeded.
    CommandRan {
        context: Arc<CommandContext>,
        result: Value,
    },
    /// The handler failed, panicked or timed out.
    CommandError {
        context: Arc<CommandContext>,
        error: CommandError,
    },
    /// A middleware raised an error.
    MiddlewareError {
        context: Arc<CommandContext>,
        error: CommandError,
    },
    /// A prefix matched but no enabled command accepted the token.
    NoCommand { message: Arc<InboundMessage> },
}

impl DispatchEvent {
    /// Stable event name, e.g. for metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            DispatchEvent::CommandRan { .. } => "COMMAND_RAN",
            DispatchEvent::CommandError { .. } => "COMMAND_ERROR",
            DispatchEvent::MiddlewareError { .. } => "MIDDLEWARE_ERROR",
            DispatchEvent::NoCommand { .. } => "NO_COMMAND",
        }
    }

    /// The command context, absent for `NoCommand`.
    pub fn context(&self) -> Option<&Arc<CommandContext>> {
        match self {
            DispatchEvent::CommandRan { context, .. }
            | DispatchEvent::CommandError { context, .. }
            | DispatchEvent::MiddlewareError { context, .. } => Some(context),
            DispatchEvent::NoCommand { .. } => None,
        }
    }

    /// The originating message.
    pub fn message(&self) -> &InboundMessage {
        match self {
            DispatchEvent::NoCommand { message } => message,
            DispatchEvent::CommandRan { context, .. }
            | DispatchEvent::CommandError { context, .. }
            | DispatchEvent::MiddlewareError { context, .. } => context.message(),
        }
    }
}

/// Broadcast channel carrying [`DispatchEvent`]s to any number of subscribers.
///
/// Publishing never blocks; with no subscribers events are dropped, and a
/// subscriber that falls behind by more than the capacity observes
/// `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub(crate) fn publish(&self, event: DispatchEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => trace!(event = name, receivers, "Published dispatch event"),
            Err(_) => trace!(event = name, "No subscribers for dispatch event"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::Author;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::default();
        let message = Arc::new(InboundMessage::new("1", "c", Author::new("u", "u"), "!x"));
        bus.publish(DispatchEvent::NoCommand {
            message: Arc::clone(&message),
        });

        let mut rx = bus.subscribe();
        bus.publish(DispatchEvent::NoCommand { message });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "NO_COMMAND");
        assert_eq!(event.message().content, "!x");
        assert!(event.context().is_none());
    }
}
