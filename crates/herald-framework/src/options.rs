//! Process-wide dispatch options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::CommandMeta;

/// Options governing how the dispatcher treats every message.
///
/// Set once at startup. All fields have serde defaults, so the struct can be
/// read straight out of the `[handler]` config section.
///
/// # Example
///
/// ```rust,ignore
/// let options = HandlerOptions {
///     allow_bot_authors: true,
///     ..HandlerOptions::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerOptions {
    /// Whether messages written by bot accounts are dispatched.
    pub allow_bot_authors: bool,
    /// Whether the bot's own mention counts as a prefix.
    pub mention_prefix: bool,
    /// Fold case when comparing prefixes.
    pub case_insensitive_prefix: bool,
    /// Fold case when matching command tokens.
    pub case_insensitive_command: bool,
    /// Field values merged into every registered definition.
    pub defaults: CommandMeta,
    /// Upper bound on handler execution, in milliseconds. Unset means no limit.
    #[serde(rename = "handler_timeout_ms", with = "millis")]
    pub handler_timeout: Option<Duration>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            allow_bot_authors: false,
            mention_prefix: true,
            case_insensitive_prefix: true,
            case_insensitive_command: true,
            defaults: CommandMeta::default(),
            handler_timeout: None,
        }
    }
}

impl HandlerOptions {
    /// Sets the handler timeout.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Sets the default field values.
    pub fn with_defaults(mut self, defaults: CommandMeta) -> Self {
        self.defaults = defaults;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
