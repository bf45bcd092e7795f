//! Prefix resolution.
//!
//! A message activates command parsing only if its body starts with one of
//! the acceptable prefixes. Candidates come from a fixed list or a
//! per-message resolver, followed by the bot's mention forms when
//! [`HandlerOptions::mention_prefix`] is set. With neither list nor resolver
//! configured every message is eligible with an empty prefix, and mentions
//! are not consulted.
//!
//! [`HandlerOptions::mention_prefix`]: crate::options::HandlerOptions::mention_prefix

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use herald_core::{InboundMessage, mention, nickname_mention};

/// Computes the acceptable prefixes for a single message.
///
/// Implemented for async closures taking `Arc<InboundMessage>`:
///
/// ```rust,ignore
/// dispatcher.set_prefix_resolver(|msg: Arc<InboundMessage>| async move {
///     let guild_prefix = settings.prefix_for(msg.guild_id.as_deref()).await;
///     vec![guild_prefix]
/// });
/// ```
#[async_trait]
pub trait PrefixResolver: Send + Sync + 'static {
    async fn resolve(&self, message: Arc<InboundMessage>) -> Vec<String>;
}

#[async_trait]
impl<F, Fut> PrefixResolver for F
where
    F: Fn(Arc<InboundMessage>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Vec<String>> + Send + 'static,
{
    async fn resolve(&self, message: Arc<InboundMessage>) -> Vec<String> {
        (self)(message).await
    }
}

/// Where prefixes come from.
#[derive(Clone, Default)]
pub enum PrefixSource {
    /// No prefix configured: every message is eligible with an empty prefix.
    #[default]
    Implicit,
    /// A fixed, ordered list.
    Fixed(Vec<String>),
    /// A per-message callback.
    Resolver(Arc<dyn PrefixResolver>),
}

impl std::fmt::Debug for PrefixSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrefixSource::Implicit => f.write_str("Implicit"),
            PrefixSource::Fixed(list) => f.debug_tuple("Fixed").field(list).finish(),
            PrefixSource::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// A prefix found at the start of a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatch {
    /// The prefix exactly as it appears in the body.
    pub prefix: String,
    /// Byte length of the prefix within the body.
    pub len: usize,
}

impl PrefixSource {
    /// Returns the ordered candidate list for `message`, or `None` in
    /// implicit mode.
    pub async fn candidates(
        &self,
        message: &Arc<InboundMessage>,
        bot_id: &str,
        mention_prefix: bool,
    ) -> Option<Vec<String>> {
        let mut candidates = match self {
            PrefixSource::Implicit => return None,
            PrefixSource::Fixed(list) => list.clone(),
            PrefixSource::Resolver(resolver) => resolver.resolve(Arc::clone(message)).await,
        };
        if mention_prefix {
            candidates.push(mention(bot_id));
            candidates.push(nickname_mention(bot_id));
        }
        Some(candidates)
    }

    /// Resolves the prefix of `message`.
    ///
    /// Returns `None` if the body starts with none of the candidates.
    pub async fn resolve(
        &self,
        message: &Arc<InboundMessage>,
        bot_id: &str,
        mention_prefix: bool,
        fold: bool,
    ) -> Option<PrefixMatch> {
        let Some(candidates) = self.candidates(message, bot_id, mention_prefix).await else {
            return Some(PrefixMatch {
                prefix: String::new(),
                len: 0,
            });
        };

        let found = candidates
            .iter()
            .find_map(|candidate| leading_match(&message.content, candidate, fold));
        trace!(?candidates, matched = ?found, "Prefix resolution");
        found
    }
}

/// Tests whether `body` starts with `candidate`, optionally folding case.
fn leading_match(body: &str, candidate: &str, fold: bool) -> Option<PrefixMatch> {
    let width = candidate.chars().count();
    let end = match body.char_indices().nth(width) {
        Some((i, _)) => i,
        None if body.chars().count() == width => body.len(),
        None => return None,
    };
    let head = &body[..end];

    let hit = if fold {
        head.to_lowercase() == candidate.to_lowercase()
    } else {
        head == candidate
    };
    hit.then(|| PrefixMatch {
        prefix: head.to_string(),
        len: end,
    })
}

/// Converts common prefix shapes into a [`PrefixSource::Fixed`] list.
pub trait IntoPrefixes {
    fn into_prefixes(self) -> Vec<String>;
}

impl IntoPrefixes for &str {
    fn into_prefixes(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoPrefixes for String {
    fn into_prefixes(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoPrefixes for Vec<String> {
    fn into_prefixes(self) -> Vec<String> {
        self
    }
}

impl IntoPrefixes for Vec<&str> {
    fn into_prefixes(self) -> Vec<String> {
        self.into_iter().map(String::from).collect()
    }
}

impl<const N: usize> IntoPrefixes for [&str; N] {
    fn into_prefixes(self) -> Vec<String> {
        self.into_iter().map(String::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::Author;

    fn msg(content: &str) -> Arc<InboundMessage> {
        Arc::new(InboundMessage::new("1", "c", Author::new("u", "u"), content))
    }

    #[tokio::test]
    async fn test_fixed_prefix_case_folding() {
        let source = PrefixSource::Fixed(vec!["h!".into()]);
        let m = source.resolve(&msg("H!ping"), "99", true, true).await.unwrap();
        assert_eq!(m.prefix, "H!");
        assert_eq!(m.len, 2);
        assert!(source.resolve(&msg("H!ping"), "99", true, false).await.is_none());
        assert!(source.resolve(&msg("ping"), "99", true, true).await.is_none());
    }

    #[tokio::test]
    async fn test_first_candidate_wins() {
        let source = PrefixSource::Fixed(["!", "!!"].into_prefixes());
        let m = source.resolve(&msg("!!ping"), "99", false, true).await.unwrap();
        assert_eq!(m.prefix, "!");
    }

    #[tokio::test]
    async fn test_mention_forms() {
        let source = PrefixSource::Fixed(vec!["!".into()]);
        let plain = source.resolve(&msg("<@99> ping"), "99", true, true).await.unwrap();
        assert_eq!(plain.prefix, "<@99>");
        let nick = source.resolve(&msg("<@!99>ping"), "99", true, true).await.unwrap();
        assert_eq!(nick.prefix, "<@!99>");
        assert!(source.resolve(&msg("<@99> ping"), "99", false, true).await.is_none());
    }

    #[tokio::test]
    async fn test_implicit_mode_ignores_mentions() {
        let source = PrefixSource::Implicit;
        let m = source.resolve(&msg("<@99> ping"), "99", true, true).await.unwrap();
        assert_eq!(m.prefix, "");
        assert_eq!(m.len, 0);
    }

    #[tokio::test]
    async fn test_resolver_callback() {
        let source = PrefixSource::Resolver(Arc::new(|m: Arc<InboundMessage>| async move {
            if m.is_direct() { vec![String::new()] } else { vec!["?".to_string()] }
        }));
        let m = source.resolve(&msg("ping"), "99", true, true).await.unwrap();
        assert_eq!(m.len, 0);
    }

    #[test]
    fn test_body_shorter_than_prefix() {
        assert!(leading_match("!", "!!", true).is_none());
        assert_eq!(leading_match("!!", "!!", true).unwrap().len, 2);
    }
}
