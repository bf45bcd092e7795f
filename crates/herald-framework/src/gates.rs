//! Built-in admission middleware driven by definition metadata.
//!
//! Each gate is an ordinary [`Middleware`]; hosts opt in with
//! `dispatcher.add_middleware(...)`. Gates halt silently (`Ok(false)`) when a
//! command is not admitted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::context::CommandContext;
use crate::middleware::Middleware;
use herald_core::{BoxError, InboundMessage};

// ============================================================================
// PermissionGate
// ============================================================================

/// Answers permission questions on behalf of the chat platform.
#[async_trait]
pub trait PermissionChecker: Send + Sync + 'static {
    /// Returns `true` if `member_id` holds every permission in `permissions`
    /// in the context of `message` (its guild and channel).
    async fn has_permissions(
        &self,
        message: &InboundMessage,
        member_id: &str,
        permissions: &[String],
    ) -> Result<bool, BoxError>;
}

/// Halts commands whose declared permissions the invoker or the bot lacks.
pub struct PermissionGate {
    checker: Arc<dyn PermissionChecker>,
}

impl PermissionGate {
    pub fn new<C: PermissionChecker>(checker: C) -> Self {
        Self {
            checker: Arc::new(checker),
        }
    }
}

#[async_trait]
impl Middleware for PermissionGate {
    async fn check(&self, ctx: Arc<CommandContext>) -> Result<bool, BoxError> {
        let def = ctx.command();
        let message = ctx.message();

        let user_perms = def.user_permissions();
        if !user_perms.is_empty()
            && !self
                .checker
                .has_permissions(message, &message.author.id, user_perms)
                .await?
        {
            debug!(command = %def.key(), author = %message.author.id, "Invoker lacks permissions");
            return Ok(false);
        }

        let bot_perms = def.bot_permissions();
        if !bot_perms.is_empty()
            && !self
                .checker
                .has_permissions(message, ctx.bot().id(), bot_perms)
                .await?
        {
            debug!(command = %def.key(), "Bot lacks permissions");
            return Ok(false);
        }

        Ok(true)
    }

    fn name(&self) -> &str {
        "PermissionGate"
    }
}

// ============================================================================
// OwnerGate
// ============================================================================

/// Halts `owner_only` commands unless the author is an owner.
#[derive(Debug, Clone, Default)]
pub struct OwnerGate {
    owners: HashSet<String>,
}

impl OwnerGate {
    pub fn new<I, S>(owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            owners: owners.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owners.contains(user_id)
    }
}

#[async_trait]
impl Middleware for OwnerGate {
    async fn check(&self, ctx: Arc<CommandContext>) -> Result<bool, BoxError> {
        Ok(!ctx.command().is_owner_only() || self.is_owner(&ctx.author().id))
    }

    fn name(&self) -> &str {
        "OwnerGate"
    }
}

// ============================================================================
// CooldownGate
// ============================================================================

/// Halts repeated invocations of a command by the same author within the
/// definition's cooldown window.
///
/// The window starts when an invocation is admitted by this gate. Entries
/// whose windows have elapsed are swept every [`SWEEP_EVERY`] admissions.
#[derive(Debug, Default)]
pub struct CooldownGate {
    state: Mutex<CooldownState>,
}

/// Admissions between two sweeps of a [`CooldownGate`].
pub const SWEEP_EVERY: usize = 256;

#[derive(Debug, Default)]
struct CooldownState {
    /// (command, author) -> (admitted at, window at that time)
    last_used: HashMap<(String, String), (Instant, Duration)>,
    admitted: usize,
}

impl CooldownState {
    fn sweep(&mut self, now: Instant) {
        self.last_used
            .retain(|_, (at, window)| now.duration_since(*at) < *window);
    }
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops entries whose windows have elapsed.
    pub fn purge_expired(&self) {
        self.state.lock().sweep(Instant::now());
    }

    /// Number of (command, author) pairs currently tracked.
    pub fn tracked(&self) -> usize {
        self.state.lock().last_used.len()
    }
}

#[async_trait]
impl Middleware for CooldownGate {
    async fn check(&self, ctx: Arc<CommandContext>) -> Result<bool, BoxError> {
        let Some(window) = ctx.command().cooldown() else {
            return Ok(true);
        };

        let slot = (ctx.command().key().identity(), ctx.author().id.clone());
        let now = Instant::now();
        let mut state = self.state.lock();

        if let Some((at, _)) = state.last_used.get(&slot) {
            if now.duration_since(*at) < window {
                debug!(command = %slot.0, author = %slot.1, "Command on cooldown");
                return Ok(false);
            }
        }
        state.last_used.insert(slot, (now, window));
        state.admitted += 1;
        if state.admitted % SWEEP_EVERY == 0 {
            state.sweep(now);
            trace!(tracked = state.last_used.len(), "Swept cooldown entries");
        }
        Ok(true)
    }

    fn name(&self) -> &str {
        "CooldownGate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandDefinition;
    use crate::context::test_support::{MockBot, context};
    use herald_core::Author;

    async fn noop(_ctx: Arc<CommandContext>) -> Result<(), BoxError> {
        Ok(())
    }

    struct StaticChecker {
        granted: HashMap<String, Vec<String>>,
    }

    #[async_trait]
    impl PermissionChecker for StaticChecker {
        async fn has_permissions(
            &self,
            _message: &InboundMessage,
            member_id: &str,
            permissions: &[String],
        ) -> Result<bool, BoxError> {
            let granted = self.granted.get(member_id).cloned().unwrap_or_default();
            Ok(permissions.iter().all(|p| granted.contains(p)))
        }
    }

    fn checker(grants: &[(&str, &str)]) -> StaticChecker {
        let mut granted: HashMap<String, Vec<String>> = HashMap::new();
        for (member, perm) in grants {
            granted.entry(member.to_string()).or_default().push(perm.to_string());
        }
        StaticChecker { granted }
    }

    #[tokio::test]
    async fn test_permission_gate() {
        let def = CommandDefinition::builder("ban", noop)
            .user_permissions(["ban"])
            .bot_permissions(["ban"])
            .build()
            .unwrap();
        let bot = Arc::new(MockBot::new());

        let gate = PermissionGate::new(checker(&[("mod", "ban"), ("1000", "ban")]));
        let allowed = context(def.clone(), bot.clone(), Author::new("mod", "m"));
        let denied = context(def.clone(), bot.clone(), Author::new("pleb", "p"));
        assert!(gate.check(allowed).await.unwrap());
        assert!(!gate.check(denied).await.unwrap());

        let gate = PermissionGate::new(checker(&[("mod", "ban")]));
        let bot_lacks = context(def, bot, Author::new("mod", "m"));
        assert!(!gate.check(bot_lacks).await.unwrap());
    }

    #[tokio::test]
    async fn test_owner_gate() {
        let gate = OwnerGate::new(["root"]);
        let owner_only = CommandDefinition::builder("eval", noop)
            .owner_only(true)
            .build()
            .unwrap();
        let open = CommandDefinition::builder("ping", noop).build().unwrap();
        let bot = Arc::new(MockBot::new());

        assert!(gate.check(context(owner_only.clone(), bot.clone(), Author::new("root", "r"))).await.unwrap());
        assert!(!gate.check(context(owner_only, bot.clone(), Author::new("x", "x"))).await.unwrap());
        assert!(gate.check(context(open, bot, Author::new("x", "x"))).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_gate() {
        let gate = CooldownGate::new();
        let def = CommandDefinition::builder("daily", noop)
            .cooldown(Duration::from_secs(10))
            .build()
            .unwrap();
        let bot = Arc::new(MockBot::new());
        let alice = || context(def.clone(), bot.clone(), Author::new("alice", "a"));

        assert!(gate.check(alice()).await.unwrap());
        assert!(!gate.check(alice()).await.unwrap());
        assert!(gate.check(context(def.clone(), bot.clone(), Author::new("bob", "b"))).await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(gate.check(alice()).await.unwrap());

        gate.purge_expired();
        assert_eq!(gate.tracked(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_entries_swept_while_admitting() {
        let gate = CooldownGate::new();
        let def = CommandDefinition::builder("daily", noop)
            .cooldown(Duration::from_secs(10))
            .build()
            .unwrap();
        let bot = Arc::new(MockBot::new());

        for i in 0..SWEEP_EVERY - 1 {
            let author = Author::new(format!("user-{i}"), "u");
            assert!(gate.check(context(def.clone(), bot.clone(), author)).await.unwrap());
        }
        assert_eq!(gate.tracked(), SWEEP_EVERY - 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        let late = Author::new("late", "l");
        assert!(gate.check(context(def.clone(), bot.clone(), late)).await.unwrap());
        assert_eq!(gate.tracked(), 1);
    }
}
