//! Command definitions.
//!
//! A [`CommandDefinition`] pairs a primary [`CommandKey`] and its aliases with
//! a handler, optional lifecycle hooks and descriptive [`CommandMeta`].
//! Definitions are immutable once built; the registry shares them as
//! `Arc<CommandDefinition>` and replaces them wholesale on change.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::handler::{BoxedCommandHandler, CommandHandler, ErrorHook, RunHook};

// ============================================================================
// Keys
// ============================================================================

/// An uncompiled key, as written by a user or in a definition file.
///
/// Deserializes from either a bare string or `{ pattern = "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    Literal(String),
    Pattern { pattern: String },
}

impl KeySpec {
    /// A pattern key. The pattern must match the whole command token.
    pub fn pattern(pattern: impl Into<String>) -> Self {
        KeySpec::Pattern {
            pattern: pattern.into(),
        }
    }

    /// Compiles the spec into a [`CommandKey`].
    pub fn compile(&self) -> RegistryResult<CommandKey> {
        match self {
            KeySpec::Literal(s) => CommandKey::literal(s.clone()),
            KeySpec::Pattern { pattern } => CommandKey::pattern(pattern),
        }
    }
}

impl From<&str> for KeySpec {
    fn from(s: &str) -> Self {
        KeySpec::Literal(s.to_string())
    }
}

impl From<String> for KeySpec {
    fn from(s: String) -> Self {
        KeySpec::Literal(s)
    }
}

/// A compiled command key: a literal word or an anchored pattern.
#[derive(Clone)]
pub enum CommandKey {
    Literal(String),
    Pattern { source: String, regex: Regex },
}

impl CommandKey {
    pub fn literal(key: impl Into<String>) -> RegistryResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(RegistryError::EmptyKey);
        }
        Ok(CommandKey::Literal(key))
    }

    pub fn pattern(source: &str) -> RegistryResult<Self> {
        if source.is_empty() {
            return Err(RegistryError::EmptyKey);
        }
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| {
            RegistryError::InvalidPattern {
                pattern: source.to_string(),
                source: e,
            }
        })?;
        Ok(CommandKey::Pattern {
            source: source.to_string(),
            regex,
        })
    }

    /// The string a key is registered and looked up under.
    ///
    /// Literal keys are their own identity; pattern keys render as
    /// `/pattern/`.
    pub fn identity(&self) -> String {
        match self {
            CommandKey::Literal(s) => s.clone(),
            CommandKey::Pattern { source, .. } => format!("/{source}/"),
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, CommandKey::Pattern { .. })
    }

    /// Tests a command token against this key.
    ///
    /// With `fold` set, the token is lowercased before comparison and
    /// literal keys are compared lowercased as well.
    pub fn matches(&self, token: &str, fold: bool) -> bool {
        match self {
            CommandKey::Literal(key) if fold => key.to_lowercase() == token.to_lowercase(),
            CommandKey::Literal(key) => key == token,
            CommandKey::Pattern { regex, .. } if fold => regex.is_match(&token.to_lowercase()),
            CommandKey::Pattern { regex, .. } => regex.is_match(token),
        }
    }
}

impl fmt::Debug for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity())
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

impl PartialEq for CommandKey {
    fn eq(&self, other: &Self) -> bool {
        self.is_pattern() == other.is_pattern() && self.identity() == other.identity()
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// A fixed reply attached to a definition, sent via
/// [`CommandContext::respond`](crate::context::CommandContext::respond).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTemplate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub color: Option<u32>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Descriptive and admission metadata of a definition.
///
/// Every field is optional so that [`HandlerOptions::defaults`] can fill in
/// whatever a definition leaves unset. Explicit values always win.
///
/// [`HandlerOptions::defaults`]: crate::options::HandlerOptions::defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandMeta {
    pub name: Option<String>,
    pub description: Option<String>,
    pub usage: Option<String>,
    pub category: Option<String>,
    pub user_permissions: Option<Vec<String>>,
    pub bot_permissions: Option<Vec<String>>,
    pub owner_only: Option<bool>,
    pub cooldown_secs: Option<u64>,
    pub disabled: Option<bool>,
    pub response: Option<ResponseTemplate>,
}

impl CommandMeta {
    /// Fills every unset field from `defaults`.
    pub fn merge_defaults(&mut self, defaults: &CommandMeta) {
        fn fill<T: Clone>(slot: &mut Option<T>, default: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(default);
            }
        }

        fill(&mut self.name, &defaults.name);
        fill(&mut self.description, &defaults.description);
        fill(&mut self.usage, &defaults.usage);
        fill(&mut self.category, &defaults.category);
        fill(&mut self.user_permissions, &defaults.user_permissions);
        fill(&mut self.bot_permissions, &defaults.bot_permissions);
        fill(&mut self.owner_only, &defaults.owner_only);
        fill(&mut self.cooldown_secs, &defaults.cooldown_secs);
        fill(&mut self.disabled, &defaults.disabled);
        fill(&mut self.response, &defaults.response);
    }
}

// ============================================================================
// CommandDefinition
// ============================================================================

/// A registered command.
#[derive(Clone)]
pub struct CommandDefinition {
    key: CommandKey,
    aliases: Vec<CommandKey>,
    handler: BoxedCommandHandler,
    on_run: Option<Arc<dyn RunHook>>,
    on_error: Option<Arc<dyn ErrorHook>>,
    meta: CommandMeta,
    source: Option<PathBuf>,
}

impl CommandDefinition {
    /// Starts building a definition with a literal or pattern key.
    pub fn builder<H: CommandHandler>(key: impl Into<KeySpec>, handler: H) -> CommandBuilder {
        CommandBuilder::new(key, Arc::new(handler))
    }

    pub fn key(&self) -> &CommandKey {
        &self.key
    }

    pub fn aliases(&self) -> &[CommandKey] {
        &self.aliases
    }

    pub fn handler(&self) -> &BoxedCommandHandler {
        &self.handler
    }

    pub fn run_hook(&self) -> Option<&Arc<dyn RunHook>> {
        self.on_run.as_ref()
    }

    pub fn error_hook(&self) -> Option<&Arc<dyn ErrorHook>> {
        self.on_error.as_ref()
    }

    pub fn meta(&self) -> &CommandMeta {
        &self.meta
    }

    /// The file this definition was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Display name, falling back to the primary key.
    pub fn name(&self) -> String {
        self.meta.name.clone().unwrap_or_else(|| self.key.identity())
    }

    pub fn user_permissions(&self) -> &[String] {
        self.meta.user_permissions.as_deref().unwrap_or(&[])
    }

    pub fn bot_permissions(&self) -> &[String] {
        self.meta.bot_permissions.as_deref().unwrap_or(&[])
    }

    pub fn is_owner_only(&self) -> bool {
        self.meta.owner_only.unwrap_or(false)
    }

    pub fn cooldown(&self) -> Option<Duration> {
        self.meta
            .cooldown_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn is_disabled(&self) -> bool {
        self.meta.disabled.unwrap_or(false)
    }

    /// Returns `true` if the primary key or any alias accepts `token`.
    pub fn matches(&self, token: &str, fold: bool) -> bool {
        self.key.matches(token, fold) || self.aliases.iter().any(|a| a.matches(token, fold))
    }

    pub(crate) fn merge_defaults(&mut self, defaults: &CommandMeta) {
        self.meta.merge_defaults(defaults);
    }

    pub(crate) fn with_disabled(&self, disabled: bool) -> Self {
        let mut next = self.clone();
        next.meta.disabled = Some(disabled);
        next
    }
}

impl fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("key", &self.key)
            .field("aliases", &self.aliases)
            .field("meta", &self.meta)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Builder for [`CommandDefinition`]. Keys are compiled in [`build`](Self::build).
pub struct CommandBuilder {
    key: KeySpec,
    aliases: Vec<KeySpec>,
    handler: BoxedCommandHandler,
    on_run: Option<Arc<dyn RunHook>>,
    on_error: Option<Arc<dyn ErrorHook>>,
    meta: CommandMeta,
    source: Option<PathBuf>,
}

impl CommandBuilder {
    /// Creates a builder around an already shared handler.
    pub fn new(key: impl Into<KeySpec>, handler: BoxedCommandHandler) -> Self {
        Self {
            key: key.into(),
            aliases: Vec::new(),
            handler,
            on_run: None,
            on_error: None,
            meta: CommandMeta::default(),
            source: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<KeySpec>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn aliases<I, K>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<KeySpec>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn on_run<H: RunHook>(mut self, hook: H) -> Self {
        self.on_run = Some(Arc::new(hook));
        self
    }

    pub fn on_error<H: ErrorHook>(mut self, hook: H) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub(crate) fn hooks(
        mut self,
        on_run: Option<Arc<dyn RunHook>>,
        on_error: Option<Arc<dyn ErrorHook>>,
    ) -> Self {
        self.on_run = on_run;
        self.on_error = on_error;
        self
    }

    /// Replaces the whole metadata block.
    pub fn meta(mut self, meta: CommandMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.meta.usage = Some(usage.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.meta.category = Some(category.into());
        self
    }

    pub fn user_permissions<I, S>(mut self, perms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta.user_permissions = Some(perms.into_iter().map(Into::into).collect());
        self
    }

    pub fn bot_permissions<I, S>(mut self, perms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta.bot_permissions = Some(perms.into_iter().map(Into::into).collect());
        self
    }

    pub fn owner_only(mut self, owner_only: bool) -> Self {
        self.meta.owner_only = Some(owner_only);
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.meta.cooldown_secs = Some(cooldown.as_secs());
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.meta.disabled = Some(disabled);
        self
    }

    pub fn response(mut self, response: ResponseTemplate) -> Self {
        self.meta.response = Some(response);
        self
    }

    pub(crate) fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Compiles all keys and produces the definition.
    ///
    /// Fails on empty keys and on patterns that do not compile. An alias equal
    /// to the definition's own key is dropped.
    pub fn build(self) -> RegistryResult<CommandDefinition> {
        let key = self.key.compile()?;
        let mut aliases: Vec<CommandKey> = Vec::with_capacity(self.aliases.len());
        for spec in &self.aliases {
            let alias = spec.compile()?;
            if alias != key && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }

        Ok(CommandDefinition {
            key,
            aliases,
            handler: self.handler,
            on_run: self.on_run,
            on_error: self.on_error,
            meta: self.meta,
            source: self.source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CommandContext;
    use herald_core::BoxError;

    async fn noop(_ctx: Arc<CommandContext>) -> Result<(), BoxError> {
        Ok(())
    }

    #[test]
    fn test_literal_matching() {
        let key = CommandKey::literal("Ping").unwrap();
        assert!(key.matches("ping", true));
        assert!(key.matches("PING", true));
        assert!(!key.matches("ping", false));
        assert!(key.matches("Ping", false));
    }

    #[test]
    fn test_pattern_matches_whole_token() {
        let key = CommandKey::pattern("c(o|ou)lou?r").unwrap();
        assert!(key.matches("color", false));
        assert!(key.matches("COLOUR", true));
        assert!(!key.matches("colors", false));
        assert!(!key.matches("xcolor", false));
        assert_eq!(key.identity(), "/c(o|ou)lou?r/");
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(matches!(CommandKey::literal(""), Err(RegistryError::EmptyKey)));
        assert!(matches!(
            CommandKey::pattern("("),
            Err(RegistryError::InvalidPattern { .. })
        ));
        let err = CommandDefinition::builder("ok", noop)
            .alias(KeySpec::pattern("[z-a]"))
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn test_build_dedups_aliases() {
        let def = CommandDefinition::builder("color", noop)
            .aliases(["colour", "color", "colour"])
            .build()
            .unwrap();
        assert_eq!(def.aliases().len(), 1);
        assert!(def.matches("colour", true));
        assert!(def.matches("Color", true));
    }

    #[test]
    fn test_merge_defaults_keeps_explicit_fields() {
        let defaults = CommandMeta {
            category: Some("general".into()),
            owner_only: Some(true),
            cooldown_secs: Some(3),
            ..CommandMeta::default()
        };
        let mut def = CommandDefinition::builder("ban", noop)
            .owner_only(false)
            .build()
            .unwrap();
        def.merge_defaults(&defaults);

        assert!(!def.is_owner_only());
        assert_eq!(def.meta().category.as_deref(), Some("general"));
        assert_eq!(def.cooldown(), Some(Duration::from_secs(3)));
        assert!(!def.is_disabled());
    }

    #[test]
    fn test_key_spec_deserialize() {
        #[derive(Deserialize)]
        struct Doc {
            keys: Vec<KeySpec>,
        }
        let doc: Doc = toml::from_str(r#"keys = ["a", { pattern = "b+" }]"#).unwrap();
        assert_eq!(doc.keys[0], KeySpec::Literal("a".into()));
        assert_eq!(doc.keys[1], KeySpec::pattern("b+"));
    }
}
