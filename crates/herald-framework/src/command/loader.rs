//! Definition files and the handler catalog.
//!
//! Handler code is compiled into the binary; definition files only describe
//! commands. A definition file is a `*.toml` manifest with a top-level
//! `command` key:
//!
//! ```toml
//! command = "color"
//! aliases = ["colour", { pattern = "col(ou?)r?" }]
//! handler = "color"          # catalog name, defaults to the command key
//! description = "Set your name color"
//! usage = "color <hex>"
//! category = "customization"
//! user_permissions = ["manage_roles"]
//! cooldown_secs = 5
//!
//! [response]
//! title = "Color"
//! body = "Color updated."
//! ```
//!
//! Handlers are looked up by name in a [`HandlerCatalog`], filled either
//! programmatically or at link time through [`command_handler!`]:
//!
//! ```rust,ignore
//! async fn color(ctx: Arc<CommandContext>) -> Result<(), BoxError> { ... }
//!
//! herald_framework::command_handler!("color", color);
//! ```
//!
//! [`command_handler!`]: crate::command_handler

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use linkme::distributed_slice;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::definition::{CommandBuilder, CommandDefinition, CommandMeta, KeySpec};
use super::registry::CommandRegistry;
use crate::error::{LoadError, LoadResult, RegistryError};
use crate::handler::{BoxedCommandHandler, CommandHandler, ErrorHook, RunHook};

// =============================================================================
// Handler catalog
// =============================================================================

/// A handler together with its optional lifecycle hooks.
#[derive(Clone)]
pub struct HandlerEntry {
    handler: BoxedCommandHandler,
    on_run: Option<Arc<dyn RunHook>>,
    on_error: Option<Arc<dyn ErrorHook>>,
}

impl HandlerEntry {
    pub fn new<H: CommandHandler>(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
            on_run: None,
            on_error: None,
        }
    }

    pub fn on_run<H: RunHook>(mut self, hook: H) -> Self {
        self.on_run = Some(Arc::new(hook));
        self
    }

    pub fn on_error<H: ErrorHook>(mut self, hook: H) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    fn builder(&self, key: KeySpec) -> CommandBuilder {
        CommandBuilder::new(key, Arc::clone(&self.handler))
            .hooks(self.on_run.clone(), self.on_error.clone())
    }
}

/// A link-time handler registration, produced by [`command_handler!`].
///
/// [`command_handler!`]: crate::command_handler
pub struct HandlerRegistration {
    pub name: &'static str,
    pub factory: fn() -> HandlerEntry,
}

/// Registry of handlers contributed with [`command_handler!`].
///
/// [`command_handler!`]: crate::command_handler
#[distributed_slice]
pub static COMMAND_HANDLERS: [HandlerRegistration];

/// Named handlers available to definition files.
#[derive(Clone, Default)]
pub struct HandlerCatalog {
    entries: HashMap<String, HandlerEntry>,
}

impl HandlerCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from every handler registered via
    /// [`command_handler!`](crate::command_handler).
    ///
    /// If the same name is registered more than once a warning is emitted and
    /// the **first** registration wins.
    pub fn collect_all() -> Self {
        let mut catalog = Self::new();
        for registration in COMMAND_HANDLERS {
            if catalog.contains(registration.name) {
                warn!(
                    handler = registration.name,
                    "Multiple handlers registered under the same name, using first"
                );
                continue;
            }
            catalog
                .entries
                .insert(registration.name.to_string(), (registration.factory)());
        }
        debug!(count = catalog.len(), "Collected linked command handlers");
        catalog
    }

    /// Adds a handler under `name`, replacing any previous one.
    pub fn insert<H: CommandHandler>(&mut self, name: impl Into<String>, handler: H) {
        self.entries.insert(name.into(), HandlerEntry::new(handler));
    }

    /// Adds a handler with hooks under `name`, replacing any previous one.
    pub fn insert_entry(&mut self, name: impl Into<String>, entry: HandlerEntry) {
        self.entries.insert(name.into(), entry);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with<H: CommandHandler>(mut self, name: impl Into<String>, handler: H) -> Self {
        self.insert(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&HandlerEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for HandlerCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("HandlerCatalog")
            .field("handlers", &names)
            .finish()
    }
}

/// Registers a handler in the link-time catalog.
///
/// ```rust,ignore
/// async fn ping(_ctx: Arc<CommandContext>) -> Result<&'static str, BoxError> {
///     Ok("pong")
/// }
///
/// command_handler!("ping", ping);
///
/// // With lifecycle hooks:
/// command_handler!("ban", entry = HandlerEntry::new(ban).on_error(log_ban_failure));
/// ```
#[macro_export]
macro_rules! command_handler {
    ($name:expr, entry = $entry:expr) => {
        const _: () = {
            #[$crate::linkme::distributed_slice($crate::command::COMMAND_HANDLERS)]
            #[linkme(crate = $crate::linkme)]
            static REGISTRATION: $crate::command::HandlerRegistration =
                $crate::command::HandlerRegistration {
                    name: $name,
                    factory: || $entry,
                };
        };
    };
    ($name:expr, $handler:expr) => {
        const _: () = {
            #[$crate::linkme::distributed_slice($crate::command::COMMAND_HANDLERS)]
            #[linkme(crate = $crate::linkme)]
            static REGISTRATION: $crate::command::HandlerRegistration =
                $crate::command::HandlerRegistration {
                    name: $name,
                    factory: || $crate::command::HandlerEntry::new($handler),
                };
        };
    };
}

// =============================================================================
// Manifests
// =============================================================================

#[derive(Debug, Deserialize)]
struct CommandManifest {
    command: KeySpec,
    #[serde(default)]
    aliases: Vec<KeySpec>,
    #[serde(default)]
    handler: Option<String>,
    #[serde(flatten)]
    meta: CommandMeta,
}

impl CommandManifest {
    fn into_definition(self, catalog: &HandlerCatalog, path: &Path) -> Result<CommandDefinition, RegistryError> {
        let handler_name = match (&self.handler, &self.command) {
            (Some(name), _) => name.clone(),
            (None, KeySpec::Literal(key)) => key.clone(),
            (None, spec @ KeySpec::Pattern { .. }) => {
                return Err(RegistryError::UnknownHandler(spec.compile()?.identity()));
            }
        };
        let entry = catalog
            .get(&handler_name)
            .ok_or(RegistryError::UnknownHandler(handler_name))?;

        entry
            .builder(self.command)
            .aliases(self.aliases)
            .meta(self.meta)
            .source(path)
            .build()
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Outcome of a directory load.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Primary keys registered (or re-registered) by this load.
    pub loaded: Vec<String>,
    /// Files that are not definition files.
    pub skipped: Vec<PathBuf>,
    /// Definition files that were rejected, with the reason.
    pub rejected: Vec<LoadError>,
    /// Keys dropped because their definition file disappeared.
    pub removed: Vec<String>,
}

impl LoadReport {
    /// Returns `true` if nothing was rejected.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Loads definition files into a [`CommandRegistry`].
///
/// Remembers which file each definition came from, so loading the same
/// directory again replaces edited definitions, re-keys renamed ones and
/// drops those whose file is gone.
pub struct CommandLoader {
    registry: Arc<CommandRegistry>,
    catalog: HandlerCatalog,
    sources: Mutex<HashMap<PathBuf, String>>,
}

impl CommandLoader {
    pub fn new(registry: Arc<CommandRegistry>, catalog: HandlerCatalog) -> Self {
        Self {
            registry,
            catalog,
            sources: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &HandlerCatalog {
        &self.catalog
    }

    /// Recursively loads every definition file under `dir`.
    ///
    /// Fails only if `dir` itself cannot be read. Problems with individual
    /// files end up in [`LoadReport::rejected`].
    pub fn load_directory(&self, dir: impl AsRef<Path>) -> LoadResult<LoadReport> {
        let dir = dir.as_ref();
        std::fs::read_dir(dir).map_err(|source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut report = LoadReport::default();
        let mut seen = HashSet::new();

        for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(dir).to_path_buf();
                    report.rejected.push(LoadError::Io {
                        path,
                        source: e.into(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            seen.insert(path.to_path_buf());
            match self.load_file(path) {
                Ok(Some(def)) => report.loaded.push(def.key().identity()),
                Ok(None) => report.skipped.push(path.to_path_buf()),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Rejected command definition");
                    report.rejected.push(e);
                }
            }
        }

        let vanished: Vec<(PathBuf, String)> = {
            let sources = self.sources.lock();
            sources
                .iter()
                .filter(|(path, _)| path.starts_with(dir) && !seen.contains(*path))
                .map(|(path, key)| (path.clone(), key.clone()))
                .collect()
        };
        for (path, key) in vanished {
            self.sources.lock().remove(&path);
            if self.registry.remove(&key).is_some() {
                debug!(command = %key, path = %path.display(), "Definition file removed");
                report.removed.push(key);
            }
        }

        info!(
            dir = %dir.display(),
            loaded = report.loaded.len(),
            rejected = report.rejected.len(),
            removed = report.removed.len(),
            "Loaded command definitions"
        );
        Ok(report)
    }

    /// Loads a single file.
    ///
    /// Returns `Ok(None)` when the file is not a definition file.
    pub fn load_file(&self, path: &Path) -> LoadResult<Option<Arc<CommandDefinition>>> {
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            debug!(path = %path.display(), "Skipping non-definition file");
            return Ok(None);
        }

        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table: toml::Table = toml::from_str(&text).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if !table.contains_key("command") {
            debug!(path = %path.display(), "Skipping TOML file without a command key");
            return Ok(None);
        }

        let manifest: CommandManifest = toml::Value::Table(table).try_into().map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let rejected = |source| LoadError::Registry {
            path: path.to_path_buf(),
            source,
        };
        let def = manifest
            .into_definition(&self.catalog, path)
            .map_err(rejected)?;

        // Supersede whatever this file registered last time. A rejected
        // file keeps its previous definition and stays tracked.
        let previous = self.sources.lock().get(path).cloned();
        let stored = self
            .registry
            .replace(previous.as_deref(), def)
            .map_err(rejected)?;
        self.sources
            .lock()
            .insert(path.to_path_buf(), stored.key().identity());
        debug!(command = %stored.key(), path = %path.display(), "Loaded command definition");
        Ok(Some(stored))
    }
}

impl std::fmt::Debug for CommandLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandLoader")
            .field("catalog", &self.catalog)
            .field("tracked_files", &self.sources.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::context::CommandContext;
    use herald_core::BoxError;

    async fn ok(_ctx: Arc<CommandContext>) -> Result<(), BoxError> {
        Ok(())
    }

    async fn linked(_ctx: Arc<CommandContext>) -> Result<&'static str, BoxError> {
        Ok("linked")
    }

    crate::command_handler!("linked", linked);

    #[test]
    fn test_collect_all_sees_linked_handlers() {
        let catalog = HandlerCatalog::collect_all();
        assert!(catalog.contains("linked"));
        assert!(!catalog.contains("ping"));
    }

    fn loader() -> (Arc<CommandRegistry>, CommandLoader) {
        let registry = Arc::new(CommandRegistry::default());
        let catalog = HandlerCatalog::new().with("ping", ok).with("color", ok);
        (Arc::clone(&registry), CommandLoader::new(registry, catalog))
    }

    #[test]
    fn test_load_directory_recurses_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("fun")).unwrap();
        fs::write(dir.path().join("ping.toml"), "command = \"ping\"\n").unwrap();
        fs::write(
            dir.path().join("fun/color.toml"),
            "command = \"color\"\naliases = [\"colour\"]\ncategory = \"fun\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "# commands").unwrap();
        fs::write(dir.path().join("settings.toml"), "verbose = true\n").unwrap();

        let (registry, loader) = loader();
        let report = loader.load_directory(dir.path()).unwrap();

        assert!(report.is_clean());
        assert_eq!(report.loaded, vec!["color", "ping"]);
        assert_eq!(report.skipped.len(), 2);
        let color = registry.find("colour", true).unwrap();
        assert_eq!(color.meta().category.as_deref(), Some("fun"));
        assert!(color.source().unwrap().ends_with("fun/color.toml"));
    }

    #[test]
    fn test_reload_replaces_and_drops() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ping.toml");
        fs::write(&file, "command = \"ping\"\nusage = \"v1\"\n").unwrap();

        let (registry, loader) = loader();
        loader.load_directory(dir.path()).unwrap();
        assert_eq!(registry.get("ping").unwrap().meta().usage.as_deref(), Some("v1"));

        fs::write(&file, "command = \"pong\"\nhandler = \"ping\"\n").unwrap();
        loader.load_directory(dir.path()).unwrap();
        assert!(registry.get("ping").is_none());
        assert!(registry.get("pong").is_some());
        assert_eq!(registry.len(), 1);

        fs::remove_file(&file).unwrap();
        let report = loader.load_directory(dir.path()).unwrap();
        assert_eq!(report.removed, vec!["pong"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rejected_reload_still_tracks_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ping.toml");
        fs::write(&file, "command = \"ping\"\n").unwrap();

        let (registry, loader) = loader();
        registry
            .register(CommandDefinition::builder("ban", ok).build().unwrap())
            .unwrap();
        loader.load_directory(dir.path()).unwrap();

        fs::write(&file, "command = \"ping\"\naliases = [\"ban\"]\n").unwrap();
        let report = loader.load_directory(dir.path()).unwrap();
        assert_eq!(report.rejected.len(), 1);
        assert!(registry.find("ping", true).is_some());

        fs::remove_file(&file).unwrap();
        let report = loader.load_directory(dir.path()).unwrap();
        assert_eq!(report.removed, vec!["ping"]);
        assert!(registry.get("ping").is_none());
        assert!(registry.get("ban").is_some());
    }

    #[test]
    fn test_invalid_definitions_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.toml"), "command = \"nohandler\"\n").unwrap();
        fs::write(dir.path().join("b.toml"), "command = { pattern = \"(\" }\nhandler = \"ping\"\n").unwrap();
        fs::write(dir.path().join("c.toml"), "command = [").unwrap();
        fs::write(dir.path().join("d.toml"), "command = \"\"\nhandler = \"ping\"\n").unwrap();

        let (registry, loader) = loader();
        let report = loader.load_directory(dir.path()).unwrap();

        assert_eq!(report.rejected.len(), 4);
        assert!(matches!(
            report.rejected[0],
            LoadError::Registry { source: RegistryError::UnknownHandler(_), .. }
        ));
        assert!(matches!(
            report.rejected[1],
            LoadError::Registry { source: RegistryError::InvalidPattern { .. }, .. }
        ));
        assert!(matches!(report.rejected[2], LoadError::Parse { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let (_, loader) = loader();
        let err = loader.load_directory("/definitely/not/here").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_pattern_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("color.toml"),
            "command = { pattern = \"colou?r\" }\nhandler = \"color\"\ndisabled = true\n",
        )
        .unwrap();

        let (registry, loader) = loader();
        loader.load_directory(dir.path()).unwrap();
        assert!(registry.find("colour", true).is_none());
        assert!(!registry.toggle("/colou?r/").unwrap());
        assert!(registry.find("colour", true).is_some());
    }
}
