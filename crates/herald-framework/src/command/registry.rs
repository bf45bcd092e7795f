//! The command registry.
//!
//! Definitions live in an immutable [`Snapshot`] behind a lock. Every
//! mutation clones the snapshot, edits the copy and swaps it in, so a reader
//! holding the previous snapshot keeps a consistent view and never sees a
//! half-replaced entry. The lock is only held to clone or swap an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::definition::{CommandDefinition, CommandMeta};
use crate::error::{RegistryError, RegistryResult};

/// An immutable view of the registry.
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    entries: Vec<Arc<CommandDefinition>>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    /// Definitions in registration order.
    pub fn entries(&self) -> &[Arc<CommandDefinition>] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&Arc<CommandDefinition>> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    /// First enabled definition, in registration order, whose key or alias
    /// accepts `token`.
    pub fn find(&self, token: &str, fold: bool) -> Option<&Arc<CommandDefinition>> {
        self.entries
            .iter()
            .find(|def| !def.is_disabled() && def.matches(token, fold))
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, def)| (def.key().identity(), i))
            .collect();
    }

    fn check_collisions(&self, def: &CommandDefinition) -> RegistryResult<()> {
        let own = def.key().identity();

        for alias in def.aliases() {
            let alias = alias.identity();
            if let Some(&i) = self.index.get(&alias) {
                let owner = self.entries[i].key().identity();
                if owner != own {
                    return Err(RegistryError::AliasCollision { alias, owner });
                }
            }
        }

        for other in &self.entries {
            let owner = other.key().identity();
            if owner == own {
                continue;
            }
            if other.aliases().iter().any(|a| a.identity() == own) {
                return Err(RegistryError::AliasCollision { alias: own, owner });
            }
        }

        Ok(())
    }
}

/// Registry of command definitions keyed by primary key.
///
/// # Example
///
/// ```rust,ignore
/// let registry = CommandRegistry::new(options.defaults.clone());
/// registry.register(CommandDefinition::builder("ping", ping).build()?)?;
///
/// assert!(registry.find("PING", true).is_some());
/// registry.toggle("ping")?;
/// assert!(registry.find("ping", true).is_none());
/// ```
#[derive(Debug, Default)]
pub struct CommandRegistry {
    defaults: CommandMeta,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl CommandRegistry {
    /// Creates an empty registry that merges `defaults` into every definition.
    pub fn new(defaults: CommandMeta) -> Self {
        Self {
            defaults,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    fn update<R>(&self, f: impl FnOnce(&mut Snapshot) -> RegistryResult<R>) -> RegistryResult<R> {
        let mut guard = self.snapshot.write();
        let mut next = Snapshot::clone(&guard);
        let out = f(&mut next)?;
        *guard = Arc::new(next);
        Ok(out)
    }

    /// Inserts `def`, or replaces the definition registered under the same
    /// primary key while keeping its position.
    ///
    /// Unset metadata is filled from the registry defaults first.
    pub fn register(&self, def: CommandDefinition) -> RegistryResult<Arc<CommandDefinition>> {
        self.replace(None, def)
    }

    /// Like [`register`](Self::register), but first drops the definition
    /// under `previous` when it differs from `def`'s key.
    ///
    /// Both steps apply together or not at all: on error the registry is
    /// left exactly as it was.
    pub fn replace(
        &self,
        previous: Option<&str>,
        mut def: CommandDefinition,
    ) -> RegistryResult<Arc<CommandDefinition>> {
        def.merge_defaults(&self.defaults);
        let def = Arc::new(def);
        let key = def.key().identity();

        self.update(|snap| {
            if let Some(old) = previous.filter(|old| *old != key) {
                if let Some(i) = snap.index.get(old).copied() {
                    debug!(command = %old, "Dropping superseded command definition");
                    snap.entries.remove(i);
                    snap.reindex();
                }
            }
            snap.check_collisions(&def)?;
            match snap.index.get(&key) {
                Some(&i) => {
                    debug!(command = %key, "Replacing command definition");
                    snap.entries[i] = Arc::clone(&def);
                }
                None => {
                    debug!(command = %key, "Registering command definition");
                    snap.index.insert(key.clone(), snap.entries.len());
                    snap.entries.push(Arc::clone(&def));
                }
            }
            Ok(())
        })?;

        Ok(def)
    }

    /// Removes the definition registered under `key`.
    pub fn remove(&self, key: &str) -> Option<Arc<CommandDefinition>> {
        self.update(|snap| {
            let i = snap
                .index
                .get(key)
                .copied()
                .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
            let removed = snap.entries.remove(i);
            snap.reindex();
            Ok(removed)
        })
        .inspect(|_| debug!(command = %key, "Removed command definition"))
        .ok()
    }

    /// Returns the definition registered under `key`, disabled or not.
    pub fn get(&self, key: &str) -> Option<Arc<CommandDefinition>> {
        self.snapshot().get(key).cloned()
    }

    /// Finds the first enabled definition accepting `token`.
    pub fn find(&self, token: &str, fold: bool) -> Option<Arc<CommandDefinition>> {
        let found = self.snapshot().find(token, fold).cloned();
        trace!(token, found = found.is_some(), "Command lookup");
        found
    }

    /// Flips the `disabled` flag of `key` and returns the new state.
    pub fn toggle(&self, key: &str) -> RegistryResult<bool> {
        self.update(|snap| {
            let i = *snap
                .index
                .get(key)
                .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
            let disabled = !snap.entries[i].is_disabled();
            snap.entries[i] = Arc::new(snap.entries[i].with_disabled(disabled));
            Ok(disabled)
        })
        .inspect(|disabled| debug!(command = %key, disabled, "Toggled command"))
    }

    /// Sets the `disabled` flag of `key`.
    pub fn set_disabled(&self, key: &str, disabled: bool) -> RegistryResult<()> {
        self.update(|snap| {
            let i = *snap
                .index
                .get(key)
                .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
            if snap.entries[i].is_disabled() != disabled {
                snap.entries[i] = Arc::new(snap.entries[i].with_disabled(disabled));
            }
            Ok(())
        })
    }

    /// All definitions in registration order.
    pub fn definitions(&self) -> Vec<Arc<CommandDefinition>> {
        self.snapshot().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        *self.snapshot.write() = Arc::new(Snapshot::default());
    }
}
