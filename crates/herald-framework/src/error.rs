//! Error types for the Herald framework.

use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use herald_core::BoxError;

/// Which stage of a dispatch produced a [`CommandError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// A middleware returned `Err`.
    Middleware,
    /// The handler returned `Err`.
    Handler,
    /// The handler did not finish within the configured timeout.
    TimedOut,
    /// The handler panicked.
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Middleware => "middleware",
            FailureKind::Handler => "handler",
            FailureKind::TimedOut => "timeout",
            FailureKind::Panicked => "panic",
        };
        f.write_str(s)
    }
}

/// A failure raised while admitting or executing a command.
///
/// Middleware failures are *non-fatal*: they are shown to the invoker but
/// kept out of the diagnostic log. Everything else is fatal.
///
/// The wrapped error is shared so the value can travel through the event
/// channel and reach both hooks and the reporter.
#[derive(Debug, Clone, Error)]
#[error("{kind} failure: {source}")]
pub struct CommandError {
    kind: FailureKind,
    non_fatal: bool,
    #[source]
    source: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl CommandError {
    fn new(kind: FailureKind, source: BoxError) -> Self {
        Self {
            kind,
            non_fatal: kind == FailureKind::Middleware,
            source: Arc::from(source),
        }
    }

    /// Wraps an error raised by a middleware.
    pub fn middleware(source: impl Into<BoxError>) -> Self {
        Self::new(FailureKind::Middleware, source.into())
    }

    /// Wraps an error returned by a handler.
    pub fn handler(source: impl Into<BoxError>) -> Self {
        Self::new(FailureKind::Handler, source.into())
    }

    /// A handler that ran past `limit`.
    pub fn timed_out(limit: Duration) -> Self {
        Self::new(
            FailureKind::TimedOut,
            format!("command timed out after {}ms", limit.as_millis()).into(),
        )
    }

    /// A handler that panicked with `message`.
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::new(
            FailureKind::Panicked,
            format!("command panicked: {}", message.into()).into(),
        )
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Returns `true` if this failure should not reach the diagnostic log.
    pub fn is_non_fatal(&self) -> bool {
        self.non_fatal
    }

    /// The failure detail shown to the invoker.
    pub fn message(&self) -> String {
        self.source.to_string()
    }

    /// Attempts to view the wrapped error as a concrete type.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }
}

/// Extracts the message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Errors produced by the command registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A command or alias key was empty.
    #[error("command key must not be empty")]
    EmptyKey,

    /// A pattern key failed to compile.
    #[error("invalid command pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// An alias equals the primary key of another definition.
    #[error("alias '{alias}' collides with the primary key of '{owner}'")]
    AliasCollision {
        /// The offending alias.
        alias: String,
        /// The definition whose primary key it shadows.
        owner: String,
    },

    /// No definition is registered under the key.
    #[error("no command registered under '{0}'")]
    NotFound(String),

    /// A definition file named a handler missing from the catalog.
    #[error("no handler named '{0}' in the handler catalog")]
    UnknownHandler(String),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors produced while loading definition files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("rejected definition in '{}': {source}", path.display())]
    Registry {
        path: PathBuf,
        #[source]
        source: RegistryError,
    },
}

impl LoadError {
    /// The file or directory the error refers to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            LoadError::Io { path, .. }
            | LoadError::Parse { path, .. }
            | LoadError::Registry { path, .. } => path,
        }
    }
}

/// Result type for loader operations.
pub type LoadResult<T> = Result<T, LoadError>;
