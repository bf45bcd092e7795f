//! # Herald Framework
//!
//! The command dispatch core.
//!
//! This layer provides:
//! - A command registry with atomic replace-by-key and directory hot reload
//! - Prefix resolution (fixed, per-message, mention) and command matching
//! - An ordered middleware pipeline plus built-in permission, owner and
//!   cooldown gates
//! - The [`Dispatcher`], which runs handlers and lifecycle hooks and publishes
//!   one [`DispatchEvent`] per dispatch
//! - A default error reporter, replaceable at runtime
//! - Clap-based typed arguments (with `command` feature)

pub mod command;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod gates;
pub mod handler;
pub mod matcher;
pub mod middleware;
pub mod options;
pub mod prefix;
pub mod reporter;

#[cfg(feature = "command")]
pub mod args;

#[doc(hidden)]
pub use linkme;

pub use command::{
    CommandBuilder, CommandDefinition, CommandKey, CommandLoader, CommandMeta, CommandRegistry,
    HandlerCatalog, HandlerEntry, KeySpec, LoadReport, ResponseTemplate,
};
pub use context::CommandContext;
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherBuilder, IgnoreReason};
pub use error::{
    CommandError, FailureKind, LoadError, LoadResult, RegistryError, RegistryResult,
};
pub use event::{DispatchEvent, EventBus};
pub use gates::{CooldownGate, OwnerGate, PermissionChecker, PermissionGate};
pub use handler::{BoxedCommandHandler, CommandHandler, ErrorHook, RunHook};
pub use matcher::{Invocation, parse_invocation};
pub use middleware::{Middleware, MiddlewarePipeline, PipelineFlow};
pub use options::HandlerOptions;
pub use prefix::{IntoPrefixes, PrefixResolver, PrefixSource};
pub use reporter::{DefaultErrorReporter, ERROR_TITLE, ErrorReporter};

#[cfg(feature = "command")]
pub use args::{ArgsError, CommandArgs};
