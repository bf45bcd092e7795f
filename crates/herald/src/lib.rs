//! # Herald
//!
//! A command dispatch framework for chat bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────┐     ┌───────┐     ┌────────────┐     ┌─────────┐
//! │   Runtime   │────▶│ Prefix │────▶│ Match │────▶│ Middleware │────▶│ Handler │
//! │ (msg stream)│     └────────┘     └───────┘     └────────────┘     └─────────┘
//! └─────────────┘                                        │                 │
//!                                                        ▼                 ▼
//!                                               MIDDLEWARE_ERROR   COMMAND_RAN / COMMAND_ERROR
//! ```
//!
//! - **Registry**: command definitions keyed by name or pattern, replaceable
//!   at runtime and reloadable from a directory of TOML files
//! - **Dispatcher**: resolves the prefix, matches the command, runs the
//!   middleware pipeline and the handler, and publishes one event per
//!   dispatch
//! - **Reporter**: turns handler failures into an error reply
//! - **Runtime**: configuration, logging and the message loop
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! async fn ping(ctx: Arc<CommandContext>) -> Result<&'static str, BoxError> {
//!     ctx.reply("pong").await?;
//!     Ok("pong")
//! }
//!
//! command_handler!("ping", ping);
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = HeraldRuntime::builder(my_bot()).build()?;
//!     runtime.run(gateway_messages()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `command` *(default)*: clap-based [`CommandArgs`](framework::CommandArgs)
//! - `toml-config` *(default)*: `herald.toml` configuration files
//! - `yaml-config`: `herald.yaml` configuration files
//! - `json-log`: JSON log output

pub use herald_core as core;
pub use herald_framework as framework;
pub use herald_runtime as runtime;

pub use herald_framework::command_handler;

/// Commonly used types for building bots.
///
/// ```rust,ignore
/// use herald::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use herald_runtime::{HeraldConfig, HeraldRuntime};

    // Core model
    pub use herald_core::{
        Author, Bot, BoxError, BoxedBot, DeliveryError, DeliveryResult, Embed, InboundMessage,
        MessageKind,
    };

    // Commands and dispatch
    pub use herald_framework::{
        CommandBuilder, CommandContext, CommandDefinition, CommandError, DispatchEvent,
        DispatchOutcome, Dispatcher, ErrorReporter, HandlerCatalog, HandlerEntry,
        HandlerOptions, Middleware, command_handler,
    };

    // Built-in gates
    pub use herald_framework::{CooldownGate, OwnerGate, PermissionChecker, PermissionGate};

    #[cfg(feature = "command")]
    pub use herald_framework::CommandArgs;
}
