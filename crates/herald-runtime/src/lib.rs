//! Herald Runtime - configuration, logging and the message loop.
//!
//! This crate provides:
//! - Layered configuration (`HeraldConfig`, `ConfigLoader`)
//! - Logging setup over `tracing-subscriber`
//! - [`HeraldRuntime`], which builds a dispatcher from configuration and
//!   runs it over a stream of inbound messages
//!
//! ```ignore
//! use herald_runtime::HeraldRuntime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = HeraldRuntime::builder(bot).build()?;
//!     runtime.run(messages).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    CommandsConfig, ConfigError, ConfigLoader, ConfigResult, HeraldConfig, LoggingConfig,
    RuntimeConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{HeraldRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
