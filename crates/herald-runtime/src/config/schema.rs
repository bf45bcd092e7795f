//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use herald_framework::HandlerOptions;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
///
/// ```toml
/// [logging]
/// level = "debug"
///
/// [handler]
/// allow_bot_authors = false
/// handler_timeout_ms = 5000
///
/// [commands]
/// prefixes = ["!", "?"]
/// directories = ["commands"]
/// owners = ["180000000000000000"]
///
/// [runtime]
/// channel_capacity = 256
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Dispatch options handed to the dispatcher unchanged.
    #[serde(default)]
    pub handler: HandlerOptions,

    /// Prefixes, owners and definition directories.
    #[serde(default)]
    pub commands: CommandsConfig,

    /// Message loop settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global level. `RUST_LOG`, when set, takes precedence.
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    pub span_events: SpanEventConfig,
    /// Include file and line in log lines.
    pub file_location: bool,
    /// Log file, required when `output = "file"`.
    pub file_path: Option<PathBuf>,
    /// Per-module levels, e.g. `herald_framework = "debug"`.
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            span_events: SpanEventConfig::default(),
            file_location: false,
            file_path: None,
            filters: HashMap::new(),
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Command sources and access settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Fixed prefixes. An empty list dispatches every message without a
    /// prefix.
    pub prefixes: Vec<String>,
    /// Directories of definition files loaded at startup and on reload.
    pub directories: Vec<PathBuf>,
    /// User ids allowed to run `owner_only` commands.
    pub owners: Vec<String>,
    /// Install the cooldown gate.
    pub cooldowns: bool,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["!".to_string()],
            directories: Vec::new(),
            owners: Vec::new(),
            cooldowns: true,
        }
    }
}

// =============================================================================
// Runtime
// =============================================================================

/// Message loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of the dispatch event channel.
    pub channel_capacity: usize,
    /// How long shutdown waits for in-flight dispatches, in milliseconds.
    pub shutdown_grace_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            shutdown_grace_ms: 5000,
        }
    }
}

impl RuntimeConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
