//! Message loop and lifecycle.
//!
//! [`HeraldRuntime`] wires a [`Dispatcher`] from configuration and feeds it
//! from any stream of inbound messages, one task per message. Shutdown stops
//! intake and waits (up to `runtime.shutdown_grace_ms`) for in-flight
//! dispatches.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use herald_runtime::HeraldRuntime;
//!
//! let runtime = HeraldRuntime::builder(bot)
//!     .config_file("herald.toml")
//!     .build()?;
//!
//! // Runs until the stream ends, Ctrl+C or SIGTERM.
//! runtime.run(gateway_messages).await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::pin::pin;

use futures::{Stream, StreamExt};
use herald_core::{BoxedBot, InboundMessage};
use herald_framework::{
    CooldownGate, DispatchEvent, Dispatcher, HandlerCatalog, LoadReport, OwnerGate,
};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::config::{ConfigLoader, HeraldConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// The Herald runtime.
///
/// Cloning the inner [`Dispatcher`] is cheap, so administration
/// (`register`, `toggle`, `set_prefix`, ...) can happen through
/// [`HeraldRuntime::dispatcher`] while the loop runs.
pub struct HeraldRuntime {
    config: HeraldConfig,
    dispatcher: Dispatcher,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl HeraldRuntime {
    /// Creates a runtime builder answering through `bot`.
    pub fn builder(bot: BoxedBot) -> RuntimeBuilder {
        RuntimeBuilder::new(bot)
    }

    /// Creates a runtime from an already loaded configuration, using every
    /// handler registered with `command_handler!`.
    pub fn from_config(config: &HeraldConfig, bot: BoxedBot) -> RuntimeResult<Self> {
        validate_config(config)?;
        Self::assemble(config.clone(), bot, HandlerCatalog::collect_all())
    }

    fn assemble(config: HeraldConfig, bot: BoxedBot, catalog: HandlerCatalog) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);

        let mut builder = Dispatcher::builder(bot)
            .options(config.handler.clone())
            .catalog(catalog)
            .event_capacity(config.runtime.channel_capacity)
            .middleware(OwnerGate::new(config.commands.owners.iter().cloned()));
        if !config.commands.prefixes.is_empty() {
            builder = builder.prefix(config.commands.prefixes.clone());
        }
        if config.commands.cooldowns {
            builder = builder.middleware(CooldownGate::new());
        }

        let runtime = Self {
            dispatcher: builder.build(),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            config,
        };
        runtime.reload()?;

        info!(
            log_level = %runtime.config.logging.level,
            prefixes = ?runtime.config.commands.prefixes,
            commands = runtime.dispatcher.registry().len(),
            "Runtime initialized from configuration"
        );
        Ok(runtime)
    }

    pub fn config(&self) -> &HeraldConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Subscribes to dispatch events.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.dispatcher.subscribe()
    }

    /// Reloads every configured command directory.
    pub fn reload(&self) -> RuntimeResult<Vec<LoadReport>> {
        self.config
            .commands
            .directories
            .iter()
            .map(|dir| self.load_directory(dir))
            .collect()
    }

    /// Loads (or reloads) one directory of definition files.
    pub fn load_directory(&self, dir: impl AsRef<Path>) -> RuntimeResult<LoadReport> {
        Ok(self.dispatcher.load_directory(dir)?)
    }

    /// A token that stops the message loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops intake. In-flight dispatches keep running.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Number of dispatches currently running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Dispatches `message` on its own task.
    ///
    /// Returns `false` without dispatching once shutdown has been requested.
    pub fn spawn_dispatch(&self, message: InboundMessage) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        let dispatcher = self.dispatcher.clone();
        self.tracker.spawn(async move {
            let outcome = dispatcher.dispatch(message).await;
            trace!(outcome = ?outcome, "Dispatch finished");
        });
        true
    }

    /// Runs until `messages` ends, Ctrl+C, SIGTERM or [`shutdown`](Self::shutdown).
    pub async fn run<S>(&self, messages: S) -> RuntimeResult<()>
    where
        S: Stream<Item = InboundMessage>,
    {
        let signals = shutdown_signal().map_err(RuntimeError::Signal)?;
        info!("Herald runtime is now running. Press Ctrl+C to stop.");
        self.run_until(messages, signals).await
    }

    /// Runs over the receiving half of a channel until every sender is
    /// dropped, Ctrl+C, SIGTERM or [`shutdown`](Self::shutdown).
    pub async fn run_channel(&self, receiver: mpsc::Receiver<InboundMessage>) -> RuntimeResult<()> {
        self.run(channel_stream(receiver)).await
    }

    /// Runs until `messages` ends, `shutdown` resolves or the shutdown token
    /// is cancelled, then waits for in-flight dispatches.
    pub async fn run_until<S, F>(&self, messages: S, shutdown: F) -> RuntimeResult<()>
    where
        S: Stream<Item = InboundMessage>,
        F: Future<Output = ()>,
    {
        self.tracker.reopen();
        let mut messages = pin!(messages);
        let mut shutdown = pin!(shutdown);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                () = &mut shutdown => {
                    self.shutdown.cancel();
                    break;
                }
                next = messages.next() => match next {
                    Some(message) => {
                        self.spawn_dispatch(message);
                    }
                    None => {
                        debug!("Message stream ended");
                        break;
                    }
                },
            }
        }

        self.drain().await;
        Ok(())
    }

    async fn drain(&self) {
        self.tracker.close();
        let in_flight = self.tracker.len();
        if in_flight > 0 {
            info!(in_flight, "Waiting for in-flight dispatches");
        }

        let grace = self.config.runtime.shutdown_grace();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "Shutdown grace period elapsed with dispatches still running"
            );
        }
        info!("Herald runtime stopped");
    }
}

fn channel_stream(receiver: mpsc::Receiver<InboundMessage>) -> impl Stream<Item = InboundMessage> {
    futures::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|message| (message, receiver))
    })
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// Handlers are installed eagerly so failures surface before the loop
/// starts.
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    Ok(async move {
        #[cfg(unix)]
        tokio::select! {
            () = ctrl_c => info!("Received Ctrl+C, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await;
            info!("Received Ctrl+C, shutting down");
        }
    })
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`HeraldRuntime`].
///
/// ```rust,ignore
/// let runtime = HeraldRuntime::builder(bot)
///     .profile("production")
///     .search_path("/etc/herald")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    bot: BoxedBot,
    config_loader: ConfigLoader,
    config: Option<HeraldConfig>,
    catalog: Option<HandlerCatalog>,
}

impl RuntimeBuilder {
    pub fn new(bot: BoxedBot) -> Self {
        Self {
            bot,
            config_loader: ConfigLoader::new(),
            config: None,
            catalog: None,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration values programmatically.
    pub fn merge(mut self, config: HeraldConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `config` as is, skipping file and environment loading.
    pub fn config(mut self, config: HeraldConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Handlers available to definition files. Defaults to every handler
    /// registered with `command_handler!`.
    pub fn catalog(mut self, catalog: HandlerCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn build(self) -> RuntimeResult<HeraldRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.config_loader.load()?,
        };
        let catalog = self.catalog.unwrap_or_else(HandlerCatalog::collect_all);
        HeraldRuntime::assemble(config, self.bot, catalog)
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::sync::Arc;

    use async_trait::async_trait;
    use herald_core::{Author, Bot, BoxError, DeliveryResult, Embed};
    use herald_framework::{CommandContext, DispatchOutcome};
    use parking_lot::Mutex;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    #[derive(Default)]
    struct RecordingBot {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Bot for RecordingBot {
        fn id(&self) -> &str {
            "1000"
        }

        async fn can_send(&self, _origin: &InboundMessage) -> bool {
            true
        }

        async fn send_embed(&self, origin: &InboundMessage, embed: &Embed) -> DeliveryResult<String> {
            self.send_text(origin, &embed.to_plain_text()).await
        }

        async fn send_text(&self, _origin: &InboundMessage, text: &str) -> DeliveryResult<String> {
            let mut texts = self.texts.lock();
            texts.push(text.to_string());
            Ok(format!("r{}", texts.len()))
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    async fn ping(ctx: Arc<CommandContext>) -> Result<&'static str, BoxError> {
        ctx.reply("pong").await?;
        Ok("pong")
    }

    fn message(content: &str) -> InboundMessage {
        InboundMessage::new("m1", "c1", Author::new("u1", "alice"), content)
    }

    fn setup(dir: &Path, owners: &[&str]) -> (Arc<RecordingBot>, HeraldRuntime) {
        let bot = Arc::new(RecordingBot::default());
        let mut config = HeraldConfig::default();
        config.commands.directories = vec![dir.to_path_buf()];
        config.commands.owners = owners.iter().map(|o| o.to_string()).collect();

        let runtime = HeraldRuntime::builder(bot.clone())
            .config(config)
            .catalog(HandlerCatalog::new().with("ping", ping))
            .build()
            .unwrap();
        (bot, runtime)
    }

    #[tokio::test]
    async fn test_run_until_stream_ends() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ping.toml"), "command = \"ping\"\n").unwrap();
        let (bot, runtime) = setup(dir.path(), &[]);
        let mut events = runtime.subscribe();

        let messages = futures::stream::iter(vec![
            message("!ping"),
            message("!nothing"),
            message("hello"),
        ]);
        runtime
            .run_until(messages, std::future::pending())
            .await
            .unwrap();

        assert_eq!(runtime.in_flight(), 0);
        assert_eq!(*bot.texts.lock(), vec!["pong"]);

        let mut names = Vec::new();
        loop {
            match events.try_recv() {
                Ok(event) => names.push(event.name()),
                Err(TryRecvError::Empty) => break,
                Err(e) => panic!("unexpected: {e}"),
            }
        }
        names.sort_unstable();
        assert_eq!(names, vec!["COMMAND_RAN", "NO_COMMAND"]);
    }

    #[tokio::test]
    async fn test_channel_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ping.toml"), "command = \"ping\"\n").unwrap();
        let (bot, runtime) = setup(dir.path(), &[]);

        let (tx, rx) = mpsc::channel(4);
        tx.send(message("!ping")).await.unwrap();
        tx.send(message("!PING")).await.unwrap();
        drop(tx);

        runtime
            .run_until(channel_stream(rx), std::future::pending())
            .await
            .unwrap();
        assert_eq!(*bot.texts.lock(), vec!["pong", "pong"]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_intake() {
        let dir = tempfile::tempdir().unwrap();
        let (_bot, runtime) = setup(dir.path(), &[]);

        runtime.shutdown();
        runtime
            .run_until(futures::stream::pending(), std::future::pending())
            .await
            .unwrap();
        assert!(!runtime.spawn_dispatch(message("!ping")));
    }

    #[tokio::test]
    async fn test_shutdown_future_cancels_token() {
        let dir = tempfile::tempdir().unwrap();
        let (_bot, runtime) = setup(dir.path(), &[]);

        runtime
            .run_until(futures::stream::pending(), async {})
            .await
            .unwrap();
        assert!(runtime.shutdown_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_owner_gate_from_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ping.toml"),
            "command = \"ping\"\nowner_only = true\n",
        )
        .unwrap();

        let (bot, runtime) = setup(dir.path(), &["u2"]);
        let outcome = runtime.dispatcher().dispatch(message("!ping")).await;
        assert!(matches!(outcome, DispatchOutcome::Halted { index: 0 }));
        assert!(bot.texts.lock().is_empty());

        let mut owner = message("!ping");
        owner.author = Author::new("u2", "bob");
        assert!(runtime.dispatcher().dispatch(owner).await.is_ran());
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let (_bot, runtime) = setup(dir.path(), &[]);
        assert!(runtime.dispatcher().registry().is_empty());

        std::fs::write(
            dir.path().join("ping.toml"),
            "command = \"ping\"\naliases = [\"p\"]\n",
        )
        .unwrap();
        let reports = runtime.reload().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].loaded, vec!["ping"]);
        assert!(runtime.dispatcher().dispatch(message("!p")).await.is_ran());
    }

    #[test]
    fn test_missing_directory_fails_build() {
        let mut config = HeraldConfig::default();
        config.commands.directories = vec!["/nonexistent/herald-commands".into()];
        let result = HeraldRuntime::builder(Arc::new(RecordingBot::default()))
            .config(config)
            .catalog(HandlerCatalog::new())
            .build();
        assert!(matches!(result, Err(RuntimeError::Load(_))));
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let mut config = HeraldConfig::default();
        config.runtime.channel_capacity = 0;
        let result = HeraldRuntime::builder(Arc::new(RecordingBot::default()))
            .config(config)
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }
}
