//! Message dispatcher for the Herald framework.
//!
//! The [`Dispatcher`] turns one [`InboundMessage`] into at most one
//! [`DispatchEvent`]:
//!
//! ```text
//! RECEIVED ─▶ PREFIX_RESOLVED ─▶ MATCHED ─▶ MIDDLEWARE_RUNNING ─▶ EXECUTING
//!    │              │               │               │                 │
//!    ▼              ▼               ▼               ▼                 ▼
//! ignored       no prefix       NoCommand      halted (silent)   CommandRan
//! (silent)      (silent)                       MiddlewareError   CommandError
//! ```
//!
//! Each dispatch is independent. The dispatcher is cheap to clone and
//! implements `tower::Service<InboundMessage>`, so it can be wrapped in tower
//! layers or driven with `ServiceExt::oneshot`.
//!
//! # Example
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::builder(bot)
//!     .options(HandlerOptions::default())
//!     .prefix("!")
//!     .build();
//!
//! dispatcher.register(CommandDefinition::builder("ping", ping).build()?)?;
//! dispatcher.add_middleware(OwnerGate::new(["1234"]));
//!
//! let mut events = dispatcher.subscribe();
//! dispatcher.dispatch(message).await;
//! ```

use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tower::Service;
use tracing::{Instrument, Level, debug, span, trace};

use crate::command::{
    CommandDefinition, CommandLoader, CommandRegistry, HandlerCatalog, LoadReport,
};
use crate::context::CommandContext;
use crate::error::{CommandError, LoadResult, RegistryResult, panic_message};
use crate::event::{DEFAULT_EVENT_CAPACITY, DispatchEvent, EventBus};
use crate::matcher::parse_invocation;
use crate::middleware::{Middleware, MiddlewarePipeline, PipelineFlow};
use crate::options::HandlerOptions;
use crate::prefix::{IntoPrefixes, PrefixResolver, PrefixSource};
use crate::reporter::{DefaultErrorReporter, ErrorReporter};
use herald_core::{BoxError, BoxedBot, InboundMessage};

// =============================================================================
// DispatchOutcome
// =============================================================================

/// Why a message was dropped before prefix resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyContent,
    BotAuthor,
    UnsupportedKind,
}

/// How a dispatch ended.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Dropped by the pre-checks. No event.
    Ignored(IgnoreReason),
    /// No prefix candidate matched. No event.
    NoPrefix,
    /// No enabled command accepted the token. `NoCommand` was published.
    NoCommand,
    /// The middleware at `index` returned `false`. No event.
    Halted { index: usize },
    /// A middleware raised. `MiddlewareError` was published.
    MiddlewareFailed(CommandError),
    /// The handler succeeded. `CommandRan` was published.
    Ran(Value),
    /// The handler failed. `CommandError` was published.
    Failed(CommandError),
}

impl DispatchOutcome {
    pub fn is_ran(&self) -> bool {
        matches!(self, DispatchOutcome::Ran(_))
    }

    /// Returns `true` if this dispatch published an event.
    pub fn emitted_event(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::NoCommand
                | DispatchOutcome::MiddlewareFailed(_)
                | DispatchOutcome::Ran(_)
                | DispatchOutcome::Failed(_)
        )
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

struct DispatcherInner {
    bot: BoxedBot,
    options: HandlerOptions,
    registry: Arc<CommandRegistry>,
    loader: CommandLoader,
    prefix: RwLock<PrefixSource>,
    middleware: RwLock<MiddlewarePipeline>,
    reporter: RwLock<Arc<dyn ErrorReporter>>,
    events: EventBus,
}

/// The command dispatcher.
///
/// # Thread Safety
///
/// `Dispatcher` is `Send + Sync` and cheap to clone; clones share the same
/// registry, middleware, prefix configuration and event channel. Runtime
/// reconfiguration (`set_prefix`, `add_middleware`, ...) only affects
/// dispatches that start afterwards.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Creates a dispatcher with default options and no prefix.
    pub fn new(bot: BoxedBot) -> Self {
        Self::builder(bot).build()
    }

    pub fn builder(bot: BoxedBot) -> DispatcherBuilder {
        DispatcherBuilder::new(bot)
    }

    // ─── Accessors ───────────────────────────────────────────────────────────

    pub fn bot(&self) -> &BoxedBot {
        &self.inner.bot
    }

    pub fn options(&self) -> &HandlerOptions {
        &self.inner.options
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.inner.registry
    }

    pub fn loader(&self) -> &CommandLoader {
        &self.inner.loader
    }

    /// Subscribes to dispatch events.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.inner.events.subscribe()
    }

    // ─── Administration ──────────────────────────────────────────────────────

    /// Registers or replaces a definition.
    pub fn register(&self, def: CommandDefinition) -> RegistryResult<Arc<CommandDefinition>> {
        self.inner.registry.register(def)
    }

    /// Flips a definition's `disabled` flag and returns the new state.
    pub fn toggle(&self, key: &str) -> RegistryResult<bool> {
        self.inner.registry.toggle(key)
    }

    /// Loads (or reloads) every definition file under `dir`.
    pub fn load_directory(&self, dir: impl AsRef<Path>) -> LoadResult<LoadReport> {
        self.inner.loader.load_directory(dir)
    }

    /// Uses a fixed prefix or prefix list.
    pub fn set_prefix(&self, prefixes: impl IntoPrefixes) {
        *self.inner.prefix.write() = PrefixSource::Fixed(prefixes.into_prefixes());
    }

    /// Resolves prefixes per message.
    pub fn set_prefix_resolver<R: PrefixResolver>(&self, resolver: R) {
        *self.inner.prefix.write() = PrefixSource::Resolver(Arc::new(resolver));
    }

    /// Returns to implicit no-prefix mode.
    pub fn clear_prefix(&self) {
        *self.inner.prefix.write() = PrefixSource::Implicit;
    }

    /// Replaces the error reporter.
    pub fn set_error_reporter<R: ErrorReporter>(&self, reporter: R) {
        *self.inner.reporter.write() = Arc::new(reporter);
    }

    /// Appends a middleware to the pipeline.
    pub fn add_middleware<M: Middleware>(&self, middleware: M) {
        self.inner.middleware.write().push(middleware);
    }

    // ─── Dispatch ────────────────────────────────────────────────────────────

    /// Dispatches a single message.
    pub async fn dispatch(&self, message: InboundMessage) -> DispatchOutcome {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            message_id = %message.id,
            channel_id = %message.channel_id,
        );
        self.dispatch_inner(Arc::new(message)).instrument(span).await
    }

    async fn dispatch_inner(&self, message: Arc<InboundMessage>) -> DispatchOutcome {
        let inner = &self.inner;
        let options = &inner.options;

        if let Some(reason) = pre_check(&message, options) {
            trace!(?reason, "Message ignored");
            return DispatchOutcome::Ignored(reason);
        }

        let source = inner.prefix.read().clone();
        let Some(found) = source
            .resolve(
                &message,
                inner.bot.id(),
                options.mention_prefix,
                options.case_insensitive_prefix,
            )
            .await
        else {
            trace!("No prefix matched");
            return DispatchOutcome::NoPrefix;
        };

        let invocation = parse_invocation(&message.content, found.len, &found.prefix);
        let Some(command) = inner
            .registry
            .find(&invocation.command, options.case_insensitive_command)
        else {
            debug!(token = %invocation.command, "No command matched");
            inner.events.publish(DispatchEvent::NoCommand { message });
            return DispatchOutcome::NoCommand;
        };

        debug!(command = %command.key(), token = %invocation.command, "Command matched");
        let ctx = Arc::new(CommandContext::new(
            message,
            command,
            invocation,
            Arc::clone(&inner.bot),
        ));

        let pipeline = inner.middleware.read().clone();
        match pipeline.run(&ctx).await {
            Ok(PipelineFlow::Continue) => {}
            Ok(PipelineFlow::Halted { index }) => return DispatchOutcome::Halted { index },
            Err(error) => {
                inner.events.publish(DispatchEvent::MiddlewareError {
                    context: Arc::clone(&ctx),
                    error: error.clone(),
                });
                self.report(&ctx, error.clone()).await;
                return DispatchOutcome::MiddlewareFailed(error);
            }
        }

        match self.execute(&ctx).await {
            Ok(result) => {
                if let Some(hook) = ctx.command().run_hook() {
                    swallow("on_run", hook.on_run(Arc::clone(&ctx), result.clone())).await;
                }
                debug!(command = %ctx.command().key(), "Command ran");
                inner.events.publish(DispatchEvent::CommandRan {
                    context: Arc::clone(&ctx),
                    result: result.clone(),
                });
                DispatchOutcome::Ran(result)
            }
            Err(error) => {
                debug!(command = %ctx.command().key(), error = %error, "Command failed");
                inner.events.publish(DispatchEvent::CommandError {
                    context: Arc::clone(&ctx),
                    error: error.clone(),
                });
                if let Some(hook) = ctx.command().error_hook() {
                    swallow("on_error", hook.on_error(Arc::clone(&ctx), error.clone())).await;
                }
                self.report(&ctx, error.clone()).await;
                DispatchOutcome::Failed(error)
            }
        }
    }

    /// Runs the handler, converting panics and timeouts into failures.
    async fn execute(&self, ctx: &Arc<CommandContext>) -> Result<Value, CommandError> {
        let run = AssertUnwindSafe(ctx.command().handler().exec(Arc::clone(ctx))).catch_unwind();

        let outcome = match self.inner.options.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(CommandError::timed_out(limit)),
            },
            None => run.await,
        };

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CommandError::handler(e)),
            Err(payload) => Err(CommandError::panicked(panic_message(payload.as_ref()))),
        }
    }

    async fn report(&self, ctx: &Arc<CommandContext>, error: CommandError) {
        let reporter = Arc::clone(&self.inner.reporter.read());
        let run = AssertUnwindSafe(reporter.report(Arc::clone(ctx), error)).catch_unwind();
        if let Err(payload) = run.await {
            debug!(panic = %panic_message(payload.as_ref()), "Error reporter panicked");
        }
    }
}

fn pre_check(message: &InboundMessage, options: &HandlerOptions) -> Option<IgnoreReason> {
    if message.content.is_empty() {
        Some(IgnoreReason::EmptyContent)
    } else if message.author.bot && !options.allow_bot_authors {
        Some(IgnoreReason::BotAuthor)
    } else if !message.kind.is_dispatchable() {
        Some(IgnoreReason::UnsupportedKind)
    } else {
        None
    }
}

/// Awaits a lifecycle hook, discarding its failure or panic.
async fn swallow<F>(hook: &'static str, fut: F)
where
    F: std::future::Future<Output = Result<(), BoxError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(hook, error = %e, "Lifecycle hook failed"),
        Err(payload) => debug!(hook, panic = %panic_message(payload.as_ref()), "Lifecycle hook panicked"),
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("bot", &self.inner.bot.id())
            .field("options", &self.inner.options)
            .field("commands", &self.inner.registry.len())
            .field("prefix", &*self.inner.prefix.read())
            .field("middleware", &*self.inner.middleware.read())
            .finish()
    }
}

impl Service<InboundMessage> for Dispatcher {
    type Response = DispatchOutcome;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<DispatchOutcome, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: InboundMessage) -> Self::Future {
        let dispatcher = self.clone();
        async move { Ok(dispatcher.dispatch(message).await) }.boxed()
    }
}

// =============================================================================
// DispatcherBuilder
// =============================================================================

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    bot: BoxedBot,
    options: HandlerOptions,
    registry: Option<Arc<CommandRegistry>>,
    catalog: Option<HandlerCatalog>,
    prefix: PrefixSource,
    middleware: MiddlewarePipeline,
    reporter: Arc<dyn ErrorReporter>,
    event_capacity: usize,
}

impl DispatcherBuilder {
    pub fn new(bot: BoxedBot) -> Self {
        Self {
            bot,
            options: HandlerOptions::default(),
            registry: None,
            catalog: None,
            prefix: PrefixSource::Implicit,
            middleware: MiddlewarePipeline::new(),
            reporter: Arc::new(DefaultErrorReporter),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn options(mut self, options: HandlerOptions) -> Self {
        self.options = options;
        self
    }

    /// Shares an existing registry. By default a fresh one is created from
    /// `options.defaults`.
    pub fn registry(mut self, registry: Arc<CommandRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Handlers available to definition files. Defaults to
    /// [`HandlerCatalog::collect_all`].
    pub fn catalog(mut self, catalog: HandlerCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn prefix(mut self, prefixes: impl IntoPrefixes) -> Self {
        self.prefix = PrefixSource::Fixed(prefixes.into_prefixes());
        self
    }

    pub fn prefix_resolver<R: PrefixResolver>(mut self, resolver: R) -> Self {
        self.prefix = PrefixSource::Resolver(Arc::new(resolver));
        self
    }

    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn error_reporter<R: ErrorReporter>(mut self, reporter: R) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Capacity of the event channel.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn build(self) -> Dispatcher {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(CommandRegistry::new(self.options.defaults.clone())));
        let catalog = self.catalog.unwrap_or_else(HandlerCatalog::collect_all);

        Dispatcher {
            inner: Arc::new(DispatcherInner {
                bot: self.bot,
                options: self.options,
                loader: CommandLoader::new(Arc::clone(&registry), catalog),
                registry,
                prefix: RwLock::new(self.prefix),
                middleware: RwLock::new(self.middleware),
                reporter: RwLock::new(self.reporter),
                events: EventBus::new(self.event_capacity),
            }),
        }
    }
}
