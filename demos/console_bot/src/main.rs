//! Console Bot Example
//!
//! Every line typed on stdin becomes an inbound message from the configured
//! user; replies are printed on stdout. Command definitions live in
//! `commands/`, handlers are registered below with `command_handler!`.
//!
//! ```text
//! !ping              -> pong
//! !say hello world   -> hello world
//! !repeat "hi" -n 3  -> hi hi hi
//! !d20               -> rolled 13 (d20)
//! !about             -> embed from the definition file
//! :reload            -> reloads commands/ without restarting
//! ```
//!
//! # Usage
//!
//! ```bash
//! cd demos/console_bot && cargo run --package console-bot -- --user 1
//! ```

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use futures::StreamExt;
use herald::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

// ============================================================================
// Bot
// ============================================================================

/// A bot whose "channel" is the terminal.
#[derive(Default)]
struct ConsoleBot {
    sent: AtomicU64,
}

impl ConsoleBot {
    fn next_id(&self) -> String {
        format!("out-{}", self.sent.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl Bot for ConsoleBot {
    fn id(&self) -> &str {
        "1000"
    }

    async fn can_send(&self, _origin: &InboundMessage) -> bool {
        true
    }

    async fn send_embed(&self, _origin: &InboundMessage, embed: &Embed) -> DeliveryResult<String> {
        let rule = "─".repeat(32);
        println!("┌{rule}");
        if let Some(title) = &embed.title {
            println!("│ {title}");
        }
        if let Some(body) = &embed.description {
            for line in body.lines() {
                println!("│ {line}");
            }
        }
        println!("└{rule}");
        Ok(self.next_id())
    }

    async fn send_text(&self, _origin: &InboundMessage, text: &str) -> DeliveryResult<String> {
        println!("> {text}");
        Ok(self.next_id())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn ping(ctx: Arc<CommandContext>) -> Result<&'static str, BoxError> {
    ctx.reply("pong").await?;
    Ok("pong")
}

async fn echo(ctx: Arc<CommandContext>) -> Result<String, BoxError> {
    if ctx.raw_args().is_empty() {
        return Err("nothing to echo".into());
    }
    ctx.reply(ctx.raw_args()).await?;
    Ok(ctx.raw_args().to_string())
}

#[derive(Parser, Debug, Clone)]
struct RepeatArgs {
    /// Text to repeat.
    text: String,
    /// How many times.
    #[arg(short = 'n', long, default_value_t = 2)]
    times: usize,
}

async fn repeat(ctx: Arc<CommandContext>) -> Result<(), BoxError> {
    let args = CommandArgs::<RepeatArgs>::parse(&ctx)?;
    if args.times == 0 || args.times > 10 {
        return Err("times must be between 1 and 10".into());
    }
    let line = vec![args.text.as_str(); args.times].join(" ");
    ctx.reply(&line).await?;
    Ok(())
}

async fn respond(ctx: Arc<CommandContext>) -> Result<(), BoxError> {
    if ctx.respond().await?.is_none() {
        ctx.reply("this command has no response configured").await?;
    }
    Ok(())
}

async fn dice(ctx: Arc<CommandContext>) -> Result<u64, BoxError> {
    let sides: u64 = ctx.invoked_as()[1..].parse()?;
    if sides == 0 {
        return Err("a die needs at least one side".into());
    }
    let seed = SystemTime::now().duration_since(UNIX_EPOCH)?.subsec_nanos() as u64;
    let roll = seed % sides + 1;
    ctx.reply(&format!("rolled {roll} (d{sides})")).await?;
    Ok(roll)
}

async fn fail(_ctx: Arc<CommandContext>) -> Result<(), BoxError> {
    Err("this command always fails".into())
}

async fn log_failure(ctx: Arc<CommandContext>, error: CommandError) -> Result<(), BoxError> {
    warn!(command = %ctx.command().key(), kind = %error.kind(), "fail hook ran");
    Ok(())
}

command_handler!("ping", ping);
command_handler!("echo", echo);
command_handler!("repeat", repeat);
command_handler!("respond", respond);
command_handler!("dice", dice);
command_handler!("fail", entry = HandlerEntry::new(fail).on_error(log_failure));

// ============================================================================
// Main
// ============================================================================

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Configuration file (defaults to searching for herald.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra command directory to load on top of the configured ones.
    #[arg(long)]
    commands: Option<PathBuf>,

    /// User id the typed messages are sent as.
    #[arg(short, long, default_value = "1")]
    user: String,

    /// Display name of that user.
    #[arg(long, default_value = "console")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder = HeraldRuntime::builder(Arc::new(ConsoleBot::default()));
    if let Some(path) = &cli.config {
        builder = builder.config_file(path);
    }
    let runtime = builder.build()?;

    if let Some(dir) = &cli.commands {
        let report = runtime.load_directory(dir)?;
        info!(dir = %dir.display(), loaded = report.loaded.len(), "Loaded extra commands");
    }

    let mut events = runtime.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                DispatchEvent::CommandRan { context, result } => {
                    info!(command = %context.command().key(), result = %result, "COMMAND_RAN");
                }
                DispatchEvent::NoCommand { message } => {
                    info!(content = %message.content, "NO_COMMAND");
                }
                other => info!(event = other.name(), "dispatch event"),
            }
        }
    });

    let author = Author::new(cli.user, cli.name);
    let counter = AtomicU64::new(0);
    let lines = BufReader::new(tokio::io::stdin()).lines();
    let messages = futures::stream::unfold(lines, |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((line, lines)),
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, "Failed to read stdin");
                None
            }
        }
    })
    .filter_map(|line| {
        let message = if line.trim() == ":reload" {
            match runtime.reload() {
                Ok(reports) => {
                    let loaded: usize = reports.iter().map(|r| r.loaded.len()).sum();
                    println!("reloaded {loaded} command(s)");
                }
                Err(e) => error!(error = %e, "Reload failed"),
            }
            None
        } else {
            let id = counter.fetch_add(1, Ordering::Relaxed) + 1;
            Some(InboundMessage::new(
                format!("in-{id}"),
                "console",
                author.clone(),
                line,
            ))
        };
        futures::future::ready(message)
    });

    runtime.run(messages).await?;
    Ok(())
}
