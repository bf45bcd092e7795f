//! Typed command arguments backed by clap.
//!
//! ```rust,ignore
//! #[derive(Parser, Clone)]
//! struct BanArgs {
//!     user: String,
//!     #[arg(short, long, default_value_t = 0)]
//!     days: u32,
//! }
//!
//! async fn ban(ctx: Arc<CommandContext>) -> Result<(), BoxError> {
//!     let args = CommandArgs::<BanArgs>::parse(&ctx)?;
//!     ctx.reply(&format!("banning {} for {} days", args.user, args.days)).await?;
//!     Ok(())
//! }
//! ```
//!
//! A parse failure returned with `?` becomes a handler failure, so the
//! invoker sees clap's rendered usage message in the error reply.

use std::iter;

use clap::Parser;
use clap::error::ErrorKind;
use thiserror::Error;

use crate::context::CommandContext;

/// Arguments that could not be parsed, or a help/version request.
#[derive(Debug, Clone, Error)]
#[error("{rendered}")]
pub struct ArgsError {
    kind: ErrorKind,
    rendered: String,
}

impl ArgsError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns `true` if the invoker asked for `--help`.
    pub fn is_help(&self) -> bool {
        self.kind == ErrorKind::DisplayHelp
    }
}

impl From<clap::Error> for ArgsError {
    fn from(err: clap::Error) -> Self {
        Self {
            kind: err.kind(),
            rendered: err.render().to_string().trim_end().to_string(),
        }
    }
}

/// Arguments parsed as the clap command `T`.
#[derive(Debug, Clone)]
pub struct CommandArgs<T: Parser>(pub T);

#[derive(Clone)]
struct ParsedArgs<T>(T);

impl<T> CommandArgs<T>
where
    T: Parser + Clone + Send + Sync + 'static,
{
    /// Parses the context's arguments with shell quoting rules.
    ///
    /// The typed command token is used as the program name. The result is
    /// cached in the context state, so later calls are free.
    pub fn parse(ctx: &CommandContext) -> Result<Self, ArgsError> {
        if let Some(ParsedArgs(parsed)) = ctx.get_state::<ParsedArgs<T>>() {
            return Ok(CommandArgs(parsed));
        }

        let argv = iter::once(ctx.invoked_as().to_string()).chain(ctx.quoted_args());
        let parsed = T::try_parse_from(argv)?;
        ctx.set_state(ParsedArgs(parsed.clone()));
        Ok(CommandArgs(parsed))
    }

    /// Unwraps the command value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Parser> std::ops::Deref for CommandArgs<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Parser> std::ops::DerefMut for CommandArgs<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::command::CommandDefinition;
    use crate::context::test_support::MockBot;
    use crate::matcher::parse_invocation;
    use herald_core::{Author, BoxError, InboundMessage};

    #[derive(Parser, Clone, Debug, PartialEq)]
    struct BanArgs {
        user: String,
        #[arg(short, long, default_value_t = 0)]
        days: u32,
        #[arg(long)]
        reason: Option<String>,
    }

    async fn noop(_ctx: Arc<CommandContext>) -> Result<(), BoxError> {
        Ok(())
    }

    fn ctx(body: &str) -> CommandContext {
        let message = InboundMessage::new("1", "c", Author::new("u", "u"), body);
        let def = CommandDefinition::builder("ban", noop).build().unwrap();
        let invocation = parse_invocation(body, 1, "!");
        CommandContext::new(
            Arc::new(message),
            Arc::new(def),
            invocation,
            Arc::new(MockBot::new()),
        )
    }

    #[test]
    fn test_parse_with_quotes() {
        let ctx = ctx(r#"!ban bob -d 7 --reason "spamming links""#);
        let args = CommandArgs::<BanArgs>::parse(&ctx).unwrap();
        assert_eq!(args.user, "bob");
        assert_eq!(args.days, 7);
        assert_eq!(args.reason.as_deref(), Some("spamming links"));

        let again = CommandArgs::<BanArgs>::parse(&ctx).unwrap();
        assert_eq!(again.into_inner(), args.0);
    }

    #[test]
    fn test_parse_error_renders_usage() {
        let ctx = ctx("!ban");
        let err = CommandArgs::<BanArgs>::parse(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert!(err.to_string().contains("Usage:"));

        let help = CommandArgs::<BanArgs>::parse(&self::ctx("!ban --help")).unwrap_err();
        assert!(help.is_help());
    }
}
