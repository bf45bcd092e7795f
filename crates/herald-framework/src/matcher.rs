//! Command token extraction.
//!
//! Once a prefix has been found, [`parse_invocation`] splits the rest of the
//! body into the command token and its arguments. The token is then looked
//! up with [`CommandRegistry::find`](crate::command::CommandRegistry::find).

/// A parsed command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// The matched prefix, with a single trailing space appended when the
    /// command was separated from it by whitespace.
    pub prefix: String,
    /// The command token as typed. Empty if nothing follows the prefix.
    pub command: String,
    /// Remaining whitespace-separated tokens, empty ones dropped.
    pub args: Vec<String>,
    /// Everything after the command token, leading whitespace removed.
    pub rest: String,
}

/// Splits `body` into an [`Invocation`].
///
/// `prefix_len` is the byte length of the matched prefix at the start of
/// `body`; `prefix` is that prefix as it appeared in the body.
///
/// If the text after the prefix starts with whitespace, exactly one
/// whitespace character is consumed and `" "` is appended to the prefix, so
/// `"! ping"` and `"<@1> ping"` both yield the token `ping`. A second
/// leading whitespace character makes the token empty.
pub fn parse_invocation(body: &str, prefix_len: usize, prefix: &str) -> Invocation {
    let mut prefix = prefix.to_string();
    let mut rest = body.get(prefix_len..).unwrap_or_default();

    if let Some(first) = rest.chars().next().filter(|c| c.is_whitespace()) {
        rest = &rest[first.len_utf8()..];
        prefix.push(' ');
    }

    let (command, tail) = match rest.find(char::is_whitespace) {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };

    Invocation {
        prefix,
        command: command.to_string(),
        args: tail.split_whitespace().map(String::from).collect(),
        rest: tail.trim_start().to_string(),
    }
}
