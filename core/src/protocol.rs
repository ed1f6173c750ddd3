//! Proposal wire format
//!
//! Agents propose an action by embedding one marker in free text:
//!
//! ```text
//! {{#<command>#}<arguments>[END_CMD]
//! ```
//!
//! The opener may use a single or double leading brace and may close the
//! command name with `#}` or `}}`. The terminator may be wrapped in `[...]` or
//! `{...}`. Only the first well-formed marker in a text counts; everything
//! around it is ignored. Malformed input yields `None`, never an error.

use std::fmt;

/// Terminator keyword closing the arguments blob
pub const END_TOKEN: &str = "END_CMD";

/// A single candidate action extracted from one agent's reply.
///
/// Two proposals agree only when both fields are byte-for-byte identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Proposal {
    pub command: String,
    pub arguments: String,
}

impl Proposal {
    pub fn new(command: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            arguments: arguments.into(),
        }
    }

    /// Canonical marker form, accepted back by [`parse`].
    pub fn render(&self) -> String {
        format!("{{{{#{}#}}{}[{}]", self.command, self.arguments, END_TOKEN)
    }
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.command, self.arguments)
    }
}

/// Extract the first proposal from `text`.
pub fn parse(text: &str) -> Option<Proposal> {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'{')
        .find_map(|(start, _)| match_at(text, start))
}

/// Try to match a full marker whose opener begins at byte `start`.
fn match_at(text: &str, start: usize) -> Option<Proposal> {
    let bytes = text.as_bytes();
    let command_start = opener_end(bytes, start)?;

    // The command name is the shortest non-empty single-line run after which
    // a command closer appears and a terminator can still be found.
    for close in command_start + 1..bytes.len() {
        match bytes[close] {
            b'\n' => return None,
            b'#' | b'}' if bytes.get(close + 1) == Some(&b'}') => {
                let args_start = skip_whitespace(bytes, close + 2);
                if let Some(args_end) = find_terminator(bytes, args_start) {
                    return Some(Proposal::new(
                        &text[command_start..close],
                        &text[args_start..args_end],
                    ));
                }
            }
            _ => {}
        }
    }
    None
}

/// `{{#` or `{#` at `start`; returns the index just past the `#`.
fn opener_end(bytes: &[u8], start: usize) -> Option<usize> {
    match (bytes.get(start + 1), bytes.get(start + 2)) {
        (Some(b'{'), Some(b'#')) => Some(start + 3),
        (Some(b'#'), _) => Some(start + 2),
        _ => None,
    }
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// Index of the first `[END_CMD]`/`{END_CMD}` (mixed delimiters allowed) at or
/// after `from`.
fn find_terminator(bytes: &[u8], from: usize) -> Option<usize> {
    let token = END_TOKEN.as_bytes();
    (from..bytes.len()).find(|&pos| {
        matches!(bytes[pos], b'[' | b'{')
            && bytes[pos + 1..].starts_with(token)
            && matches!(bytes.get(pos + 1 + token.len()), Some(b']' | b'}'))
    })
}
