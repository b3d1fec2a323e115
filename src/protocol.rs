//! # Protocol
//!
//! The wire-level distinction between the two transports a connection can
//! speak, plus the tiny tokenizer shared by both.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Plain,
    WebSocket,
}

/// A decoded inbound line, split into a command name and an optional
/// remainder. Splits on the *first* space only — everything after belongs to
/// the remainder verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    pub command: String,
    pub rest: Option<String>,
}

impl Tokens {
    pub fn parse(line: &str) -> Self {
        match line.split_once(' ') {
            Some((cmd, rest)) => Tokens {
                command: cmd.to_string(),
                rest: Some(rest.to_string()),
            },
            None => Tokens {
                command: line.to_string(),
                rest: None,
            },
        }
    }
}

/// Strip a trailing CR and surrounding whitespace from a line read up to LF.
pub fn trim_line(raw: &str) -> &str {
    raw.trim_end_matches('\r').trim()
}
