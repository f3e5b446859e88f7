//! IMAP wire helpers for the raw login tier
//!
//! Only what a diagnostic conversation needs: quoting arguments,
//! recognising greetings, and reading the status of tagged responses
//! (RFC 3501 section 7.1).

use std::fmt;

/// Status of a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    No,
    Bad,
    PreAuth,
    Bye,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
            Self::PreAuth => "PREAUTH",
            Self::Bye => "BYE",
        })
    }
}

impl ResponseStatus {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }
}

/// A response line that completes a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged<'a> {
    pub status: ResponseStatus,
    pub text: &'a str,
}

/// Parse `line` as the tagged completion for `tag`.
///
/// Returns `None` for untagged data, continuation requests, responses
/// to other tags, and lines without a recognised status word.
#[must_use]
pub fn parse_tagged<'a>(tag: &str, line: &'a str) -> Option<Tagged<'a>> {
    let (line_tag, rest) = line.split_once(' ')?;
    if line_tag != tag {
        return None;
    }
    let (word, text) = rest.split_once(' ').unwrap_or((rest, ""));
    let status = ResponseStatus::parse(word)?;
    Some(Tagged { status, text })
}

/// Status of a server greeting (`* OK`, `* PREAUTH`, `* BYE`).
#[must_use]
pub fn greeting_status(line: &str) -> Option<ResponseStatus> {
    let rest = line.strip_prefix("* ")?;
    let word = rest.split_whitespace().next()?;
    ResponseStatus::parse(word).filter(|s| !matches!(s, ResponseStatus::No | ResponseStatus::Bad))
}

/// Encode `value` as an IMAP quoted string.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
