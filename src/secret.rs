//! Secret handling
//!
//! [`Secret`] keeps passwords out of `Debug` output. The free functions
//! mask secrets in strings that are about to leave a check: DSNs are
//! masked structurally, and [`scrub`] removes any remaining literal
//! occurrence of a known secret.

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

/// Replacement text for a masked secret.
pub const MASK: &str = "***";

/// Replacement text for the password argument of a logged command.
pub const COMMAND_MASK: &str = "********";

static DSN_USERINFO: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r":[^:]*@").ok());

/// A password or other credential that must not be displayed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The plaintext value. Only hand this to the wire, never to a log.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({MASK})")
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Mask the password of a DSN such as `mysql://u:p@host/db`.
///
/// Parsable DSNs are rebuilt with the password replaced. Anything else,
/// and any DSN whose parse found no password although the text still
/// carries a `:password@` span, has that span replaced instead.
#[must_use]
pub fn mask_dsn(dsn: &str) -> String {
    let parsed = crate::dsn::Dsn::parse(dsn).ok();
    if let Some(parsed) = &parsed
        && (parsed.password.is_some() || !has_userinfo_password(dsn))
    {
        return parsed.masked();
    }
    DSN_USERINFO.as_ref().map_or_else(
        || MASK.to_string(),
        |re| re.replace(dsn, format!(":{MASK}@")).into_owned(),
    )
}

fn has_userinfo_password(dsn: &str) -> bool {
    let rest = dsn.split_once("://").map_or(dsn, |(_, rest)| rest);
    DSN_USERINFO.as_ref().is_none_or(|re| re.is_match(rest))
}

/// Replace every occurrence of each non-empty secret in `text`.
#[must_use]
pub fn scrub(text: &str, secrets: &[&str]) -> String {
    let mut out = text.to_string();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        if out.contains(secret) {
            out = out.replace(secret, MASK);
        }
    }
    out
}

/// [`scrub`] every string inside a JSON value, keys included.
pub fn scrub_value(value: &mut Value, secrets: &[&str]) {
    match value {
        Value::String(s) => *s = scrub(s, secrets),
        Value::Array(items) => {
            for item in items {
                scrub_value(item, secrets);
            }
        }
        Value::Object(map) => {
            let entries = std::mem::take(map);
            for (key, mut item) in entries {
                scrub_value(&mut item, secrets);
                map.insert(scrub(&key, secrets), item);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}
