//! Probe targets
//!
//! A [`TargetSet`] is supplied by the caller for each run and lent to
//! every check. Checks refer to targets by name so the same check type
//! can be pointed at the IMAP port, the SMTP port, or anything else.

use crate::error::{Error, Result};
use crate::secret::Secret;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How the transport is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Cleartext TCP.
    #[default]
    Plain,
    /// Cleartext greeting, then an in-band `STARTTLS` upgrade.
    StartTls,
    /// TLS from the first byte (993, 465).
    Implicit,
}

impl FromStr for TlsMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "none" | "" => Ok(Self::Plain),
            "starttls" => Ok(Self::StartTls),
            "tls" | "ssl" | "implicit" => Ok(Self::Implicit),
            other => Err(Error::Config(format!("Unknown TLS mode '{other}'"))),
        }
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::StartTls => "starttls",
            Self::Implicit => "tls",
        })
    }
}

/// A `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
}

impl Endpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: TlsMode::Plain,
        }
    }

    #[must_use]
    pub const fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tls {
            TlsMode::Plain => write!(f, "{}:{}", self.host, self.port),
            tls => write!(f, "{}:{} ({tls})", self.host, self.port),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Secret,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<Secret>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Something a check can be pointed at.
#[derive(Debug, Clone)]
pub enum Target {
    Endpoint(Endpoint),
    Login {
        endpoint: Endpoint,
        credentials: Credentials,
    },
    Path(PathBuf),
    Dsn(Secret),
}

impl Target {
    /// Human-readable identity with every credential removed.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Endpoint(ep) => ep.to_string(),
            Self::Login {
                endpoint,
                credentials,
            } => format!("{}@{endpoint}", credentials.username),
            Self::Path(path) => path.display().to_string(),
            Self::Dsn(raw) => crate::secret::mask_dsn(raw.expose()),
        }
    }

    fn secrets(&self) -> Vec<&str> {
        match self {
            Self::Login { credentials, .. } => vec![credentials.password.expose()],
            Self::Dsn(raw) => raw
                .expose()
                .rfind('@')
                .and_then(|at| raw.expose()[..at].split_once("://"))
                .and_then(|(_, userinfo)| userinfo.split_once(':'))
                .map(|(_, pass)| pass)
                .into_iter()
                .collect(),
            Self::Endpoint(_) | Self::Path(_) => Vec::new(),
        }
    }
}

/// Summary of one target as it appears in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub name: String,
    pub description: String,
}

/// Named targets for one run, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    targets: Vec<(String, Target)>,
}

impl TargetSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a named target.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, target: Target) -> Self {
        self.insert(name, target);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, target: Target) {
        let name = name.into();
        if let Some(slot) = self.targets.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = target;
        } else {
            self.targets.push((name, target));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Look up a target, failing with a configuration error if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no target has this name.
    pub fn require(&self, name: &str) -> Result<&Target> {
        self.get(name)
            .ok_or_else(|| Error::Config(format!("no target named '{name}'")))
    }

    /// Look up a network endpoint, accepting either an endpoint or a
    /// login target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the target is absent or not a network
    /// target.
    pub fn endpoint(&self, name: &str) -> Result<&Endpoint> {
        match self.require(name)? {
            Target::Endpoint(ep) | Target::Login { endpoint: ep, .. } => Ok(ep),
            _ => Err(Error::Config(format!("target '{name}' is not a network endpoint"))),
        }
    }

    /// Look up a login target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the target is absent or carries no
    /// credentials.
    pub fn login(&self, name: &str) -> Result<(&Endpoint, &Credentials)> {
        match self.require(name)? {
            Target::Login {
                endpoint,
                credentials,
            } => Ok((endpoint, credentials)),
            _ => Err(Error::Config(format!("target '{name}' has no credentials"))),
        }
    }

    /// Look up a filesystem path target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the target is absent or not a path.
    pub fn path(&self, name: &str) -> Result<&Path> {
        match self.require(name)? {
            Target::Path(p) => Ok(p),
            _ => Err(Error::Config(format!("target '{name}' is not a path"))),
        }
    }

    /// Every secret held by any target, for scrubbing result text.
    #[must_use]
    pub fn secrets(&self) -> Vec<&str> {
        self.targets.iter().flat_map(|(_, t)| t.secrets()).collect()
    }

    #[must_use]
    pub fn summaries(&self) -> Vec<TargetSummary> {
        self.targets
            .iter()
            .map(|(name, t)| TargetSummary {
                name: name.clone(),
                description: t.describe(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_target() -> Target {
        Target::Login {
            endpoint: Endpoint::new("mail.local", 143),
            credentials: Credentials::new("alice@example.com", "hunter2"),
        }
    }

    #[test]
    fn tls_mode_parses_aliases() {
        assert_eq!("plain".parse::<TlsMode>().unwrap(), TlsMode::Plain);
        assert_eq!("STARTTLS".parse::<TlsMode>().unwrap(), TlsMode::StartTls);
        assert_eq!("ssl".parse::<TlsMode>().unwrap(), TlsMode::Implicit);
        assert!("quic".parse::<TlsMode>().is_err());
    }

    #[test]
    fn login_description_hides_password() {
        let desc = login_target().describe();
        assert_eq!(desc, "alice@example.com@mail.local:143");
        assert!(!desc.contains("hunter2"));
    }

    #[test]
    fn dsn_description_is_masked() {
        let t = Target::Dsn(Secret::new("mysql://u:hunter2@db/rc"));
        assert_eq!(t.describe(), "mysql://u:***@db/rc");
    }

    #[test]
    fn secrets_collects_login_and_dsn_passwords() {
        let set = TargetSet::new()
            .with("login", login_target())
            .with("dsn", Target::Dsn(Secret::new("mysql://u:dbpass@db/rc")))
            .with("smtp", Target::Endpoint(Endpoint::new("localhost", 25)));
        let secrets = set.secrets();
        assert_eq!(secrets, vec!["hunter2", "dbpass"]);
    }

    #[test]
    fn endpoint_lookup_accepts_login_targets() {
        let set = TargetSet::new().with("imap", login_target());
        assert_eq!(set.endpoint("imap").unwrap().port, 143);
        assert!(set.path("imap").is_err());
        assert!(set.endpoint("missing").is_err());
    }

    #[test]
    fn insert_replaces_existing_name() {
        let mut set = TargetSet::new().with("imap", Target::Endpoint(Endpoint::new("a", 1)));
        set.insert("imap", Target::Endpoint(Endpoint::new("b", 2)));
        assert_eq!(set.len(), 1);
        assert_eq!(set.endpoint("imap").unwrap().host, "b");
    }
}
