//! Error types for mailprobe
//!
//! Every variant except [`Error::DuplicateCheck`] describes something
//! wrong with the *target* and is converted into a `failed` result at
//! the check boundary. `DuplicateCheck` describes a misconfigured engine
//! and is the only one that reaches the caller of `register`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a TCP connection attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionFailure {
    Refused,
    Timeout,
    Dns,
    Other,
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Refused => "connection refused",
            Self::Timeout => "timed out",
            Self::Dns => "name resolution failed",
            Self::Other => "connection failed",
        })
    }
}

/// The login layer a credential was rejected at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthTier {
    Raw,
    Library,
    Application,
}

impl fmt::Display for AuthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raw => "raw protocol",
            Self::Library => "library",
            Self::Application => "application",
        })
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{endpoint}: {kind}: {message}")]
    Connection {
        kind: ConnectionFailure,
        endpoint: String,
        message: String,
    },

    #[error("{tier} login rejected: {message}")]
    Authentication { tier: AuthTier, message: String },

    #[error("config file {} not readable: {source}", path.display())]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no connection string matched in {}", path.display())]
    PatternNotMatched { path: PathBuf },

    #[error("missing capabilities: {}", missing.join(", "))]
    CapabilityMissing { missing: Vec<String> },

    #[error("check '{0}' is already registered")]
    DuplicateCheck(String),

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn connection(
        kind: ConnectionFailure,
        endpoint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Connection {
            kind,
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub(crate) fn timeout(endpoint: impl Into<String>, after: Duration) -> Self {
        Self::connection(
            ConnectionFailure::Timeout,
            endpoint,
            format!("no response within {after:?}"),
        )
    }

    /// Classify an I/O error raised while talking to `endpoint`.
    ///
    /// Classification uses the error kind only, never its message.
    pub(crate) fn from_io(endpoint: impl Into<String>, err: &std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::ConnectionRefused => ConnectionFailure::Refused,
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                ConnectionFailure::Timeout
            }
            _ => ConnectionFailure::Other,
        };
        Self::connection(kind, endpoint, err.to_string())
    }

    /// The result classification this error maps to.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Connection { kind, .. } => match kind {
                ConnectionFailure::Refused => FailureKind::ConnectionRefused,
                ConnectionFailure::Timeout => FailureKind::Timeout,
                ConnectionFailure::Dns => FailureKind::DnsError,
                ConnectionFailure::Other => FailureKind::ConnectionFailed,
            },
            Self::Io(_) => FailureKind::ConnectionFailed,
            Self::Authentication { .. } => FailureKind::Authentication,
            Self::ConfigNotFound { .. } => FailureKind::ConfigNotFound,
            Self::PatternNotMatched { .. } => FailureKind::PatternNotMatched,
            Self::CapabilityMissing { .. } => FailureKind::CapabilityMissing,
            Self::Protocol(_) => FailureKind::Protocol,
            Self::Tls(_) => FailureKind::Tls,
            Self::Database(_) => FailureKind::Database,
            Self::DuplicateCheck(_) | Self::Config(_) => FailureKind::Configuration,
        }
    }
}

/// Classification carried by every `failed` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ConnectionRefused,
    Timeout,
    DnsError,
    ConnectionFailed,
    Tls,
    Protocol,
    Authentication,
    ConfigNotFound,
    PatternNotMatched,
    CapabilityMissing,
    MissingPath,
    Database,
    Configuration,
    /// The check panicked.
    Internal,
}

impl FailureKind {
    /// Whether this is one of the `ConnectionError` kinds.
    #[must_use]
    pub const fn is_connection_error(self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused | Self::Timeout | Self::DnsError | Self::ConnectionFailed
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionRefused => "connection-refused",
            Self::Timeout => "timeout",
            Self::DnsError => "dns-error",
            Self::ConnectionFailed => "connection-failed",
            Self::Tls => "tls",
            Self::Protocol => "protocol",
            Self::Authentication => "authentication",
            Self::ConfigNotFound => "config-not-found",
            Self::PatternNotMatched => "pattern-not-matched",
            Self::CapabilityMissing => "capability-missing",
            Self::MissingPath => "missing-path",
            Self::Database => "database",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn io_refused_is_classified_by_kind() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "whatever text");
        let e = Error::from_io("localhost:143", &err);
        assert_eq!(e.kind(), FailureKind::ConnectionRefused);
    }

    #[test]
    fn io_message_does_not_drive_classification() {
        let err = io::Error::other("connection refused");
        let e = Error::from_io("localhost:143", &err);
        assert_eq!(e.kind(), FailureKind::ConnectionFailed);
    }

    #[test]
    fn connection_kinds_are_connection_errors() {
        assert!(FailureKind::ConnectionRefused.is_connection_error());
        assert!(FailureKind::Timeout.is_connection_error());
        assert!(FailureKind::DnsError.is_connection_error());
        assert!(!FailureKind::Authentication.is_connection_error());
        assert!(!FailureKind::Internal.is_connection_error());
    }

    #[test]
    fn failure_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&FailureKind::ConnectionRefused).unwrap();
        assert_eq!(json, "\"connection-refused\"");
        let json = serde_json::to_string(&FailureKind::DnsError).unwrap();
        assert_eq!(json, "\"dns-error\"");
    }

    #[test]
    fn timeout_helper_maps_to_timeout_kind() {
        let e = Error::timeout("mail:25", Duration::from_secs(5));
        assert_eq!(e.kind(), FailureKind::Timeout);
        assert!(e.to_string().contains("mail:25"));
    }
}
