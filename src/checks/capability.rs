//! Required capability check

use crate::engine::{Check, CheckContext};
use crate::error::{Error, FailureKind, Result};
use crate::report::Outcome;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use std::net::{TcpListener, ToSocketAddrs};
use std::sync::Arc;
use tracing::debug;

/// Reports which named capabilities this process can exercise.
///
/// Called on a blocking thread, so implementations may touch the
/// network stack or the resolver.
pub trait CapabilityProvider: Send + Sync {
    fn available(&self) -> BTreeSet<String>;
}

/// Probes the host this process runs on.
///
/// - `tcp`: a loopback socket can be bound
/// - `dns`: `resolve_name` resolves
/// - `tls`, `starttls`: a rustls client config builds with the ring
///   provider
/// - `imap`, `smtp`, `mysql`: the protocol modules compiled into the probe
#[derive(Debug, Clone)]
pub struct BuiltinCapabilities {
    resolve_name: String,
}

impl Default for BuiltinCapabilities {
    fn default() -> Self {
        Self::resolving("localhost")
    }
}

impl BuiltinCapabilities {
    /// Use `name` for the `dns` test instead of `localhost`.
    #[must_use]
    pub fn resolving(name: impl Into<String>) -> Self {
        Self {
            resolve_name: name.into(),
        }
    }

    fn can_bind_loopback() -> bool {
        TcpListener::bind(("127.0.0.1", 0)).is_ok()
    }

    fn can_resolve(&self) -> bool {
        (self.resolve_name.as_str(), 0)
            .to_socket_addrs()
            .is_ok_and(|mut addrs| addrs.next().is_some())
    }

    fn can_build_tls() -> bool {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .is_ok()
    }
}

impl CapabilityProvider for BuiltinCapabilities {
    fn available(&self) -> BTreeSet<String> {
        let mut available: BTreeSet<String> = ["imap", "smtp", "mysql"]
            .into_iter()
            .map(ToString::to_string)
            .collect();
        if Self::can_bind_loopback() {
            available.insert("tcp".to_string());
        }
        if self.can_resolve() {
            available.insert("dns".to_string());
        } else {
            debug!("{} does not resolve", self.resolve_name);
        }
        if Self::can_build_tls() {
            available.insert("tls".to_string());
            available.insert("starttls".to_string());
        }
        available
    }
}

/// A fixed capability list.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities(pub BTreeSet<String>);

impl<S: Into<String>> FromIterator<S> for StaticCapabilities {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl CapabilityProvider for StaticCapabilities {
    fn available(&self) -> BTreeSet<String> {
        self.0.clone()
    }
}

/// Compares `required_capabilities` from the config with what the
/// provider offers. Needs no target.
#[derive(Clone)]
pub struct CapabilityCheck {
    id: String,
    provider: Arc<dyn CapabilityProvider>,
}

impl CapabilityCheck {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_provider(id, Arc::new(BuiltinCapabilities::default()))
    }

    #[must_use]
    pub fn with_provider(id: impl Into<String>, provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            id: id.into(),
            provider,
        }
    }
}

#[async_trait]
impl Check for CapabilityCheck {
    fn id(&self) -> &str {
        &self.id
    }

    fn target(&self) -> &'static str {
        "runtime"
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Outcome> {
        let provider = Arc::clone(&self.provider);
        let available = match tokio::task::spawn_blocking(move || provider.available()).await {
            Ok(available) => available,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => return Err(Error::Io(std::io::Error::other(e))),
        };
        let required = &ctx.config.required_capabilities;
        let missing: Vec<&str> = required
            .iter()
            .filter(|name| !available.contains(*name))
            .map(String::as_str)
            .collect();

        let data = json!({
            "available": available,
            "required": required
                .iter()
                .map(|name| json!({ "name": name, "present": available.contains(name) }))
                .collect::<Vec<_>>(),
        });

        if missing.is_empty() {
            let detail = format!("all {} required capabilities present", required.len());
            Ok(Outcome::ok(detail).with_data(data))
        } else {
            Ok(Outcome::failed(
                FailureKind::CapabilityMissing,
                format!("missing capabilities: {}", missing.join(", ")),
            )
            .with_data(data))
        }
    }
}
