//! TCP reachability with greeting capture

use crate::connection::{LineStream, open_stream};
use crate::engine::{Check, CheckContext};
use crate::error::Result;
use crate::report::Outcome;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Connects to an endpoint and records the first line the server sends.
///
/// Works for any greeting-first protocol (IMAP, SMTP, POP3). Failures
/// are classified as `connection-refused`, `timeout`, `dns-error` or
/// `connection-failed`.
#[derive(Debug, Clone)]
pub struct SocketCheck {
    id: String,
    target: String,
}

impl SocketCheck {
    #[must_use]
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
        }
    }
}

#[async_trait]
impl Check for SocketCheck {
    fn id(&self) -> &str {
        &self.id
    }

    fn target(&self) -> &str {
        &self.target
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Outcome> {
        let endpoint = ctx.targets.endpoint(&self.target)?;
        let stream = open_stream(endpoint, ctx.timeout()).await?;
        let mut lines = LineStream::new(stream, endpoint, ctx.timeout());
        let greeting = lines.read_line().await?;
        debug!("Greeting from {}: {}", endpoint, greeting);

        let data = json!({
            "address": endpoint.address(),
            "tls": endpoint.tls,
            "greeting": greeting,
        });
        Ok(Outcome::ok(format!("connected to {endpoint}: {greeting}")).with_data(data))
    }
}
