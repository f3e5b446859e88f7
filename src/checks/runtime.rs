//! Environment the probe itself runs in

use crate::engine::{Check, CheckContext};
use crate::error::Result;
use crate::report::Outcome;
use async_trait::async_trait;
use serde_json::json;
use std::env::consts;

/// Always succeeds; records tool version and platform so reports from
/// different hosts can be told apart.
#[derive(Debug, Clone)]
pub struct RuntimeInfoCheck {
    id: String,
}

impl RuntimeInfoCheck {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Check for RuntimeInfoCheck {
    fn id(&self) -> &str {
        &self.id
    }

    fn target(&self) -> &'static str {
        "runtime"
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Outcome> {
        let version = env!("CARGO_PKG_VERSION");
        Ok(Outcome::ok(format!(
            "{} {version} on {}/{}",
            env!("CARGO_PKG_NAME"),
            consts::OS,
            consts::ARCH
        ))
        .with_data(json!({
            "tool_version": version,
            "os": consts::OS,
            "arch": consts::ARCH,
            "family": consts::FAMILY,
            "timeout_ms": ctx.timeout().as_millis(),
            "mode": ctx.config.mode,
        })))
    }
}
