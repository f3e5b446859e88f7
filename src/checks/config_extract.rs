//! Connection string extraction from the webmail config file

use crate::connection::within;
use crate::dsn::Dsn;
use crate::engine::{Check, CheckContext};
use crate::error::{Error, Result};
use crate::report::Outcome;
use crate::secret::mask_dsn;
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::path::Path;
use tracing::{debug, info};

/// First capture of `pattern` in `text`, trimmed.
#[must_use]
pub fn extract_dsn(text: &str, pattern: &Regex) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|dsn| !dsn.is_empty())
}

/// Read `path` and extract the DSN, bounded by `timeout`.
///
/// Bytes that are not UTF-8, such as a Latin-1 comment, are replaced
/// before matching; only a missing or unreadable file is
/// [`Error::ConfigNotFound`].
pub(crate) async fn read_dsn(
    path: &Path,
    pattern: &Regex,
    timeout: std::time::Duration,
) -> Result<String> {
    let label = path.display().to_string();
    let bytes = within(timeout, &label, tokio::fs::read(path))
        .await?
        .map_err(|source| Error::ConfigNotFound {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Read {} bytes from {}", bytes.len(), label);

    let text = String::from_utf8_lossy(&bytes);
    extract_dsn(&text, pattern).ok_or_else(|| Error::PatternNotMatched {
        path: path.to_path_buf(),
    })
}

/// Reads the config file named by a path target and reports the DSN
/// it defines, password masked.
#[derive(Debug, Clone)]
pub struct ConfigExtractCheck {
    id: String,
    target: String,
}

impl ConfigExtractCheck {
    #[must_use]
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
        }
    }
}

#[async_trait]
impl Check for ConfigExtractCheck {
    fn id(&self) -> &str {
        &self.id
    }

    fn target(&self) -> &str {
        &self.target
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Outcome> {
        let path = ctx.targets.path(&self.target)?;
        let raw = read_dsn(path, &ctx.config.dsn_pattern, ctx.timeout()).await?;
        let masked = mask_dsn(&raw);
        info!("Found DSN in {}: {}", path.display(), masked);

        let parsed = Dsn::parse(&raw).ok();
        Ok(Outcome::ok(format!("DSN found: {masked}")).with_data(json!({
            "dsn": masked,
            "scheme": parsed.as_ref().map(|d| d.scheme.clone()),
            "host": parsed.as_ref().and_then(|d| d.host.clone()),
            "database": parsed.as_ref().and_then(|d| d.database.clone()),
        })))
    }
}
