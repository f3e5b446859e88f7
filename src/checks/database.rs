//! Database reachability for the DSN the webmail is configured with

use crate::checks::config_extract::read_dsn;
use crate::connection::{resolve, within};
use crate::dsn::Dsn;
use crate::engine::{Check, CheckContext};
use crate::error::{Error, Result};
use crate::report::Outcome;
use crate::secret::{Secret, scrub};
use crate::target::Target;
use async_trait::async_trait;
use serde_json::json;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Opens and closes one connection described by a DSN.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    /// Open one connection, complete the handshake, and disconnect
    /// without executing any statement.
    ///
    /// Returns a short description of what was reached.
    ///
    /// # Errors
    ///
    /// Connection failures are classified like any other endpoint;
    /// server-side refusals become [`Error::Database`].
    async fn connect(&self, dsn: &Dsn, timeout: Duration) -> Result<String>;
}

/// Connects with `sqlx` and closes again; the handshake with
/// authentication is the whole test.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

fn map_sqlx(endpoint: &str, err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Io(e) => Error::from_io(endpoint, &e),
        sqlx::Error::Tls(e) => Error::Tls(e.to_string()),
        other => Error::Database(other.to_string()),
    }
}

#[async_trait]
impl DatabaseConnector for MySqlConnector {
    async fn connect(&self, dsn: &Dsn, timeout: Duration) -> Result<String> {
        let host = dsn.host.as_deref().unwrap_or("localhost");
        let port = dsn.port.unwrap_or(DEFAULT_MYSQL_PORT);
        let endpoint = format!("{host}:{port}");
        let deadline = Instant::now() + timeout;

        // sqlx reports resolver failures as plain I/O errors.
        resolve(&endpoint, deadline, timeout).await?;

        let mut options = MySqlConnectOptions::new().host(host).port(port);
        if let Some(user) = &dsn.user {
            options = options.username(user);
        }
        if let Some(password) = &dsn.password {
            options = options.password(password.expose());
        }
        if let Some(database) = &dsn.database {
            options = options.database(database);
        }

        debug!("Connecting to MySQL at {}", endpoint);
        let session = async {
            let conn = options.connect().await?;
            conn.close().await
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        within(remaining, &endpoint, session)
            .await
            .map_err(|_| Error::timeout(&endpoint, timeout))?
            .map_err(|e| map_sqlx(&endpoint, e))?;
        info!("MySQL at {} accepted the connection", endpoint);
        Ok(format!("MySQL server at {endpoint}"))
    }
}

/// Connects to the configured database.
///
/// The target is either a DSN or the config file to extract one from.
/// Only MySQL DSNs are connected; other schemes are skipped.
#[derive(Clone)]
pub struct DatabaseCheck {
    id: String,
    target: String,
    connector: Arc<dyn DatabaseConnector>,
}

impl DatabaseCheck {
    #[must_use]
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_connector(id, target, Arc::new(MySqlConnector))
    }

    #[must_use]
    pub fn with_connector(
        id: impl Into<String>,
        target: impl Into<String>,
        connector: Arc<dyn DatabaseConnector>,
    ) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            connector,
        }
    }

    async fn resolve(&self, ctx: &CheckContext<'_>) -> Result<Secret> {
        match ctx.targets.require(&self.target)? {
            Target::Dsn(raw) => Ok(raw.clone()),
            Target::Path(path) => read_dsn(path, &ctx.config.dsn_pattern, ctx.timeout())
                .await
                .map(Secret::from),
            _ => Err(Error::Config(format!(
                "target '{}' is neither a DSN nor a config file",
                self.target
            ))),
        }
    }
}

#[async_trait]
impl Check for DatabaseCheck {
    fn id(&self) -> &str {
        &self.id
    }

    fn target(&self) -> &str {
        &self.target
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Outcome> {
        let raw = self.resolve(ctx).await?;
        let dsn = Dsn::parse(raw.expose())?;
        let masked = dsn.masked();

        if !dsn.is_mysql() {
            return Ok(Outcome::skipped(format!(
                "non-MySQL database, connection test not supported ({})",
                dsn.scheme
            )));
        }

        let password = dsn
            .password
            .as_ref()
            .map(Secret::expose)
            .unwrap_or_default();
        match self.connector.connect(&dsn, ctx.timeout()).await {
            Ok(summary) => Ok(
                Outcome::ok(format!("connected to {masked}: {summary}")).with_data(json!({
                    "dsn": masked,
                    "server": summary,
                })),
            ),
            Err(e) => {
                let detail = scrub(&e.to_string(), &[password]);
                Ok(Outcome::failed(e.kind(), detail).with_data(json!({ "dsn": masked })))
            }
        }
    }
}
