//! Application-level login
//!
//! Webmail front ends rarely hand credentials straight to IMAP: plugins
//! rewrite the username, pick a host, or veto the attempt first. An
//! [`AuthRequest`] is passed through an ordered chain of [`AuthHook`]s
//! and, if still valid, handed to an [`ApplicationLogin`]. Both are
//! explicit objects given to the check, so no process-wide session
//! state is involved.

use crate::connection::{imap_session, select};
use crate::error::Result;
use crate::secret::Secret;
use crate::target::Endpoint;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Credentials as seen by the hook chain.
#[derive(Clone)]
pub struct AuthRequest {
    pub host: String,
    pub user: String,
    pub password: Secret,
    /// Cleared by a hook that considers the request unusable.
    pub valid: bool,
    /// Set by a hook that wants the login attempt stopped.
    pub abort: bool,
    pub error: Option<String>,
}

impl AuthRequest {
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: Secret) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password,
            valid: true,
            abort: false,
            error: None,
        }
    }

    /// Whether the chain left the request in a state that may log in.
    #[must_use]
    pub const fn accepted(&self) -> bool {
        self.valid && !self.abort
    }
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password)
            .field("valid", &self.valid)
            .field("abort", &self.abort)
            .field("error", &self.error)
            .finish()
    }
}

/// One link of the authentication hook chain.
#[async_trait]
pub trait AuthHook: Send + Sync {
    fn name(&self) -> &str;

    async fn authenticate(&self, request: AuthRequest) -> AuthRequest;
}

/// Appends a default domain to bare usernames.
#[derive(Debug, Clone)]
pub struct UsernameDomainHook {
    domain: String,
}

impl UsernameDomainHook {
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }
}

#[async_trait]
impl AuthHook for UsernameDomainHook {
    fn name(&self) -> &'static str {
        "username_domain"
    }

    async fn authenticate(&self, mut request: AuthRequest) -> AuthRequest {
        if !request.user.contains('@') && !request.user.is_empty() {
            request.user = format!("{}@{}", request.user, self.domain);
        }
        request
    }
}

/// Run `request` through `hooks` in order.
///
/// A hook that aborts stops the chain; later hooks are not consulted.
pub async fn run_hooks(
    hooks: &[std::sync::Arc<dyn AuthHook>],
    mut request: AuthRequest,
) -> (AuthRequest, Vec<String>) {
    let mut ran = Vec::with_capacity(hooks.len());
    for hook in hooks {
        debug!("Running auth hook {}", hook.name());
        request = hook.authenticate(request).await;
        ran.push(hook.name().to_string());
        if request.abort {
            break;
        }
    }
    (request, ran)
}

/// The host application's own login routine.
#[async_trait]
pub trait ApplicationLogin: Send + Sync {
    /// Log in with `request`, then end the session again.
    ///
    /// Returns a short description of the established session.
    ///
    /// # Errors
    ///
    /// Returns the connection, TLS or authentication error that stopped
    /// the login.
    async fn login(
        &self,
        endpoint: &Endpoint,
        request: &AuthRequest,
        io_timeout: Duration,
    ) -> Result<String>;
}

/// Logs in the way a webmail session starts: IMAP login followed by
/// opening the inbox.
#[derive(Debug, Clone)]
pub struct ImapApplicationLogin {
    folder: String,
}

impl Default for ImapApplicationLogin {
    fn default() -> Self {
        Self {
            folder: "INBOX".to_string(),
        }
    }
}

impl ImapApplicationLogin {
    /// Open `folder` instead of `INBOX` after logging in.
    #[must_use]
    pub fn with_folder(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
        }
    }
}

#[async_trait]
impl ApplicationLogin for ImapApplicationLogin {
    async fn login(
        &self,
        endpoint: &Endpoint,
        request: &AuthRequest,
        io_timeout: Duration,
    ) -> Result<String> {
        let endpoint = Endpoint {
            host: request.host.clone(),
            ..endpoint.clone()
        };
        let credentials =
            crate::target::Credentials::new(request.user.clone(), request.password.clone());
        let mut session = imap_session(&endpoint, &credentials, io_timeout).await?;

        let selected = select(&mut session, &self.folder).await;
        session.logout().await.ok();
        let exists = selected?;

        info!("Application session opened {} on {}", self.folder, endpoint);
        Ok(format!("opened {} ({exists} messages)", self.folder))
    }
}
