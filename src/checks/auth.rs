//! Three-tier IMAP login
//!
//! The same credentials are tried three ways, each closer to what a
//! webmail user would experience:
//!
//! 1. raw: a hand-written `LOGIN` command over a line stream
//! 2. library: an `async-imap` session that lists folders
//! 3. application: the hook chain plus [`ApplicationLogin`]
//!
//! The tiers share a group so the engine never runs them against the
//! server at the same time.

use crate::checks::app::{
    ApplicationLogin, AuthHook, AuthRequest, ImapApplicationLogin, run_hooks,
};
use crate::connection::{
    BoxedStream, LineStream, imap_session, list_folders, open_stream, within, wrap_tls,
};
use crate::engine::{Check, CheckContext};
use crate::error::{AuthTier, Error, Result};
use crate::imap::{ResponseStatus, greeting_status, parse_tagged, quote};
use crate::report::Outcome;
use crate::secret::COMMAND_MASK;
use crate::target::{Credentials, TlsMode};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Untagged lines tolerated before a tagged completion.
const MAX_UNTAGGED: usize = 64;

/// Builds the grouped raw, library and application login checks for one
/// login target.
#[derive(Clone)]
pub struct TieredAuthProbe {
    prefix: String,
    target: String,
    hooks: Vec<Arc<dyn AuthHook>>,
    login: Arc<dyn ApplicationLogin>,
}

impl TieredAuthProbe {
    /// Check ids become `<prefix>.raw-login`, `<prefix>.library-login`
    /// and `<prefix>.app-login`.
    #[must_use]
    pub fn new(prefix: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            target: target.into(),
            hooks: Vec::new(),
            login: Arc::new(ImapApplicationLogin::default()),
        }
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn AuthHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: impl IntoIterator<Item = Arc<dyn AuthHook>>) -> Self {
        self.hooks.extend(hooks);
        self
    }

    #[must_use]
    pub fn with_application(mut self, login: Arc<dyn ApplicationLogin>) -> Self {
        self.login = login;
        self
    }

    /// The three tiers in execution order.
    #[must_use]
    pub fn checks(&self) -> Vec<Arc<dyn Check>> {
        let group = format!("{}.login", self.prefix);
        vec![
            Arc::new(RawLoginCheck {
                id: format!("{}.raw-login", self.prefix),
                target: self.target.clone(),
                group: group.clone(),
            }),
            Arc::new(LibraryLoginCheck {
                id: format!("{}.library-login", self.prefix),
                target: self.target.clone(),
                group: group.clone(),
            }),
            Arc::new(AppLoginCheck {
                id: format!("{}.app-login", self.prefix),
                target: self.target.clone(),
                group,
                hooks: self.hooks.clone(),
                login: self.login.clone(),
            }),
        ]
    }
}

/// Tier 1: speaks IMAP directly.
#[derive(Debug, Clone)]
pub struct RawLoginCheck {
    id: String,
    target: String,
    group: String,
}

impl RawLoginCheck {
    #[must_use]
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            group: id.clone(),
            id,
            target: target.into(),
        }
    }
}

/// Read lines until the completion for `tag`, recording each in
/// `transcript`.
async fn read_tagged(
    lines: &mut LineStream,
    tag: &str,
    transcript: &mut Vec<String>,
) -> Result<(ResponseStatus, String)> {
    for _ in 0..=MAX_UNTAGGED {
        let line = lines.read_line().await?;
        transcript.push(format!("S: {line}"));
        if let Some(tagged) = parse_tagged(tag, &line) {
            debug!("{} completed: {} {}", tag, tagged.status, tagged.text);
            let status = tagged.status;
            return Ok((status, line));
        }
        if greeting_status(&line) == Some(ResponseStatus::Bye) {
            return Err(Error::Protocol(format!("server closed the session: {line}")));
        }
    }
    Err(Error::Protocol(format!(
        "no {tag} completion after {MAX_UNTAGGED} lines"
    )))
}

fn reject_line_breaks(credentials: &Credentials) -> Result<()> {
    let has_break = |s: &str| s.contains(['\r', '\n']);
    if has_break(&credentials.username) || has_break(credentials.password.expose()) {
        return Err(Error::Config("credentials must not contain line breaks".into()));
    }
    Ok(())
}

#[async_trait]
impl Check for RawLoginCheck {
    fn id(&self) -> &str {
        &self.id
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn group(&self) -> Option<&str> {
        Some(&self.group)
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Outcome> {
        let (endpoint, credentials) = ctx.targets.login(&self.target)?;
        reject_line_breaks(credentials)?;
        let timeout = ctx.timeout();

        let stream = open_stream(endpoint, timeout).await?;
        let mut lines = LineStream::new(stream, endpoint, timeout);
        let mut transcript = Vec::new();

        let greeting = lines.read_line().await?;
        transcript.push(format!("S: {greeting}"));
        match greeting_status(&greeting) {
            Some(ResponseStatus::Bye) => {
                return Err(Error::Protocol(format!("server refused the session: {greeting}")));
            }
            Some(_) => {}
            None => return Err(Error::Protocol(format!("unexpected greeting: {greeting}"))),
        }

        if endpoint.tls == TlsMode::StartTls {
            lines.write_line("S1 STARTTLS").await?;
            transcript.push("C: S1 STARTTLS".to_string());
            let (status, reply) = read_tagged(&mut lines, "S1", &mut transcript).await?;
            if status != ResponseStatus::Ok {
                return Err(Error::Tls(format!("STARTTLS refused: {reply}")));
            }
            let handshake = wrap_tls(lines.into_inner(), &endpoint.host);
            let tls = within(timeout, &endpoint.address(), handshake).await??;
            let upgraded: BoxedStream = Box::new(tls);
            lines = LineStream::new(upgraded, endpoint, timeout);
            transcript.push("-- TLS established".to_string());
        }

        let user = quote(&credentials.username);
        let command = format!("A1 LOGIN {user} {}", quote(credentials.password.expose()));
        let logged = format!("A1 LOGIN {user} {COMMAND_MASK}");
        debug!("Sending {} to {}", logged, endpoint);
        lines.write_line(&command).await?;
        transcript.push(format!("C: {logged}"));

        let completion = read_tagged(&mut lines, "A1", &mut transcript).await;

        if let Err(e) = lines.write_line("A2 LOGOUT").await {
            debug!("LOGOUT to {} not sent: {}", endpoint, e);
        } else {
            transcript.push("C: A2 LOGOUT".to_string());
        }

        let (status, response) = completion?;
        if status != ResponseStatus::Ok {
            warn!("Raw login to {} rejected", endpoint);
            return Err(Error::Authentication {
                tier: AuthTier::Raw,
                message: format!("{logged} -> {response}"),
            });
        }

        info!("Raw login to {} succeeded", endpoint);
        Ok(Outcome::ok(format!("{logged} -> {response}")).with_data(json!({
            "greeting": greeting,
            "command": logged,
            "response": response,
            "transcript": transcript,
        })))
    }
}

/// Tier 2: logs in through `async-imap` and lists folders.
#[derive(Debug, Clone)]
pub struct LibraryLoginCheck {
    id: String,
    target: String,
    group: String,
}

impl LibraryLoginCheck {
    #[must_use]
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            group: id.clone(),
            id,
            target: target.into(),
        }
    }
}

#[async_trait]
impl Check for LibraryLoginCheck {
    fn id(&self) -> &str {
        &self.id
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn group(&self) -> Option<&str> {
        Some(&self.group)
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Outcome> {
        let (endpoint, credentials) = ctx.targets.login(&self.target)?;
        let timeout = ctx.timeout();
        let address = endpoint.address();

        let mut session = imap_session(endpoint, credentials, timeout).await?;
        let listed = within(timeout, &address, list_folders(&mut session)).await;
        if within(timeout, &address, session.logout()).await.is_err() {
            debug!("LOGOUT from {} timed out", endpoint);
        }
        let folders = listed??;

        info!("Library login to {} listed {} folders", endpoint, folders.len());
        Ok(Outcome::ok(format!(
            "logged in as {} and listed {} folders",
            credentials.username,
            folders.len()
        ))
        .with_data(json!({ "folders": folders })))
    }
}

/// Tier 3: runs the hook chain, then the application's own login.
#[derive(Clone)]
pub struct AppLoginCheck {
    id: String,
    target: String,
    group: String,
    hooks: Vec<Arc<dyn AuthHook>>,
    login: Arc<dyn ApplicationLogin>,
}

impl AppLoginCheck {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        target: impl Into<String>,
        hooks: Vec<Arc<dyn AuthHook>>,
        login: Arc<dyn ApplicationLogin>,
    ) -> Self {
        let id = id.into();
        Self {
            group: id.clone(),
            id,
            target: target.into(),
            hooks,
            login,
        }
    }
}

fn as_application(err: Error) -> Error {
    match err {
        Error::Authentication { message, .. } => Error::Authentication {
            tier: AuthTier::Application,
            message,
        },
        other => other,
    }
}

#[async_trait]
impl Check for AppLoginCheck {
    fn id(&self) -> &str {
        &self.id
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn group(&self) -> Option<&str> {
        Some(&self.group)
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Outcome> {
        let (endpoint, credentials) = ctx.targets.login(&self.target)?;
        let request = AuthRequest::new(
            endpoint.host.clone(),
            credentials.username.clone(),
            credentials.password.clone(),
        );

        let attempt = async {
            let (request, ran) = run_hooks(&self.hooks, request).await;
            if !request.accepted() {
                let reason = request.error.as_deref().unwrap_or("Unknown error");
                return Err(Error::Authentication {
                    tier: AuthTier::Application,
                    message: format!("authentication hook failed: {reason}"),
                });
            }

            let summary = self
                .login
                .login(endpoint, &request, ctx.timeout())
                .await
                .map_err(as_application)?;

            let detail = format!("application login as {} succeeded: {summary}", request.user);
            Ok(Outcome::ok(detail).with_data(json!({
                "user": request.user,
                "host": request.host,
                "hooks": ran,
            })))
        };

        within(ctx.config.app_login_timeout, &endpoint.address(), attempt).await?
    }
}
