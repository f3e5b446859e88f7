//! Diagnostic probes for webmail installations
//!
//! Checks whether an IMAP/SMTP backend, its credentials, the webmail
//! install tree and its database are usable. A [`ProbeEngine`] runs an
//! ordered list of [`Check`]s against a [`TargetSet`] and returns a
//! [`ProbeReport`] with one scrubbed result per check.
//!
//! Login is probed in three tiers of increasing abstraction (raw IMAP
//! commands, an `async-imap` session, then the application login behind
//! a hook chain) so a failure can be pinned to the layer that broke.

pub mod checks;
mod config;
mod connection;
mod dsn;
mod engine;
mod error;
mod imap;
mod render;
mod report;
mod secret;
mod suite;
mod target;

pub use config::{MailTargets, ProbeConfig, compile_dsn_pattern};
pub use dsn::Dsn;
pub use engine::{Check, CheckContext, ProbeEngine, RunMode, RunPhase};
pub use error::{AuthTier, ConnectionFailure, Error, FailureKind, Result};
pub use render::{JsonRenderer, Renderer, TextRenderer};
pub use report::{CheckResult, DEADLINE_EXCEEDED, Outcome, ProbeReport, Status};
pub use secret::{Secret, mask_dsn};
pub use suite::{
    CONFIG_TARGET, IMAP_TARGET, INSTALL_TARGET, LOGIN_TARGET, SMTP_TARGET, Suite, mail_targets,
};
pub use target::{Credentials, Endpoint, Target, TargetSet, TargetSummary, TlsMode};
