//! Probe configuration
//!
//! Both structs load from the environment (reading a `.env` file if
//! present) and can be built from any lookup function for tests.

use crate::engine::RunMode;
use crate::error::{Error, Result};
use crate::target::{Credentials, Endpoint, Target, TlsMode};
use regex::Regex;
use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default per-check I/O bound.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound for the application login tier.
pub const DEFAULT_APP_LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default pattern for the writable DSN in a Roundcube config file.
pub const DEFAULT_DSN_PATTERN: &str = r"\$config\['db_dsnw'\]\s*=\s*'([^']+)'";

pub const DEFAULT_CAPABILITIES: &[&str] = &["tcp", "dns", "tls", "imap", "mysql"];

pub const DEFAULT_LAYOUT_DIRS: &[&str] = &["program", "config", "skins", "plugins"];

/// Engine and check settings.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// I/O bound applied by every network or file check.
    pub timeout: Duration,
    /// Bound for the whole application login tier.
    pub app_login_timeout: Duration,
    /// Advisory overall deadline; checks not started by then are skipped.
    pub deadline: Option<Duration>,
    pub mode: RunMode,
    pub required_capabilities: BTreeSet<String>,
    pub install_root: PathBuf,
    /// Config file, relative to `install_root` unless absolute.
    pub config_path: PathBuf,
    /// Extraction pattern; capture group 1 is the DSN.
    pub dsn_pattern: Regex,
    pub layout_dirs: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            app_login_timeout: DEFAULT_APP_LOGIN_TIMEOUT,
            deadline: None,
            mode: RunMode::Sequential,
            required_capabilities: DEFAULT_CAPABILITIES
                .iter()
                .map(ToString::to_string)
                .collect(),
            install_root: PathBuf::from("."),
            config_path: PathBuf::from("config/config.inc.php"),
            dsn_pattern: default_dsn_pattern(),
            layout_dirs: DEFAULT_LAYOUT_DIRS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

#[allow(clippy::expect_used)]
fn default_dsn_pattern() -> Regex {
    Regex::new(DEFAULT_DSN_PATTERN).expect("default DSN pattern compiles")
}

impl ProbeConfig {
    /// Load probe settings from environment variables
    ///
    /// Reads from `.env` file if present. All variables are optional:
    /// - `PROBE_TIMEOUT_SECS` (default: `5`)
    /// - `PROBE_APP_LOGIN_TIMEOUT_SECS` (default: `30`)
    /// - `PROBE_DEADLINE_SECS` (default: none)
    /// - `PROBE_CONCURRENT` (default: `false`)
    /// - `PROBE_REQUIRED_CAPABILITIES` (comma separated)
    /// - `PROBE_INSTALL_ROOT` (default: `.`)
    /// - `PROBE_CONFIG_PATH` (default: `config/config.inc.php`)
    /// - `PROBE_DSN_PATTERN` (regex, group 1 is the DSN)
    /// - `PROBE_LAYOUT_DIRS` (comma separated)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("PROBE_TIMEOUT_SECS") {
            config.timeout = parse_secs("PROBE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("PROBE_APP_LOGIN_TIMEOUT_SECS") {
            config.app_login_timeout = parse_secs("PROBE_APP_LOGIN_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("PROBE_DEADLINE_SECS") {
            config.deadline = Some(parse_secs("PROBE_DEADLINE_SECS", &v)?);
        }
        if let Some(v) = lookup("PROBE_CONCURRENT") {
            config.mode = if parse_bool("PROBE_CONCURRENT", &v)? {
                RunMode::Concurrent
            } else {
                RunMode::Sequential
            };
        }
        if let Some(v) = lookup("PROBE_REQUIRED_CAPABILITIES") {
            config.required_capabilities = split_list(&v).collect();
        }
        if let Some(v) = lookup("PROBE_INSTALL_ROOT") {
            config.install_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("PROBE_CONFIG_PATH") {
            config.config_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PROBE_DSN_PATTERN") {
            config.dsn_pattern = compile_dsn_pattern(&v)?;
        }
        if let Some(v) = lookup("PROBE_LAYOUT_DIRS") {
            config.layout_dirs = split_list(&v).collect();
        }

        Ok(config)
    }

    /// Absolute or root-relative location of the config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.install_root.join(&self.config_path)
    }
}

/// Compile a DSN extraction pattern, requiring a capture group.
///
/// # Errors
///
/// Returns [`Error::Config`] if the pattern is invalid or has no group.
pub fn compile_dsn_pattern(pattern: &str) -> Result<Regex> {
    let re = Regex::new(pattern).map_err(|e| Error::Config(format!("Invalid DSN pattern: {e}")))?;
    if re.captures_len() < 2 {
        return Err(Error::Config(
            "DSN pattern needs a capture group for the connection string".into(),
        ));
    }
    Ok(re)
}

/// The mail endpoints under test and optional login credentials.
#[derive(Debug, Clone)]
pub struct MailTargets {
    pub imap: Endpoint,
    pub smtp: Endpoint,
    pub credentials: Option<Credentials>,
}

impl MailTargets {
    /// Load mail endpoints from environment variables
    ///
    /// Reads from `.env` file if present. Optional (with defaults):
    /// - `IMAP_HOST` (default: `localhost`)
    /// - `IMAP_PORT` (default: `143`)
    /// - `IMAP_TLS` (`plain`, `starttls` or `tls`; default: `plain`)
    /// - `SMTP_HOST` (default: `localhost`)
    /// - `SMTP_PORT` (default: `25`)
    /// - `IMAP_USERNAME` and `IMAP_PASSWORD` (both needed for login
    ///   checks)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid port or TLS mode.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid port or TLS mode.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let imap_tls: TlsMode = lookup("IMAP_TLS").unwrap_or_default().parse()?;
        let imap = Endpoint::new(
            lookup("IMAP_HOST").unwrap_or_else(|| "localhost".to_string()),
            parse_port("IMAP_PORT", lookup("IMAP_PORT"), 143)?,
        )
        .with_tls(imap_tls);
        let smtp = Endpoint::new(
            lookup("SMTP_HOST").unwrap_or_else(|| "localhost".to_string()),
            parse_port("SMTP_PORT", lookup("SMTP_PORT"), 25)?,
        );

        let credentials = match (lookup("IMAP_USERNAME"), lookup("IMAP_PASSWORD")) {
            (Some(user), Some(pass)) if !user.is_empty() => Some(Credentials::new(user, pass)),
            _ => None,
        };

        Ok(Self {
            imap,
            smtp,
            credentials,
        })
    }

    /// The IMAP endpoint paired with credentials, if any were given.
    #[must_use]
    pub fn login_target(&self) -> Option<Target> {
        self.credentials.as_ref().map(|credentials| Target::Login {
            endpoint: self.imap.clone(),
            credentials: credentials.clone(),
        })
    }
}

fn parse_port(name: &str, value: Option<String>, default: u16) -> Result<u16> {
    value.map_or(Ok(default), |v| {
        v.parse()
            .map_err(|e| Error::Config(format!("Invalid {name}: {e}")))
    })
}

fn parse_secs(name: &str, value: &str) -> Result<Duration> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {name}: {e}")))?;
    Duration::try_from_secs_f64(secs).map_err(|e| Error::Config(format!("Invalid {name}: {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!("Invalid {name}: '{other}'"))),
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}
