//! Prebuilt check suites
//!
//! A [`Suite`] pairs an engine loaded with checks and the targets those
//! checks name. The CLI and library users pick one of the constructors
//! instead of registering checks by hand.

use crate::checks::{
    CapabilityCheck, ConfigExtractCheck, DatabaseCheck, InstallLayoutCheck, RuntimeInfoCheck,
    SocketCheck, TieredAuthProbe,
};
use crate::config::{MailTargets, ProbeConfig};
use crate::engine::ProbeEngine;
use crate::error::{Error, Result};
use crate::report::ProbeReport;
use crate::target::{Endpoint, Target, TargetSet};
use tracing::debug;

pub const IMAP_TARGET: &str = "imap";
pub const SMTP_TARGET: &str = "smtp";
pub const LOGIN_TARGET: &str = "login";
pub const CONFIG_TARGET: &str = "config";
pub const INSTALL_TARGET: &str = "install-root";

/// Checks plus the targets they run against.
pub struct Suite {
    engine: ProbeEngine,
    targets: TargetSet,
}

impl Suite {
    /// The three login tiers against the IMAP endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `mail` carries no credentials.
    pub fn login(config: ProbeConfig, mail: &MailTargets) -> Result<Self> {
        Self::login_with(config, mail, TieredAuthProbe::new("imap", LOGIN_TARGET))
    }

    /// Like [`Suite::login`] with a caller-configured probe (hooks or a
    /// custom application login). The probe must name [`LOGIN_TARGET`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `mail` carries no credentials.
    pub fn login_with(
        config: ProbeConfig,
        mail: &MailTargets,
        probe: TieredAuthProbe,
    ) -> Result<Self> {
        require_credentials(mail)?;
        let mut engine = ProbeEngine::new(config);
        engine.register_all(probe.checks())?;
        Ok(Self {
            targets: mail_targets(engine.config(), mail),
            engine,
        })
    }

    /// Everything that needs no credentials: runtime, capabilities, both
    /// mail ports, installation layout, config file and database.
    ///
    /// # Errors
    ///
    /// Only fails if two checks end up with the same id.
    pub fn environment(config: ProbeConfig, mail: &MailTargets) -> Result<Self> {
        let mut engine = ProbeEngine::new(config);
        register_environment(&mut engine)?;
        Ok(Self {
            targets: mail_targets(engine.config(), mail),
            engine,
        })
    }

    /// Environment checks followed by the login tiers when credentials
    /// are present.
    ///
    /// # Errors
    ///
    /// Only fails if two checks end up with the same id.
    pub fn all(config: ProbeConfig, mail: &MailTargets) -> Result<Self> {
        let mut engine = ProbeEngine::new(config);
        register_environment(&mut engine)?;
        if mail.credentials.is_some() {
            engine.register_all(TieredAuthProbe::new("imap", LOGIN_TARGET).checks())?;
        } else {
            debug!("No IMAP credentials; login tiers not registered");
        }
        Ok(Self {
            targets: mail_targets(engine.config(), mail),
            engine,
        })
    }

    /// A single greeting check against an arbitrary endpoint.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other suites.
    pub fn socket(config: ProbeConfig, endpoint: Endpoint) -> Result<Self> {
        let mut engine = ProbeEngine::new(config);
        engine.register(SocketCheck::new("socket", "endpoint"))?;
        Ok(Self {
            engine,
            targets: TargetSet::new().with("endpoint", Target::Endpoint(endpoint)),
        })
    }

    #[must_use]
    pub const fn engine(&self) -> &ProbeEngine {
        &self.engine
    }

    #[must_use]
    pub const fn targets(&self) -> &TargetSet {
        &self.targets
    }

    pub async fn run(&self) -> ProbeReport {
        self.engine.run(&self.targets).await
    }
}

fn require_credentials(mail: &MailTargets) -> Result<()> {
    if mail.credentials.is_none() {
        return Err(Error::Config(
            "IMAP_USERNAME and IMAP_PASSWORD are required for login checks".into(),
        ));
    }
    Ok(())
}

fn register_environment(engine: &mut ProbeEngine) -> Result<()> {
    engine
        .register(RuntimeInfoCheck::new("runtime.info"))?
        .register(CapabilityCheck::new("runtime.capabilities"))?
        .register(SocketCheck::new("imap.socket", IMAP_TARGET))?
        .register(SocketCheck::new("smtp.socket", SMTP_TARGET))?
        .register(InstallLayoutCheck::new("install.layout", INSTALL_TARGET))?
        .register(ConfigExtractCheck::new("config.dsn", CONFIG_TARGET))?
        .register(DatabaseCheck::new("database.connect", CONFIG_TARGET))?;
    Ok(())
}

/// Name every target the built-in suites refer to.
#[must_use]
pub fn mail_targets(config: &ProbeConfig, mail: &MailTargets) -> TargetSet {
    let mut targets = TargetSet::new()
        .with(IMAP_TARGET, Target::Endpoint(mail.imap.clone()))
        .with(SMTP_TARGET, Target::Endpoint(mail.smtp.clone()))
        .with(INSTALL_TARGET, Target::Path(config.install_root.clone()))
        .with(CONFIG_TARGET, Target::Path(config.config_file()));
    if let Some(login) = mail.login_target() {
        targets.insert(LOGIN_TARGET, login);
    }
    targets
}
