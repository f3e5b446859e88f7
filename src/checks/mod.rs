//! Built-in checks
//!
//! Each check is stateless and names the target it inspects; the
//! caller supplies the targets at run time through a `TargetSet`.

mod app;
mod auth;
mod capability;
mod config_extract;
mod database;
mod layout;
mod runtime;
mod socket;

pub use app::{
    ApplicationLogin, AuthHook, AuthRequest, ImapApplicationLogin, UsernameDomainHook, run_hooks,
};
pub use auth::{AppLoginCheck, LibraryLoginCheck, RawLoginCheck, TieredAuthProbe};
pub use capability::{BuiltinCapabilities, CapabilityCheck, CapabilityProvider, StaticCapabilities};
pub use config_extract::{ConfigExtractCheck, extract_dsn};
pub use database::{DatabaseCheck, DatabaseConnector, MySqlConnector};
pub use layout::InstallLayoutCheck;
pub use runtime::RuntimeInfoCheck;
pub use socket::SocketCheck;
