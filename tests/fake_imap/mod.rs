//! Fake IMAP server for integration testing
//!
//! An in-process server that speaks enough IMAP for the login probes:
//!
//! TCP -> [TLS] -> greeting -> [STARTTLS -> TLS] -> LOGIN -> LIST/SELECT -> LOGOUT
//!
//! - `server` -- listener, transport setup and command dispatch
//! - `handlers/` -- one file per IMAP command
//! - `store` -- users, folders and greeting served
//! - `io` -- write helper

mod handlers;
mod io;
pub mod store;
mod server;

pub use server::{FakeImapServer, Transport};
pub use store::MailstoreBuilder;
