//! IMAP command handlers for the fake server.
//!
//! One module per command the login probes send (LOGIN, LIST, SELECT,
//! LOGOUT).

mod list;
mod login;
mod logout;
mod select;

pub use list::handle_list;
pub use login::handle_login;
pub use logout::handle_logout;
pub use select::handle_select;
