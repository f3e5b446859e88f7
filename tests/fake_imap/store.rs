//! State served by the fake IMAP server
//!
//! ```ignore
//! let store = MailstoreBuilder::new()
//!     .user("alice", "hunter2")
//!     .folder("INBOX", 3)
//!     .folder("Sent", 0)
//!     .build();
//! ```
//!
//! Only what the login probes look at is modelled: accepted
//! credentials, folder names with a message count, and the greeting.

pub const DEFAULT_GREETING: &str = "* OK IMAP4rev1 Fake server ready";

#[derive(Debug, Clone)]
pub struct Mailstore {
    pub users: Vec<(String, String)>,
    pub folders: Vec<Folder>,
    pub greeting: String,
    /// Send an untagged `CAPABILITY` line before the LOGIN completion,
    /// as Dovecot does.
    pub capability_on_login: bool,
}

impl Mailstore {
    /// Look up a folder by name (case-sensitive, matching real IMAP).
    pub fn get_folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.name == name)
    }

    pub fn accepts(&self, user: &str, password: &str) -> bool {
        self.users.iter().any(|(u, p)| u == user && p == password)
    }
}

#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub messages: u32,
}

pub struct MailstoreBuilder {
    store: Mailstore,
}

impl MailstoreBuilder {
    pub fn new() -> Self {
        Self {
            store: Mailstore {
                users: Vec::new(),
                folders: Vec::new(),
                greeting: DEFAULT_GREETING.to_string(),
                capability_on_login: false,
            },
        }
    }

    pub fn user(mut self, name: &str, password: &str) -> Self {
        self.store
            .users
            .push((name.to_string(), password.to_string()));
        self
    }

    pub fn folder(mut self, name: &str, messages: u32) -> Self {
        self.store.folders.push(Folder {
            name: name.to_string(),
            messages,
        });
        self
    }

    /// Replace the greeting line (without CRLF).
    pub fn greeting(mut self, line: &str) -> Self {
        self.store.greeting = line.to_string();
        self
    }

    pub fn capability_on_login(mut self) -> Self {
        self.store.capability_on_login = true;
        self
    }

    pub fn build(self) -> Mailstore {
        self.store
    }
}
