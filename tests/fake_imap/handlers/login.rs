//! LOGIN command handler.
//!
//! Credentials are checked against the store. A rejected login keeps the
//! connection open in the not-authenticated state, as real servers do.

use crate::fake_imap::io::write_line;
use crate::fake_imap::store::Mailstore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the LOGIN command. Returns whether the user is now
/// authenticated.
pub async fn handle_login<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    user: &str,
    password: &str,
    store: &Mailstore,
    stream: &mut BufReader<S>,
) -> bool {
    if !store.accepts(user, password) {
        let resp = format!("{tag} NO [AUTHENTICATIONFAILED] Invalid credentials\r\n");
        let _ = write_line(stream, &resp).await;
        return false;
    }
    if store.capability_on_login {
        let _ = write_line(stream, "* CAPABILITY IMAP4rev1 IDLE NAMESPACE\r\n").await;
    }
    let resp = format!("{tag} OK LOGIN completed\r\n");
    write_line(stream, &resp).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::store::MailstoreBuilder;
    use tokio::io::BufReader;

    async fn run(tag: &str, user: &str, password: &str, store: &Mailstore) -> (String, bool) {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);

        let ok = handle_login(tag, user, password, store, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        (String::from_utf8(buf).unwrap(), ok)
    }

    #[tokio::test]
    async fn accepts_known_user() {
        let store = MailstoreBuilder::new().user("alice", "hunter2").build();
        let (output, ok) = run("A0001", "alice", "hunter2", &store).await;
        assert!(ok);
        assert_eq!(output, "A0001 OK LOGIN completed\r\n");
    }

    #[tokio::test]
    async fn rejects_wrong_password() {
        let store = MailstoreBuilder::new().user("alice", "hunter2").build();
        let (output, ok) = run("A1", "alice", "letmein", &store).await;
        assert!(!ok);
        assert!(output.starts_with("A1 NO "));
    }

    #[tokio::test]
    async fn untagged_capability_precedes_completion() {
        let store = MailstoreBuilder::new()
            .user("alice", "hunter2")
            .capability_on_login()
            .build();
        let (output, _) = run("A1", "alice", "hunter2", &store).await;
        let capability = output.find("* CAPABILITY").unwrap();
        let completion = output.find("A1 OK").unwrap();
        assert!(capability < completion);
    }
}
