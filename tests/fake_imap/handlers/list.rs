//! LIST handler.
//!
//! Every folder is listed flat under the `/` delimiter. Well-known
//! names carry their RFC 6154 special-use attribute, the way Dovecot
//! and Proton Bridge advertise them:
//!
//! ```text
//! * LIST (\HasNoChildren) "/" "INBOX"
//! * LIST (\HasNoChildren \Archive) "/" "Archive"
//! A2 OK LIST completed
//! ```

use crate::fake_imap::io::write_line;
use crate::fake_imap::store::Mailstore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

fn special_use(name: &str) -> Option<&'static str> {
    match name {
        "Archive" => Some("\\Archive"),
        "Drafts" => Some("\\Drafts"),
        "Sent" => Some("\\Sent"),
        "Spam" | "Junk" => Some("\\Junk"),
        "Trash" => Some("\\Trash"),
        _ => None,
    }
}

fn list_line(name: &str) -> String {
    let attributes = special_use(name).map_or_else(
        || "\\HasNoChildren".to_string(),
        |flag| format!("\\HasNoChildren {flag}"),
    );
    format!("* LIST ({attributes}) \"/\" \"{name}\"\r\n")
}

pub async fn handle_list<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    store: &Mailstore,
    stream: &mut BufReader<S>,
) {
    for folder in &store.folders {
        if write_line(stream, &list_line(&folder.name)).await.is_err() {
            return;
        }
    }
    let _ = write_line(stream, &format!("{tag} OK LIST completed\r\n")).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::store::MailstoreBuilder;
    use tokio::io::AsyncReadExt;

    async fn listing(store: &Mailstore) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);
        handle_list("L1", store, &mut stream).await;
        drop(stream);

        let mut out = String::new();
        BufReader::new(client)
            .read_to_string(&mut out)
            .await
            .unwrap();
        out
    }

    #[tokio::test]
    async fn one_line_per_folder_in_store_order() {
        let store = MailstoreBuilder::new()
            .folder("INBOX", 2)
            .folder("Archive", 0)
            .folder("Projects", 0)
            .build();
        let out = listing(&store).await;
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "* LIST (\\HasNoChildren) \"/\" \"INBOX\"",
                "* LIST (\\HasNoChildren \\Archive) \"/\" \"Archive\"",
                "* LIST (\\HasNoChildren) \"/\" \"Projects\"",
                "L1 OK LIST completed",
            ]
        );
    }

    #[tokio::test]
    async fn empty_store_only_completes() {
        let out = listing(&MailstoreBuilder::new().build()).await;
        assert_eq!(out, "L1 OK LIST completed\r\n");
    }

    #[test]
    fn junk_aliases() {
        assert_eq!(special_use("Spam"), special_use("Junk"));
        assert_eq!(special_use("INBOX"), None);
    }
}
