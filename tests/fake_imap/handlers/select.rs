//! SELECT handler.
//!
//! Answers with the untagged data async-imap needs to build a
//! `Mailbox`: `FLAGS`, `EXISTS`, `RECENT` and `UIDVALIDITY`.

use crate::fake_imap::io::write_line;
use crate::fake_imap::store::Mailstore;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

const SELECT_FLAGS: &str = "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n";

/// Returns whether the folder exists.
pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    store: &Mailstore,
    stream: &mut BufReader<S>,
) -> bool {
    let Some(folder) = store.get_folder(folder_name) else {
        let _ = write_line(stream, &format!("{tag} NO Unknown folder {folder_name}\r\n")).await;
        return false;
    };

    let untagged = [
        SELECT_FLAGS.to_string(),
        format!("* {} EXISTS\r\n", folder.messages),
        "* 0 RECENT\r\n".to_string(),
        "* OK [UIDVALIDITY 1] UIDs valid\r\n".to_string(),
    ];
    for line in &untagged {
        if write_line(stream, line).await.is_err() {
            return false;
        }
    }
    write_line(stream, &format!("{tag} OK [READ-ONLY] SELECT completed\r\n"))
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::store::MailstoreBuilder;
    use tokio::io::AsyncReadExt;

    async fn select(name: &str, store: &Mailstore) -> (String, bool) {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);
        let selected = handle_select("S1", name, store, &mut stream).await;
        drop(stream);

        let mut out = String::new();
        BufReader::new(client)
            .read_to_string(&mut out)
            .await
            .unwrap();
        (out, selected)
    }

    #[tokio::test]
    async fn reports_message_count() {
        let store = MailstoreBuilder::new().folder("INBOX", 7).build();
        let (out, selected) = select("INBOX", &store).await;
        assert!(selected);
        assert!(out.contains("* 7 EXISTS\r\n"));
        assert!(out.ends_with("S1 OK [READ-ONLY] SELECT completed\r\n"));
    }

    #[tokio::test]
    async fn folder_names_are_case_sensitive() {
        let store = MailstoreBuilder::new().folder("Archive", 0).build();
        let (out, selected) = select("archive", &store).await;
        assert!(!selected);
        assert_eq!(out, "S1 NO Unknown folder archive\r\n");
    }
}
