//! LOGOUT handler.

use crate::fake_imap::io::write_line;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Say goodbye to `user` (or to an anonymous session) and confirm.
///
/// The raw login probe always sends LOGOUT, even after a rejected
/// LOGIN, so both paths are exercised.
pub async fn handle_logout<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    user: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let bye = user.map_or_else(
        || "* BYE closing unauthenticated session\r\n".to_string(),
        |user| format!("* BYE {user} signing off\r\n"),
    );
    if write_line(stream, &bye).await.is_ok() {
        let _ = write_line(stream, &format!("{tag} OK LOGOUT completed\r\n")).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn transcript(tag: &str, user: Option<&str>) -> String {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);
        handle_logout(tag, user, &mut stream).await;
        drop(stream);

        let mut out = String::new();
        BufReader::new(client)
            .read_to_string(&mut out)
            .await
            .unwrap();
        out
    }

    #[tokio::test]
    async fn names_the_logged_in_user() {
        let out = transcript("A2", Some("alice")).await;
        assert_eq!(out, "* BYE alice signing off\r\nA2 OK LOGOUT completed\r\n");
    }

    #[tokio::test]
    async fn anonymous_session_still_gets_ok() {
        let out = transcript("A2", None).await;
        assert!(out.starts_with("* BYE closing unauthenticated session"));
        assert!(out.ends_with("A2 OK LOGOUT completed\r\n"));
    }
}
