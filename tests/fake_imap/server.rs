//! In-process fake IMAP server for integration testing
//!
//! ## Connection lifecycle
//!
//! ```text
//!   Client connects via TCP
//!       |
//!   (Implicit) TLS handshake before anything else
//!       |
//!   Server sends greeting: "* OK IMAP4rev1 ready\r\n"
//!       |                  (a "* BYE" greeting closes the connection)
//!   (StartTls) client sends STARTTLS, then TLS handshake
//!       |
//!   Client sends LOGIN; wrong credentials get a tagged NO
//!       |
//!   Client issues LIST / SELECT
//!       |
//!   Client sends LOGOUT
//! ```
//!
//! Every client command starts with a tag that the server echoes in its
//! completion; lines prefixed with `*` are untagged data sent before it:
//!
//! ```text
//!   Client:  A0002 LIST "" "*"
//!   Server:  * LIST (\HasNoChildren) "/" "INBOX"
//!   Server:  A0002 OK LIST completed
//! ```

use super::handlers::{handle_list, handle_login, handle_logout, handle_select};
use super::io::write_line;
use super::store::Mailstore;
use imap_codec::CommandCodec;
use imap_codec::decode::Decoder;
use imap_codec::imap_types::command::CommandBody;
use imap_codec::imap_types::core::AString;
use imap_codec::imap_types::mailbox::Mailbox as ImapMailbox;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

/// How the server secures its connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Plain,
    StartTls,
    Implicit,
}

/// A fake IMAP server that runs on localhost with an OS-assigned port.
///
/// A self-signed certificate is generated at startup with `rcgen`, so
/// no cert files are needed.
pub struct FakeImapServer {
    port: u16,
    /// Handle to the background task so it lives as long as the server.
    handle: tokio::task::JoinHandle<()>,
}

impl FakeImapServer {
    /// Start a server that requires STARTTLS before LOGIN.
    pub async fn start(store: Mailstore) -> Self {
        Self::start_with(store, Transport::StartTls).await
    }

    /// Start a server with the given transport.
    ///
    /// The server runs until the `FakeImapServer` is dropped.
    pub async fn start_with(store: Mailstore, transport: Transport) -> Self {
        // Several tests may race to install the provider; losing is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let names = vec!["127.0.0.1".to_string(), "localhost".to_string()];
        let cert = generate_simple_self_signed(names).expect("generate self-signed cert");
        let cert_der = cert.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config");

        let acceptor = TlsAcceptor::from(Arc::new(tls_config));
        let store = Arc::new(store);

        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                let acceptor = acceptor.clone();
                let store = store.clone();
                tokio::spawn(async move {
                    handle_connection(stream, transport, acceptor, &store).await;
                });
            }
        });

        Self { port, handle }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for FakeImapServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Send the greeting. Returns `false` if the session should end here.
async fn greet<S: AsyncRead + AsyncWrite + Unpin>(
    reader: &mut BufReader<S>,
    store: &Mailstore,
) -> bool {
    let greeting = format!("{}\r\n", store.greeting);
    write_line(reader, &greeting).await.is_ok() && !store.greeting.starts_with("* BYE")
}

async fn handle_connection(
    stream: TcpStream,
    transport: Transport,
    acceptor: TlsAcceptor,
    store: &Mailstore,
) {
    match transport {
        Transport::Plain => {
            let mut reader = BufReader::new(stream);
            if greet(&mut reader, store).await {
                handle_imap_session(reader, store).await;
            }
        }
        Transport::Implicit => {
            let Ok(tls_stream) = acceptor.accept(stream).await else {
                return;
            };
            let mut reader = BufReader::new(tls_stream);
            if greet(&mut reader, store).await {
                handle_imap_session(reader, store).await;
            }
        }
        Transport::StartTls => {
            let mut reader = BufReader::new(stream);
            if !greet(&mut reader, store).await {
                return;
            }
            let Some(tcp) = negotiate_starttls(reader).await else {
                return;
            };
            let Ok(tls_stream) = acceptor.accept(tcp).await else {
                return;
            };
            handle_imap_session(BufReader::new(tls_stream), store).await;
        }
    }
}

/// Expect `STARTTLS` as the first command and hand back the raw stream.
async fn negotiate_starttls(mut reader: BufReader<TcpStream>) -> Option<TcpStream> {
    let mut line = String::new();
    reader.read_line(&mut line).await.ok()?;

    let (tag, command) = line.trim().split_once(' ')?;
    if !command.eq_ignore_ascii_case("STARTTLS") {
        let resp = format!("{tag} BAD Expected STARTTLS\r\n");
        let _ = write_line(&mut reader, &resp).await;
        return None;
    }

    let resp = format!("{tag} OK Begin TLS negotiation now\r\n");
    write_line(&mut reader, &resp).await.ok()?;
    Some(reader.into_inner())
}

fn mailbox_name(mb: &ImapMailbox<'_>) -> String {
    match mb {
        ImapMailbox::Inbox => "INBOX".to_string(),
        ImapMailbox::Other(other) => {
            let bytes: &[u8] = other.as_ref();
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

fn astring(value: &AString<'_>) -> String {
    let bytes: &[u8] = value.as_ref();
    String::from_utf8_lossy(bytes).into_owned()
}

/// Command loop over an established stream.
///
/// `imap-codec` parses each line into a typed `Command`; LIST and
/// SELECT are refused until LOGIN succeeds.
async fn handle_imap_session<S: AsyncRead + AsyncWrite + Unpin>(
    mut reader: BufReader<S>,
    store: &Mailstore,
) {
    let codec = CommandCodec::default();
    let mut user: Option<String> = None;

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Ok((_, command)) = codec.decode(line.as_bytes()) else {
            let tag = trimmed.split_whitespace().next().unwrap_or("*");
            let resp = format!("{tag} BAD Parse error\r\n");
            if write_line(&mut reader, &resp).await.is_err() {
                break;
            }
            continue;
        };

        let tag = command.tag.inner();

        match command.body {
            CommandBody::Login { username, password } => {
                let name = astring(&username);
                let pass = astring(password.declassify());
                user = handle_login(tag, &name, &pass, store, &mut reader)
                    .await
                    .then_some(name);
            }
            CommandBody::Logout => {
                handle_logout(tag, user.as_deref(), &mut reader).await;
                break;
            }
            CommandBody::List { .. } | CommandBody::Select { .. } if user.is_none() => {
                let resp = format!("{tag} NO Not authenticated\r\n");
                if write_line(&mut reader, &resp).await.is_err() {
                    break;
                }
            }
            CommandBody::List { .. } => {
                handle_list(tag, store, &mut reader).await;
            }
            CommandBody::Select { mailbox: mb, .. } => {
                let name = mailbox_name(&mb);
                handle_select(tag, &name, store, &mut reader).await;
            }
            _ => {
                let resp = format!("{tag} BAD Unknown command\r\n");
                if write_line(&mut reader, &resp).await.is_err() {
                    break;
                }
            }
        }
    }
}
