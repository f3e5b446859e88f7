//! Transport helpers shared by the network checks
//!
//! Opens TCP connections with classified failures, layers TLS on top
//! (implicit or after `STARTTLS`), reads CRLF lines under a timeout and
//! builds authenticated `async-imap` sessions. Every stream is owned by
//! the caller's scope and closed when it is dropped, including when a
//! timeout cancels the future holding it.

use crate::error::{AuthTier, ConnectionFailure, Error, Result};
use crate::target::{Credentials, Endpoint, TlsMode};
use async_imap::Session;
use futures::StreamExt;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::ServerName;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::{TcpStream, lookup_host};
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

/// Longest line accepted from a server.
const MAX_LINE: u64 = 8192;

/// Any bidirectional byte stream a check can talk over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// An authenticated IMAP session over whichever transport the endpoint
/// asked for.
pub type ImapSession = Session<Compat<BoxedStream>>;

/// Run `fut`, failing with a timeout error against `endpoint` if it does
/// not finish within `timeout`.
pub(crate) async fn within<F: Future>(
    timeout: Duration,
    endpoint: &str,
    fut: F,
) -> Result<F::Output> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::timeout(endpoint, timeout))
}

/// Resolve `addr` (`host:port`) before `deadline`, classifying an empty
/// or failed lookup as a DNS failure.
pub(crate) async fn resolve(
    addr: &str,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<SocketAddr>> {
    debug!("Resolving {}", addr);
    let resolved = match tokio::time::timeout_at(deadline, lookup_host(addr)).await {
        Err(_) => return Err(Error::timeout(addr, timeout)),
        Ok(Err(e)) => {
            return Err(Error::connection(ConnectionFailure::Dns, addr, e.to_string()));
        }
        Ok(Ok(addrs)) => addrs.collect::<Vec<_>>(),
    };
    if resolved.is_empty() {
        return Err(Error::connection(
            ConnectionFailure::Dns,
            addr,
            "no addresses returned",
        ));
    }
    Ok(resolved)
}

/// Resolve and connect to `endpoint`, classifying failures as DNS,
/// refused, timeout, or other.
///
/// Resolution and every connect attempt share one `timeout` budget.
pub async fn open_tcp(endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream> {
    let addr = endpoint.address();
    let deadline = Instant::now() + timeout;
    let resolved = resolve(&addr, deadline, timeout).await?;

    let mut last_err = None;
    for socket_addr in resolved {
        match tokio::time::timeout_at(deadline, TcpStream::connect(socket_addr)).await {
            Ok(Ok(stream)) => {
                debug!("Connected to {} via {}", addr, socket_addr);
                return Ok(stream);
            }
            Ok(Err(e)) => {
                debug!("Connect to {} failed: {}", socket_addr, e);
                last_err = Some(Error::from_io(&addr, &e));
            }
            Err(_) => return Err(Error::timeout(&addr, timeout)),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        Error::connection(ConnectionFailure::Other, &addr, "no address accepted")
    }))
}

/// Build a TLS connector that accepts all certificates.
///
/// Mail servers under diagnosis routinely run self-signed certificates,
/// so chain verification is skipped. Handshake signatures are still
/// checked.
fn tls_connector() -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Perform a TLS client handshake over `stream`.
pub async fn wrap_tls<S>(stream: S, host: &str) -> Result<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let connector = tls_connector()?;
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;
    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::Tls(e.to_string()))
}

/// Open a stream ready to receive the server greeting.
///
/// `StartTls` endpoints come back in cleartext; the caller performs the
/// protocol-specific upgrade.
pub async fn open_stream(endpoint: &Endpoint, timeout: Duration) -> Result<BoxedStream> {
    let tcp = open_tcp(endpoint, timeout).await?;
    match endpoint.tls {
        TlsMode::Plain | TlsMode::StartTls => Ok(Box::new(tcp)),
        TlsMode::Implicit => {
            let tls = within(timeout, &endpoint.address(), wrap_tls(tcp, &endpoint.host)).await??;
            Ok(Box::new(tls))
        }
    }
}

/// Line-oriented access to a text protocol stream.
#[derive(Debug)]
pub struct LineStream {
    reader: BufReader<BoxedStream>,
    endpoint: String,
    timeout: Duration,
}

impl LineStream {
    #[must_use]
    pub fn new(stream: BoxedStream, endpoint: &Endpoint, timeout: Duration) -> Self {
        Self {
            reader: BufReader::new(stream),
            endpoint: endpoint.address(),
            timeout,
        }
    }

    /// Read one line with its CRLF stripped.
    ///
    /// # Errors
    ///
    /// Fails with a timeout, an I/O classification, or a connection error
    /// if the peer closed the stream before sending a line. A line that is
    /// not UTF-8 or runs past 8192 bytes is a protocol error.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let mut limited = (&mut self.reader).take(MAX_LINE);
        let n = within(self.timeout, &self.endpoint, limited.read_until(b'\n', &mut buf))
            .await?
            .map_err(|e| Error::from_io(&self.endpoint, &e))?;
        if n == 0 {
            return Err(Error::connection(
                ConnectionFailure::Other,
                &self.endpoint,
                "connection closed by peer",
            ));
        }
        if !buf.ends_with(b"\n") && n as u64 >= MAX_LINE {
            return Err(Error::Protocol(format!(
                "line from {} longer than {MAX_LINE} bytes",
                self.endpoint
            )));
        }
        let line = String::from_utf8(buf).map_err(|_| {
            Error::Protocol(format!("line from {} is not valid UTF-8", self.endpoint))
        })?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Write `line` followed by CRLF and flush.
    ///
    /// # Errors
    ///
    /// Fails with a timeout or an I/O classification.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let stream = self.reader.get_mut();
        let endpoint = self.endpoint.clone();
        within(self.timeout, &endpoint, async {
            stream.write_all(line.as_bytes()).await?;
            stream.write_all(b"\r\n").await?;
            stream.flush().await
        })
        .await?
        .map_err(|e| Error::from_io(&endpoint, &e))
    }

    /// Give back the underlying stream, e.g. to upgrade it to TLS.
    #[must_use]
    pub fn into_inner(self) -> BoxedStream {
        self.reader.into_inner()
    }
}

/// Open an authenticated IMAP session.
///
/// Connects to `endpoint`, upgrades the transport as its [`TlsMode`]
/// requires, and logs in. Each network step is bounded by `timeout`.
pub async fn imap_session(
    endpoint: &Endpoint,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<ImapSession> {
    let addr = endpoint.address();
    debug!("Connecting to IMAP server at {}", addr);

    let tcp = open_tcp(endpoint, timeout).await?;
    let stream: BoxedStream = match endpoint.tls {
        TlsMode::Plain => Box::new(tcp),
        TlsMode::Implicit => {
            Box::new(within(timeout, &addr, wrap_tls(tcp, &endpoint.host)).await??)
        }
        TlsMode::StartTls => {
            let mut client = async_imap::Client::new(tcp.compat());
            within(timeout, &addr, client.run_command_and_check_ok("STARTTLS", None))
                .await?
                .map_err(|e| Error::Tls(format!("STARTTLS failed: {e}")))?;
            let inner = client.into_inner().into_inner();
            Box::new(within(timeout, &addr, wrap_tls(inner, &endpoint.host)).await??)
        }
    };

    let client = async_imap::Client::new(stream.compat());
    let session = within(
        timeout,
        &addr,
        client.login(&credentials.username, credentials.password.expose()),
    )
    .await?
    .map_err(|(e, _)| match e {
        async_imap::error::Error::Io(io) => Error::from_io(&addr, &io),
        async_imap::error::Error::ConnectionLost => {
            Error::connection(ConnectionFailure::Other, &addr, "connection lost during login")
        }
        other => Error::Authentication {
            tier: AuthTier::Library,
            message: other.to_string(),
        },
    })?;

    info!("Logged in to IMAP server at {}", addr);
    Ok(session)
}

/// List all folder names visible to the session.
pub async fn list_folders(session: &mut ImapSession) -> Result<Vec<String>> {
    let mut folder_stream = session
        .list(Some(""), Some("*"))
        .await
        .map_err(|e| Error::Protocol(format!("List folders failed: {e}")))?;

    let mut names = Vec::new();
    while let Some(item) = folder_stream.next().await {
        match item {
            Ok(name) => names.push(name.name().to_string()),
            Err(e) => warn!("Skipping unparsable LIST entry: {}", e),
        }
    }
    drop(folder_stream);

    Ok(names)
}

/// SELECT a folder on an existing session, returning its message count.
pub async fn select(session: &mut ImapSession, folder: &str) -> Result<u32> {
    let mailbox = session
        .select(folder)
        .await
        .map_err(|e| Error::Protocol(format!("Failed to select {folder}: {e}")))?;
    Ok(mailbox.exists)
}

/// Certificate verifier that accepts any server certificate but still
/// verifies handshake signatures with the provider's algorithms.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
