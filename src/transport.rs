//! Plaintext-or-TLS line transport
//!
//! A [`Connection`] hides whether the bytes on the wire are encrypted.
//! Callers see three operations: wait for a line with a given prefix,
//! read the next line, and write a CRLF-terminated command. Every read
//! is bounded by the connection's read timeout.
//!
//! A connection can also be built *blacklisted*: it owns no socket and
//! every operation fails immediately with [`Error::Blacklisted`]. A
//! mailbox whose TLS handshake failed hands out only these from then on.

use crate::error::{Error, Result};
use crate::line_buffer::{LineBuffer, MAX_LINE_LEN};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, error, warn};

/// Per-read budget used when a mailbox does not configure one.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest command accepted by [`Connection::send`], CRLF included.
pub const MAX_COMMAND_LEN: usize = 1024;

const READ_CHUNK: usize = 1024;

/// How a connection should be opened.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub read_timeout: Duration,
    /// Skip certificate verification (self-signed servers).
    pub accept_invalid_certs: bool,
    /// Log protocol chatter at `info` instead of `trace`.
    pub verbose: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            accept_invalid_certs: false,
            verbose: false,
        }
    }
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Stream {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(s) => s.read(buf).await,
            Self::Tls(s) => s.read(buf).await,
        }
    }

    async fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(s) => s.write(buf).await,
            Self::Tls(s) => s.write(buf).await,
        }
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Plain(s) => s.flush().await,
            Self::Tls(s) => s.flush().await,
        }
    }
}

/// One live (or blacklisted) line-oriented connection.
pub struct Connection {
    stream: Option<Stream>,
    name: String,
    verbose: bool,
    read_timeout: Duration,
    buffer: LineBuffer,
}

impl Connection {
    /// Connect over TCP, then negotiate TLS when `tls` is set.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectFailed`] if the socket cannot be opened and
    /// [`Error::HandshakeFailed`] if TLS negotiation fails. A failed
    /// handshake never falls back to plaintext.
    pub async fn open(
        host: &str,
        port: u16,
        tls: bool,
        name: impl Into<String>,
        options: &ConnectOptions,
    ) -> Result<Self> {
        let name = name.into();
        let tcp = connect_tcp(host, port, options.read_timeout).await?;

        let stream = if tls {
            let tls_stream = handshake(tcp, host, &name, options).await?;
            Stream::Tls(Box::new(tls_stream))
        } else {
            Stream::Plain(tcp)
        };

        chatter!(
            options.verbose,
            connection = %name,
            encrypted = tls,
            "connected to {host}:{port}"
        );

        Ok(Self {
            stream: Some(stream),
            name,
            verbose: options.verbose,
            read_timeout: options.read_timeout,
            buffer: LineBuffer::new(),
        })
    }

    /// A connection that refuses all I/O.
    #[must_use]
    pub fn blacklisted(name: impl Into<String>) -> Self {
        Self {
            stream: None,
            name: name.into(),
            verbose: false,
            read_timeout: DEFAULT_READ_TIMEOUT,
            buffer: LineBuffer::new(),
        }
    }

    #[must_use]
    pub const fn is_blacklisted(&self) -> bool {
        self.stream.is_none()
    }

    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        matches!(self.stream, Some(Stream::Tls(_)))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Discard lines until one starts with `prefix`, and return it.
    ///
    /// Informational lines and banners are skipped this way. Buffered
    /// bytes left over from an earlier call are consumed first.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when no data arrives within the read timeout,
    /// [`Error::PeerClosed`] on end of stream, [`Error::Io`] on a read
    /// failure and [`Error::Blacklisted`] without touching the network.
    pub async fn expect_line(&mut self, prefix: &str) -> Result<String> {
        if self.stream.is_none() {
            return Err(Error::Blacklisted(self.name.clone()));
        }
        chatter!(self.verbose, connection = %self.name, "expecting: {prefix:?}");

        loop {
            while let Some(raw) = self.buffer.extract_line(MAX_LINE_LEN) {
                let line = String::from_utf8_lossy(&raw).into_owned();
                if line.starts_with(prefix) {
                    chatter!(self.verbose, connection = %self.name, "got: {}", line.trim_end());
                    return Ok(line);
                }
                chatter!(self.verbose, connection = %self.name, "dumped: {}", line.trim_end());
            }
            self.fill().await?;
        }
    }

    /// Return the next line, whatever it holds.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::expect_line`].
    pub async fn get_line(&mut self) -> Result<String> {
        self.expect_line("").await
    }

    /// Write `command` followed by CRLF.
    ///
    /// # Errors
    ///
    /// [`Error::ShortWrite`] if the stream accepts fewer bytes than
    /// requested; there is no retry of the remainder.
    pub async fn send(&mut self, command: &str) -> Result<()> {
        self.write_command(command, command).await
    }

    /// Like [`Connection::send`], but log `shown` instead of `command`.
    ///
    /// # Errors
    ///
    /// Same as [`Connection::send`].
    pub async fn send_redacted(&mut self, command: &str, shown: &str) -> Result<()> {
        self.write_command(command, shown).await
    }

    /// Close the connection: TLS sessions send `close_notify` first.
    pub async fn close(mut self) {
        chatter!(self.verbose, connection = %self.name, "closing");
        match self.stream.take() {
            Some(Stream::Tls(mut tls)) => {
                if tokio::time::timeout(self.read_timeout, tls.shutdown())
                    .await
                    .is_err()
                {
                    debug!(connection = %self.name, "TLS shutdown timed out");
                }
            }
            Some(Stream::Plain(tcp)) => drop(tcp),
            None => {}
        }
        self.buffer.clear();
    }

    /// Wait for the socket to become readable and append one chunk.
    async fn fill(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::Blacklisted(self.name.clone()));
        };

        let mut chunk = [0u8; READ_CHUNK];
        let read = match tokio::time::timeout(self.read_timeout, stream.read(&mut chunk)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                error!(connection = %self.name, "error reading: {e}");
                return Err(Error::Io(e));
            }
            Err(_) => {
                warn!(
                    connection = %self.name,
                    "no data after {} seconds",
                    self.read_timeout.as_secs()
                );
                return Err(Error::Timeout(self.read_timeout.as_secs()));
            }
        };

        if read == 0 {
            debug!(connection = %self.name, "peer closed the connection");
            return Err(Error::PeerClosed);
        }
        self.buffer.extend(&chunk[..read]);
        Ok(())
    }

    async fn write_command(&mut self, command: &str, shown: &str) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            warn!(connection = %self.name, "write on a blacklisted connection");
            return Err(Error::Blacklisted(self.name.clone()));
        };

        let line = format!("{command}\r\n");
        if line.len() > MAX_COMMAND_LEN {
            return Err(Error::Protocol(format!(
                "command of {} bytes exceeds {MAX_COMMAND_LEN}",
                line.len()
            )));
        }

        let pending = tokio::time::timeout(self.read_timeout, stream.write(line.as_bytes()));
        let written = match pending.await {
            Ok(written) => written?,
            Err(_) => return Err(self.write_timed_out(shown)),
        };
        if written < line.len() {
            error!(
                connection = %self.name,
                "short write of {written}/{} bytes: {shown}",
                line.len()
            );
            return Err(Error::ShortWrite {
                written,
                requested: line.len(),
            });
        }
        match tokio::time::timeout(self.read_timeout, stream.flush()).await {
            Ok(flushed) => flushed?,
            Err(_) => return Err(self.write_timed_out(shown)),
        }

        chatter!(self.verbose, connection = %self.name, "wrote: {shown}");
        Ok(())
    }

    fn write_timed_out(&self, shown: &str) -> Error {
        warn!(
            connection = %self.name,
            "could not write '{shown}' within {} seconds",
            self.read_timeout.as_secs()
        );
        Error::Timeout(self.read_timeout.as_secs())
    }
}

/// Check that `host` can be presented as a TLS server name.
///
/// # Errors
///
/// [`Error::Address`] when it is neither a DNS name nor an IP address.
pub fn validate_server_name(host: &str) -> Result<()> {
    ServerName::try_from(host)
        .map(drop)
        .map_err(|e| Error::Address(format!("invalid TLS server name {host:?}: {e}")))
}

async fn connect_tcp(host: &str, port: u16, budget: Duration) -> Result<TcpStream> {
    let addr = format!("{host}:{port}");
    debug!("Connecting to {}", addr);

    match tokio::time::timeout(budget, TcpStream::connect(&addr)).await {
        Ok(Ok(tcp)) => Ok(tcp),
        Ok(Err(source)) => Err(Error::ConnectFailed { addr, source }),
        Err(_) => Err(Error::ConnectFailed {
            addr,
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
        }),
    }
}

async fn handshake(
    tcp: TcpStream,
    host: &str,
    name: &str,
    options: &ConnectOptions,
) -> Result<TlsStream<TcpStream>> {
    let connector = tls_connector(options.accept_invalid_certs)?;
    let Ok(server_name) = ServerName::try_from(host.to_string()) else {
        error!(connection = %name, "{host} is not a valid TLS server name");
        return Err(Error::HandshakeFailed(name.to_string()));
    };

    match tokio::time::timeout(options.read_timeout, connector.connect(server_name, tcp)).await {
        Ok(Ok(tls)) => {
            chatter!(options.verbose, connection = %name, "handshake completed");
            Ok(tls)
        }
        Ok(Err(e)) => {
            error!(connection = %name, "TLS handshake failed: {e}");
            Err(Error::HandshakeFailed(name.to_string()))
        }
        Err(_) => {
            error!(connection = %name, "TLS handshake timed out");
            Err(Error::HandshakeFailed(name.to_string()))
        }
    }
}

/// Build a TLS connector, verifying against the webpki roots unless
/// `accept_invalid_certs` is set.
fn tls_connector(accept_invalid_certs: bool) -> Result<TlsConnector> {
    let builder =
        rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Config(format!("TLS setup failed: {e}")))?;

    let config = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth()
    } else {
        let roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Certificate verifier that accepts all certificates.
#[derive(Debug)]
struct AcceptAnyCert;

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
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
