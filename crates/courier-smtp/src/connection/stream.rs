//! Byte-stream transport: traits and the TCP/TLS implementation.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore},
};

use crate::error::{Error, Result};

/// A connected byte stream that can be upgraded to TLS in place.
pub trait SmtpStream: AsyncRead + AsyncWrite + Unpin + Send + Sized + 'static {
    /// Returns true once the stream is encrypted.
    fn is_encrypted(&self) -> bool;

    /// Runs a TLS handshake over this stream.
    fn upgrade_to_tls(self, hostname: &str) -> impl Future<Output = Result<Self>> + Send;
}

/// Opens streams to a server.
///
/// A pool creates one transport lazily and closes it on shutdown.
pub trait Transport: Send + Sync + 'static {
    /// Stream type produced by [`Transport::connect`].
    type Stream: SmtpStream;

    /// Connects to `host:port`, with TLS from the first byte if `tls`.
    fn connect(
        &self,
        host: &str,
        port: u16,
        tls: bool,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;

    /// Releases shared resources. Existing streams are not affected.
    fn close(&self) {}
}

/// TCP transport with rustls and the webpki root store.
pub struct TcpTransport {
    connector: TlsConnector,
    closed: AtomicBool,
}

impl TcpTransport {
    /// Creates a transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connector: create_tls_connector(),
            closed: AtomicBool::new(false),
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Transport for TcpTransport {
    type Stream = NetStream;

    async fn connect(&self, host: &str, port: u16, tls: bool) -> Result<NetStream> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::InvalidState("transport closed".into()));
        }

        tracing::debug!(host, port, tls, "Connecting");
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|source| Error::Connection {
                host: host.to_string(),
                port,
                source,
            })?;

        let stream = NetStream {
            inner: Inner::Plain(tcp),
            connector: self.connector.clone(),
        };

        if tls {
            // No connection exists until the handshake completes.
            stream
                .upgrade_to_tls(host)
                .await
                .map_err(|e| Error::Connection {
                    host: host.to_string(),
                    port,
                    source: io::Error::other(e.to_string()),
                })
        } else {
            Ok(stream)
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

enum Inner {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// SMTP stream (TCP or TLS).
pub struct NetStream {
    inner: Inner,
    connector: TlsConnector,
}

impl std::fmt::Debug for NetStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetStream")
            .field("encrypted", &self.is_encrypted())
            .finish_non_exhaustive()
    }
}

impl SmtpStream for NetStream {
    fn is_encrypted(&self) -> bool {
        matches!(self.inner, Inner::Tls(_))
    }

    async fn upgrade_to_tls(self, hostname: &str) -> Result<Self> {
        let tcp = match self.inner {
            Inner::Plain(tcp) => tcp,
            Inner::Tls(_) => return Err(Error::InvalidState("already using TLS".into())),
        };

        let server_name = ServerName::try_from(hostname.to_string())
            .map_err(|_| Error::Tls(format!("invalid hostname: {hostname}")))?;

        let tls = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::Tls(e.to_string()))?;
        tracing::debug!(hostname, "TLS established");

        Ok(Self {
            inner: Inner::Tls(Box::new(tls)),
            connector: self.connector,
        })
    }
}

impl AsyncRead for NetStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            Inner::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Inner::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for NetStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            Inner::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Inner::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            Inner::Plain(s) => Pin::new(s).poll_flush(cx),
            Inner::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            Inner::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Inner::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector with the webpki root certificates.
fn create_tls_connector() -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
