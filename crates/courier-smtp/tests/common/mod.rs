//! Scripted streams and transports for driving real sessions in tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_test::io::{Builder, Mock};

use courier_smtp::{Error, Result, SmtpStream, Transport};

/// Mock stream whose TLS upgrade only flips a flag.
#[derive(Debug)]
pub struct TestStream {
    inner: Mock,
    encrypted: bool,
}

impl TestStream {
    pub fn new(inner: Mock) -> Self {
        Self {
            inner,
            encrypted: false,
        }
    }
}

impl SmtpStream for TestStream {
    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    async fn upgrade_to_tls(mut self, _hostname: &str) -> Result<Self> {
        self.encrypted = true;
        Ok(self)
    }
}

impl AsyncRead for TestStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TestStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Builder pre-loaded with a greeting and a plain EHLO exchange.
pub fn ready_script() -> Builder {
    let mut builder = Builder::new();
    builder
        .read(b"220 mx.example.com ESMTP ready\r\n")
        .write(b"EHLO localhost\r\n")
        .read(b"250-mx.example.com\r\n250 8BITMIME\r\n");
    builder
}

/// Transport handing out scripted streams in order.
#[derive(Clone, Default)]
pub struct MockTransport {
    streams: Arc<Mutex<VecDeque<Mock>>>,
    connects: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(streams: impl IntoIterator<Item = Mock>) -> Self {
        Self {
            streams: Arc::new(Mutex::new(streams.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    type Stream = TestStream;

    async fn connect(&self, host: &str, port: u16, tls: bool) -> Result<TestStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.streams.lock().unwrap().pop_front();
        let Some(mock) = next else {
            return Err(Error::Connection {
                host: host.to_string(),
                port,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "no scripted stream"),
            });
        };
        let mut stream = TestStream::new(mock);
        stream.encrypted = tls;
        Ok(stream)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// In-memory log sink for `tracing_subscriber::fmt`.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Installs a thread-local subscriber writing into this capture.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let capture = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || capture.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
