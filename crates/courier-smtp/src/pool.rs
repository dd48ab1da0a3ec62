//! Connection pool.
//!
//! The pool tracks every connection it has created, in creation order.
//! A connection is either parked (idle, or broken and waiting to be closed)
//! or busy, held by a caller between [`Pool::acquire`] and
//! [`Pool::release`]. The lock is never held across network I/O.
//!
//! There is no size cap and no queueing: a caller that finds no usable
//! idle connection always opens a new one.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::connection::{Config, Connection, TcpTransport, Transport};
use crate::error::{Error, Result};
use crate::types::{AddressValidator, BasicValidator, Envelope, MessageRenderer};

type Factory<T> = Box<dyn Fn(&Config) -> Result<T> + Send + Sync>;

/// A pooled connection.
pub type PooledConnection<T> = Connection<<T as Transport>::Stream>;

struct Slot<S> {
    id: u64,
    /// `None` while a caller holds the connection.
    parked: Option<Connection<S>>,
}

struct Inner<T: Transport> {
    transport: Option<Arc<T>>,
    slots: Vec<Slot<T::Stream>>,
    next_id: u64,
    stopped: bool,
}

/// Pool of SMTP connections to one server.
pub struct Pool<T: Transport> {
    config: Arc<Config>,
    factory: Factory<T>,
    validator: Arc<dyn AddressValidator>,
    inner: Mutex<Inner<T>>,
}

impl Pool<TcpTransport> {
    /// Creates a pool over TCP/TLS.
    #[must_use]
    pub fn tcp(config: Config) -> Self {
        Self::new(config, |_| Ok(TcpTransport::new()))
    }
}

impl<T: Transport> Pool<T> {
    /// Creates a pool.
    ///
    /// `factory` builds the shared transport on first use.
    #[must_use]
    pub fn new<F>(config: Config, factory: F) -> Self
    where
        F: Fn(&Config) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            config: Arc::new(config),
            factory: Box::new(factory),
            validator: Arc::new(BasicValidator),
            inner: Mutex::new(Inner {
                transport: None,
                slots: Vec::new(),
                next_id: 1,
                stopped: false,
            }),
        }
    }

    /// Replaces the address validator.
    #[must_use]
    pub fn with_validator(mut self, validator: impl AddressValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Pool configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of tracked connections, busy and broken included.
    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    /// Number of parked connections that are not broken.
    pub async fn idle_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .slots
            .iter()
            .filter(|s| s.parked.as_ref().is_some_and(|c| !c.is_broken()))
            .count()
    }

    /// Returns true after [`Pool::shutdown`].
    pub async fn is_stopped(&self) -> bool {
        self.inner.lock().await.stopped
    }

    /// Returns a connection that has completed its handshake.
    ///
    /// Idle connections are tried first, in creation order, each with an
    /// RSET probe. A failed probe marks that connection broken. When none
    /// is usable a new connection is opened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolStopped`] after shutdown, a connection error if
    /// the server cannot be reached, or the handshake failure.
    pub async fn acquire(&self) -> Result<PooledConnection<T>> {
        loop {
            let candidate = {
                let mut inner = self.inner.lock().await;
                if inner.stopped {
                    return Err(Error::PoolStopped);
                }
                inner
                    .slots
                    .iter_mut()
                    .find(|s| s.parked.as_ref().is_some_and(|c| !c.is_broken()))
                    .and_then(|s| s.parked.take())
            };

            let Some(mut conn) = candidate else {
                break;
            };

            match conn.reset().await {
                Ok(()) => {
                    tracing::debug!(conn = conn.id(), "Reusing idle connection");
                    return Ok(conn);
                }
                Err(e) => {
                    tracing::warn!(conn = conn.id(), error = %e, "Reset probe failed");
                    self.park(conn).await;
                }
            }
        }

        self.open().await
    }

    /// Hands a connection back.
    ///
    /// Broken connections stay tracked, closed, until shutdown. Connections
    /// that already sent QUIT are dropped. After shutdown every returned
    /// connection is closed.
    pub async fn release(&self, conn: PooledConnection<T>) {
        self.park(conn).await;
    }

    /// Delivers one message over a pooled connection.
    ///
    /// # Errors
    ///
    /// Returns the acquisition or delivery failure. No retry is attempted.
    pub async fn send<R>(&self, envelope: &Envelope, content: &R) -> Result<()>
    where
        R: MessageRenderer + ?Sized,
    {
        let mut conn = self.acquire().await?;
        let result = conn.send(envelope, content, self.validator.as_ref()).await;
        match &result {
            Ok(()) => tracing::info!(conn = conn.id(), "Message delivered"),
            Err(e) => tracing::warn!(conn = conn.id(), error = %e, "Delivery failed"),
        }
        self.release(conn).await;
        result
    }

    /// Stops the pool.
    ///
    /// Closes the transport, sends QUIT on every idle connection and closes
    /// broken ones without QUIT. Busy connections are left to their holder.
    /// Returns once every parked connection has been handled. Later calls
    /// do nothing.
    pub async fn shutdown(&self) {
        let (transport, parked) = {
            let mut inner = self.inner.lock().await;
            if inner.stopped {
                return;
            }
            inner.stopped = true;

            let mut parked = Vec::new();
            inner.slots.retain_mut(|slot| match slot.parked.take() {
                Some(conn) => {
                    parked.push(conn);
                    false
                }
                None => true,
            });
            (inner.transport.take(), parked)
        };

        if let Some(transport) = transport {
            transport.close();
        }

        let count = parked.len();
        for mut conn in parked {
            if conn.is_broken() {
                conn.close().await;
            } else if let Err(e) = conn.quit().await {
                tracing::debug!(conn = conn.id(), error = %e, "QUIT failed during shutdown");
            }
        }
        tracing::info!(closed = count, "Connection pool stopped");
    }

    async fn open(&self) -> Result<PooledConnection<T>> {
        let (transport, id) = {
            let mut inner = self.inner.lock().await;
            if inner.stopped {
                return Err(Error::PoolStopped);
            }
            let transport = match &inner.transport {
                Some(transport) => Arc::clone(transport),
                None => {
                    let transport = Arc::new((self.factory)(&self.config)?);
                    inner.transport = Some(Arc::clone(&transport));
                    transport
                }
            };
            let id = inner.next_id;
            inner.next_id += 1;
            inner.slots.push(Slot { id, parked: None });
            (transport, id)
        };

        let config = &self.config;
        let connecting = transport.connect(&config.host, config.port, config.implicit_tls);
        let stream = match tokio::time::timeout(config.connect_timeout, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.forget(id).await;
                return Err(e);
            }
            Err(_) => {
                self.forget(id).await;
                return Err(Error::Connection {
                    host: config.host.clone(),
                    port: config.port,
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                });
            }
        };

        let mut conn = Connection::new(id, stream, Arc::clone(config));
        match conn.handshake().await {
            Ok(()) => {
                tracing::info!(
                    conn = id,
                    host = %config.host,
                    encrypted = conn.session().is_encrypted(),
                    authenticated = conn.session().is_authenticated(),
                    "Connection ready"
                );
                Ok(conn)
            }
            Err(e) => {
                tracing::warn!(conn = id, error = %e, "Handshake failed");
                self.park(conn).await;
                Err(e)
            }
        }
    }

    async fn park(&self, mut conn: PooledConnection<T>) {
        if conn.is_broken() {
            conn.close().await;
        }

        let mut inner = self.inner.lock().await;
        let finished = conn.is_closed() && !conn.is_broken();
        if inner.stopped || finished {
            inner.slots.retain(|s| s.id != conn.id());
            drop(inner);
            if let Err(e) = conn.quit().await {
                tracing::debug!(conn = conn.id(), error = %e, "QUIT failed");
            }
            return;
        }

        if let Some(slot) = inner.slots.iter_mut().find(|s| s.id == conn.id()) {
            slot.parked = Some(conn);
        }
    }

    async fn forget(&self, id: u64) {
        self.inner.lock().await.slots.retain(|s| s.id != id);
    }
}

impl<T: Transport> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field(
                "connections",
                &match self.inner.try_lock() {
                    Ok(inner) => format!("{} connections", inner.slots.len()),
                    Err(_) => "LOCKED".to_string(),
                },
            )
            .finish_non_exhaustive()
    }
}
