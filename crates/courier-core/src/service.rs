//! Mail sending service.
//!
//! Wraps a connection pool with a start/stop lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};

use courier_smtp::{Pool, TcpTransport, Transport};
use tracing::{debug, info};

use crate::config::MailConfig;
use crate::error::{Error, Result};
use crate::message::MailMessage;

/// Sends messages over pooled SMTP connections.
#[derive(Debug)]
pub struct MailService<T: Transport = TcpTransport> {
    pool: Pool<T>,
    stopped: AtomicBool,
}

impl MailService<TcpTransport> {
    /// Creates a service connecting over TCP.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: &MailConfig) -> Result<Self> {
        Ok(Self::with_pool(Pool::tcp(config.to_smtp_config()?)))
    }
}

impl<T: Transport> MailService<T> {
    /// Creates a service over an existing pool.
    #[must_use]
    pub const fn with_pool(pool: Pool<T>) -> Self {
        Self {
            pool,
            stopped: AtomicBool::new(false),
        }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &Pool<T> {
        &self.pool
    }

    /// Marks the service as started. Connections open lazily on first send.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] after [`stop`](Self::stop).
    pub fn start(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::Stopped);
        }
        let config = self.pool.config();
        debug!(host = %config.host, port = config.port, "Mail service started");
        Ok(())
    }

    /// Stops the service and shuts the pool down. Later calls do nothing.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Stopping mail service");
        self.pool.shutdown().await;
    }

    /// Returns true once [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Renders and sends a message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] after stop, otherwise the delivery error.
    pub async fn send_mail(&self, message: &MailMessage) -> Result<()> {
        self.ensure_running()?;
        self.pool.send(&message.envelope(), message).await?;
        info!(subject = %message.subject, "Mail sent");
        Ok(())
    }

    /// Sends pre-rendered message text using the envelope of `message`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stopped`] after stop, otherwise the delivery error.
    pub async fn send_mail_string(&self, message: &MailMessage, text: &str) -> Result<()> {
        self.ensure_running()?;
        self.pool.send(&message.envelope(), text).await?;
        info!(subject = %message.subject, "Mail sent");
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_stopped() {
            Err(Error::Stopped)
        } else {
            Ok(())
        }
    }
}
