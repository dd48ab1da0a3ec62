//! Error types for SMTP operations.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::types::Reply;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a message renderer.
pub type RenderError = Box<dyn std::error::Error + Send + Sync>;

/// SMTP error types.
///
/// Every failed send produces exactly one of these. Variants that follow a
/// server reply keep the whole [`Reply`] so callers can tell a 4xx from a
/// 5xx even though the engine treats both as failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Could not establish the transport connection.
    #[error("Connection to {host}:{port} failed: {source}")]
    Connection {
        /// Server hostname.
        host: String,
        /// Server port.
        port: u16,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS setup or handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// No reply arrived within the configured deadline.
    #[error("Timed out after {0:?} waiting for the server")]
    Timeout(Duration),

    /// Malformed reply line from the server.
    #[error("Protocol format error: {0}")]
    ProtocolFormat(String),

    /// Server greeting was not 2xx/3xx.
    #[error("Greeting rejected: {0}")]
    GreetingRejected(Reply),

    /// EHLO was refused after the channel was already encrypted.
    #[error("EHLO rejected: {0}")]
    EhloRejected(Reply),

    /// HELO was refused.
    #[error("HELO rejected: {0}")]
    HeloRejected(Reply),

    /// STARTTLS was advertised but the command was refused.
    #[error("STARTTLS rejected: {0}")]
    StartTlsRejected(Reply),

    /// Policy requires STARTTLS but the server does not offer it.
    #[error("STARTTLS required but not supported by server")]
    StartTlsUnsupportedRequired,

    /// Login is required but cannot be performed.
    #[error("Authentication unavailable: {0}")]
    AuthUnavailable(AuthUnavailable),

    /// Server refused the credentials.
    #[error("Authentication rejected: {0}")]
    AuthRejected(Reply),

    /// Envelope sender refused, locally or by the server.
    #[error("Sender address not accepted: {0}")]
    SenderRejected(Rejection),

    /// Recipient refused, locally or by the server.
    #[error("Recipient address not accepted: {0}")]
    RecipientRejected(Rejection),

    /// DATA command refused.
    #[error("DATA command not accepted: {0}")]
    DataRejected(Reply),

    /// Rendered message exceeds the server's advertised SIZE.
    #[error("Message of {size} bytes exceeds server limit of {limit} bytes")]
    MessageTooLarge {
        /// Rendered content length.
        size: usize,
        /// Limit advertised by the server.
        limit: usize,
    },

    /// The message renderer failed.
    #[error("Cannot build message content: {0}")]
    ContentBuild(#[source] RenderError),

    /// Server refused the transmitted content.
    #[error("Sending data failed: {0}")]
    DeliveryRejected(Reply),

    /// QUIT was not acknowledged.
    #[error("QUIT failed: {0}")]
    QuitFailed(Reply),

    /// RSET probe on an idle connection failed.
    #[error("RSET failed: {0}")]
    ResetFailed(Reply),

    /// The connection pool has been shut down.
    #[error("Connection pool is stopped")]
    PoolStopped,

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),
}

/// Why authentication could not be attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthUnavailable {
    /// Server advertises no mechanism this client implements.
    NoCompatibleMechanism,
    /// Login is required but no credentials were supplied.
    NoCredentials,
}

impl fmt::Display for AuthUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCompatibleMechanism => f.write_str(
                "login is required, but no compatible AUTH mechanism is available (STARTTLS may be needed)",
            ),
            Self::NoCredentials => f.write_str("login is required, but no credentials supplied"),
        }
    }
}

/// Reason a sender or recipient was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The address failed local syntax validation; nothing was sent.
    Invalid(String),
    /// The server refused the command.
    Reply(Reply),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(reason) => write!(f, "invalid address: {reason}"),
            Self::Reply(reply) => write!(f, "{reply}"),
        }
    }
}

impl Error {
    /// Returns the server reply that caused this error, if any.
    #[must_use]
    pub const fn reply(&self) -> Option<&Reply> {
        match self {
            Self::GreetingRejected(reply)
            | Self::EhloRejected(reply)
            | Self::HeloRejected(reply)
            | Self::StartTlsRejected(reply)
            | Self::AuthRejected(reply)
            | Self::SenderRejected(Rejection::Reply(reply))
            | Self::RecipientRejected(Rejection::Reply(reply))
            | Self::DataRejected(reply)
            | Self::DeliveryRejected(reply)
            | Self::QuitFailed(reply)
            | Self::ResetFailed(reply) => Some(reply),
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        match self.reply() {
            Some(reply) => reply.is_permanent_error(),
            None => false,
        }
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self.reply() {
            Some(reply) => reply.is_transient_error(),
            None => false,
        }
    }
}
