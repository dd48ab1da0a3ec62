//! SMTP command builder.
//!
//! Every command has a wire rendering and a log rendering. They only differ
//! for SASL lines, whose placeholder text is fixed when the line is built so
//! the log never sees anything derived from a credential.

use std::fmt;

use crate::types::{Address, AuthMechanism};

/// A credential-bearing SASL line.
#[derive(Clone, PartialEq, Eq)]
pub struct SaslLine {
    wire: String,
    masked: String,
}

impl SaslLine {
    /// Pairs the real encoded line with a same-shape placeholder.
    #[must_use]
    pub const fn new(wire: String, masked: String) -> Self {
        Self { wire, masked }
    }

    /// The text sent to the server.
    #[must_use]
    pub fn wire(&self) -> &str {
        &self.wire
    }

    /// The text safe to log.
    #[must_use]
    pub fn masked(&self) -> &str {
        &self.masked
    }
}

impl fmt::Debug for SaslLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SaslLine").field(&self.masked).finish()
    }
}

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (PLAIN sends credentials here)
        initial_response: Option<SaslLine>,
    },
    /// Bare SASL continuation line answering a 334 challenge
    Sasl(SaslLine),
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to bytes, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = self.render(false).into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns the loggable rendering, without CRLF.
    #[must_use]
    pub fn masked(&self) -> String {
        self.render(true)
    }

    fn render(&self, masked: bool) -> String {
        let sasl = |line: &SaslLine| {
            if masked {
                line.masked.clone()
            } else {
                line.wire.clone()
            }
        };

        match self {
            Self::Helo { hostname } => format!("HELO {hostname}"),
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response,
            } => match initial_response {
                Some(line) => format!("AUTH {} {}", mechanism.as_str(), sasl(line)),
                None => format!("AUTH {}", mechanism.as_str()),
            },
            Self::Sasl(line) => sasl(line),
            Self::MailFrom { from } => format!("MAIL FROM:<{from}>"),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Quit => "QUIT".to_string(),
        }
    }
}

/// Encodes message content for transmission after a 354 reply.
///
/// Line endings are normalized to CRLF, any line starting with `.` gets a
/// second `.`, and the `.` end-of-data line is appended.
#[must_use]
pub fn encode_data(content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + content.len() / 32 + 5);

    if !content.is_empty() {
        let body = content
            .strip_suffix(b"\n")
            .map_or(content, |b| b.strip_suffix(b"\r").unwrap_or(b));

        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }

    out.extend_from_slice(b".\r\n");
    out
}
