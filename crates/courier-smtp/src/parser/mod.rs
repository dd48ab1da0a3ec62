//! SMTP response parser.
//!
//! Replies arrive as CRLF-terminated lines of the form `DDD-text` (more
//! lines follow) or `DDD text` (final line). Transport chunk boundaries are
//! arbitrary, so [`ReplyParser`] buffers bytes until whole lines exist and
//! only yields a [`Reply`] once its final line has been seen.

use std::mem;

use bytes::BytesMut;

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Longest line accepted before the peer is considered broken.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// One parsed reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyLine<'a> {
    /// Status code shared by every line of the reply.
    pub code: ReplyCode,
    /// True for `DDD-` lines.
    pub continuation: bool,
    /// Text after the separator.
    pub text: &'a str,
}

/// Parses a single reply line without its CRLF.
///
/// # Errors
///
/// Returns [`Error::ProtocolFormat`] if the line is shorter than four
/// characters, does not start with a three-digit code in 100-599, or has a
/// fourth character other than space or hyphen.
pub fn parse_line(line: &str) -> Result<ReplyLine<'_>> {
    let bytes = line.as_bytes();
    if bytes.len() < 4 {
        return Err(Error::ProtocolFormat(format!(
            "Reply line too short: {line:?}"
        )));
    }

    if !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(Error::ProtocolFormat(format!(
            "Invalid reply code: {line:?}"
        )));
    }

    let code = bytes[..3]
        .iter()
        .fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'));
    if !(100..600).contains(&code) {
        return Err(Error::ProtocolFormat(format!(
            "Reply code out of range: {code}"
        )));
    }

    let continuation = match bytes[3] {
        b' ' => false,
        b'-' => true,
        _ => {
            return Err(Error::ProtocolFormat(format!(
                "Malformed reply line: {line:?}"
            )));
        }
    };

    Ok(ReplyLine {
        code: ReplyCode::new(code),
        continuation,
        text: &line[4..],
    })
}

/// Incremental reply parser.
#[derive(Debug, Default)]
pub struct ReplyParser {
    buffer: BytesMut,
    code: Option<ReplyCode>,
    lines: Vec<String>,
}

impl ReplyParser {
    /// Creates an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk received from the transport.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Returns the next complete reply, or `None` if more bytes are needed.
    ///
    /// Bytes after the returned reply stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolFormat`] on a malformed line, a code change
    /// inside a multi-line reply, or an over-long line. All partial state is
    /// discarded first.
    pub fn next_reply(&mut self) -> Result<Option<Reply>> {
        while let Some(pos) = find_crlf(&self.buffer) {
            let raw = self.buffer.split_to(pos + 2);
            let line = String::from_utf8_lossy(&raw[..pos]);
            match self.accept(&line) {
                Ok(Some(reply)) => return Ok(Some(reply)),
                Ok(None) => {}
                Err(e) => {
                    self.clear();
                    return Err(e);
                }
            }
        }

        if self.buffer.len() > MAX_LINE_LENGTH {
            self.clear();
            return Err(Error::ProtocolFormat("Reply line too long".into()));
        }

        Ok(None)
    }

    /// Drops buffered bytes and any half-read reply.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.code = None;
        self.lines.clear();
    }

    /// Returns true if bytes or lines of an unfinished reply are held.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty() || !self.lines.is_empty()
    }

    fn accept(&mut self, line: &str) -> Result<Option<Reply>> {
        let parsed = parse_line(line)?;

        if let Some(code) = self.code
            && code != parsed.code
        {
            return Err(Error::ProtocolFormat(format!(
                "Reply code changed from {code} to {} in multi-line reply",
                parsed.code
            )));
        }

        self.code = Some(parsed.code);
        self.lines.push(parsed.text.to_string());

        if parsed.continuation {
            return Ok(None);
        }

        self.code = None;
        Ok(Some(Reply::new(parsed.code, mem::take(&mut self.lines))))
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
