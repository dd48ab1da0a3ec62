//! Outgoing message model and RFC 5322 rendering.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use courier_smtp::{Envelope, MessageRenderer, RenderError};

/// Errors raised while rendering a message.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    /// A header value contains a line break.
    #[error("Header {0} contains a line break")]
    HeaderInjection(&'static str),

    /// No To, Cc or Bcc recipient.
    #[error("Message has no recipients")]
    NoRecipients,
}

/// An email message to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailMessage {
    /// Sender address.
    pub from: String,
    /// Bounce address; used as the envelope sender when set.
    pub bounce_address: Option<String>,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// CC addresses.
    pub cc: Vec<String>,
    /// BCC addresses. Never rendered into headers.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub text: String,
    /// Date header; the render time when unset.
    pub date: Option<DateTime<Utc>>,
}

impl MailMessage {
    /// Creates a new outgoing message.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            subject: subject.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Adds a CC recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Adds a BCC recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Sets the bounce address.
    #[must_use]
    pub fn bounce_address(mut self, addr: impl Into<String>) -> Self {
        self.bounce_address = Some(addr.into());
        self
    }

    /// Fixes the Date header.
    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Builds the SMTP envelope: To, then Cc, then Bcc.
    #[must_use]
    pub fn envelope(&self) -> Envelope {
        let mut envelope = Envelope::new(self.from.clone());
        envelope.return_path.clone_from(&self.bounce_address);
        envelope.recipients = self
            .to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .cloned()
            .collect();
        envelope
    }

    /// Formats the message as RFC 5322 text with CRLF line endings.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] if a header would span lines or there is no
    /// recipient.
    pub fn to_rfc5322(&self) -> Result<String, MessageError> {
        if self.to.is_empty() && self.cc.is_empty() && self.bcc.is_empty() {
            return Err(MessageError::NoRecipients);
        }
        check_header("From", &self.from)?;
        check_header("Subject", &self.subject)?;
        for addr in &self.to {
            check_header("To", addr)?;
        }
        for addr in &self.cc {
            check_header("Cc", addr)?;
        }

        let date = self.date.unwrap_or_else(Utc::now);
        let mut msg = String::new();

        // Writing to a String cannot fail.
        let _ = write!(msg, "Date: {}\r\n", date.to_rfc2822());
        let _ = write!(msg, "From: {}\r\n", self.from);
        if !self.to.is_empty() {
            let _ = write!(msg, "To: {}\r\n", self.to.join(", "));
        }
        if !self.cc.is_empty() {
            let _ = write!(msg, "Cc: {}\r\n", self.cc.join(", "));
        }
        let _ = write!(msg, "Subject: {}\r\n", self.subject);
        msg.push_str("MIME-Version: 1.0\r\n");
        msg.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        msg.push_str("Content-Transfer-Encoding: 8bit\r\n");
        msg.push_str("\r\n");
        msg.push_str(&normalize_newlines(&self.text));

        Ok(msg)
    }
}

impl MessageRenderer for MailMessage {
    fn render(&self) -> Result<Vec<u8>, RenderError> {
        Ok(self.to_rfc5322()?.into_bytes())
    }
}

fn check_header(name: &'static str, value: &str) -> Result<(), MessageError> {
    if value.contains(['\r', '\n']) {
        return Err(MessageError::HeaderInjection(name));
    }
    Ok(())
}

fn normalize_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        match line.strip_suffix('\n') {
            Some(body) => {
                out.push_str(body.strip_suffix('\r').unwrap_or(body));
                out.push_str("\r\n");
            }
            None => out.push_str(line),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 16, 3, 4, 5).unwrap()
    }

    #[test]
    fn test_rfc5322_rendering() {
        let msg = MailMessage::new("me@example.com", "Hello", "line one\nline two\n")
            .to("a@example.com")
            .to("b@example.com")
            .cc("c@example.com")
            .bcc("hidden@example.com")
            .date(fixed_date());

        assert_eq!(
            msg.to_rfc5322().unwrap(),
            "Date: Tue, 16 Jan 2024 03:04:05 +0000\r\n\
             From: me@example.com\r\n\
             To: a@example.com, b@example.com\r\n\
             Cc: c@example.com\r\n\
             Subject: Hello\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             Content-Transfer-Encoding: 8bit\r\n\
             \r\n\
             line one\r\nline two\r\n"
        );
    }

    #[test]
    fn test_header_injection_rejected() {
        let msg = MailMessage::new("me@example.com", "Hi\r\nBcc: victim@example.com", "x")
            .to("a@example.com");
        assert_eq!(
            msg.to_rfc5322().unwrap_err(),
            MessageError::HeaderInjection("Subject")
        );

        let msg = MailMessage::new("me@example.com", "Hi", "x").to("a@example.com\nX: y");
        assert_eq!(msg.to_rfc5322().unwrap_err(), MessageError::HeaderInjection("To"));
    }

    #[test]
    fn test_no_recipients() {
        let msg = MailMessage::new("me@example.com", "Hi", "x");
        assert_eq!(msg.to_rfc5322().unwrap_err(), MessageError::NoRecipients);
        assert!(msg.render().is_err());
    }

    #[test]
    fn test_envelope_uses_bounce_address() {
        let msg = MailMessage::new("me@example.com", "Hi", "x")
            .to("a@example.com")
            .cc("c@example.com")
            .bcc("b@example.com")
            .bounce_address("bounces@example.com");

        let envelope = msg.envelope();
        assert_eq!(envelope.sender(), "bounces@example.com");
        assert_eq!(
            envelope.recipients,
            vec!["a@example.com", "c@example.com", "b@example.com"]
        );
    }

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("a\nb\r\nc"), "a\r\nb\r\nc");
        assert_eq!(normalize_newlines(""), "");
    }
}
