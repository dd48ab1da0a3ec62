//! Server replies.

use std::fmt;

/// A complete server reply: one code and the text of every line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit code shared by all lines.
    pub code: ReplyCode,
    /// Line texts with the code and separator removed.
    pub message: Vec<String>,
}

impl Reply {
    /// Creates a reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(code: ReplyCode, message: Vec<String>) -> Self {
        Self { code, message }
    }

    /// 2xx or 3xx.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    /// 2xx only.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code.class(), ReplyClass::Completed)
    }

    /// 4xx.
    #[must_use]
    pub const fn is_transient_error(&self) -> bool {
        self.code.is_transient()
    }

    /// 5xx.
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code.is_permanent()
    }

    /// Text of the first line; empty for a reply without text.
    ///
    /// Carries the base64 challenge of a 334 reply.
    #[must_use]
    pub fn first_line(&self) -> &str {
        self.message.first().map_or("", String::as_str)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        for (i, line) in self.message.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { " / " })?;
            f.write_str(line)?;
        }
        Ok(())
    }
}

/// First digit of a reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// 2xx: the command completed.
    Completed,
    /// 3xx: the server waits for more input (AUTH challenge, DATA).
    Intermediate,
    /// 4xx: temporary failure.
    Transient,
    /// 5xx: permanent failure.
    Permanent,
    /// Any other leading digit. Treated as failure.
    Other,
}

/// Three-digit reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Wraps a numeric code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Numeric value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Classifies the code by its first digit.
    #[must_use]
    pub const fn class(self) -> ReplyClass {
        match self.0 / 100 {
            2 => ReplyClass::Completed,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::Transient,
            5 => ReplyClass::Permanent,
            _ => ReplyClass::Other,
        }
    }

    /// 2xx or 3xx. Every other code is a failure at this layer.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(
            self.class(),
            ReplyClass::Completed | ReplyClass::Intermediate
        )
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self.class(), ReplyClass::Completed)
    }

    /// 3xx.
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        matches!(self.class(), ReplyClass::Intermediate)
    }

    /// 4xx.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self.class(), ReplyClass::Transient)
    }

    /// 5xx.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(self.class(), ReplyClass::Permanent)
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(code: u16, lines: &[&str]) -> Reply {
        Reply::new(
            ReplyCode::new(code),
            lines.iter().map(ToString::to_string).collect(),
        )
    }

    #[test]
    fn classification() {
        let cases = [
            (199, ReplyClass::Other, false),
            (200, ReplyClass::Completed, true),
            (250, ReplyClass::Completed, true),
            (334, ReplyClass::Intermediate, true),
            (354, ReplyClass::Intermediate, true),
            (399, ReplyClass::Intermediate, true),
            (400, ReplyClass::Transient, false),
            (421, ReplyClass::Transient, false),
            (499, ReplyClass::Transient, false),
            (500, ReplyClass::Permanent, false),
            (554, ReplyClass::Permanent, false),
            (600, ReplyClass::Other, false),
        ];
        for (code, class, ok) in cases {
            let code = ReplyCode::new(code);
            assert_eq!(code.class(), class, "{code}");
            assert_eq!(code.is_ok(), ok, "{code}");
        }
    }

    #[test]
    fn intermediate_is_ok_but_not_success() {
        let data = reply(354, &["Go ahead"]);
        assert!(data.is_ok());
        assert!(!data.is_success());
        assert!(data.code.is_intermediate());
    }

    #[test]
    fn failure_kinds() {
        let busy = reply(450, &["Mailbox busy"]);
        assert!(busy.is_transient_error());
        assert!(!busy.is_permanent_error());

        let unknown = reply(550, &["No such user"]);
        assert!(unknown.is_permanent_error());
        assert!(!unknown.is_transient_error());
    }

    #[test]
    fn first_line() {
        assert_eq!(reply(334, &["VXNlcm5hbWU6"]).first_line(), "VXNlcm5hbWU6");
        assert_eq!(reply(250, &[]).first_line(), "");
    }

    #[test]
    fn display() {
        assert_eq!(
            reply(550, &["No such user", "Try again"]).to_string(),
            "550 No such user / Try again"
        );
        assert_eq!(reply(250, &[]).to_string(), "250");
        assert_eq!(ReplyCode::new(7).to_string(), "007");
    }
}
