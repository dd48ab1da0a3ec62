//! SMTP extension types.

use std::collections::BTreeSet;

use super::Reply;

/// SMTP extensions discovered from EHLO response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS - TLS upgrade
    StartTls,
    /// AUTH - Authentication, mechanism names upper-cased
    Auth(Vec<String>),
    /// SIZE - Maximum message size
    Size(Option<usize>),
    /// 8BITMIME - 8-bit MIME transport
    EightBitMime,
    /// PIPELINING - Command pipelining (recognized, never used)
    Pipelining,
    /// Unknown extension
    Unknown(String),
}

impl Extension {
    /// Parses an extension line from EHLO response.
    ///
    /// The legacy `AUTH=LOGIN PLAIN` spelling is accepted as well.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            return Self::Unknown(line.to_string());
        }

        let keyword = parts[0].to_uppercase();
        if let Some(first) = keyword.strip_prefix("AUTH=") {
            let mut mechanisms = vec![first.to_string()];
            mechanisms.extend(parts[1..].iter().map(|m| m.to_uppercase()));
            mechanisms.retain(|m| !m.is_empty());
            return Self::Auth(mechanisms);
        }

        match keyword.as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(parts[1..].iter().map(|m| m.to_uppercase()).collect()),
            "SIZE" => Self::Size(parts.get(1).and_then(|s| s.parse().ok())),
            "8BITMIME" => Self::EightBitMime,
            "PIPELINING" => Self::Pipelining,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// SASL authentication mechanisms this client implements.
///
/// Declaration order is preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuthMechanism {
    /// CRAM-MD5 - challenge-response
    CramMd5,
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext
    Login,
}

impl AuthMechanism {
    /// All mechanisms, most preferred first.
    pub const PREFERENCE: [Self; 3] = [Self::CramMd5, Self::Plain, Self::Login];

    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "CRAM-MD5" => Some(Self::CramMd5),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::CramMd5 => "CRAM-MD5",
        }
    }
}

/// Server capabilities negotiated through EHLO.
///
/// Replaced wholesale each time EHLO runs, so the set seen after STARTTLS
/// never mixes with the plaintext one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// STARTTLS advertised.
    pub start_tls: bool,
    /// Advertised SASL mechanism names, upper-cased.
    pub auth_mechanisms: BTreeSet<String>,
    /// SIZE limit; `None` when absent or advertised as 0.
    pub max_message_size: Option<usize>,
    /// 8BITMIME advertised.
    pub eight_bit_mime: bool,
    /// PIPELINING advertised.
    pub pipelining: bool,
}

impl Capabilities {
    /// Builds capabilities from the lines of an EHLO reply.
    ///
    /// The first line of a real EHLO reply is the server's domain, which
    /// parses as an unknown extension and is ignored.
    #[must_use]
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut caps = Self::default();
        for line in lines {
            match Extension::parse(line.as_ref()) {
                Extension::StartTls => caps.start_tls = true,
                Extension::Auth(mechanisms) => caps.auth_mechanisms.extend(mechanisms),
                Extension::Size(size) => caps.max_message_size = size.filter(|&n| n > 0),
                Extension::EightBitMime => caps.eight_bit_mime = true,
                Extension::Pipelining => caps.pipelining = true,
                Extension::Unknown(_) => {}
            }
        }
        caps
    }

    /// Builds capabilities from an EHLO reply.
    #[must_use]
    pub fn from_reply(reply: &Reply) -> Self {
        Self::from_lines(&reply.message)
    }

    /// Returns true if the server advertised the given mechanism.
    #[must_use]
    pub fn supports_auth(&self, mechanism: AuthMechanism) -> bool {
        self.auth_mechanisms.contains(mechanism.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod extension_parse_tests {
        use super::*;

        #[test]
        fn parse_starttls() {
            assert_eq!(Extension::parse("STARTTLS"), Extension::StartTls);
            assert_eq!(Extension::parse("starttls"), Extension::StartTls);
        }

        #[test]
        fn parse_auth() {
            assert_eq!(
                Extension::parse("AUTH plain LOGIN"),
                Extension::Auth(vec!["PLAIN".into(), "LOGIN".into()])
            );
        }

        #[test]
        fn parse_legacy_auth() {
            assert_eq!(
                Extension::parse("AUTH=LOGIN PLAIN"),
                Extension::Auth(vec!["LOGIN".into(), "PLAIN".into()])
            );
        }

        #[test]
        fn parse_size() {
            assert_eq!(
                Extension::parse("SIZE 52428800"),
                Extension::Size(Some(52_428_800))
            );
            assert_eq!(Extension::parse("SIZE"), Extension::Size(None));
            assert_eq!(Extension::parse("SIZE lots"), Extension::Size(None));
        }

        #[test]
        fn parse_unknown() {
            assert_eq!(
                Extension::parse("SMTPUTF8"),
                Extension::Unknown("SMTPUTF8".into())
            );
            assert!(matches!(Extension::parse(""), Extension::Unknown(_)));
        }
    }

    mod capabilities_tests {
        use super::*;

        #[test]
        fn full_ehlo_set() {
            let caps = Capabilities::from_lines([
                "STARTTLS",
                "AUTH PLAIN LOGIN CRAM-MD5",
                "SIZE 35000000",
                "8BITMIME",
            ]);
            assert!(caps.start_tls);
            assert_eq!(
                caps.auth_mechanisms,
                ["PLAIN", "LOGIN", "CRAM-MD5"]
                    .into_iter()
                    .map(String::from)
                    .collect::<BTreeSet<_>>()
            );
            assert_eq!(caps.max_message_size, Some(35_000_000));
            assert!(caps.eight_bit_mime);
            assert!(!caps.pipelining);
        }

        #[test]
        fn domain_line_ignored() {
            let caps = Capabilities::from_lines(["mail.example.com Hello", "PIPELINING"]);
            assert!(caps.pipelining);
            assert!(!caps.start_tls);
            assert!(caps.auth_mechanisms.is_empty());
        }

        #[test]
        fn zero_size_means_unlimited() {
            let caps = Capabilities::from_lines(["SIZE 0"]);
            assert_eq!(caps.max_message_size, None);
        }

        #[test]
        fn supports_auth() {
            let caps = Capabilities::from_lines(["AUTH LOGIN XOAUTH2"]);
            assert!(caps.supports_auth(AuthMechanism::Login));
            assert!(!caps.supports_auth(AuthMechanism::Plain));
            assert!(caps.auth_mechanisms.contains("XOAUTH2"));
        }
    }

    mod auth_mechanism_tests {
        use super::*;

        #[test]
        fn parse() {
            assert_eq!(AuthMechanism::parse("plain"), Some(AuthMechanism::Plain));
            assert_eq!(AuthMechanism::parse("LOGIN"), Some(AuthMechanism::Login));
            assert_eq!(
                AuthMechanism::parse("CRAM-MD5"),
                Some(AuthMechanism::CramMd5)
            );
            assert_eq!(AuthMechanism::parse("XOAUTH2"), None);
        }

        #[test]
        fn preference_order() {
            assert_eq!(
                AuthMechanism::PREFERENCE,
                [
                    AuthMechanism::CramMd5,
                    AuthMechanism::Plain,
                    AuthMechanism::Login
                ]
            );
        }
    }
}
