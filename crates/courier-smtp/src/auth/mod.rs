//! SASL authentication: mechanism selection and challenge/response steps.
//!
//! [`AuthExchange`] is a small state machine. It produces the command to
//! send next and consumes the server's reply, without touching I/O, so the
//! session can drive it one round trip at a time.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md5::Md5;

use crate::command::{Command, SaslLine};
use crate::error::{Error, Result};
use crate::types::{AuthMechanism, Capabilities, Reply};

type HmacMd5 = Hmac<Md5>;

/// Placeholder logged in place of the username.
const MASKED_USERNAME: &str = "username";
/// Placeholder logged in place of the password.
const MASKED_PASSWORD: &str = "********";
/// Placeholder logged in place of the CRAM-MD5 digest.
const MASKED_DIGEST: &str = "********************************";

/// Contains user credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates credentials from username and password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Whether the session logs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginPolicy {
    /// Never authenticate.
    Disabled,
    /// Authenticate when credentials and a mechanism are available.
    #[default]
    Optional,
    /// Fail the session unless authentication happens.
    Required,
}

/// Picks the most preferred mechanism the server advertises.
///
/// Preference is CRAM-MD5, then PLAIN, then LOGIN.
#[must_use]
pub fn select_mechanism(caps: &Capabilities) -> Option<AuthMechanism> {
    AuthMechanism::PREFERENCE
        .into_iter()
        .find(|&m| caps.supports_auth(m))
}

/// Builds the PLAIN initial response, base64 of `\0user\0pass`.
#[must_use]
pub fn plain(credentials: &Credentials) -> SaslLine {
    SaslLine::new(
        encode(&format!(
            "\0{}\0{}",
            credentials.username, credentials.password
        )),
        encode(&format!("\0{MASKED_USERNAME}\0{MASKED_PASSWORD}")),
    )
}

/// Builds the LOGIN username line.
#[must_use]
pub fn login_username(credentials: &Credentials) -> SaslLine {
    SaslLine::new(encode(&credentials.username), encode(MASKED_USERNAME))
}

/// Builds the LOGIN password line.
#[must_use]
pub fn login_password(credentials: &Credentials) -> SaslLine {
    SaslLine::new(encode(&credentials.password), encode(MASKED_PASSWORD))
}

/// Computes the hex HMAC-MD5 of `challenge` keyed with `password`.
///
/// # Errors
///
/// Returns [`Error::InvalidState`] if the MAC rejects the key.
pub fn cram_md5_digest(password: &str, challenge: &[u8]) -> Result<String> {
    let mut mac = HmacMd5::new_from_slice(password.as_bytes())
        .map_err(|e| Error::InvalidState(format!("HMAC key: {e}")))?;
    mac.update(challenge);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Answers a CRAM-MD5 challenge, base64 of `user hexdigest`.
///
/// # Errors
///
/// Returns [`Error::ProtocolFormat`] if the challenge is not valid base64.
pub fn cram_md5(credentials: &Credentials, encoded_challenge: &str) -> Result<SaslLine> {
    let challenge = STANDARD
        .decode(encoded_challenge.trim())
        .map_err(|e| Error::ProtocolFormat(format!("Invalid CRAM-MD5 challenge: {e}")))?;
    let digest = cram_md5_digest(&credentials.password, &challenge)?;

    Ok(SaslLine::new(
        encode(&format!("{} {digest}", credentials.username)),
        encode(&format!("{MASKED_USERNAME} {MASKED_DIGEST}")),
    ))
}

fn encode(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Outcome of feeding a reply to an [`AuthExchange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStep {
    /// Send this command and feed back its reply.
    Respond(Command),
    /// Authentication succeeded.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Initial,
    Challenge,
    Username,
    Password,
    Outcome,
    Finished,
}

/// One SASL exchange over a single mechanism.
#[derive(Debug, Clone)]
pub struct AuthExchange {
    mechanism: AuthMechanism,
    credentials: Credentials,
    stage: Stage,
}

impl AuthExchange {
    /// Prepares an exchange.
    #[must_use]
    pub const fn new(mechanism: AuthMechanism, credentials: Credentials) -> Self {
        Self {
            mechanism,
            credentials,
            stage: Stage::Initial,
        }
    }

    /// Selected mechanism.
    #[must_use]
    pub const fn mechanism(&self) -> AuthMechanism {
        self.mechanism
    }

    /// Returns the AUTH command that opens the exchange.
    pub fn start(&mut self) -> Command {
        let (initial_response, next) = match self.mechanism {
            AuthMechanism::CramMd5 => (None, Stage::Challenge),
            AuthMechanism::Plain => (Some(plain(&self.credentials)), Stage::Outcome),
            AuthMechanism::Login => (None, Stage::Username),
        };
        self.stage = next;
        Command::Auth {
            mechanism: self.mechanism,
            initial_response,
        }
    }

    /// Consumes the reply to the last command sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthRejected`] if the server refuses a step, or
    /// [`Error::ProtocolFormat`] for an undecodable CRAM-MD5 challenge.
    pub fn on_reply(&mut self, reply: &Reply) -> Result<AuthStep> {
        match self.stage {
            Stage::Challenge => {
                self.expect_continue(reply)?;
                let line = cram_md5(&self.credentials, reply.first_line())?;
                self.stage = Stage::Outcome;
                Ok(AuthStep::Respond(Command::Sasl(line)))
            }
            Stage::Username => {
                self.expect_continue(reply)?;
                self.stage = Stage::Password;
                Ok(AuthStep::Respond(Command::Sasl(login_username(
                    &self.credentials,
                ))))
            }
            Stage::Password => {
                self.expect_continue(reply)?;
                self.stage = Stage::Outcome;
                Ok(AuthStep::Respond(Command::Sasl(login_password(
                    &self.credentials,
                ))))
            }
            Stage::Outcome => {
                let accepted = match self.mechanism {
                    AuthMechanism::Login => reply.is_ok(),
                    AuthMechanism::CramMd5 | AuthMechanism::Plain => reply.is_success(),
                };
                self.stage = Stage::Finished;
                if accepted {
                    Ok(AuthStep::Done)
                } else {
                    Err(Error::AuthRejected(reply.clone()))
                }
            }
            Stage::Initial | Stage::Finished => Err(Error::InvalidState(format!(
                "no {} exchange step pending",
                self.mechanism.as_str()
            ))),
        }
    }

    fn expect_continue(&mut self, reply: &Reply) -> Result<()> {
        if reply.code.is_intermediate() {
            Ok(())
        } else {
            self.stage = Stage::Finished;
            Err(Error::AuthRejected(reply.clone()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ReplyCode;

    fn reply(code: u16, text: &str) -> Reply {
        Reply::new(ReplyCode::new(code), vec![text.to_string()])
    }

    fn creds() -> Credentials {
        Credentials::new("alice", "wonderland")
    }

    #[test]
    fn test_cram_md5_reference_vector() {
        let challenge = b"<1896.697170952@postoffice.reston.mci.net>";
        assert_eq!(
            cram_md5_digest("tanstaaftanstaaf", challenge).unwrap(),
            "b913a602c7eda7a495b4e6e7334d3890"
        );

        let line = cram_md5(
            &Credentials::new("tim", "tanstaaftanstaaf"),
            "PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+",
        )
        .unwrap();
        assert_eq!(line.wire(), "dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw");
        assert_eq!(
            line.wire(),
            STANDARD.encode("tim b913a602c7eda7a495b4e6e7334d3890")
        );
        assert_ne!(line.masked(), line.wire());
    }

    #[test]
    fn test_cram_md5_bad_challenge() {
        assert!(matches!(
            cram_md5(&creds(), "!!not base64!!"),
            Err(Error::ProtocolFormat(_))
        ));
    }

    #[test]
    fn test_plain_line() {
        let line = plain(&creds());
        assert_eq!(line.wire(), "AGFsaWNlAHdvbmRlcmxhbmQ=");
        assert_eq!(line.masked(), "AHVzZXJuYW1lACoqKioqKioq");
    }

    #[test]
    fn test_login_lines() {
        assert_eq!(login_username(&creds()).wire(), "YWxpY2U=");
        assert_eq!(login_password(&creds()).wire(), "d29uZGVybGFuZA==");
        assert_eq!(login_password(&creds()).masked(), "KioqKioqKio=");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let debug = format!("{:?}", creds());
        assert!(debug.contains("alice"));
        assert!(!debug.contains("wonderland"));
    }

    #[test]
    fn test_select_mechanism_priority() {
        let all = Capabilities::from_lines(["AUTH LOGIN PLAIN CRAM-MD5"]);
        assert_eq!(select_mechanism(&all), Some(AuthMechanism::CramMd5));

        let no_cram = Capabilities::from_lines(["AUTH LOGIN PLAIN"]);
        assert_eq!(select_mechanism(&no_cram), Some(AuthMechanism::Plain));

        let login_only = Capabilities::from_lines(["AUTH LOGIN XOAUTH2"]);
        assert_eq!(select_mechanism(&login_only), Some(AuthMechanism::Login));

        let none = Capabilities::from_lines(["AUTH XOAUTH2 GSSAPI"]);
        assert_eq!(select_mechanism(&none), None);
    }

    #[test]
    fn test_plain_exchange() {
        let mut exchange = AuthExchange::new(AuthMechanism::Plain, creds());
        assert_eq!(
            exchange.start().serialize(),
            b"AUTH PLAIN AGFsaWNlAHdvbmRlcmxhbmQ=\r\n"
        );
        assert_eq!(
            exchange.on_reply(&reply(235, "Authentication successful")).unwrap(),
            AuthStep::Done
        );
    }

    #[test]
    fn test_plain_rejected() {
        let mut exchange = AuthExchange::new(AuthMechanism::Plain, creds());
        exchange.start();
        assert!(matches!(
            exchange.on_reply(&reply(535, "Bad credentials")),
            Err(Error::AuthRejected(_))
        ));
    }

    #[test]
    fn test_login_exchange() {
        let mut exchange = AuthExchange::new(AuthMechanism::Login, creds());
        assert_eq!(exchange.start().serialize(), b"AUTH LOGIN\r\n");

        let AuthStep::Respond(user) = exchange.on_reply(&reply(334, "VXNlcm5hbWU6")).unwrap()
        else {
            panic!("expected username step");
        };
        assert_eq!(user.serialize(), b"YWxpY2U=\r\n");

        let AuthStep::Respond(pass) = exchange.on_reply(&reply(334, "UGFzc3dvcmQ6")).unwrap()
        else {
            panic!("expected password step");
        };
        assert_eq!(pass.serialize(), b"d29uZGVybGFuZA==\r\n");
        assert_eq!(pass.masked(), "KioqKioqKio=");

        assert_eq!(
            exchange.on_reply(&reply(235, "OK")).unwrap(),
            AuthStep::Done
        );
    }

    #[test]
    fn test_login_final_rejection() {
        let mut exchange = AuthExchange::new(AuthMechanism::Login, creds());
        exchange.start();
        exchange.on_reply(&reply(334, "VXNlcm5hbWU6")).unwrap();
        exchange.on_reply(&reply(334, "UGFzc3dvcmQ6")).unwrap();
        assert!(matches!(
            exchange.on_reply(&reply(535, "No")),
            Err(Error::AuthRejected(_))
        ));
    }

    #[test]
    fn test_cram_exchange() {
        let mut exchange = AuthExchange::new(
            AuthMechanism::CramMd5,
            Credentials::new("tim", "tanstaaftanstaaf"),
        );
        assert_eq!(exchange.start().serialize(), b"AUTH CRAM-MD5\r\n");
        let step = exchange
            .on_reply(&reply(
                334,
                "PDE4OTYuNjk3MTcwOTUyQHBvc3RvZmZpY2UucmVzdG9uLm1jaS5uZXQ+",
            ))
            .unwrap();
        assert_eq!(
            step,
            AuthStep::Respond(Command::Sasl(SaslLine::new(
                "dGltIGI5MTNhNjAyYzdlZGE3YTQ5NWI0ZTZlNzMzNGQzODkw".into(),
                STANDARD.encode(format!("{MASKED_USERNAME} {MASKED_DIGEST}")),
            )))
        );
        assert_eq!(
            exchange.on_reply(&reply(235, "OK")).unwrap(),
            AuthStep::Done
        );
    }

    #[test]
    fn test_cram_refused_before_challenge() {
        let mut exchange = AuthExchange::new(AuthMechanism::CramMd5, creds());
        exchange.start();
        assert!(matches!(
            exchange.on_reply(&reply(504, "Unrecognized authentication type")),
            Err(Error::AuthRejected(_))
        ));
        assert!(matches!(
            exchange.on_reply(&reply(235, "late")),
            Err(Error::InvalidState(_))
        ));
    }
}
