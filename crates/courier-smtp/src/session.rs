//! SMTP protocol state machine.
//!
//! [`Session`] owns no I/O. Each call consumes one event (a reply, a
//! finished TLS upgrade, rendered content) and returns the [`Action`] the
//! driver must perform next. Exactly one command is outstanding at a time.
//!
//! ```text
//! Connecting -> AwaitGreeting -> AwaitEhlo | AwaitHelo
//!            -> [AwaitStartTls -> TlsUpgrading -> AwaitEhlo]
//!            -> [Authenticating] -> Ready
//! Ready -> AwaitMailFrom -> AwaitRcptTo -> AwaitData -> BuildingContent
//!       -> AwaitContentAck -> Ready | AwaitQuit -> Closed
//! Ready -> AwaitReset -> Ready
//! ```
//!
//! Any error moves the session to `Failed`, which is terminal.

use std::sync::Arc;

use crate::auth::{AuthExchange, AuthStep, LoginPolicy, select_mechanism};
use crate::command::{Command, encode_data};
use crate::connection::{Config, StartTlsPolicy};
use crate::error::{AuthUnavailable, Error, Rejection, RenderError, Result};
use crate::types::{Address, AddressValidator, Capabilities, Envelope, Reply};

/// Protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Transport not yet connected.
    Connecting,
    /// Waiting for the server banner.
    AwaitGreeting,
    /// EHLO sent.
    AwaitEhlo,
    /// HELO sent.
    AwaitHelo,
    /// STARTTLS sent.
    AwaitStartTls,
    /// TLS handshake in progress.
    TlsUpgrading,
    /// SASL exchange in progress.
    Authenticating,
    /// Handshake done, no transaction open.
    Ready,
    /// RSET probe sent.
    AwaitReset,
    /// MAIL FROM sent.
    AwaitMailFrom,
    /// RCPT TO sent.
    AwaitRcptTo,
    /// DATA sent.
    AwaitData,
    /// Waiting for the rendered message.
    BuildingContent,
    /// Content sent, waiting for the final acknowledgement.
    AwaitContentAck,
    /// QUIT sent.
    AwaitQuit,
    /// Session ended cleanly.
    Closed,
    /// Session ended with an error.
    Failed,
}

impl State {
    /// Returns true for `Closed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// What the driver must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Read a reply without sending anything.
    Receive,
    /// Write the command, then read its reply.
    Send(Command),
    /// Upgrade the stream to TLS, then call [`Session::on_tls_upgraded`].
    UpgradeTls,
    /// Render the message, then call [`Session::on_content`].
    RenderContent,
    /// Write the encoded content, then read its reply.
    SendContent(Vec<u8>),
    /// Handshake or reset finished; the session is ready for a message.
    Ready,
    /// Message accepted; the session is ready for the next one.
    Delivered,
    /// QUIT answered; close the transport.
    Close,
}

/// Per-connection protocol session.
#[derive(Debug)]
pub struct Session {
    config: Arc<Config>,
    state: State,
    encrypted: bool,
    upgraded: bool,
    capabilities: Capabilities,
    auth: Option<AuthExchange>,
    authenticated: bool,
    recipient: Option<Address>,
    failure: Option<String>,
}

impl Session {
    /// Creates a session for a stream that is or is not already encrypted.
    #[must_use]
    pub fn new(config: Arc<Config>, encrypted: bool) -> Self {
        Self {
            config,
            state: State::Connecting,
            encrypted,
            upgraded: false,
            capabilities: Capabilities::default(),
            auth: None,
            authenticated: false,
            recipient: None,
            failure: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Capabilities from the latest EHLO.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Whether the channel is encrypted.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Whether a SASL exchange succeeded.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Description of the error that failed the session.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Transport is connected; wait for the greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the session is `Connecting`.
    pub fn connected(&mut self) -> Result<Action> {
        self.expect(State::Connecting, "connected")?;
        self.state = State::AwaitGreeting;
        Ok(Action::Receive)
    }

    /// Feeds the reply to the outstanding command.
    ///
    /// # Errors
    ///
    /// Returns the error matching the refused step; the session is then
    /// `Failed`.
    pub fn on_reply(&mut self, reply: Reply) -> Result<Action> {
        let result = self.step(reply);
        self.guard(result)
    }

    /// The TLS handshake finished; capabilities are renegotiated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless an upgrade was requested.
    pub fn on_tls_upgraded(&mut self) -> Result<Action> {
        let result = self.expect(State::TlsUpgrading, "TLS upgrade").map(|()| {
            self.encrypted = true;
            self.upgraded = true;
            self.capabilities = Capabilities::default();
            self.ehlo()
        });
        self.guard(result)
    }

    /// Opens a mail transaction.
    ///
    /// Addresses are checked before anything is sent. A validation failure
    /// leaves the session `Ready`. Only the first recipient is used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SenderRejected`] or [`Error::RecipientRejected`]
    /// with [`Rejection::Invalid`], or [`Error::InvalidState`].
    pub fn begin_transaction(
        &mut self,
        envelope: &Envelope,
        validator: &dyn AddressValidator,
    ) -> Result<Action> {
        self.expect(State::Ready, "MAIL FROM")?;

        let from = validator
            .validate(envelope.sender())
            .map_err(|e| Error::SenderRejected(Rejection::Invalid(e)))?;

        let Some(first) = envelope.recipients.first() else {
            return Err(Error::RecipientRejected(Rejection::Invalid(
                "no recipients".into(),
            )));
        };
        let to = validator
            .validate(first)
            .map_err(|e| Error::RecipientRejected(Rejection::Invalid(e)))?;

        if envelope.recipients.len() > 1 {
            tracing::warn!(
                dropped = envelope.recipients.len() - 1,
                "Only the first recipient is delivered"
            );
        }

        self.recipient = Some(to);
        self.state = State::AwaitMailFrom;
        Ok(Action::Send(Command::MailFrom { from }))
    }

    /// Feeds the rendered message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContentBuild`] if rendering failed, or
    /// [`Error::MessageTooLarge`] if the server's SIZE limit is exceeded.
    pub fn on_content(
        &mut self,
        rendered: std::result::Result<Vec<u8>, RenderError>,
    ) -> Result<Action> {
        let result = self.content(rendered);
        self.guard(result)
    }

    /// Starts an RSET probe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the session is `Ready`.
    pub fn reset(&mut self) -> Result<Action> {
        self.expect(State::Ready, "RSET")?;
        self.state = State::AwaitReset;
        Ok(Action::Send(Command::Rset))
    }

    /// Starts QUIT.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the session already ended.
    pub fn quit(&mut self) -> Result<Action> {
        if self.state.is_terminal() {
            return Err(self.invalid("QUIT"));
        }
        self.state = State::AwaitQuit;
        Ok(Action::Send(Command::Quit))
    }

    /// Marks the session closed without QUIT.
    pub fn close(&mut self) {
        if self.state != State::Failed {
            self.state = State::Closed;
        }
    }

    /// Fails the session with `error` and hands it back.
    pub fn fail(&mut self, error: Error) -> Error {
        if self.state != State::Failed {
            tracing::debug!(%error, state = ?self.state, "Session failed");
            self.failure = Some(error.to_string());
            self.state = State::Failed;
        }
        error
    }

    fn guard(&mut self, result: Result<Action>) -> Result<Action> {
        result.map_err(|e| self.fail(e))
    }

    fn expect(&self, state: State, operation: &str) -> Result<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn invalid(&self, operation: &str) -> Error {
        Error::InvalidState(format!("{operation} not allowed in {:?}", self.state))
    }

    fn step(&mut self, reply: Reply) -> Result<Action> {
        match self.state {
            State::AwaitGreeting => {
                if !reply.is_ok() {
                    return Err(Error::GreetingRejected(reply));
                }
                if reply.message.iter().any(|line| line.contains("ESMTP")) {
                    Ok(self.ehlo())
                } else {
                    Ok(self.helo())
                }
            }
            State::AwaitEhlo => {
                if reply.is_ok() {
                    self.capabilities = Capabilities::from_reply(&reply);
                    self.negotiate()
                } else if self.upgraded {
                    Err(Error::EhloRejected(reply))
                } else {
                    tracing::debug!(code = %reply.code, "EHLO refused, falling back to HELO");
                    Ok(self.helo())
                }
            }
            State::AwaitHelo => {
                if !reply.is_ok() {
                    return Err(Error::HeloRejected(reply));
                }
                self.capabilities = Capabilities::default();
                self.negotiate()
            }
            State::AwaitStartTls => {
                if !reply.is_success() {
                    return Err(Error::StartTlsRejected(reply));
                }
                self.state = State::TlsUpgrading;
                Ok(Action::UpgradeTls)
            }
            State::Authenticating => {
                let Some(exchange) = self.auth.as_mut() else {
                    return Err(self.invalid("AUTH reply"));
                };
                match exchange.on_reply(&reply)? {
                    AuthStep::Respond(command) => Ok(Action::Send(command)),
                    AuthStep::Done => {
                        tracing::debug!(mechanism = exchange.mechanism().as_str(), "Authenticated");
                        self.auth = None;
                        self.authenticated = true;
                        self.state = State::Ready;
                        Ok(Action::Ready)
                    }
                }
            }
            State::AwaitReset => {
                if !reply.is_ok() {
                    return Err(Error::ResetFailed(reply));
                }
                self.state = State::Ready;
                Ok(Action::Ready)
            }
            State::AwaitMailFrom => {
                if !reply.is_ok() {
                    return Err(Error::SenderRejected(Rejection::Reply(reply)));
                }
                let Some(to) = self.recipient.take() else {
                    return Err(self.invalid("RCPT TO"));
                };
                self.state = State::AwaitRcptTo;
                Ok(Action::Send(Command::RcptTo { to }))
            }
            State::AwaitRcptTo => {
                if !reply.is_ok() {
                    return Err(Error::RecipientRejected(Rejection::Reply(reply)));
                }
                self.state = State::AwaitData;
                Ok(Action::Send(Command::Data))
            }
            State::AwaitData => {
                if !reply.is_ok() {
                    return Err(Error::DataRejected(reply));
                }
                self.state = State::BuildingContent;
                Ok(Action::RenderContent)
            }
            State::AwaitContentAck => {
                if !reply.is_ok() {
                    return Err(Error::DeliveryRejected(reply));
                }
                if self.config.keep_alive {
                    self.state = State::Ready;
                    Ok(Action::Delivered)
                } else {
                    self.state = State::AwaitQuit;
                    Ok(Action::Send(Command::Quit))
                }
            }
            State::AwaitQuit => {
                self.state = State::Closed;
                if reply.is_ok() {
                    Ok(Action::Close)
                } else {
                    Err(Error::QuitFailed(reply))
                }
            }
            State::Connecting
            | State::TlsUpgrading
            | State::Ready
            | State::BuildingContent
            | State::Closed
            | State::Failed => Err(self.invalid("reply")),
        }
    }

    fn content(&mut self, rendered: std::result::Result<Vec<u8>, RenderError>) -> Result<Action> {
        self.expect(State::BuildingContent, "content")?;
        let bytes = rendered.map_err(Error::ContentBuild)?;

        if let Some(limit) = self.capabilities.max_message_size
            && bytes.len() > limit
        {
            return Err(Error::MessageTooLarge {
                size: bytes.len(),
                limit,
            });
        }

        self.state = State::AwaitContentAck;
        Ok(Action::SendContent(encode_data(&bytes)))
    }

    fn ehlo(&mut self) -> Action {
        self.state = State::AwaitEhlo;
        Action::Send(Command::Ehlo {
            hostname: self.config.helo_name.clone(),
        })
    }

    fn helo(&mut self) -> Action {
        self.state = State::AwaitHelo;
        Action::Send(Command::Helo {
            hostname: self.config.helo_name.clone(),
        })
    }

    fn negotiate(&mut self) -> Result<Action> {
        if !self.encrypted {
            match self.config.starttls {
                StartTlsPolicy::Disabled => {}
                _ if self.capabilities.start_tls => {
                    self.state = State::AwaitStartTls;
                    return Ok(Action::Send(Command::StartTls));
                }
                StartTlsPolicy::Required => return Err(Error::StartTlsUnsupportedRequired),
                StartTlsPolicy::Optional => {}
            }
        }

        self.login()
    }

    fn login(&mut self) -> Result<Action> {
        let config = Arc::clone(&self.config);
        let policy = config.login;
        if policy == LoginPolicy::Disabled {
            return Ok(self.ready());
        }

        let advertised = !self.capabilities.auth_mechanisms.is_empty();
        match &config.credentials {
            Some(credentials) if advertised => {
                let Some(mechanism) = select_mechanism(&self.capabilities) else {
                    return Err(Error::AuthUnavailable(
                        AuthUnavailable::NoCompatibleMechanism,
                    ));
                };
                let mut exchange = AuthExchange::new(mechanism, credentials.clone());
                let command = exchange.start();
                self.auth = Some(exchange);
                self.state = State::Authenticating;
                Ok(Action::Send(command))
            }
            Some(_) if policy == LoginPolicy::Required => Err(Error::AuthUnavailable(
                AuthUnavailable::NoCompatibleMechanism,
            )),
            None if policy == LoginPolicy::Required => {
                Err(Error::AuthUnavailable(AuthUnavailable::NoCredentials))
            }
            _ => Ok(self.ready()),
        }
    }

    fn ready(&mut self) -> Action {
        self.state = State::Ready;
        Action::Ready
    }
}
