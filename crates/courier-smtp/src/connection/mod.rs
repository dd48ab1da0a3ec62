//! SMTP connections: configuration, transports and the session driver.
//!
//! A [`Connection`] pairs one stream with one [`Session`] and performs the
//! I/O each [`Action`] asks for. Any error on the way marks the connection
//! broken; a broken connection is never used again.

mod config;
mod stream;

pub use config::{
    Config, ConfigBuilder, RELAY_PORT, SUBMISSION_PORT, SUBMISSIONS_PORT, StartTlsPolicy,
};
pub use stream::{NetStream, SmtpStream, TcpTransport, Transport};

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::ReplyParser;
use crate::session::{Action, Session, State};
use crate::types::{AddressValidator, Envelope, MessageRenderer, Reply};

/// Read chunk size.
const READ_BUFFER_SIZE: usize = 4096;

/// One SMTP connection.
#[derive(Debug)]
pub struct Connection<S> {
    id: u64,
    stream: Option<S>,
    parser: ReplyParser,
    session: Session,
    config: Arc<Config>,
    broken: bool,
}

impl<S: SmtpStream> Connection<S> {
    /// Wraps a freshly connected stream.
    #[must_use]
    pub fn new(id: u64, stream: S, config: Arc<Config>) -> Self {
        let session = Session::new(Arc::clone(&config), stream.is_encrypted());
        Self {
            id,
            stream: Some(stream),
            parser: ReplyParser::new(),
            session,
            config,
            broken: false,
        }
    }

    /// Connection id, unique within its pool.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Protocol session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.session.state()
    }

    /// Returns true once an error has made the connection unusable.
    #[must_use]
    pub const fn is_broken(&self) -> bool {
        self.broken
    }

    /// Returns true once the stream has been dropped.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Runs greeting, EHLO/HELO, STARTTLS and authentication.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the connection is then broken.
    pub async fn handshake(&mut self) -> Result<()> {
        let action = self.session.connected();
        let action = self.guard(action)?;
        self.run::<[u8]>(action, None).await.map(drop)
    }

    /// Delivers one message.
    ///
    /// `content` is rendered only after the server accepts DATA. Invalid
    /// addresses are reported before any command is sent and leave the
    /// connection usable.
    ///
    /// # Errors
    ///
    /// Returns the first failure. Except for address validation, the
    /// connection is then broken.
    pub async fn send<R>(
        &mut self,
        envelope: &Envelope,
        content: &R,
        validator: &dyn AddressValidator,
    ) -> Result<()>
    where
        R: MessageRenderer + ?Sized,
    {
        let action = self.session.begin_transaction(envelope, validator)?;
        let outcome = match self.run(action, Some(content)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // QUIT was sent; the stream goes whatever the reply.
                if matches!(e, Error::QuitFailed(_)) {
                    self.close().await;
                }
                return Err(e);
            }
        };
        match outcome {
            Action::Delivered => Ok(()),
            Action::Close => {
                self.close().await;
                Ok(())
            }
            other => Err(Error::InvalidState(format!(
                "delivery ended with {other:?}"
            ))),
        }
    }

    /// Sends RSET to check liveness and clear transaction state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResetFailed`] or an I/O error; the connection is
    /// then broken.
    pub async fn reset(&mut self) -> Result<()> {
        let action = self.session.reset();
        let action = self.guard(action)?;
        self.run::<[u8]>(action, None).await.map(drop)
    }

    /// Sends QUIT, then closes the stream whatever the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QuitFailed`] if QUIT was not acknowledged.
    pub async fn quit(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let result = match self.session.quit() {
            Ok(action) => self.run::<[u8]>(action, None).await.map(drop),
            Err(e) => Err(e),
        };
        self.close().await;
        result
    }

    /// Closes the stream without QUIT.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::trace!(conn = self.id, ?e, "Shutdown failed");
            }
            tracing::debug!(conn = self.id, "Connection closed");
        }
        self.session.close();
    }

    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|e| {
            self.broken = true;
            self.session.fail(e)
        })
    }

    async fn run<R>(&mut self, action: Action, content: Option<&R>) -> Result<Action>
    where
        R: MessageRenderer + ?Sized,
    {
        let result = self.drive(action, content).await;
        self.guard(result)
    }

    async fn drive<R>(&mut self, mut action: Action, content: Option<&R>) -> Result<Action>
    where
        R: MessageRenderer + ?Sized,
    {
        loop {
            action = match action {
                Action::Receive => {
                    let reply = self.read_reply().await?;
                    self.session.on_reply(reply)?
                }
                Action::Send(command) => {
                    self.write_command(&command).await?;
                    let reply = self.read_reply().await?;
                    self.session.on_reply(reply)?
                }
                Action::UpgradeTls => {
                    self.upgrade().await?;
                    self.session.on_tls_upgraded()?
                }
                Action::RenderContent => {
                    let Some(content) = content else {
                        return Err(Error::InvalidState("no message to render".into()));
                    };
                    self.session.on_content(content.render())?
                }
                Action::SendContent(bytes) => {
                    tracing::debug!(conn = self.id, bytes = bytes.len(), "C: <message content>");
                    self.write_all(&bytes).await?;
                    let reply = self.read_reply().await?;
                    self.session.on_reply(reply)?
                }
                done @ (Action::Ready | Action::Delivered | Action::Close) => return Ok(done),
            };
        }
    }

    async fn upgrade(&mut self) -> Result<()> {
        // Bytes sent before the handshake must not be read as post-TLS replies.
        if self.parser.has_partial() {
            return Err(Error::ProtocolFormat(
                "unexpected data before TLS handshake".into(),
            ));
        }
        let stream = self.stream.take().ok_or_else(closed)?;
        let upgrading = stream.upgrade_to_tls(&self.config.host);
        let stream = match self.config.command_timeout {
            Some(limit) => with_deadline(limit, upgrading).await?,
            None => upgrading.await?,
        };
        self.stream = Some(stream);
        Ok(())
    }

    async fn write_command(&mut self, command: &Command) -> Result<()> {
        tracing::debug!(conn = self.id, command = %command.masked(), "C:");
        self.write_all(&command.serialize()).await
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or_else(closed)?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let reply = match self.config.command_timeout {
            Some(limit) => with_deadline(limit, self.read_reply_inner()).await?,
            None => self.read_reply_inner().await?,
        };
        tracing::debug!(conn = self.id, code = %reply.code, text = %reply.first_line(), "S:");
        Ok(reply)
    }

    async fn read_reply_inner(&mut self) -> Result<Reply> {
        let mut chunk = [0u8; READ_BUFFER_SIZE];
        loop {
            if let Some(reply) = self.parser.next_reply()? {
                return Ok(reply);
            }
            let stream = self.stream.as_mut().ok_or_else(closed)?;
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
            self.parser.feed(&chunk[..n]);
        }
    }
}

async fn with_deadline<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(limit))?
}

fn closed() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "connection already closed",
    ))
}
