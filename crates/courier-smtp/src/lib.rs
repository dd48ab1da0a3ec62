//! # courier-smtp
//!
//! A pooled SMTP/ESMTP client engine implementing RFC 5321.
//!
//! ## Features
//!
//! - **Explicit state machine**: the protocol session is a pure transition
//!   function, driven by a thin I/O layer
//! - **Connection pool**: idle connections are probed with RSET and reused
//! - **TLS support**: both implicit TLS (port 465) and STARTTLS, with
//!   capabilities renegotiated after the upgrade
//! - **Authentication**: CRAM-MD5, PLAIN and LOGIN, credentials masked in
//!   logs
//! - **Extensions**: SIZE is enforced before content is sent
//!
//! ## Quick Start
//!
//! ```ignore
//! use courier_smtp::{Config, Credentials, Envelope, Pool};
//!
//! #[tokio::main]
//! async fn main() -> courier_smtp::Result<()> {
//!     let config = Config::builder("smtp.example.com")
//!         .credentials(Credentials::new("user@example.com", "password"))
//!         .build();
//!     let pool = Pool::tcp(config);
//!
//!     let envelope = Envelope::new("sender@example.com").to("recipient@example.com");
//!     pool.send(&envelope, "Subject: Test\r\n\r\nHello, World!\r\n").await?;
//!
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`parser`]: incremental reply parser
//! - [`command`]: command rendering and dot-stuffing
//! - [`auth`]: SASL mechanisms
//! - [`session`]: protocol state machine
//! - [`connection`]: configuration, transports and the session driver
//! - [`pool`]: connection pool
//! - [`types`]: replies, capabilities, addresses and envelopes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod pool;
pub mod session;
pub mod types;

pub use auth::{Credentials, LoginPolicy};
pub use connection::{
    Config, ConfigBuilder, Connection, SmtpStream, StartTlsPolicy, TcpTransport, Transport,
};
pub use error::{AuthUnavailable, Error, Rejection, RenderError, Result};
pub use pool::{Pool, PooledConnection};
pub use types::{
    Address, AddressValidator, AuthMechanism, BasicValidator, Capabilities, Envelope,
    MessageRenderer, Reply, ReplyClass, ReplyCode,
};
