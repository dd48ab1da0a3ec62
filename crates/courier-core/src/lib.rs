//! # courier-core
//!
//! Service layer over the `courier-smtp` engine.
//!
//! This crate provides:
//! - [`MailConfig`]: serde-loadable server settings with validation
//! - [`MailMessage`]: a plain-text message rendered as RFC 5322
//! - [`MailService`]: start/stop lifecycle and sending over a connection pool

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod message;
pub mod service;

pub use config::{
    LoginOption, MailConfig, StartTlsOption, ValidationError, ValidationResult, validate_config,
};
pub use error::{Error, Result};
pub use message::{MailMessage, MessageError};
pub use service::MailService;
