//! Error types for the core library.

use thiserror::Error;

use crate::config::ValidationError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// SMTP operation failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] courier_smtp::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Configuration failed validation.
    #[error("Configuration error: {}", join(.0))]
    Config(Vec<ValidationError>),

    /// The mail service has been stopped.
    #[error("Mail service is stopped")]
    Stopped,
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ValidationError::message)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
