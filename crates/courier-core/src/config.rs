//! Mail server configuration.
//!
//! [`MailConfig`] is the serializable form applications keep in their
//! settings. It is validated as a whole and converted into the engine's
//! [`courier_smtp::Config`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use courier_smtp::{Credentials, LoginPolicy, StartTlsPolicy};

use crate::error::{Error, Result};

/// STARTTLS setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartTlsOption {
    /// Never upgrade.
    Disabled,
    /// Upgrade when offered.
    #[default]
    Optional,
    /// Refuse to continue unencrypted.
    Required,
}

impl From<StartTlsOption> for StartTlsPolicy {
    fn from(option: StartTlsOption) -> Self {
        match option {
            StartTlsOption::Disabled => Self::Disabled,
            StartTlsOption::Optional => Self::Optional,
            StartTlsOption::Required => Self::Required,
        }
    }
}

/// Login setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginOption {
    /// Never log in.
    Disabled,
    /// Log in when possible.
    #[default]
    Optional,
    /// Refuse to send without logging in.
    Required,
}

impl From<LoginOption> for LoginPolicy {
    fn from(option: LoginOption) -> Self {
        match option {
            LoginOption::Disabled => Self::Disabled,
            LoginOption::Optional => Self::Optional,
            LoginOption::Required => Self::Required,
        }
    }
}

/// Mail server configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Server hostname.
    pub hostname: String,
    /// Server port.
    pub port: u16,
    /// TLS from the first byte.
    pub ssl: bool,
    /// STARTTLS setting.
    pub starttls: StartTlsOption,
    /// Login setting.
    pub login: LoginOption,
    /// Login username.
    pub username: Option<String>,
    /// Login password.
    pub password: Option<String>,
    /// EHLO/HELO name; `localhost` when unset.
    pub helo_name: Option<String>,
    /// Reuse connections between messages.
    pub keep_alive: bool,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-reply timeout in seconds; `None` waits forever.
    pub command_timeout_secs: Option<u64>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 25,
            ssl: false,
            starttls: StartTlsOption::Optional,
            login: LoginOption::Optional,
            username: None,
            password: None,
            helo_name: None,
            keep_alive: true,
            connect_timeout_secs: 30,
            command_timeout_secs: Some(60),
        }
    }
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("ssl", &self.ssl)
            .field("starttls", &self.starttls)
            .field("login", &self.login)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("helo_name", &self.helo_name)
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("command_timeout_secs", &self.command_timeout_secs)
            .finish()
    }
}

impl MailConfig {
    /// Creates a configuration for `hostname:port` with defaults elsewhere.
    #[must_use]
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            ..Self::default()
        }
    }

    /// Parses a JSON configuration. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serde`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets login credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Validates and converts into the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] with every problem found.
    pub fn to_smtp_config(&self) -> Result<courier_smtp::Config> {
        validate_config(self).map_err(Error::Config)?;

        let mut builder = courier_smtp::Config::builder(self.hostname.trim())
            .port(self.port)
            .implicit_tls(self.ssl)
            .starttls(self.starttls.into())
            .login(self.login.into())
            .keep_alive(self.keep_alive)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .command_timeout(self.command_timeout_secs.map(Duration::from_secs));

        if let Some(name) = &self.helo_name {
            builder = builder.helo_name(name.clone());
        }
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }
}

/// Validation error for mail configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Hostname is empty.
    EmptyHostname,
    /// Port is 0.
    InvalidPort,
    /// Password given without a username, or login required without one.
    MissingUsername,
    /// Username given without a password.
    MissingPassword,
    /// EHLO name is empty or contains whitespace.
    InvalidHeloName,
    /// Connect timeout is 0.
    InvalidConnectTimeout,
    /// Command timeout is 0.
    InvalidCommandTimeout,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyHostname => "Mail server hostname is required",
            Self::InvalidPort => "Port must be 1-65535",
            Self::MissingUsername => "Username is required",
            Self::MissingPassword => "Password is required",
            Self::InvalidHeloName => "EHLO name must be a single non-empty word",
            Self::InvalidConnectTimeout => "Connect timeout must be at least one second",
            Self::InvalidCommandTimeout => "Command timeout must be at least one second",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyHostname => "hostname",
            Self::InvalidPort => "port",
            Self::MissingUsername => "username",
            Self::MissingPassword => "password",
            Self::InvalidHeloName => "helo_name",
            Self::InvalidConnectTimeout => "connect_timeout_secs",
            Self::InvalidCommandTimeout => "command_timeout_secs",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating a configuration.
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a mail configuration.
///
/// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all errors.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_config(config: &MailConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.hostname.trim().is_empty() {
        errors.push(ValidationError::EmptyHostname);
    }
    if config.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }

    let username = config.username.as_deref().filter(|u| !u.trim().is_empty());
    match (username, &config.password) {
        (Some(_), None) => errors.push(ValidationError::MissingPassword),
        (None, Some(_)) => errors.push(ValidationError::MissingUsername),
        (None, None) if config.login == LoginOption::Required => {
            errors.push(ValidationError::MissingUsername);
        }
        _ => {}
    }

    if let Some(name) = &config.helo_name
        && (name.is_empty() || name.chars().any(char::is_whitespace))
    {
        errors.push(ValidationError::InvalidHeloName);
    }

    if config.connect_timeout_secs == 0 {
        errors.push(ValidationError::InvalidConnectTimeout);
    }
    if config.command_timeout_secs == Some(0) {
        errors.push(ValidationError::InvalidCommandTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
