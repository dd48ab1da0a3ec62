//! Connection configuration types.

use std::time::Duration;

use crate::auth::{Credentials, LoginPolicy};

/// Whether the session upgrades a plaintext connection with STARTTLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartTlsPolicy {
    /// Never upgrade.
    Disabled,
    /// Upgrade when the server advertises STARTTLS.
    #[default]
    Optional,
    /// Fail the session unless the connection ends up encrypted.
    Required,
}

/// Submission port used with STARTTLS.
pub const SUBMISSION_PORT: u16 = 587;
/// Implicit TLS port.
pub const SUBMISSIONS_PORT: u16 = 465;
/// Plain relay port.
pub const RELAY_PORT: u16 = 25;

/// SMTP connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname, also used for TLS verification.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// TLS from the first byte.
    pub implicit_tls: bool,
    /// STARTTLS policy for plaintext connections.
    pub starttls: StartTlsPolicy,
    /// Authentication policy.
    pub login: LoginPolicy,
    /// Login credentials, if any.
    pub credentials: Option<Credentials>,
    /// Name announced in EHLO/HELO.
    pub helo_name: String,
    /// Keep the connection open after a delivery instead of sending QUIT.
    pub keep_alive: bool,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Deadline for each reply; `None` waits forever.
    pub command_timeout: Option<Duration>,
}

impl Config {
    /// Creates a new configuration for STARTTLS submission on port 587.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        ConfigBuilder::new(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    implicit_tls: bool,
    starttls: StartTlsPolicy,
    login: LoginPolicy,
    credentials: Option<Credentials>,
    helo_name: String,
    keep_alive: bool,
    connect_timeout: Duration,
    command_timeout: Option<Duration>,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            implicit_tls: false,
            starttls: StartTlsPolicy::Optional,
            login: LoginPolicy::Optional,
            credentials: None,
            helo_name: "localhost".to_string(),
            keep_alive: true,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Some(Duration::from_secs(60)),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enables or disables implicit TLS.
    #[must_use]
    pub const fn implicit_tls(mut self, enabled: bool) -> Self {
        self.implicit_tls = enabled;
        self
    }

    /// Sets the STARTTLS policy.
    #[must_use]
    pub const fn starttls(mut self, policy: StartTlsPolicy) -> Self {
        self.starttls = policy;
        self
    }

    /// Sets the login policy.
    #[must_use]
    pub const fn login(mut self, policy: LoginPolicy) -> Self {
        self.login = policy;
        self
    }

    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the EHLO/HELO name.
    #[must_use]
    pub fn helo_name(mut self, name: impl Into<String>) -> Self {
        self.helo_name = name.into();
        self
    }

    /// Keeps connections open between deliveries.
    #[must_use]
    pub const fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-reply deadline.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        let default_port = if self.implicit_tls {
            SUBMISSIONS_PORT
        } else if self.starttls == StartTlsPolicy::Disabled {
            RELAY_PORT
        } else {
            SUBMISSION_PORT
        };

        Config {
            host: self.host,
            port: self.port.unwrap_or(default_port),
            implicit_tls: self.implicit_tls,
            starttls: self.starttls,
            login: self.login,
            credentials: self.credentials,
            helo_name: self.helo_name,
            keep_alive: self.keep_alive,
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
        }
    }
}
