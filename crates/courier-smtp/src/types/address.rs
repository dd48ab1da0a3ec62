//! Email address types and syntactic validation.

use std::fmt;

/// Email address for SMTP envelope.
///
/// Only produced by an [`AddressValidator`], so a value of this type has
/// passed syntax checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Validates `addr` with the default validator.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self, String> {
        BasicValidator.validate(&addr.into())
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Syntactic address checks run before MAIL FROM / RCPT TO are sent.
pub trait AddressValidator: Send + Sync {
    /// Validates an address string.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the address is rejected.
    fn validate(&self, addr: &str) -> Result<Address, String>;
}

/// Default validator: one `@`, non-empty local and domain parts, and nothing
/// that would break out of the `<...>` envelope syntax.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicValidator;

impl AddressValidator for BasicValidator {
    fn validate(&self, addr: &str) -> Result<Address, String> {
        if addr.is_empty() {
            return Err("Address cannot be empty".into());
        }

        if addr
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
        {
            return Err("Address contains whitespace or angle brackets".into());
        }

        let Some((local, domain)) = addr.split_once('@') else {
            return Err("Address must contain @".into());
        };

        if domain.contains('@') {
            return Err("Address must have exactly one @".into());
        }

        if local.is_empty() || domain.is_empty() {
            return Err("Local and domain parts cannot be empty".into());
        }

        Ok(Address(addr.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.to_string(), "user@example.com");
    }

    #[test]
    fn test_invalid_address_no_at() {
        assert!(Address::new("userexample.com").is_err());
    }

    #[test]
    fn test_invalid_address_empty() {
        assert!(Address::new("").is_err());
    }

    #[test]
    fn test_invalid_address_two_at() {
        assert!(Address::new("a@b@example.com").is_err());
    }

    #[test]
    fn test_invalid_address_empty_parts() {
        assert!(Address::new("@example.com").is_err());
        assert!(Address::new("user@").is_err());
    }

    #[test]
    fn test_invalid_address_injection() {
        assert!(Address::new("user@example.com> SIZE=1").is_err());
        assert!(Address::new("user@example.com\r\nRSET").is_err());
    }
}
