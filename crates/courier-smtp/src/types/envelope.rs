//! Message envelope and content rendering.

use crate::error::RenderError;

/// SMTP envelope for one message.
///
/// Addresses are kept as raw strings; they are validated just before the
/// corresponding command is issued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Declared sender.
    pub from: String,
    /// Bounce (return-path) address, preferred over `from` when non-empty.
    pub return_path: Option<String>,
    /// Recipients in order.
    pub recipients: Vec<String>,
}

impl Envelope {
    /// Creates an envelope with a sender and no recipients.
    #[must_use]
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            return_path: None,
            recipients: Vec::new(),
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    /// Sets the bounce address.
    #[must_use]
    pub fn return_path(mut self, addr: impl Into<String>) -> Self {
        self.return_path = Some(addr.into());
        self
    }

    /// Address used for MAIL FROM.
    #[must_use]
    pub fn sender(&self) -> &str {
        match self.return_path.as_deref() {
            Some(bounce) if !bounce.is_empty() => bounce,
            _ => &self.from,
        }
    }
}

/// Produces the final transmittable message bytes.
///
/// Called only after the server has accepted DATA.
pub trait MessageRenderer: Sync {
    /// Renders the message.
    ///
    /// # Errors
    ///
    /// Any error aborts the transaction with `Error::ContentBuild`.
    fn render(&self) -> Result<Vec<u8>, RenderError>;
}

impl MessageRenderer for [u8] {
    fn render(&self) -> Result<Vec<u8>, RenderError> {
        Ok(self.to_vec())
    }
}

impl MessageRenderer for Vec<u8> {
    fn render(&self) -> Result<Vec<u8>, RenderError> {
        Ok(self.clone())
    }
}

impl MessageRenderer for str {
    fn render(&self) -> Result<Vec<u8>, RenderError> {
        Ok(self.as_bytes().to_vec())
    }
}

impl MessageRenderer for String {
    fn render(&self) -> Result<Vec<u8>, RenderError> {
        Ok(self.as_bytes().to_vec())
    }
}
