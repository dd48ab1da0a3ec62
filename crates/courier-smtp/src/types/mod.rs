//! Core SMTP types.

mod address;
mod envelope;
mod extension;
mod reply;

pub use address::{Address, AddressValidator, BasicValidator};
pub use envelope::{Envelope, MessageRenderer};
pub use extension::{AuthMechanism, Capabilities, Extension};
pub use reply::{Reply, ReplyClass, ReplyCode};
