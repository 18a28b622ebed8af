//! Domain models for stored mail

mod address;
mod message;

pub use address::{Address, AddressId, EmailAddress, normalize_email};
pub use message::{Message, MessageId, MessagePreview, NewMessage, NewMessageBuilder};
