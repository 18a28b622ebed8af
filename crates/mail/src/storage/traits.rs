//! Storage trait definitions

use crate::models::{Address, AddressId, Message, MessageId, MessagePreview, NewMessage};
use anyhow::Result;

/// Failure to create an address row
#[derive(Debug, thiserror::Error)]
pub enum CreateAddressError {
    /// Another writer already committed a row for this email
    #[error("address {email} already exists")]
    Conflict { email: String },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Error indicating a message with the same id is already stored
///
/// Returned inside `anyhow::Error` by [`MailStore::insert_message`]; recover
/// it with `downcast_ref`.
#[derive(Debug, thiserror::Error)]
#[error("message {id} already exists")]
pub struct DuplicateMessageError {
    pub id: MessageId,
}

/// Trait for mail storage operations
///
/// This trait abstracts over different storage backends (in-memory, SQLite)
/// and provides the address and message primitives the ingestion pipeline
/// and the retrieval side are built on. Every call is a self-contained unit:
/// implementations acquire their backing resource for the duration of the
/// call and release it on every exit path.
pub trait MailStore: Send + Sync {
    // === Addresses ===

    /// Look up an address by (normalized) email
    fn get_address_by_email(&self, email: &str) -> Result<Option<Address>>;

    /// Look up an address by id
    fn get_address(&self, id: AddressId) -> Result<Option<Address>>;

    /// Insert a new address row
    ///
    /// Fails with [`CreateAddressError::Conflict`] when a row for the same
    /// email already exists.
    fn create_address(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<Address, CreateAddressError>;

    // === Messages ===

    /// Insert a message in a single atomic write
    ///
    /// An existing message with the same id is never overwritten; the call
    /// fails with [`DuplicateMessageError`] instead.
    fn insert_message(&self, message: &NewMessage) -> Result<()>;

    /// Get a message, including its raw bytes, by id
    fn get_message(&self, id: &MessageId) -> Result<Option<Message>>;

    /// Get only the raw bytes of a message
    fn get_raw_message(&self, id: &MessageId) -> Result<Option<Vec<u8>>>;

    /// Check if a message exists
    fn has_message(&self, id: &MessageId) -> Result<bool>;

    /// Delete a message; deleting a missing id is not an error
    fn delete_message(&self, id: &MessageId) -> Result<()>;

    /// List message previews in insertion order
    fn list_previews(&self) -> Result<Vec<MessagePreview>>;

    /// Count stored messages
    fn count_messages(&self) -> Result<usize>;
}
