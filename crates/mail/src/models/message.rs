//! Message model representing a stored mail submission

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Address, AddressId};
use crate::content_id;

/// Unique identifier for a message, derived from its raw content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Compute the id for a raw message (see [`content_id::compute_id`])
    pub fn for_content(raw: &[u8]) -> Self {
        Self(content_id::compute_id(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A message as read back from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Content-derived id
    pub id: MessageId,
    /// Address the message was submitted by
    pub sender_id: AddressId,
    /// Subject, at most 100 characters
    pub subject_preview: String,
    /// First readable body fragment, at most 100 characters
    pub body_preview: String,
    /// Size of the raw submission in bytes
    pub size: u64,
    /// When the message was stored
    pub received_at: DateTime<Utc>,
    /// The original submission, byte for byte
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// Lightweight listing entry, without the raw payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreview {
    pub id: MessageId,
    pub sender: Address,
    pub subject_preview: String,
    pub body_preview: String,
    pub size: u64,
    pub received_at: DateTime<Utc>,
}

/// A message ready to be inserted
///
/// Previews are stored as given; truncation is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub id: MessageId,
    pub sender_id: AddressId,
    pub subject_preview: String,
    pub body_preview: String,
    pub raw: Vec<u8>,
}

impl NewMessage {
    /// Create a new message builder
    pub fn builder(id: MessageId, sender_id: AddressId) -> NewMessageBuilder {
        NewMessageBuilder::new(id, sender_id)
    }

    /// Size of the raw submission in bytes
    pub fn size(&self) -> u64 {
        self.raw.len() as u64
    }
}

/// Builder for creating NewMessage instances
pub struct NewMessageBuilder {
    id: MessageId,
    sender_id: AddressId,
    subject_preview: String,
    body_preview: String,
    raw: Vec<u8>,
}

impl NewMessageBuilder {
    fn new(id: MessageId, sender_id: AddressId) -> Self {
        Self {
            id,
            sender_id,
            subject_preview: String::new(),
            body_preview: String::new(),
            raw: Vec::new(),
        }
    }

    pub fn subject_preview(mut self, subject_preview: impl Into<String>) -> Self {
        self.subject_preview = subject_preview.into();
        self
    }

    pub fn body_preview(mut self, body_preview: impl Into<String>) -> Self {
        self.body_preview = body_preview.into();
        self
    }

    pub fn raw(mut self, raw: impl Into<Vec<u8>>) -> Self {
        self.raw = raw.into();
        self
    }

    pub fn build(self) -> NewMessage {
        NewMessage {
            id: self.id,
            sender_id: self.sender_id,
            subject_preview: self.subject_preview,
            body_preview: self.body_preview,
            raw: self.raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_for_content() {
        let raw = b"Subject: Hi\r\n\r\nHello world\r\n";
        let id = MessageId::for_content(raw);
        assert_eq!(id.as_str(), content_id::compute_id(raw));
        assert_eq!(id.to_string(), id.as_str());
    }

    #[test]
    fn test_builder_defaults_to_empty_previews() {
        let msg = NewMessage::builder(MessageId::new("m1"), AddressId(7))
            .raw(b"raw".to_vec())
            .build();
        assert_eq!(msg.subject_preview, "");
        assert_eq!(msg.body_preview, "");
        assert_eq!(msg.sender_id, AddressId(7));
        assert_eq!(msg.size(), 3);
    }
}
