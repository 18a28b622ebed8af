//! Message listing and detail queries

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Address, Message, MessageId, MessagePreview};
use crate::storage::MailStore;
use crate::text::{shorten, slugify};

/// Summary information for displaying a message in a list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSummary {
    /// Message ID
    pub id: MessageId,
    /// Sender as a header would show it
    pub sender: String,
    /// Email address of the sender
    pub sender_email: String,
    /// Subject preview
    pub subject: String,
    /// Body preview
    pub snippet: String,
    /// Short title: the subject, or the shortened snippet when there is none
    pub title: String,
    /// URL-safe token derived from the title
    pub slug: String,
    /// Raw size in bytes
    pub size: u64,
    pub received_at: DateTime<Utc>,
}

impl From<MessagePreview> for MessageSummary {
    fn from(preview: MessagePreview) -> Self {
        let title = if preview.subject_preview.is_empty() {
            shorten(Some(preview.body_preview.as_str())).unwrap_or_default()
        } else {
            preview.subject_preview.clone()
        };
        Self {
            id: preview.id,
            sender: preview.sender.display(),
            sender_email: preview.sender.email,
            slug: slugify(&title),
            title,
            subject: preview.subject_preview,
            snippet: preview.body_preview,
            size: preview.size,
            received_at: preview.received_at,
        }
    }
}

/// A stored message together with its sender
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDetail {
    pub message: Message,
    pub sender: Address,
}

/// List all messages in store order
pub fn list_summaries(store: &dyn MailStore) -> Result<Vec<MessageSummary>> {
    let previews = store.list_previews()?;
    Ok(previews.into_iter().map(MessageSummary::from).collect())
}

/// Get a message and resolve its sender
pub fn get_message_detail(store: &dyn MailStore, id: &MessageId) -> Result<Option<MessageDetail>> {
    let Some(message) = store.get_message(id)? else {
        return Ok(None);
    };
    let sender = store
        .get_address(message.sender_id)?
        .with_context(|| format!("Sender {} of message {} not found", message.sender_id, id))?;
    Ok(Some(MessageDetail { message, sender }))
}
