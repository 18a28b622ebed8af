//! Mailbox-style access for retrieval clients
//!
//! Exposes stored messages the way a mailbox protocol sees them: a list of
//! (identifier, size) pairs, whole messages, header blocks and bodies.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::models::MessageId;
use crate::storage::MailStore;

/// Identifier and size of one stored message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub identifier: MessageId,
    /// Length of the raw message in bytes
    pub size_in_bytes: u64,
}

/// List every stored message in store order
pub fn list_metadata(store: &dyn MailStore) -> Result<Vec<MessageMetadata>> {
    let previews = store.list_previews()?;
    Ok(previews
        .into_iter()
        .map(|p| MessageMetadata {
            identifier: p.id,
            size_in_bytes: p.size,
        })
        .collect())
}

/// Full raw message
pub fn message_content(store: &dyn MailStore, id: &MessageId) -> Result<Option<Vec<u8>>> {
    store.get_raw_message(id)
}

/// Header block of a message, up to the first empty line
///
/// Every header line in the result ends with a single `\n`, whatever the
/// original line ending was.
pub fn message_headers(store: &dyn MailStore, id: &MessageId) -> Result<Option<Vec<u8>>> {
    Ok(store
        .get_raw_message(id)?
        .map(|raw| split_header_block(&raw).0))
}

/// Everything after the header block and its terminating empty line
pub fn message_body(store: &dyn MailStore, id: &MessageId) -> Result<Option<Vec<u8>>> {
    Ok(store
        .get_raw_message(id)?
        .map(|raw| split_header_block(&raw).1.to_vec()))
}

/// Delete the given messages; unknown ids are skipped silently
pub fn remove(store: &dyn MailStore, ids: &[MessageId]) -> Result<()> {
    for id in ids {
        store
            .delete_message(id)
            .with_context(|| format!("Failed to remove message {id}"))?;
    }
    debug!("Removed {} message(s) from mailbox", ids.len());
    Ok(())
}

/// Split raw bytes into the normalized header block and the remaining body
fn split_header_block(raw: &[u8]) -> (Vec<u8>, &[u8]) {
    let mut headers = Vec::new();
    let mut rest = raw;

    loop {
        let (line, remaining) = match rest.iter().position(|&b| b == b'\n') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, &rest[rest.len()..]),
        };
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return (headers, remaining);
        }
        headers.extend_from_slice(line);
        headers.push(b'\n');
        rest = remaining;
    }
}
