//! In-memory storage implementation for testing

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Result, anyhow};
use chrono::Utc;

use super::traits::{CreateAddressError, DuplicateMessageError, MailStore};
use crate::models::{Address, AddressId, Message, MessageId, MessagePreview, NewMessage};

#[derive(Default)]
struct Tables {
    /// Indexed by `id - 1`
    addresses: Vec<Address>,
    address_by_email: HashMap<String, AddressId>,
    messages: HashMap<String, Message>,
    /// Message ids in insertion order
    order: Vec<MessageId>,
}

/// In-memory mail storage, useful for tests
///
/// Mirrors the SQLite store's semantics: unique emails, no overwrite of an
/// existing message id, insertion-ordered listings.
#[derive(Default)]
pub struct InMemoryMailStore {
    tables: RwLock<Tables>,
}

impl InMemoryMailStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("In-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("In-memory store lock poisoned"))
    }
}

impl MailStore for InMemoryMailStore {
    fn get_address_by_email(&self, email: &str) -> Result<Option<Address>> {
        let tables = self.read()?;
        Ok(tables
            .address_by_email
            .get(&email.to_lowercase())
            .and_then(|id| tables.addresses.get(id.0 as usize - 1))
            .cloned())
    }

    fn get_address(&self, id: AddressId) -> Result<Option<Address>> {
        let tables = self.read()?;
        if id.0 < 1 {
            return Ok(None);
        }
        Ok(tables.addresses.get(id.0 as usize - 1).cloned())
    }

    fn create_address(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<Address, CreateAddressError> {
        let mut tables = self.write()?;
        let key = email.to_lowercase();
        if tables.address_by_email.contains_key(&key) {
            return Err(CreateAddressError::Conflict {
                email: email.to_string(),
            });
        }

        let address = Address {
            id: AddressId(tables.addresses.len() as i64 + 1),
            email: email.to_string(),
            name: name.map(str::to_string),
        };
        tables.address_by_email.insert(key, address.id);
        tables.addresses.push(address.clone());
        Ok(address)
    }

    fn insert_message(&self, message: &NewMessage) -> Result<()> {
        let mut tables = self.write()?;
        if tables.messages.contains_key(message.id.as_str()) {
            return Err(DuplicateMessageError {
                id: message.id.clone(),
            }
            .into());
        }
        if message.sender_id.0 < 1 || message.sender_id.0 as usize > tables.addresses.len() {
            return Err(anyhow!(
                "Failed to create message {}: unknown sender {}",
                message.id,
                message.sender_id
            ));
        }

        let stored = Message {
            id: message.id.clone(),
            sender_id: message.sender_id,
            subject_preview: message.subject_preview.clone(),
            body_preview: message.body_preview.clone(),
            size: message.size(),
            received_at: Utc::now(),
            raw: message.raw.clone(),
        };
        tables.order.push(message.id.clone());
        tables.messages.insert(message.id.0.clone(), stored);
        Ok(())
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<Message>> {
        Ok(self.read()?.messages.get(id.as_str()).cloned())
    }

    fn get_raw_message(&self, id: &MessageId) -> Result<Option<Vec<u8>>> {
        Ok(self.read()?.messages.get(id.as_str()).map(|m| m.raw.clone()))
    }

    fn has_message(&self, id: &MessageId) -> Result<bool> {
        Ok(self.read()?.messages.contains_key(id.as_str()))
    }

    fn delete_message(&self, id: &MessageId) -> Result<()> {
        let mut tables = self.write()?;
        if tables.messages.remove(id.as_str()).is_some() {
            tables.order.retain(|existing| existing != id);
        }
        Ok(())
    }

    fn list_previews(&self) -> Result<Vec<MessagePreview>> {
        let tables = self.read()?;
        let previews = tables
            .order
            .iter()
            .filter_map(|id| tables.messages.get(id.as_str()))
            .filter_map(|m| {
                let sender = tables.addresses.get(m.sender_id.0 as usize - 1)?;
                Some(MessagePreview {
                    id: m.id.clone(),
                    sender: sender.clone(),
                    subject_preview: m.subject_preview.clone(),
                    body_preview: m.body_preview.clone(),
                    size: m.size,
                    received_at: m.received_at,
                })
            })
            .collect();
        Ok(previews)
    }

    fn count_messages(&self) -> Result<usize> {
        Ok(self.read()?.messages.len())
    }
}
