//! Storage traits and implementations
//!
//! This module defines the storage abstraction layer for addresses and
//! messages. The trait-based design allows swapping between in-memory and
//! SQLite storage implementations.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryMailStore;
pub use sqlite::{DEFAULT_COMPRESSION_LEVEL, SqliteMailStore};
pub use traits::{CreateAddressError, DuplicateMessageError, MailStore};
