//! Mail sink - stores every submitted message for later retrieval
//!
//! This crate provides the platform-independent core of the sink:
//! - Domain models (Address, Message, EmailAddress)
//! - Text normalization and content-derived message ids
//! - Envelope parsing and body preview extraction
//! - Storage trait abstractions with SQLite and in-memory backends
//! - Per-submission ingestion sessions with fault classification
//! - Query API for listing views and mailbox protocols
//!
//! Transports (SMTP listeners, mailbox servers) live outside this crate and
//! drive it through [`Ingestor`] and the [`query`] functions.

pub mod config;
pub mod content_id;
pub mod envelope;
pub mod ingest;
pub mod models;
pub mod query;
pub mod registry;
pub mod storage;
pub mod text;

pub use config::SinkConfig;
pub use envelope::{BodyPart, Envelope, EnvelopeError, UnsupportedContentError, parse_envelope};
pub use ingest::{Fault, IngestError, IngestSession, Ingestor, SessionState};
pub use models::{Address, AddressId, EmailAddress, Message, MessageId, MessagePreview, NewMessage};
pub use query::{
    MessageDetail, MessageMetadata, MessageSummary, get_message_detail, list_metadata,
    list_summaries, message_body, message_content, message_headers, remove,
};
pub use registry::{find_address, get_or_create_address};
pub use storage::{
    CreateAddressError, DuplicateMessageError, InMemoryMailStore, MailStore, SqliteMailStore,
};
