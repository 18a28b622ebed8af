//! Query API for retrieval clients
//!
//! Provides high-level read and removal functions over a [`MailStore`],
//! formatted for listing views and mailbox protocols.
//!
//! [`MailStore`]: crate::storage::MailStore

mod mailbox;
mod messages;

pub use mailbox::{
    MessageMetadata, list_metadata, message_body, message_content, message_headers, remove,
};
pub use messages::{MessageDetail, MessageSummary, get_message_detail, list_summaries};
