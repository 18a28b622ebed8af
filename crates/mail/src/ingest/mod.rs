//! Ingestion of submitted messages
//!
//! Turns a (sender, raw bytes) submission into an Address and a Message row.
//! Errors carry a [`Fault`] so transports can answer the submitter.

mod error;
mod handler;

pub use error::{Fault, IngestError};
pub use handler::{
    BODY_PREVIEW_CHARS, IngestSession, Ingestor, SUBJECT_PREVIEW_CHARS, SessionState,
};
