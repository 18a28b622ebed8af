//! Ingestion errors and their fault classes

use crate::envelope::EnvelopeError;
use crate::models::MessageId;

/// Who is to blame for a failed submission
///
/// Transports map this to their own reply codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The submission itself is unacceptable; nothing was persisted
    Client,
    /// The sink could not complete a valid submission
    Server,
    /// Stored data is inconsistent with itself
    Fatal,
}

/// Failure of a single submission
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed sender address: {0:?}")]
    MalformedSender(String),

    #[error("message data received before a sender")]
    MissingSender,

    #[error("session already finished")]
    SessionFinished,

    #[error("unreadable message: {0}")]
    UnreadableEnvelope(#[from] EnvelopeError),

    #[error("failed to read message data")]
    Read(#[source] std::io::Error),

    #[error("message {0} was already submitted")]
    Resubmission(MessageId),

    #[error("message id {0} collides with different stored content")]
    IdCollision(MessageId),

    #[error("address {email} missing after a creation conflict")]
    AddressReconciliation { email: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl IngestError {
    pub fn fault(&self) -> Fault {
        match self {
            IngestError::MalformedSender(_)
            | IngestError::MissingSender
            | IngestError::SessionFinished
            | IngestError::UnreadableEnvelope(_) => Fault::Client,
            IngestError::Read(_) | IngestError::Resubmission(_) | IngestError::Storage(_) => {
                Fault::Server
            }
            IngestError::IdCollision(_) | IngestError::AddressReconciliation { .. } => Fault::Fatal,
        }
    }
}
