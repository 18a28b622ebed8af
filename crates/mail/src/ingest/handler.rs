//! Per-submission ingestion sessions
//!
//! A transport creates one [`IngestSession`] per submission from a shared
//! [`Ingestor`] and feeds it the sender, then the message data, then a
//! completion signal. Sessions hold no state beyond their own submission.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use log::{debug, error, info, warn};

use super::error::{Fault, IngestError};
use crate::envelope::Envelope;
use crate::models::{EmailAddress, MessageId, NewMessage};
use crate::registry::get_or_create_address;
use crate::storage::{DuplicateMessageError, MailStore};
use crate::text::truncate;

/// Maximum characters kept of the subject (ellipsis included)
pub const SUBJECT_PREVIEW_CHARS: usize = 100;

/// Maximum characters kept of the body gist
pub const BODY_PREVIEW_CHARS: usize = 100;

/// Hands out ingestion sessions that share one store handle
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn MailStore>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self { store }
    }

    /// Start a session for one submission
    pub fn session(&self) -> IngestSession {
        IngestSession {
            store: Arc::clone(&self.store),
            state: SessionState::ReceivingSender,
        }
    }

    /// Run a complete submission: sender, data, done
    pub fn ingest(&self, sender: &str, data: impl Read) -> Result<MessageId, IngestError> {
        let mut session = self.session();
        session.on_sender_header(sender);
        let result = session.on_data(data);
        session.on_done();
        result
    }

    pub fn store(&self) -> &Arc<dyn MailStore> {
        &self.store
    }
}

/// Where a session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    ReceivingSender,
    ReceivingData { sender: String },
    Resolved(MessageId),
    Rejected,
}

impl SessionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionState::Resolved(_) | SessionState::Rejected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::ReceivingSender => f.write_str("receiving sender"),
            SessionState::ReceivingData { sender } => write!(f, "receiving data from {sender}"),
            SessionState::Resolved(id) => write!(f, "stored {id}"),
            SessionState::Rejected => f.write_str("rejected"),
        }
    }
}

/// State machine for a single submission
pub struct IngestSession {
    store: Arc<dyn MailStore>,
    state: SessionState,
}

impl IngestSession {
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Record the claimed sender. No I/O happens until data arrives.
    ///
    /// A later sender header replaces an earlier one; headers arriving after
    /// the session finished are ignored.
    pub fn on_sender_header(&mut self, sender: &str) {
        if self.state.is_finished() {
            debug!("Ignoring sender {:?} on finished session", sender);
            return;
        }
        debug!("Sender header: {:?}", sender);
        self.state = SessionState::ReceivingData {
            sender: sender.to_string(),
        };
    }

    /// Read the message data to its end and store it.
    pub fn on_data(&mut self, data: impl Read) -> Result<MessageId, IngestError> {
        let sender = match std::mem::replace(&mut self.state, SessionState::Rejected) {
            SessionState::ReceivingData { sender } => sender,
            SessionState::ReceivingSender => {
                debug!("Message data arrived before a sender");
                return Err(IngestError::MissingSender);
            }
            finished => {
                self.state = finished;
                return Err(IngestError::SessionFinished);
            }
        };

        match self.store_submission(&sender, data) {
            Ok(id) => {
                info!("Stored message {} from {}", id, sender);
                self.state = SessionState::Resolved(id.clone());
                Ok(id)
            }
            Err(e) => {
                match e.fault() {
                    Fault::Client => debug!("Rejected submission from {:?}: {}", sender, e),
                    Fault::Server => warn!("Failed to store submission from {:?}: {:#}", sender, e),
                    Fault::Fatal => error!("Store inconsistency for {:?}: {:#}", sender, e),
                }
                Err(e)
            }
        }
    }

    /// Completion signal; only logs the outcome
    pub fn on_done(&mut self) {
        debug!("Session done: {}", self.state);
    }

    fn store_submission(&self, sender: &str, mut data: impl Read) -> Result<MessageId, IngestError> {
        let claimed = EmailAddress::parse(sender)
            .ok_or_else(|| IngestError::MalformedSender(sender.to_string()))?;

        let mut raw = Vec::new();
        data.read_to_end(&mut raw).map_err(IngestError::Read)?;

        // Rejected before anything is written
        let envelope = Envelope::parse(&raw)?;

        let address =
            get_or_create_address(self.store.as_ref(), &claimed.email, claimed.name.as_deref())?;

        let gist = envelope.preview_gist().unwrap_or_else(|e| {
            warn!("Storing message from {} without body preview: {}", address.email, e);
            None
        });

        let id = MessageId::for_content(&raw);
        let message = NewMessage::builder(id.clone(), address.id)
            .subject_preview(truncate(
                envelope.subject.as_deref(),
                SUBJECT_PREVIEW_CHARS,
                true,
            ))
            .body_preview(truncate(gist.as_deref(), BODY_PREVIEW_CHARS, false))
            .raw(raw)
            .build();

        match self.store.insert_message(&message) {
            Ok(()) => Ok(id),
            Err(e) if e.downcast_ref::<DuplicateMessageError>().is_some() => {
                Err(self.classify_duplicate(id, &message.raw))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Tell a resubmission of identical bytes from an id collision
    fn classify_duplicate(&self, id: MessageId, raw: &[u8]) -> IngestError {
        match self.store.get_raw_message(&id) {
            Ok(Some(stored)) if stored == raw => IngestError::Resubmission(id),
            Ok(Some(_)) => IngestError::IdCollision(id),
            // Deleted between the insert and this read
            Ok(None) => IngestError::Resubmission(id),
            Err(e) => e
                .context(format!("Failed to compare duplicate message {id}"))
                .into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeError;
    use crate::models::{Address, AddressId, Message, MessagePreview};
    use crate::storage::{CreateAddressError, InMemoryMailStore};
    use std::io;

    const JANE: &str = r#""Jane Doe" <jane@example.com>"#;

    fn create_test_ingestor() -> (Ingestor, Arc<InMemoryMailStore>) {
        let store = Arc::new(InMemoryMailStore::new());
        (Ingestor::new(store.clone()), store)
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"))
        }
    }

    /// Store that reports every insert as a duplicate of different content
    struct CollidingStore {
        inner: InMemoryMailStore,
    }

    impl MailStore for CollidingStore {
        fn get_address_by_email(&self, email: &str) -> anyhow::Result<Option<Address>> {
            self.inner.get_address_by_email(email)
        }
        fn get_address(&self, id: AddressId) -> anyhow::Result<Option<Address>> {
            self.inner.get_address(id)
        }
        fn create_address(
            &self,
            email: &str,
            name: Option<&str>,
        ) -> Result<Address, CreateAddressError> {
            self.inner.create_address(email, name)
        }
        fn insert_message(&self, message: &NewMessage) -> anyhow::Result<()> {
            Err(DuplicateMessageError {
                id: message.id.clone(),
            }
            .into())
        }
        fn get_message(&self, id: &MessageId) -> anyhow::Result<Option<Message>> {
            self.inner.get_message(id)
        }
        fn get_raw_message(&self, _id: &MessageId) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(Some(b"Subject: other\r\n\r\nsomething else".to_vec()))
        }
        fn has_message(&self, id: &MessageId) -> anyhow::Result<bool> {
            self.inner.has_message(id)
        }
        fn delete_message(&self, id: &MessageId) -> anyhow::Result<()> {
            self.inner.delete_message(id)
        }
        fn list_previews(&self) -> anyhow::Result<Vec<MessagePreview>> {
            self.inner.list_previews()
        }
        fn count_messages(&self) -> anyhow::Result<usize> {
            self.inner.count_messages()
        }
    }

    #[test]
    fn test_happy_path() {
        let (ingestor, store) = create_test_ingestor();
        let raw = b"From: jane@example.com\r\nSubject: Hi\r\n\r\nHello world\r\n";

        let mut session = ingestor.session();
        assert_eq!(session.state(), &SessionState::ReceivingSender);
        session.on_sender_header(JANE);
        let id = session.on_data(&raw[..]).unwrap();
        session.on_done();

        assert_eq!(session.state(), &SessionState::Resolved(id.clone()));
        assert_eq!(id, MessageId::for_content(raw));

        let stored = store.get_message(&id).unwrap().unwrap();
        assert_eq!(stored.subject_preview, "Hi");
        assert_eq!(stored.body_preview, "Hello world");
        assert_eq!(stored.raw, raw.to_vec());

        let sender = store.get_address(stored.sender_id).unwrap().unwrap();
        assert_eq!(sender.email, "jane@example.com");
        assert_eq!(sender.name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_long_subject_and_body_are_truncated() {
        let (ingestor, store) = create_test_ingestor();
        let subject = "s".repeat(150);
        let body = "b".repeat(150);
        let raw = format!("Subject: {subject}\r\n\r\n{body}\r\n");

        let id = ingestor.ingest("a@example.com", raw.as_bytes()).unwrap();
        let stored = store.get_message(&id).unwrap().unwrap();

        assert_eq!(stored.subject_preview.chars().count(), 100);
        assert!(stored.subject_preview.ends_with("..."));
        assert_eq!(stored.body_preview, "b".repeat(100));
    }

    #[test]
    fn test_malformed_sender_persists_nothing() {
        let (ingestor, store) = create_test_ingestor();
        let err = ingestor
            .ingest("not an address", &b"Subject: x\r\n\r\ny"[..])
            .unwrap_err();

        assert!(matches!(err, IngestError::MalformedSender(_)));
        assert_eq!(err.fault(), Fault::Client);
        assert_eq!(store.count_messages().unwrap(), 0);
        assert_eq!(store.get_address(AddressId(1)).unwrap(), None);
    }

    #[test]
    fn test_unreadable_envelope_persists_nothing() {
        let (ingestor, store) = create_test_ingestor();
        let err = ingestor.ingest(JANE, &b""[..]).unwrap_err();

        assert!(matches!(
            err,
            IngestError::UnreadableEnvelope(EnvelopeError::Empty)
        ));
        assert_eq!(err.fault(), Fault::Client);
        assert_eq!(store.get_address(AddressId(1)).unwrap(), None);
    }

    #[test]
    fn test_data_without_sender() {
        let (ingestor, _store) = create_test_ingestor();
        let mut session = ingestor.session();
        let err = session.on_data(&b"Subject: x\r\n\r\ny"[..]).unwrap_err();
        assert!(matches!(err, IngestError::MissingSender));
        assert_eq!(session.state(), &SessionState::Rejected);
    }

    #[test]
    fn test_second_data_is_rejected() {
        let (ingestor, store) = create_test_ingestor();
        let mut session = ingestor.session();
        session.on_sender_header(JANE);
        let id = session.on_data(&b"Subject: one\r\n\r\nfirst"[..]).unwrap();

        let err = session.on_data(&b"Subject: two\r\n\r\nsecond"[..]).unwrap_err();
        assert!(matches!(err, IngestError::SessionFinished));
        assert_eq!(session.state(), &SessionState::Resolved(id));
        assert_eq!(store.count_messages().unwrap(), 1);

        // Late sender headers do not reopen the session
        session.on_sender_header("other@example.com");
        assert!(session.state().is_finished());
    }

    #[test]
    fn test_resubmission_is_server_fault() {
        let (ingestor, store) = create_test_ingestor();
        let raw = b"Subject: Again\r\n\r\nSame bytes";
        let id = ingestor.ingest(JANE, &raw[..]).unwrap();

        let err = ingestor.ingest(JANE, &raw[..]).unwrap_err();
        assert!(matches!(&err, IngestError::Resubmission(dup) if *dup == id));
        assert_eq!(err.fault(), Fault::Server);
        assert_eq!(store.count_messages().unwrap(), 1);
    }

    #[test]
    fn test_collision_is_fatal() {
        let store = Arc::new(CollidingStore {
            inner: InMemoryMailStore::new(),
        });
        let ingestor = Ingestor::new(store);
        let err = ingestor
            .ingest(JANE, &b"Subject: mine\r\n\r\nmy bytes"[..])
            .unwrap_err();
        assert!(matches!(err, IngestError::IdCollision(_)));
        assert_eq!(err.fault(), Fault::Fatal);
    }

    #[test]
    fn test_read_failure_is_server_fault() {
        let (ingestor, store) = create_test_ingestor();
        let err = ingestor.ingest(JANE, FailingReader).unwrap_err();
        assert!(matches!(err, IngestError::Read(_)));
        assert_eq!(err.fault(), Fault::Server);
        assert_eq!(store.count_messages().unwrap(), 0);
    }

    #[test]
    fn test_unsupported_content_is_stored_without_preview() {
        let (ingestor, store) = create_test_ingestor();
        let raw = b"From: a@example.com\r\nSubject: Scan\r\n\
                    Content-Type: application/pdf\r\n\
                    Content-Transfer-Encoding: base64\r\n\r\nJVBERi0=\r\n";

        let id = ingestor.ingest(JANE, &raw[..]).unwrap();
        let stored = store.get_message(&id).unwrap().unwrap();
        assert_eq!(stored.subject_preview, "Scan");
        assert_eq!(stored.body_preview, "");
    }

    #[test]
    fn test_same_sender_shares_address() {
        let (ingestor, store) = create_test_ingestor();
        let a = ingestor.ingest(JANE, &b"Subject: 1\r\n\r\none"[..]).unwrap();
        let b = ingestor
            .ingest("<JANE@example.com>", &b"Subject: 2\r\n\r\ntwo"[..])
            .unwrap();

        let first = store.get_message(&a).unwrap().unwrap();
        let second = store.get_message(&b).unwrap().unwrap();
        assert_eq!(first.sender_id, second.sender_id);
    }
}
