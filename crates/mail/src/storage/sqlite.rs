//! SQLite-based mail storage with zstd-compressed raw payloads

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{Connection, ErrorCode, OptionalExtension, ffi, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{CreateAddressError, DuplicateMessageError, MailStore};
use crate::config::SinkConfig;
use crate::models::{Address, AddressId, Message, MessageId, MessagePreview, NewMessage};

/// zstd level used when none is configured (good balance of speed vs size)
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Sender addresses, unique on normalized email
            CREATE TABLE addresses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                name TEXT
            );

            -- Messages keyed by content id
            CREATE TABLE messages (
                id TEXT PRIMARY KEY NOT NULL,
                sender_id INTEGER NOT NULL,
                subject VARCHAR(100) NOT NULL,
                abstract VARCHAR(100) NOT NULL,
                raw BLOB NOT NULL,  -- zstd compressed
                FOREIGN KEY (sender_id) REFERENCES addresses(id)
            );

            CREATE INDEX idx_messages_sender_id ON messages(sender_id);
            "#,
        ),
        // Migration 2: Size and arrival time for retrieval clients
        M::up(
            r#"
            ALTER TABLE messages ADD COLUMN raw_size INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE messages ADD COLUMN received_at TEXT NOT NULL DEFAULT '1970-01-01T00:00:00+00:00';
            "#,
        ),
    ])
}

/// Check whether an error is a constraint violation with one of the given
/// extended codes
fn is_constraint_violation(err: &rusqlite::Error, extended_codes: &[i32]) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation && extended_codes.contains(&e.extended_code)
        }
        _ => false,
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// SQLite-based mail storage
///
/// One connection guarded by a mutex; each trait call holds the guard for
/// its duration. Raw payloads are compressed before the lock is taken.
pub struct SqliteMailStore {
    conn: Mutex<Connection>,
    compression_level: i32,
}

impl SqliteMailStore {
    /// Open (or create) a store at `db_path` with the default compression level
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_level(db_path, DEFAULT_COMPRESSION_LEVEL)
    }

    /// Open the store described by a [`SinkConfig`]
    pub fn from_config(config: &SinkConfig) -> Result<Self> {
        Self::open_with_level(&config.database_path, config.compression_level)
    }

    /// Open (or create) a store at `db_path`
    ///
    /// - `db_path`: Path to the SQLite database file; parent directories are
    ///   created as needed
    /// - `compression_level`: zstd level for raw payloads
    pub fn open_with_level(db_path: impl AsRef<Path>, compression_level: i32) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }

        let mut conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;

        // WAL lets readers proceed during writes; foreign_keys must be on
        // for the sender reference to be enforced.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        info!("Opened mail store at {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            compression_level,
        })
    }

    /// Close the store, flushing the database file
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| anyhow!("Database connection lock poisoned"))?;
        conn.close()
            .map_err(|(_, e)| e)
            .context("Failed to close database")?;
        info!("Closed mail store");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    fn decompress(&self, id: &str, compressed: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(compressed)
            .with_context(|| format!("Failed to decompress raw message {id}"))
    }
}

impl MailStore for SqliteMailStore {
    fn get_address_by_email(&self, email: &str) -> Result<Option<Address>> {
        let conn = self.lock()?;
        let address = conn
            .query_row(
                "SELECT id, email, name FROM addresses WHERE email = ?",
                [email],
                |row| {
                    Ok(Address {
                        id: AddressId(row.get(0)?),
                        email: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("Failed to retrieve sender record for {email}"))?;
        Ok(address)
    }

    fn get_address(&self, id: AddressId) -> Result<Option<Address>> {
        let conn = self.lock()?;
        let address = conn
            .query_row(
                "SELECT id, email, name FROM addresses WHERE id = ?",
                [id.as_i64()],
                |row| {
                    Ok(Address {
                        id: AddressId(row.get(0)?),
                        email: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("Failed to retrieve sender record for id {id}"))?;
        Ok(address)
    }

    fn create_address(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<Address, CreateAddressError> {
        let conn = self.lock()?;

        match conn.execute(
            "INSERT INTO addresses (email, name) VALUES (?, ?)",
            params![email, name],
        ) {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e, &[ffi::SQLITE_CONSTRAINT_UNIQUE]) => {
                return Err(CreateAddressError::Conflict {
                    email: email.to_string(),
                });
            }
            Err(e) => {
                return Err(anyhow::Error::from(e)
                    .context(format!("Failed to create address record for {email}"))
                    .into());
            }
        }

        let id = AddressId(conn.last_insert_rowid());
        debug!("Created address {} for {}", id, email);

        Ok(Address {
            id,
            email: email.to_string(),
            name: name.map(str::to_string),
        })
    }

    fn insert_message(&self, message: &NewMessage) -> Result<()> {
        let compressed = zstd::encode_all(message.raw.as_slice(), self.compression_level)
            .context("Failed to compress raw message")?;
        let received_at = Utc::now().to_rfc3339();

        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO messages
             (id, sender_id, subject, abstract, raw, raw_size, received_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                message.id.as_str(),
                message.sender_id.as_i64(),
                message.subject_preview,
                message.body_preview,
                compressed,
                message.size() as i64,
                received_at,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if is_constraint_violation(
                    &e,
                    &[ffi::SQLITE_CONSTRAINT_PRIMARYKEY, ffi::SQLITE_CONSTRAINT_UNIQUE],
                ) =>
            {
                Err(DuplicateMessageError {
                    id: message.id.clone(),
                }
                .into())
            }
            Err(e) => Err(anyhow::Error::from(e)
                .context(format!("Failed to create message {}", message.id))),
        }
    }

    fn get_message(&self, id: &MessageId) -> Result<Option<Message>> {
        let conn = self.lock()?;

        let row: Option<(String, i64, String, String, Vec<u8>, i64, String)> = conn
            .query_row(
                "SELECT id, sender_id, subject, abstract, raw, raw_size, received_at
                 FROM messages WHERE id = ?",
                [id.as_str()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("Cannot get message_id={id}"))?;
        drop(conn);

        let Some((msg_id, sender_id, subject, body_preview, compressed, size, received_at)) = row
        else {
            return Ok(None);
        };

        let raw = self.decompress(&msg_id, &compressed)?;

        Ok(Some(Message {
            id: MessageId::new(msg_id),
            sender_id: AddressId(sender_id),
            subject_preview: subject,
            body_preview,
            size: size as u64,
            received_at: parse_timestamp(&received_at),
            raw,
        }))
    }

    fn get_raw_message(&self, id: &MessageId) -> Result<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let compressed: Option<Vec<u8>> = conn
            .query_row(
                "SELECT raw FROM messages WHERE id = ?",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Cannot get message_id={id}"))?;
        drop(conn);

        compressed
            .map(|c| self.decompress(id.as_str(), &c))
            .transpose()
    }

    fn has_message(&self, id: &MessageId) -> Result<bool> {
        let conn = self.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?)",
            [id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn delete_message(&self, id: &MessageId) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn
            .execute("DELETE FROM messages WHERE id = ?", [id.as_str()])
            .with_context(|| format!("Failed to delete message_id={id}"))?;
        debug!("Deleted {} row(s) for message {}", deleted, id);
        Ok(())
    }

    fn list_previews(&self) -> Result<Vec<MessagePreview>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT m.id, m.subject, m.abstract, m.raw_size, m.received_at,
                    a.id, a.email, a.name
             FROM messages m
             JOIN addresses a ON a.id = m.sender_id
             ORDER BY m.rowid",
        )?;

        let previews = stmt
            .query_map([], |row| {
                let size: i64 = row.get(3)?;
                let received_at: String = row.get(4)?;
                Ok(MessagePreview {
                    id: MessageId::new(row.get::<_, String>(0)?),
                    subject_preview: row.get(1)?,
                    body_preview: row.get(2)?,
                    size: size as u64,
                    received_at: parse_timestamp(&received_at),
                    sender: Address {
                        id: AddressId(row.get(5)?),
                        email: row.get(6)?,
                        name: row.get(7)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Cannot retrieve messages")?;

        debug!("Listed {} message previews", previews.len());
        Ok(previews)
    }

    fn count_messages(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_store() -> (SqliteMailStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("mail.test.sqlite");
        let store = SqliteMailStore::open(&db_path).unwrap();
        (store, dir)
    }

    fn make_test_message(raw: &[u8], sender_id: AddressId) -> NewMessage {
        NewMessage::builder(MessageId::for_content(raw), sender_id)
            .subject_preview("Test")
            .body_preview("Test preview")
            .raw(raw.to_vec())
            .build()
    }

    #[test]
    fn test_address_crud() {
        let (store, _dir) = create_test_store();

        let created = store
            .create_address("jane@example.com", Some("Jane Doe"))
            .unwrap();
        assert_eq!(created.email, "jane@example.com");
        assert_eq!(created.name.as_deref(), Some("Jane Doe"));

        let by_email = store
            .get_address_by_email("jane@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(by_email, created);

        let by_id = store.get_address(created.id).unwrap().unwrap();
        assert_eq!(by_id, created);

        assert!(store.get_address_by_email("nobody@example.com").unwrap().is_none());
        assert!(store.get_address(AddressId(9999)).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_address_conflicts() {
        let (store, _dir) = create_test_store();

        store.create_address("jane@example.com", None).unwrap();
        let err = store
            .create_address("jane@example.com", Some("Other"))
            .unwrap_err();
        assert!(matches!(err, CreateAddressError::Conflict { .. }));

        // Uniqueness ignores case
        let err = store.create_address("JANE@example.com", None).unwrap_err();
        assert!(matches!(err, CreateAddressError::Conflict { .. }));
    }

    #[test]
    fn test_message_crud() {
        let (store, _dir) = create_test_store();
        let sender = store.create_address("jane@example.com", None).unwrap();

        let raw = b"Subject: Test\r\n\r\nBody\r\n";
        let message = make_test_message(raw, sender.id);
        let id = message.id.clone();
        store.insert_message(&message).unwrap();

        assert!(store.has_message(&id).unwrap());

        let stored = store.get_message(&id).unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.sender_id, sender.id);
        assert_eq!(stored.subject_preview, "Test");
        assert_eq!(stored.body_preview, "Test preview");
        assert_eq!(stored.raw, raw.to_vec());
        assert_eq!(stored.size, raw.len() as u64);

        let raw_back = store.get_raw_message(&id).unwrap().unwrap();
        assert_eq!(raw_back, raw.to_vec());
    }

    #[test]
    fn test_missing_message() {
        let (store, _dir) = create_test_store();
        let id = MessageId::new("missing");
        assert!(store.get_message(&id).unwrap().is_none());
        assert!(store.get_raw_message(&id).unwrap().is_none());
        assert!(!store.has_message(&id).unwrap());
    }

    #[test]
    fn test_duplicate_message_is_rejected() {
        let (store, _dir) = create_test_store();
        let sender = store.create_address("jane@example.com", None).unwrap();

        let raw = b"Subject: Once\r\n\r\nOnly once\r\n";
        store.insert_message(&make_test_message(raw, sender.id)).unwrap();

        let second = NewMessage::builder(MessageId::for_content(raw), sender.id)
            .subject_preview("Overwritten?")
            .raw(raw.to_vec())
            .build();
        let err = store.insert_message(&second).unwrap_err();
        let dup = err.downcast_ref::<DuplicateMessageError>().unwrap();
        assert_eq!(dup.id, MessageId::for_content(raw));

        // The first record is untouched
        let stored = store.get_message(&MessageId::for_content(raw)).unwrap().unwrap();
        assert_eq!(stored.subject_preview, "Test");
        assert_eq!(store.count_messages().unwrap(), 1);
    }

    #[test]
    fn test_unknown_sender_is_rejected() {
        let (store, _dir) = create_test_store();
        let err = store
            .insert_message(&make_test_message(b"Subject: x\r\n\r\ny", AddressId(42)))
            .unwrap_err();
        assert!(err.downcast_ref::<DuplicateMessageError>().is_none());
        assert_eq!(store.count_messages().unwrap(), 0);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (store, _dir) = create_test_store();
        let sender = store.create_address("jane@example.com", None).unwrap();
        let message = make_test_message(b"Subject: Bye\r\n\r\nGone soon", sender.id);
        let id = message.id.clone();
        store.insert_message(&message).unwrap();

        store.delete_message(&id).unwrap();
        store.delete_message(&id).unwrap();
        assert!(!store.has_message(&id).unwrap());

        // The sender outlives its messages
        assert!(store.get_address(sender.id).unwrap().is_some());
    }

    #[test]
    fn test_list_previews_in_insertion_order() {
        let (store, _dir) = create_test_store();
        let jane = store.create_address("jane@example.com", Some("Jane")).unwrap();
        let john = store.create_address("john@example.com", None).unwrap();

        let raws: [&[u8]; 3] = [
            b"Subject: c\r\n\r\nthird-alphabetically first",
            b"Subject: a\r\n\r\nsecond",
            b"Subject: b\r\n\r\nthird",
        ];
        let senders = [jane.id, john.id, jane.id];
        let mut ids = Vec::new();
        for (raw, sender) in raws.iter().zip(senders) {
            let message = make_test_message(raw, sender);
            ids.push(message.id.clone());
            store.insert_message(&message).unwrap();
        }

        let previews = store.list_previews().unwrap();
        let listed: Vec<MessageId> = previews.iter().map(|p| p.id.clone()).collect();
        assert_eq!(listed, ids);
        assert_eq!(previews[0].sender, jane);
        assert_eq!(previews[1].sender, john);
        assert_eq!(previews[2].size, raws[2].len() as u64);

        // Stable across repeated reads
        let again: Vec<MessageId> = store
            .list_previews()
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(again, ids);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("mail.test.sqlite");

        let store = SqliteMailStore::open(&db_path).unwrap();
        let sender = store.create_address("jane@example.com", None).unwrap();
        let message = make_test_message(b"Subject: Keep\r\n\r\nme", sender.id);
        let id = message.id.clone();
        store.insert_message(&message).unwrap();
        store.close().unwrap();

        let reopened = SqliteMailStore::open_with_level(&db_path, 19).unwrap();
        assert!(reopened.has_message(&id).unwrap());
        assert_eq!(
            reopened.get_address_by_email("jane@example.com").unwrap(),
            Some(sender)
        );
    }

    #[test]
    fn test_large_raw_roundtrip() {
        let (store, _dir) = create_test_store();
        let sender = store.create_address("bulk@example.com", None).unwrap();

        let mut raw = b"Subject: Big\r\n\r\n".to_vec();
        raw.extend(std::iter::repeat_n(b'z', 256 * 1024));
        let message = make_test_message(&raw, sender.id);
        let id = message.id.clone();
        store.insert_message(&message).unwrap();

        assert_eq!(store.get_raw_message(&id).unwrap().unwrap(), raw);
    }
}
