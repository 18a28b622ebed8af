//! Sender address records and sender-string decomposition

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Opaque handle of a stored address row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AddressId(pub i64);

impl AddressId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for AddressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored sender address
///
/// The email is normalized (see [`normalize_email`]) and unique across the
/// store. Rows are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    /// Normalized email address (e.g., "jane@example.com")
    pub email: String,
    /// Display name (e.g., "Jane Doe")
    pub name: Option<String>,
}

impl Address {
    /// Format the address the way a mail header would show it
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("\"{}\" <{}>", name, self.email),
            None => format!("<{}>", self.email),
        }
    }
}

/// Normalize an email for lookup and uniqueness: trimmed and lowercased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Address part shared by every accepted sender form
const ADDR: &str = r#"[^\s<>"@]+@[^\s<>"@]+"#;

static QUOTED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r#"^"([^"]*)"\s*<({ADDR})>$"#)).expect("quoted name pattern")
});

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^<({ADDR})>$")).expect("bracketed pattern"));

static BARE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r#"^([^"<>]+?)\s*<({ADDR})>$"#)).expect("bare name pattern")
});

static LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^({ADDR})$")).expect("literal pattern"));

/// An email address with optional display name, as claimed by a sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "Jane Doe")
    pub name: Option<String>,
    /// Email address (e.g., "jane@example.com")
    pub email: String,
}

impl EmailAddress {
    /// Create a new email address with just the email
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new email address with a display name
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Decompose a sender string into address and display name.
    ///
    /// Accepted forms, tried in this order:
    /// 1. `"Display Name" <user@example.com>`
    /// 2. `<user@example.com>`
    /// 3. `Display Name <user@example.com>`
    /// 4. `user@example.com`
    ///
    /// Returns `None` when nothing matches. An empty display name is treated
    /// as absent. The email is returned as written; callers normalize it.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();

        let (name, email) = if let Some(caps) = QUOTED_NAME.captures(s) {
            (Some(caps[1].trim().to_string()), caps[2].to_string())
        } else if let Some(caps) = BRACKETED.captures(s) {
            (None, caps[1].to_string())
        } else if let Some(caps) = BARE_NAME.captures(s) {
            (Some(caps[1].trim().to_string()), caps[2].to_string())
        } else if let Some(caps) = LITERAL.captures(s) {
            (None, caps[1].to_string())
        } else {
            return None;
        };

        Some(Self {
            name: name.filter(|n| !n.is_empty()),
            email,
        })
    }
}
