//! Content-derived message identifiers
//!
//! A message id is the SHA-256 digest of the complete raw submission,
//! encoded with the URL-safe base64 alphabet and no padding. The same bytes
//! always produce the same id, so the id is stable across resubmissions and
//! never needs to be stored separately from the content it names.

use base64::prelude::*;
use sha2::{Digest, Sha256};

/// Length of an encoded id: 32 digest bytes in unpadded base64
pub const ID_LEN: usize = 43;

/// Compute the content id of a raw message.
pub fn compute_id(raw: &[u8]) -> String {
    let digest = Sha256::digest(raw);
    BASE64_URL_SAFE_NO_PAD.encode(digest)
}

/// Check whether a string has the shape of a content id.
///
/// Useful for rejecting obviously bogus identifiers before touching the store.
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
