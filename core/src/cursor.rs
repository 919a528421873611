//! Opaque, tamper-evident pagination cursors.
//!
//! A cursor carries the composite sort key `(timestamp, id)` of a boundary row.
//! Wire layout before base64url (no padding):
//!
//! ```text
//! <RFC 3339 timestamp> '|' <id> '|' <16-byte tag>
//! ```
//!
//! The tag is a SHA-256 over the server secret and the payload, truncated to
//! 16 bytes. Changing any character of an encoded cursor makes [`CursorCodec::decode`]
//! fail with [`RegistrationError::InvalidCursor`].

use crate::error::{RegistrationError, Result};
use crate::types::RegistrationId;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

const TAG_LEN: usize = 16;
const SEPARATOR: u8 = b'|';

/// Composite sort key of a registration row: `(registered_at, id)`.
///
/// Ordering is lexicographic on the fields, timestamp first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    /// Primary sort column
    pub timestamp: DateTime<Utc>,
    /// Tie-breaker
    pub id: RegistrationId,
}

impl SortKey {
    /// Create a sort key.
    #[must_use]
    pub const fn new(timestamp: DateTime<Utc>, id: RegistrationId) -> Self {
        Self { timestamp, id }
    }
}

/// Encodes and decodes cursors under a server-side secret.
#[derive(Clone)]
pub struct CursorCodec {
    secret: Vec<u8>,
}

impl std::fmt::Debug for CursorCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorCodec").finish_non_exhaustive()
    }
}

impl CursorCodec {
    /// Create a codec keyed by `secret`.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Encode a sort key into an opaque cursor string.
    #[must_use]
    pub fn encode(&self, key: &SortKey) -> String {
        let mut bytes = format!(
            "{}|{}",
            key.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            key.id
        )
        .into_bytes();
        let tag = self.tag(&bytes);
        bytes.push(SEPARATOR);
        bytes.extend_from_slice(&tag);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Decode a cursor string back into its sort key.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidCursor`] if the string is not valid
    /// base64url, is truncated, fails the tag check, or carries an unparsable
    /// timestamp or id.
    pub fn decode(&self, cursor: &str) -> Result<SortKey> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|e| RegistrationError::InvalidCursor(format!("not base64url: {e}")))?;

        let Some(split) = bytes.len().checked_sub(TAG_LEN + 1) else {
            return Err(RegistrationError::InvalidCursor("too short".to_string()));
        };
        let (payload, rest) = bytes.split_at(split);
        let (separator, tag) = rest.split_at(1);
        if separator != [SEPARATOR] {
            return Err(RegistrationError::InvalidCursor("malformed".to_string()));
        }
        if !constant_time_eq::constant_time_eq(tag, &self.tag(payload)) {
            return Err(RegistrationError::InvalidCursor("signature mismatch".to_string()));
        }

        let payload = std::str::from_utf8(payload)
            .map_err(|_| RegistrationError::InvalidCursor("not utf-8".to_string()))?;
        let (timestamp, id) = payload
            .split_once('|')
            .ok_or_else(|| RegistrationError::InvalidCursor("missing id".to_string()))?;

        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| RegistrationError::InvalidCursor(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc);
        let id = id
            .parse::<i64>()
            .map_err(|e| RegistrationError::InvalidCursor(format!("bad id: {e}")))?;

        Ok(SortKey::new(timestamp, RegistrationId::new(id)))
    }

    fn tag(&self, payload: &[u8]) -> [u8; TAG_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update([0u8]);
        hasher.update(payload);
        let digest = hasher.finalize();

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&digest[..TAG_LEN]);
        tag
    }
}
