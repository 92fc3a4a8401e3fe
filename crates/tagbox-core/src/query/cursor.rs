//! Opaque, tamper-evident query cursors.
//!
//! A cursor is `base64url(body) "." base64url(mac)` where the body is the
//! JSON of the cursor state and the mac is HMAC-SHA256 over the body
//! bytes, truncated to 16 bytes. Cursors are client-held and untrusted:
//! anything that fails to decode or verify is reported as expired, never
//! a panic.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{Error, Result};

/// HMAC key length in bytes.
const KEY_LENGTH: usize = 32;

/// HMAC output length after truncation.
const MAC_LENGTH: usize = 16;

/// Continuation state of a tag query.
///
/// The tag set and schema ride inside the cursor, so a resumed query
/// always runs with the filters it started with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCursor {
    /// Tags the query selects on.
    pub tags: Vec<Vec<u8>>,
    /// JSON Schema the payloads are filtered by.
    pub schema: serde_json::Value,
    /// Last sequence number examined; the next page starts after it.
    pub since_seq: i64,
    /// Creation time in Unix milliseconds; the retention window is
    /// measured from here.
    pub created_at: i64,
    /// Earliest Unix millisecond timestamp the cursor may be used again.
    /// Present only once the reader has drained the inbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_til: Option<i64>,
}

/// Continuation state of an export, which has no filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportCursor {
    /// Last sequence number examined.
    pub since_seq: i64,
    /// Creation time in Unix milliseconds.
    pub created_at: i64,
    /// Earliest Unix millisecond timestamp the cursor may be used again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_til: Option<i64>,
}

/// Cursor encoder/decoder with HMAC validation.
pub struct CursorCodec {
    key: [u8; KEY_LENGTH],
}

impl CursorCodec {
    /// Create a codec with the given key.
    #[must_use]
    pub const fn new(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a codec with a random key.
    ///
    /// Cursors are node-local; a fresh key per process simply expires
    /// any cursor issued before a restart.
    #[must_use]
    pub fn with_random_key() -> Self {
        use rand::RngCore;
        let mut key = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Encode a cursor to an opaque string.
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor state cannot be serialized.
    pub fn encode<T: Serialize>(&self, cursor: &T) -> Result<String> {
        let body = serde_json::to_vec(cursor)?;
        let mac = self.mac(&body)?;
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&body),
            URL_SAFE_NO_PAD.encode(mac)
        ))
    }

    /// Decode and verify a cursor.
    ///
    /// # Errors
    ///
    /// Returns `CursorExpired` for anything malformed, tampered with, or
    /// signed under a different key.
    pub fn decode<T: DeserializeOwned>(&self, encoded: &str) -> Result<T> {
        let (body_part, mac_part) = encoded.split_once('.').ok_or(Error::CursorExpired)?;
        let body = URL_SAFE_NO_PAD
            .decode(body_part)
            .map_err(|_| Error::CursorExpired)?;
        let mac = URL_SAFE_NO_PAD
            .decode(mac_part)
            .map_err(|_| Error::CursorExpired)?;

        let mut verifier =
            <Hmac<Sha256>>::new_from_slice(&self.key).map_err(|_| Error::CursorExpired)?;
        verifier.update(&body);
        verifier
            .verify_truncated_left(&mac)
            .map_err(|_| Error::CursorExpired)?;

        serde_json::from_slice(&body).map_err(|_| Error::CursorExpired)
    }

    fn mac(&self, body: &[u8]) -> Result<[u8; MAC_LENGTH]> {
        let mut mac = <Hmac<Sha256>>::new_from_slice(&self.key)
            .map_err(|_| Error::Internal("cursor key rejected by HMAC".into()))?;
        mac.update(body);
        let full = mac.finalize().into_bytes();

        let mut truncated = [0u8; MAC_LENGTH];
        truncated.copy_from_slice(&full[..MAC_LENGTH]);
        Ok(truncated)
    }
}
