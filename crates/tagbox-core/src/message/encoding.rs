//! Canonical message encoding and content hashing.
//!
//! The deduplication key is SHA-256 over a fixed, length-prefixed byte
//! layout. Tags are hashed in sorted order and payload objects serialize
//! with sorted keys, so hash equality is independent of iteration order.

use sha2::{Digest, Sha256};

use crate::Result;

/// SHA-256 content hash (32 bytes).
pub type ContentHash = [u8; 32];

/// Encode a tag list into the stored binary form.
///
/// Layout: tag count (u64 BE), then per tag a u64 BE length prefix
/// followed by the raw bytes. Tags keep their sender-supplied order.
#[must_use]
pub fn encode_tags(tags: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + tags.iter().map(|t| 8 + t.len()).sum::<usize>());
    buf.extend_from_slice(&(tags.len() as u64).to_be_bytes());
    for tag in tags {
        buf.extend_from_slice(&(tag.len() as u64).to_be_bytes());
        buf.extend_from_slice(tag);
    }
    buf
}

/// Decode a stored tag list.
///
/// # Errors
///
/// Returns `Internal` if the blob does not follow the encoded layout;
/// tag blobs are only ever written by [`encode_tags`], so a mismatch
/// means the stored row is corrupt.
pub fn decode_tags(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    let corrupt = || crate::Error::Internal("corrupt tag encoding in ledger row".into());

    let mut rest = bytes;
    let count = take_u64(&mut rest).ok_or_else(corrupt)?;
    let mut tags = Vec::new();
    for _ in 0..count {
        let len = take_u64(&mut rest).ok_or_else(corrupt)?;
        let len = usize::try_from(len).map_err(|_| corrupt())?;
        if rest.len() < len {
            return Err(corrupt());
        }
        let (tag, tail) = rest.split_at(len);
        tags.push(tag.to_vec());
        rest = tail;
    }
    if !rest.is_empty() {
        return Err(corrupt());
    }
    Ok(tags)
}

fn take_u64(rest: &mut &[u8]) -> Option<u64> {
    if rest.len() < 8 {
        return None;
    }
    let (head, tail) = rest.split_at(8);
    let mut be = [0u8; 8];
    be.copy_from_slice(head);
    *rest = tail;
    Some(u64::from_be_bytes(be))
}

/// Encoded size of a message's variable parts, used for the size bound.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encoded_size(
    tags: &[Vec<u8>],
    payload: &serde_json::Value,
    metadata: &[u8],
) -> Result<usize> {
    let payload_bytes = serde_json::to_vec(payload)?;
    Ok(encode_tags(tags).len() + payload_bytes.len() + metadata.len())
}

/// Compute the deduplication hash of a message.
///
/// Input layout: inbox sequence namespace (8 bytes BE), tag count and
/// tags in sorted order (each length-prefixed), canonical JSON payload
/// bytes (length-prefixed), metadata (length-prefixed).
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn content_hash(
    inbox_seq: i64,
    tags: &[Vec<u8>],
    payload: &serde_json::Value,
    metadata: &[u8],
) -> Result<ContentHash> {
    let mut sorted: Vec<&Vec<u8>> = tags.iter().collect();
    sorted.sort();

    let payload_bytes = serde_json::to_vec(payload)?;

    let mut hasher = Sha256::new();
    hasher.update(inbox_seq.to_be_bytes());
    hasher.update((sorted.len() as u64).to_be_bytes());
    for tag in sorted {
        hasher.update((tag.len() as u64).to_be_bytes());
        hasher.update(tag);
    }
    hasher.update((payload_bytes.len() as u64).to_be_bytes());
    hasher.update(&payload_bytes);
    hasher.update((metadata.len() as u64).to_be_bytes());
    hasher.update(metadata);

    Ok(hasher.finalize().into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_hash_independent_of_tag_order() {
        let payload = json!({"kind": "note", "body": "hi"});
        let a = content_hash(
            1,
            &[b"x".to_vec(), b"y".to_vec()],
            &payload,
            b"meta",
        )
        .unwrap();
        let b = content_hash(
            1,
            &[b"y".to_vec(), b"x".to_vec()],
            &payload,
            b"meta",
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_depends_on_inbox_namespace() {
        let payload = json!({"body": "hi"});
        let a = content_hash(1, &[b"t".to_vec()], &payload, b"").unwrap();
        let b = content_hash(2, &[b"t".to_vec()], &payload, b"").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_distinguishes_content() {
        let a = content_hash(1, &[b"t".to_vec()], &json!({"n": 1}), b"").unwrap();
        let b = content_hash(1, &[b"t".to_vec()], &json!({"n": 2}), b"").unwrap();
        let c = content_hash(1, &[b"t".to_vec()], &json!({"n": 1}), b"m").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_length_prefixes_prevent_boundary_shifts() {
        // Moving a byte between adjacent fields must change the hash.
        let a = content_hash(1, &[b"ab".to_vec(), b"c".to_vec()], &json!({}), b"").unwrap();
        let b = content_hash(1, &[b"a".to_vec(), b"bc".to_vec()], &json!({}), b"").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decode_rejects_truncated_blob() {
        let mut bytes = encode_tags(&[b"hello".to_vec()]);
        bytes.truncate(bytes.len() - 1);
        assert!(decode_tags(&bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_trailing_garbage() {
        let mut bytes = encode_tags(&[b"hello".to_vec()]);
        bytes.push(0);
        assert!(decode_tags(&bytes).is_err());
    }

    proptest! {
        #[test]
        fn prop_tags_roundtrip(tags in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..64),
            0..8,
        )) {
            let encoded = encode_tags(&tags);
            let decoded = decode_tags(&encoded).unwrap();
            prop_assert_eq!(decoded, tags);
        }
    }
}
