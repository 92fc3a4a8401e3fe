//! Message ledger data models.

use serde::Serialize;

/// A message stored in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Internal sequence number, unique and monotonic within the inbox.
    /// The sole ordering and pagination key.
    pub seq: i64,
    /// Externally visible message id, unique within the inbox.
    pub external_id: String,
    /// Tags the message can be queried by. Unique within the message.
    pub tags: Vec<Vec<u8>>,
    /// Opaque payload object.
    pub payload: serde_json::Value,
    /// Opaque small metadata blob.
    pub metadata: Vec<u8>,
}

impl Message {
    /// Attach a label for the requesting reader.
    #[must_use]
    pub fn into_labeled(self, label: i64) -> LabeledMessage {
        LabeledMessage {
            id: self.external_id,
            tags: self.tags,
            payload: self.payload,
            metadata: self.metadata,
            label,
        }
    }
}

/// A message joined with the requesting reader's label.
///
/// The label defaults to 0 when unset or when the caller is anonymous,
/// so results are stable across authenticated and unauthenticated views
/// except for this field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledMessage {
    /// Externally visible message id.
    pub id: String,
    /// Tags the message was sent with.
    pub tags: Vec<Vec<u8>>,
    /// Opaque payload object.
    pub payload: serde_json::Value,
    /// Opaque small metadata blob.
    pub metadata: Vec<u8>,
    /// The reader's label, 0 if unset.
    pub label: i64,
}

/// Result of a send operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    /// Canonical external id of the message. On deduplication this is
    /// the id already on record, not the one supplied with the resend.
    pub id: String,
    /// Whether a new ledger row was created.
    pub created: bool,
}
