//! Append-only message ledger with content-addressed deduplication.
//!
//! This module provides:
//! - **Canonical encoding**: a deterministic byte form of a message used
//!   for the SHA-256 deduplication hash
//! - **Ledger repository**: insert-or-dedup with atomic tag fan-out,
//!   lookups by sequence and external id, and export pages

mod encoding;
mod model;
mod repository;

pub use encoding::{content_hash, decode_tags, encode_tags, encoded_size};
pub use model::{LabeledMessage, Message, SendOutcome};
pub use repository::{InsertOutcome, MessageRepository};
