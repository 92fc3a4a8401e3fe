//! Secondary index from (inbox, tag) to message sequence numbers.
//!
//! Rows are written by the message ledger in the same transaction as a
//! first-time insert; this module only reads them.

mod repository;

pub use repository::TagIndex;
