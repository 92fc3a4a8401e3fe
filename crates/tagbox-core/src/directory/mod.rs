//! Inbox directory with read-through caching.
//!
//! This module resolves an inbox identifier to its owning account and
//! sequence namespace. Results (including misses) are cached with no TTL;
//! inbox-to-owner bindings are immutable after creation, so entries only
//! go stale if that invariant is ever relaxed.

mod model;
mod repository;

pub use model::{AccountId, InboxInfo, SHARED_INBOX_ID};
pub use repository::InboxDirectory;
