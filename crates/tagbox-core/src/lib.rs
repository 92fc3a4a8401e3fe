//! # tagbox-core
//!
//! Multi-tenant inbox message store and query engine.
//!
//! This crate provides:
//! - **Inbox Directory** - inbox id to owner/namespace resolution, cached
//! - **Message Ledger** - append-only, content-addressed storage with
//!   idempotent sends
//! - **Tag Index** - query messages by any of their tags
//! - **Label Overlay** - per-reader moderation labels on messages
//! - **Query/Export Engine** - schema-filtered, cursor-paginated reads
//!   with built-in polling backoff
//!
//! Clients send opaque, tagged objects into a named inbox; readers
//! retrieve them by tag with cursor-paginated queries. All pagination
//! state lives in an opaque, HMAC-signed client-held cursor, so the
//! engine is stateless between calls. The HTTP framing, authentication,
//! and inbox provisioning are external collaborators.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod directory;
mod error;
pub mod label;
pub mod message;
pub mod query;
pub mod service;
pub mod tags;

pub use config::Config;
pub use directory::{AccountId, InboxDirectory, InboxInfo, SHARED_INBOX_ID};
pub use error::{Error, Result};
pub use label::LabelRepository;
pub use message::{LabeledMessage, Message, MessageRepository, SendOutcome};
pub use query::{
    CursorCodec, ExportCursor, QueryCursor, QueryEngine, QueryPage, QueryRequest, SchemaFilter,
};
pub use service::{InboxService, SendRequest};
pub use tags::TagIndex;
