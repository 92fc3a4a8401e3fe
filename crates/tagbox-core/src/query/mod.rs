//! Query and export engine.
//!
//! This module provides:
//! - **Cursor codec**: opaque, HMAC-signed continuation tokens carrying
//!   all pagination state, so the engine itself is stateless
//! - **Schema filter**: compiled JSON Schema predicates applied to
//!   payloads after a page is assembled
//! - **Engine**: tag-indexed candidate selection, label joins, and the
//!   rate-limited polling discipline

mod cursor;
mod engine;
mod schema;

pub use cursor::{CursorCodec, ExportCursor, QueryCursor};
pub use engine::{QueryEngine, QueryPage, QueryRequest};
pub use schema::SchemaFilter;
