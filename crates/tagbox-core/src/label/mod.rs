//! Per-reader label overlay.
//!
//! Labels annotate retrieved messages (ok, expired, incorrect, junk, ...)
//! without touching message content. Each (message, reader) pair holds at
//! most one label; a reader only ever sees their own.

mod repository;

pub use repository::LabelRepository;
