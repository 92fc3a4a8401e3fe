//! Boundary operations composing the store's components.
//!
//! The HTTP layer hands this module already-validated typed inputs and
//! an optional caller identity; everything here is framing-agnostic.

mod inbox;

pub use inbox::{InboxService, SendRequest};
