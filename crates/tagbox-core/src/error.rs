//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The inbox or message does not exist. Deliberately does not say
    /// which, so callers cannot probe for inbox existence.
    #[error("Inbox or message not found")]
    NotFound,

    /// The caller is not authorized for this operation.
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    /// Malformed input, rejected before any storage mutation.
    #[error("Invalid input: {0}")]
    BadInput(String),

    /// The supplied filter schema failed to compile.
    #[error("Invalid filter schema: {0}")]
    BadSchema(String),

    /// The cursor failed to decode, failed signature verification, or is
    /// older than the retention window. Callers must restart the query.
    #[error("Cursor invalid or expired")]
    CursorExpired,

    /// The cursor's rate limit deadline has not been reached yet.
    #[error("Rate limited, retry after {retry_after_ms} ms")]
    RateLimited {
        /// Milliseconds until the cursor becomes usable again.
        retry_after_ms: i64,
    },

    /// A storage invariant was violated. Surfaced as a server error and
    /// logged as a bug, never silently dropped.
    #[error("Storage inconsistency: {0}")]
    Internal(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error is recoverable at the request boundary.
    ///
    /// Recoverable errors map to a client-facing response code; the rest
    /// indicate bugs or storage failures.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Serde(_) | Self::Internal(_)
        )
    }
}
