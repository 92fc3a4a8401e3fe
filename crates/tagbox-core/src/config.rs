//! Tunable limits and intervals for the message store.

use chrono::Duration;

/// Configuration for the inbox store and query engine.
///
/// Defaults match the production service: pages of 100 messages, a 30 day
/// cursor retention window, one poll per second once a reader is caught
/// up, and 32 KiB per message.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of messages returned per query/export page.
    pub query_limit: usize,
    /// How long a cursor stays valid, measured from its creation.
    pub retention: Duration,
    /// Minimum delay between polls once a reader has drained the inbox.
    pub rate_limit_interval: Duration,
    /// Maximum number of inbox directory entries cached in memory.
    pub cache_capacity: usize,
    /// Upper bound on the encoded size of tags + payload + metadata.
    pub max_message_bytes: usize,
    /// Key used to sign cursors. `None` generates a random key at
    /// startup, which invalidates outstanding cursors on restart.
    pub cursor_key: Option<[u8; 32]>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            query_limit: 100,
            retention: Duration::days(30),
            rate_limit_interval: Duration::seconds(1),
            cache_capacity: 1000,
            max_message_bytes: 32 * 1024,
            cursor_key: None,
        }
    }
}
