//! Inbox directory storage and cache.

use std::collections::HashMap;
use std::sync::Mutex;

use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use super::model::{AccountId, InboxInfo, SHARED_INBOX_ID};
use crate::{Error, Result};

/// Read-through directory of inboxes, cached by inbox id.
///
/// Negative lookups are cached too, so repeated probes for a missing
/// inbox never reach the database. Entries are only dropped when the
/// cache hits capacity (full flush) or the process restarts; this is
/// sound because an inbox's owner never changes after creation.
pub struct InboxDirectory {
    pool: SqlitePool,
    cache: Mutex<HashMap<String, Option<InboxInfo>>>,
    capacity: usize,
}

impl InboxDirectory {
    /// Create a directory backed by the given pool.
    #[must_use]
    pub fn with_pool(pool: SqlitePool, capacity: usize) -> Self {
        Self {
            pool,
            cache: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Initialize database schema.
    pub(crate) async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS inboxes (
                inbox_seq INTEGER PRIMARY KEY AUTOINCREMENT,
                inbox_id TEXT NOT NULL UNIQUE,
                owner_account_id INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Resolve an inbox id to its directory entry.
    ///
    /// Returns `None` if no such inbox exists. The shared inbox resolves
    /// without touching storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn resolve(&self, inbox_id: &str) -> Result<Option<InboxInfo>> {
        if inbox_id == SHARED_INBOX_ID {
            return Ok(Some(InboxInfo::shared()));
        }

        if let Some(cached) = self.cache_get(inbox_id) {
            return Ok(cached);
        }

        let row = sqlx::query(
            r"
            SELECT inbox_seq, owner_account_id
            FROM inboxes
            WHERE inbox_id = ?
            ",
        )
        .bind(inbox_id)
        .fetch_optional(&self.pool)
        .await?;

        let info = row.map(|r| InboxInfo {
            owner: Some(AccountId::new(r.get("owner_account_id"))),
            inbox_seq: r.get("inbox_seq"),
        });

        self.cache_put(inbox_id, info);
        Ok(info)
    }

    /// Register a new inbox for an owning account.
    ///
    /// This is the seam used by the external provisioning collaborator;
    /// everything else in the core treats the directory as read-only.
    ///
    /// # Errors
    ///
    /// Returns `BadInput` for the reserved shared id and a database error
    /// if the id is already taken.
    pub async fn create(&self, inbox_id: &str, owner: AccountId) -> Result<InboxInfo> {
        if inbox_id == SHARED_INBOX_ID {
            return Err(Error::BadInput("inbox id is reserved".into()));
        }

        let row = sqlx::query(
            r"
            INSERT INTO inboxes (inbox_id, owner_account_id)
            VALUES (?, ?)
            RETURNING inbox_seq
            ",
        )
        .bind(inbox_id)
        .bind(owner.0)
        .fetch_one(&self.pool)
        .await?;

        let info = InboxInfo {
            owner: Some(owner),
            inbox_seq: row.get("inbox_seq"),
        };

        // Write through so this process sees its own provisioning even
        // after a cached negative lookup.
        self.cache_put(inbox_id, Some(info));
        debug!("Provisioned inbox {} as seq {}", inbox_id, info.inbox_seq);

        Ok(info)
    }

    fn cache_get(&self, inbox_id: &str) -> Option<Option<InboxInfo>> {
        #[allow(clippy::unwrap_used)]
        let cache = self.cache.lock().unwrap();
        cache.get(inbox_id).copied()
    }

    fn cache_put(&self, inbox_id: &str, info: Option<InboxInfo>) {
        #[allow(clippy::unwrap_used)]
        let mut cache = self.cache.lock().unwrap();
        if cache.len() >= self.capacity {
            // Bounded cache: flush wholesale rather than tracking
            // recency. Entries are immutable and cheap to re-read.
            cache.clear();
        }
        cache.insert(inbox_id.to_string(), info);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn in_memory() -> InboxDirectory {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let dir = InboxDirectory::with_pool(pool, 16);
        dir.initialize().await.unwrap();
        dir
    }

    #[tokio::test]
    async fn test_shared_inbox_resolves_without_a_row() {
        let dir = in_memory().await;

        let info = dir.resolve(SHARED_INBOX_ID).await.unwrap().unwrap();
        assert!(info.is_public());
        assert_eq!(info.inbox_seq, 0);
    }

    #[tokio::test]
    async fn test_create_and_resolve() {
        let dir = in_memory().await;

        let created = dir.create("alice-inbox", AccountId::new(1)).await.unwrap();
        assert_eq!(created.owner, Some(AccountId::new(1)));
        assert!(created.inbox_seq >= 1);

        let resolved = dir.resolve("alice-inbox").await.unwrap().unwrap();
        assert_eq!(resolved, created);
    }

    #[tokio::test]
    async fn test_missing_inbox_is_none() {
        let dir = in_memory().await;
        assert!(dir.resolve("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_after_cached_negative_is_visible() {
        let dir = in_memory().await;

        // Prime the negative cache, then provision.
        assert!(dir.resolve("late").await.unwrap().is_none());
        let created = dir.create("late", AccountId::new(2)).await.unwrap();

        let resolved = dir.resolve("late").await.unwrap();
        assert_eq!(resolved, Some(created));
    }

    #[tokio::test]
    async fn test_reserved_id_rejected() {
        let dir = in_memory().await;
        let err = dir.create(SHARED_INBOX_ID, AccountId::new(1)).await;
        assert!(matches!(err, Err(Error::BadInput(_))));
    }

    #[tokio::test]
    async fn test_distinct_inboxes_get_distinct_namespaces() {
        let dir = in_memory().await;

        let a = dir.create("a", AccountId::new(1)).await.unwrap();
        let b = dir.create("b", AccountId::new(1)).await.unwrap();
        assert_ne!(a.inbox_seq, b.inbox_seq);
        assert!(b.inbox_seq > a.inbox_seq);
    }
}
