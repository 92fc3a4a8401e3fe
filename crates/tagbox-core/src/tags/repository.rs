//! Tag index candidate selection.

use std::collections::BTreeSet;

use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use crate::Result;

/// Read side of the (inbox, tag) -> message sequence index.
pub struct TagIndex {
    pool: SqlitePool,
}

impl TagIndex {
    /// Create an index reader backed by the given pool.
    #[must_use]
    pub const fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Sequence numbers of messages matching any of the given tags, with
    /// `seq > after_seq`, distinct and ascending, capped at `limit`.
    ///
    /// An empty tag set matches nothing. Each tag is looked up with its
    /// own fixed statement and the results are merged in process; any of
    /// the first `limit` sequences of the union is within the first
    /// `limit` rows of at least one per-tag scan, so the cap is safe.
    ///
    /// # Errors
    ///
    /// Returns an error if a database query fails.
    pub async fn candidates(
        &self,
        inbox_seq: i64,
        tags: &[Vec<u8>],
        after_seq: i64,
        limit: usize,
    ) -> Result<Vec<i64>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let mut merged = BTreeSet::new();
        for tag in tags {
            let rows = sqlx::query(
                r"
                SELECT message_seq
                FROM inbox_message_tags
                WHERE inbox_seq = ? AND tag = ? AND message_seq > ?
                ORDER BY message_seq ASC
                LIMIT ?
                ",
            )
            .bind(inbox_seq)
            .bind(tag.as_slice())
            .bind(after_seq)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

            for row in rows {
                merged.insert(row.get::<i64, _>("message_seq"));
            }
        }

        Ok(merged.into_iter().take(limit).collect())
    }
}
