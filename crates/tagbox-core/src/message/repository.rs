//! Message ledger storage repository.

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::{debug, warn};

use super::encoding::{content_hash, decode_tags, encode_tags};
use super::model::Message;
use crate::{Error, Result};

/// Result of a ledger insert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Sequence number of the message, new or pre-existing.
    pub seq: i64,
    /// Canonical external id on record for the message.
    pub external_id: String,
    /// Whether a new row was created.
    pub created: bool,
}

/// Repository for the append-only message ledger and its tag rows.
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    /// Create a repository backed by the given pool.
    #[must_use]
    pub const fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize database schema.
    pub(crate) async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS inbox_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                hash BLOB NOT NULL UNIQUE,
                inbox_seq INTEGER NOT NULL,
                external_id TEXT NOT NULL,
                tags BLOB NOT NULL,
                payload TEXT NOT NULL,
                metadata BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(inbox_seq, external_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS inbox_message_tags (
                message_seq INTEGER NOT NULL,
                inbox_seq INTEGER NOT NULL,
                tag BLOB NOT NULL,
                PRIMARY KEY (inbox_seq, tag, message_seq)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Pagination scans by (inbox, seq)
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_inbox_messages_inbox_seq
            ON inbox_messages(inbox_seq, seq)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a message, deduplicating by content hash.
    ///
    /// The row insert and the per-tag index fan-out commit as one
    /// transaction, so a message is never visible without its tag rows.
    /// On a hash collision the existing row is read back and its id and
    /// sequence are returned with `created = false`; the supplied
    /// external id is ignored in that case.
    ///
    /// # Errors
    ///
    /// Returns `BadInput` if the external id is already taken by a
    /// message with different content, and `Internal` if a colliding row
    /// cannot be read back.
    pub async fn insert(
        &self,
        inbox_seq: i64,
        external_id: &str,
        tags: &[Vec<u8>],
        payload: &serde_json::Value,
        metadata: &[u8],
    ) -> Result<InsertOutcome> {
        let hash = content_hash(inbox_seq, tags, payload, metadata)?;
        let payload_text = serde_json::to_string(payload)?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO inbox_messages (hash, inbox_seq, external_id, tags, payload, metadata)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(hash) DO NOTHING
            RETURNING seq
            ",
        )
        .bind(hash.to_vec())
        .bind(inbox_seq)
        .bind(external_id)
        .bind(encode_tags(tags))
        .bind(&payload_text)
        .bind(metadata)
        .fetch_optional(&mut *tx)
        .await;

        let inserted = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(Error::BadInput("message id already in use".into()));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(row) = inserted {
            let seq: i64 = row.get("seq");
            for tag in tags {
                sqlx::query(
                    r"
                    INSERT INTO inbox_message_tags (message_seq, inbox_seq, tag)
                    VALUES (?, ?, ?)
                    ",
                )
                .bind(seq)
                .bind(inbox_seq)
                .bind(tag.as_slice())
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;

            return Ok(InsertOutcome {
                seq,
                external_id: external_id.to_string(),
                created: true,
            });
        }

        // Hash collision: the message already exists. Read back the
        // winner inside the same transaction so the fallback cannot run
        // ahead of a concurrent writer's commit.
        let existing = sqlx::query(
            r"
            SELECT seq, external_id
            FROM inbox_messages
            WHERE hash = ?
            ",
        )
        .bind(hash.to_vec())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = existing else {
            warn!("Message row missing after hash conflict in inbox {inbox_seq}");
            return Err(Error::Internal(
                "message row missing after hash conflict".into(),
            ));
        };

        let seq: i64 = row.get("seq");
        debug!("Deduplicated send in inbox {inbox_seq} to seq {seq}");

        Ok(InsertOutcome {
            seq,
            external_id: row.get("external_id"),
            created: false,
        })
    }

    /// Get a message by its sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the row is
    /// corrupt.
    pub async fn get_by_seq(&self, inbox_seq: i64, seq: i64) -> Result<Option<Message>> {
        let row = sqlx::query(
            r"
            SELECT seq, external_id, tags, payload, metadata
            FROM inbox_messages
            WHERE inbox_seq = ? AND seq = ?
            ",
        )
        .bind(inbox_seq)
        .bind(seq)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_message).transpose()
    }

    /// Get a message by its external id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or the row is
    /// corrupt.
    pub async fn get_by_external_id(
        &self,
        inbox_seq: i64,
        external_id: &str,
    ) -> Result<Option<Message>> {
        let row = sqlx::query(
            r"
            SELECT seq, external_id, tags, payload, metadata
            FROM inbox_messages
            WHERE inbox_seq = ? AND external_id = ?
            ",
        )
        .bind(inbox_seq)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_message).transpose()
    }

    /// Get up to `limit` messages with `seq > since_seq`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a row is corrupt.
    pub async fn export_page(
        &self,
        inbox_seq: i64,
        since_seq: i64,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r"
            SELECT seq, external_id, tags, payload, metadata
            FROM inbox_messages
            WHERE inbox_seq = ? AND seq > ?
            ORDER BY seq ASC
            LIMIT ?
            ",
        )
        .bind(inbox_seq)
        .bind(since_seq)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }
}

/// Convert a database row to a `Message`.
fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let tags_blob: Vec<u8> = row.get("tags");
    let payload_text: String = row.get("payload");

    Ok(Message {
        seq: row.get("seq"),
        external_id: row.get("external_id"),
        tags: decode_tags(&tags_blob)?,
        payload: serde_json::from_str(&payload_text)?,
        metadata: row.get("metadata"),
    })
}
