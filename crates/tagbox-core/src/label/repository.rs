//! Label overlay storage repository.

use std::collections::HashMap;

use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use crate::Result;
use crate::directory::AccountId;

/// Repository for per-reader message labels.
pub struct LabelRepository {
    pool: SqlitePool,
}

impl LabelRepository {
    /// Create a repository backed by the given pool.
    #[must_use]
    pub const fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize database schema.
    pub(crate) async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS inbox_message_labels (
                message_seq INTEGER NOT NULL,
                account_id INTEGER NOT NULL,
                label INTEGER NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (message_seq, account_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set a reader's label on a message. Last writer wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn set(&self, message_seq: i64, account: AccountId, label: i64) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO inbox_message_labels (message_seq, account_id, label)
            VALUES (?, ?, ?)
            ON CONFLICT(message_seq, account_id) DO UPDATE SET
                label = excluded.label,
                updated_at = CURRENT_TIMESTAMP
            ",
        )
        .bind(message_seq)
        .bind(account.0)
        .bind(label)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Labels the given reader has set on the given messages.
    ///
    /// The returned map only holds entries for labeled messages; absent
    /// entries default to 0. Anonymous callers get an empty map without
    /// touching storage, so unauthenticated views never expose labels.
    ///
    /// # Errors
    ///
    /// Returns an error if a database query fails.
    pub async fn labels_for(
        &self,
        message_seqs: &[i64],
        caller: Option<AccountId>,
    ) -> Result<HashMap<i64, i64>> {
        let Some(account) = caller else {
            return Ok(HashMap::new());
        };

        let mut labels = HashMap::new();
        for &seq in message_seqs {
            let row = sqlx::query(
                r"
                SELECT label
                FROM inbox_message_labels
                WHERE message_seq = ? AND account_id = ?
                ",
            )
            .bind(seq)
            .bind(account.0)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                labels.insert(seq, row.get("label"));
            }
        }

        Ok(labels)
    }
}
