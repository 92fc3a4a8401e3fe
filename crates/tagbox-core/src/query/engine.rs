//! Paginated query and export over the ledger, tag index, and labels.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use super::cursor::{CursorCodec, ExportCursor, QueryCursor};
use super::schema::SchemaFilter;
use crate::config::Config;
use crate::directory::AccountId;
use crate::label::LabelRepository;
use crate::message::{LabeledMessage, MessageRepository};
use crate::tags::TagIndex;
use crate::{Error, Result};

/// A fresh query or a continuation of an earlier one.
///
/// The two are distinct variants on purpose: a resumed query carries
/// only its cursor, and the tag set and schema embedded at creation
/// time are the ones that run. Callers cannot supply fresh filters
/// alongside a cursor for the engine to silently ignore.
#[derive(Debug, Clone)]
pub enum QueryRequest {
    /// Start a new query with the given filters.
    Fresh {
        /// Tags to select on; a message matches if it carries any of them.
        tags: Vec<Vec<u8>>,
        /// JSON Schema the payloads are filtered by.
        schema: serde_json::Value,
    },
    /// Continue from a previously returned cursor.
    Resume {
        /// The opaque cursor string.
        cursor: String,
    },
}

/// One page of query or export results.
#[derive(Debug, Clone)]
pub struct QueryPage {
    /// Messages on this page, ascending by sequence, labeled for the
    /// requesting caller.
    pub results: Vec<LabeledMessage>,
    /// Whether more candidates were available beyond this page.
    pub has_more: bool,
    /// Cursor for the next call.
    pub cursor: String,
}

/// Stateless pagination engine.
///
/// All cross-call state lives in the client-held cursor; concurrent
/// calls share nothing but the backing store.
pub struct QueryEngine {
    messages: MessageRepository,
    tags: TagIndex,
    labels: LabelRepository,
    codec: CursorCodec,
    query_limit: usize,
    retention_ms: i64,
    rate_limit_ms: i64,
}

impl QueryEngine {
    /// Create an engine over the given pool.
    #[must_use]
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        let codec = config
            .cursor_key
            .map_or_else(CursorCodec::with_random_key, CursorCodec::new);

        Self {
            messages: MessageRepository::with_pool(pool.clone()),
            tags: TagIndex::with_pool(pool.clone()),
            labels: LabelRepository::with_pool(pool),
            codec,
            query_limit: config.query_limit,
            retention_ms: config.retention.num_milliseconds(),
            rate_limit_ms: config.rate_limit_interval.num_milliseconds(),
        }
    }

    /// Run one page of a tag query against an already-authorized inbox.
    ///
    /// # Errors
    ///
    /// Returns `BadSchema` for an uncompilable schema, `CursorExpired`
    /// or `RateLimited` for cursor failures, and storage errors.
    pub async fn query(
        &self,
        inbox_seq: i64,
        caller: Option<AccountId>,
        request: QueryRequest,
    ) -> Result<QueryPage> {
        let now = Utc::now().timestamp_millis();

        let (tags, schema, since_seq) = match request {
            QueryRequest::Fresh { tags, schema } => (tags, schema, 0),
            QueryRequest::Resume { cursor } => {
                let cursor: QueryCursor = self.codec.decode(&cursor)?;
                self.check_window(cursor.created_at, cursor.wait_til, now)?;
                (cursor.tags, cursor.schema, cursor.since_seq)
            }
        };

        let filter = SchemaFilter::compile(&schema)?;

        let candidates = self
            .tags
            .candidates(inbox_seq, &tags, since_seq, self.query_limit + 1)
            .await?;
        let has_more = candidates.len() == self.query_limit + 1;
        let page = &candidates[..candidates.len().min(self.query_limit)];

        // The resume point is the last candidate examined, not the last
        // one that passed the schema filter, so no candidate is skipped.
        // An empty page keeps its position instead of rewinding.
        let last_seq = page.last().copied().unwrap_or(since_seq);

        let labels = self.labels.labels_for(page, caller).await?;

        let mut results = Vec::with_capacity(page.len());
        for &seq in page {
            let Some(message) = self.messages.get_by_seq(inbox_seq, seq).await? else {
                continue;
            };
            if !filter.matches(&message.payload) {
                continue;
            }
            let label = labels.get(&seq).copied().unwrap_or(0);
            results.push(message.into_labeled(label));
        }

        debug!(
            "Query in inbox {inbox_seq} returned {} of {} candidates",
            results.len(),
            page.len()
        );

        let cursor = self.codec.encode(&QueryCursor {
            tags,
            schema,
            since_seq: last_seq,
            created_at: now,
            wait_til: self.next_wait_til(has_more, now),
        })?;

        Ok(QueryPage {
            results,
            has_more,
            cursor,
        })
    }

    /// Run one page of a full export against an already-authorized inbox.
    ///
    /// Exports follow the identical cursor and rate-limit discipline but
    /// apply no tag or schema filtering.
    ///
    /// # Errors
    ///
    /// Returns `CursorExpired` or `RateLimited` for cursor failures, and
    /// storage errors.
    pub async fn export(
        &self,
        inbox_seq: i64,
        caller: AccountId,
        cursor: Option<&str>,
    ) -> Result<QueryPage> {
        let now = Utc::now().timestamp_millis();

        let since_seq = match cursor {
            None => 0,
            Some(encoded) => {
                let cursor: ExportCursor = self.codec.decode(encoded)?;
                self.check_window(cursor.created_at, cursor.wait_til, now)?;
                cursor.since_seq
            }
        };

        let mut rows = self
            .messages
            .export_page(inbox_seq, since_seq, self.query_limit + 1)
            .await?;
        let has_more = rows.len() == self.query_limit + 1;
        rows.truncate(self.query_limit);

        let last_seq = rows.last().map_or(since_seq, |m| m.seq);

        let seqs: Vec<i64> = rows.iter().map(|m| m.seq).collect();
        let labels = self.labels.labels_for(&seqs, Some(caller)).await?;

        let results = rows
            .into_iter()
            .map(|message| {
                let label = labels.get(&message.seq).copied().unwrap_or(0);
                message.into_labeled(label)
            })
            .collect();

        let cursor = self.codec.encode(&ExportCursor {
            since_seq: last_seq,
            created_at: now,
            wait_til: self.next_wait_til(has_more, now),
        })?;

        Ok(QueryPage {
            results,
            has_more,
            cursor,
        })
    }

    /// Validate a resumed cursor's retention window and rate limit.
    fn check_window(&self, created_at: i64, wait_til: Option<i64>, now: i64) -> Result<()> {
        if created_at + self.retention_ms < now {
            return Err(Error::CursorExpired);
        }
        if let Some(wait_til) = wait_til {
            if wait_til > now {
                return Err(Error::RateLimited {
                    retry_after_ms: wait_til - now,
                });
            }
        }
        Ok(())
    }

    /// Throttle only once the reader has drained all available
    /// candidates; while more is available, polling is unthrottled.
    fn next_wait_til(&self, has_more: bool, now: i64) -> Option<i64> {
        (!has_more).then(|| now + self.rate_limit_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    fn small_config() -> Config {
        Config {
            query_limit: 2,
            rate_limit_interval: Duration::milliseconds(40),
            ..Config::default()
        }
    }

    async fn seeded(config: Config) -> (MessageRepository, LabelRepository, QueryEngine) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let messages = MessageRepository::with_pool(pool.clone());
        messages.initialize().await.unwrap();
        let labels = LabelRepository::with_pool(pool.clone());
        labels.initialize().await.unwrap();

        let engine = QueryEngine::new(pool, &config);
        (messages, labels, engine)
    }

    async fn seed_tagged(messages: &MessageRepository, inbox_seq: i64, n: usize, tag: &[u8]) {
        for i in 0..n {
            messages
                .insert(
                    inbox_seq,
                    &format!("{}-{i}", String::from_utf8_lossy(tag)),
                    &[tag.to_vec()],
                    &json!({"n": i}),
                    b"",
                )
                .await
                .unwrap();
        }
    }

    fn fresh(tag: &[u8]) -> QueryRequest {
        QueryRequest::Fresh {
            tags: vec![tag.to_vec()],
            schema: json!({}),
        }
    }

    #[tokio::test]
    async fn test_pagination_covers_every_message_once() {
        let (messages, _labels, engine) = seeded(small_config()).await;
        seed_tagged(&messages, 1, 5, b"a").await;

        let mut ids = Vec::new();
        let mut request = fresh(b"a");
        loop {
            let page = engine.query(1, None, request).await.unwrap();
            ids.extend(page.results.iter().map(|m| m.id.clone()));
            if !page.has_more {
                break;
            }
            request = QueryRequest::Resume {
                cursor: page.cursor,
            };
        }

        // Every message exactly once, in ascending sequence order.
        assert_eq!(ids, vec!["a-0", "a-1", "a-2", "a-3", "a-4"]);
    }

    #[tokio::test]
    async fn test_drained_reader_is_rate_limited() {
        let (messages, _labels, engine) = seeded(small_config()).await;
        seed_tagged(&messages, 1, 1, b"a").await;

        let page = engine.query(1, None, fresh(b"a")).await.unwrap();
        assert!(!page.has_more);

        let resumed = engine
            .query(
                1,
                None,
                QueryRequest::Resume {
                    cursor: page.cursor.clone(),
                },
            )
            .await;
        assert!(matches!(resumed, Err(Error::RateLimited { .. })));

        // After the embedded interval the same cursor works again.
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        let resumed = engine
            .query(
                1,
                None,
                QueryRequest::Resume {
                    cursor: page.cursor,
                },
            )
            .await
            .unwrap();
        assert!(resumed.results.is_empty());
    }

    #[tokio::test]
    async fn test_unthrottled_while_more_is_available() {
        let (messages, _labels, engine) = seeded(small_config()).await;
        seed_tagged(&messages, 1, 5, b"a").await;

        let first = engine.query(1, None, fresh(b"a")).await.unwrap();
        assert!(first.has_more);

        // No wait needed between pages while the reader is behind.
        let second = engine
            .query(
                1,
                None,
                QueryRequest::Resume {
                    cursor: first.cursor,
                },
            )
            .await
            .unwrap();
        assert_eq!(second.results.len(), 2);
    }

    #[tokio::test]
    async fn test_drained_cursor_holds_its_position() {
        let (messages, _labels, engine) = seeded(small_config()).await;
        seed_tagged(&messages, 1, 1, b"a").await;

        let page = engine.query(1, None, fresh(b"a")).await.unwrap();
        assert_eq!(page.results.len(), 1);

        // New message arrives after the reader caught up.
        messages
            .insert(1, "late", &[b"a".to_vec()], &json!({"n": 99}), b"")
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        let resumed = engine
            .query(
                1,
                None,
                QueryRequest::Resume {
                    cursor: page.cursor,
                },
            )
            .await
            .unwrap();

        // Only the new message, not a replay of the drained inbox.
        assert_eq!(resumed.results.len(), 1);
        assert_eq!(resumed.results[0].id, "late");
    }

    #[tokio::test]
    async fn test_cursor_keeps_its_original_tag_set() {
        let (messages, _labels, engine) = seeded(small_config()).await;
        seed_tagged(&messages, 1, 3, b"a").await;
        seed_tagged(&messages, 1, 3, b"b").await;

        let page = engine.query(1, None, fresh(b"a")).await.unwrap();
        assert!(page.has_more);

        let resumed = engine
            .query(
                1,
                None,
                QueryRequest::Resume {
                    cursor: page.cursor,
                },
            )
            .await
            .unwrap();
        for message in &resumed.results {
            assert_eq!(message.tags, vec![b"a".to_vec()]);
        }
    }

    #[tokio::test]
    async fn test_schema_filter_shrinks_page_without_skipping() {
        let (messages, _labels, engine) = seeded(small_config()).await;
        seed_tagged(&messages, 1, 5, b"a").await;

        // Only payloads with n >= 3 pass; they sit on the last page.
        let mut request = QueryRequest::Fresh {
            tags: vec![b"a".to_vec()],
            schema: json!({"properties": {"n": {"minimum": 3}}, "required": ["n"]}),
        };
        let mut matched = Vec::new();
        let mut saw_short_page_with_more = false;
        loop {
            let page = engine.query(1, None, request).await.unwrap();
            if page.has_more && page.results.len() < 2 {
                saw_short_page_with_more = true;
            }
            matched.extend(page.results);
            if !page.has_more {
                break;
            }
            request = QueryRequest::Resume {
                cursor: page.cursor,
            };
        }

        assert!(saw_short_page_with_more);
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().all(|m| m.payload["n"].as_i64().unwrap() >= 3));
    }

    #[tokio::test]
    async fn test_empty_tag_set_returns_empty_rate_limited_page() {
        let (_messages, _labels, engine) = seeded(small_config()).await;

        let page = engine
            .query(
                1,
                None,
                QueryRequest::Fresh {
                    tags: vec![],
                    schema: json!({}),
                },
            )
            .await
            .unwrap();
        assert!(page.results.is_empty());
        assert!(!page.has_more);

        let resumed = engine
            .query(
                1,
                None,
                QueryRequest::Resume {
                    cursor: page.cursor,
                },
            )
            .await;
        assert!(matches!(resumed, Err(Error::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_bad_schema_is_rejected() {
        let (_messages, _labels, engine) = seeded(small_config()).await;

        let result = engine
            .query(
                1,
                None,
                QueryRequest::Fresh {
                    tags: vec![b"a".to_vec()],
                    schema: json!({"type": "no-such-type"}),
                },
            )
            .await;
        assert!(matches!(result, Err(Error::BadSchema(_))));
    }

    #[tokio::test]
    async fn test_stale_cursor_expires() {
        let config = Config {
            query_limit: 2,
            retention: Duration::milliseconds(30),
            rate_limit_interval: Duration::milliseconds(1),
            ..Config::default()
        };
        let (messages, _labels, engine) = seeded(config).await;
        seed_tagged(&messages, 1, 1, b"a").await;

        let page = engine.query(1, None, fresh(b"a")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;

        let resumed = engine
            .query(
                1,
                None,
                QueryRequest::Resume {
                    cursor: page.cursor,
                },
            )
            .await;
        assert!(matches!(resumed, Err(Error::CursorExpired)));
    }

    #[tokio::test]
    async fn test_export_pages_everything_with_labels() {
        let (messages, labels, engine) = seeded(small_config()).await;
        let owner = AccountId::new(1);
        seed_tagged(&messages, 1, 5, b"a").await;

        let first_seq = messages
            .get_by_external_id(1, "a-0")
            .await
            .unwrap()
            .unwrap()
            .seq;
        labels.set(first_seq, owner, 2).await.unwrap();

        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = engine.export(1, owner, cursor.as_deref()).await.unwrap();
            all.extend(page.results);
            if !page.has_more {
                break;
            }
            cursor = Some(page.cursor);
        }

        assert_eq!(all.len(), 5);
        assert_eq!(all[0].label, 2);
        assert!(all[1..].iter().all(|m| m.label == 0));
    }
}
