//! Inbox service: send, get, label, query, and export.

use std::collections::HashSet;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::config::Config;
use crate::directory::{AccountId, InboxDirectory, InboxInfo};
use crate::label::LabelRepository;
use crate::message::{LabeledMessage, MessageRepository, SendOutcome, encoded_size};
use crate::query::{QueryEngine, QueryPage, QueryRequest};
use crate::{Error, Result};

/// A message to send into an inbox.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Tags the message can later be queried by. Must be unique within
    /// the message.
    pub tags: Vec<Vec<u8>>,
    /// Opaque payload object.
    pub payload: serde_json::Value,
    /// Opaque small metadata blob.
    pub metadata: Vec<u8>,
    /// Caller-chosen message id; a random token is generated when absent.
    pub requested_id: Option<String>,
}

/// The inbox message store and query engine behind one database.
pub struct InboxService {
    directory: InboxDirectory,
    messages: MessageRepository,
    labels: LabelRepository,
    engine: QueryEngine,
    max_message_bytes: usize,
}

impl InboxService {
    /// Create a service with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema
    /// creation fails.
    pub async fn new(database_path: &str, config: Config) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        Self::with_pool(pool, config).await
    }

    /// Create an in-memory service for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema
    /// creation fails.
    pub async fn in_memory() -> Result<Self> {
        Self::in_memory_with(Config::default()).await
    }

    /// Create an in-memory service with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema
    /// creation fails.
    pub async fn in_memory_with(config: Config) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool, config).await
    }

    async fn with_pool(pool: SqlitePool, config: Config) -> Result<Self> {
        let directory = InboxDirectory::with_pool(pool.clone(), config.cache_capacity);
        let messages = MessageRepository::with_pool(pool.clone());
        let labels = LabelRepository::with_pool(pool.clone());

        directory.initialize().await?;
        messages.initialize().await?;
        labels.initialize().await?;

        let engine = QueryEngine::new(pool, &config);

        Ok(Self {
            directory,
            messages,
            labels,
            engine,
            max_message_bytes: config.max_message_bytes,
        })
    }

    /// The inbox directory, exposed for the provisioning collaborator.
    #[must_use]
    pub const fn directory(&self) -> &InboxDirectory {
        &self.directory
    }

    /// Send a message to an inbox.
    ///
    /// Sending identical content twice is idempotent: the second call
    /// reports `created = false` and the id already on record.
    ///
    /// # Errors
    ///
    /// Returns `BadInput` for duplicate tags, an empty requested id, or
    /// an oversized message (all checked before any storage mutation),
    /// and `NotFound` if the inbox does not exist.
    pub async fn send(&self, inbox_id: &str, request: SendRequest) -> Result<SendOutcome> {
        validate_tags(&request.tags)?;
        if let Some(id) = &request.requested_id {
            if id.is_empty() {
                return Err(Error::BadInput("message id must not be empty".into()));
            }
        }
        let size = encoded_size(&request.tags, &request.payload, &request.metadata)?;
        if size > self.max_message_bytes {
            return Err(Error::BadInput(format!(
                "message is too large ({size} bytes)"
            )));
        }

        let info = self
            .directory
            .resolve(inbox_id)
            .await?
            .ok_or(Error::NotFound)?;

        let external_id = request.requested_id.unwrap_or_else(generate_message_id);
        let outcome = self
            .messages
            .insert(
                info.inbox_seq,
                &external_id,
                &request.tags,
                &request.payload,
                &request.metadata,
            )
            .await?;

        debug!(
            "Send to inbox {inbox_id}: id {} created {}",
            outcome.external_id, outcome.created
        );

        Ok(SendOutcome {
            id: outcome.external_id,
            created: outcome.created,
        })
    }

    /// Get a message by its id, labeled for the requesting caller.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the inbox is public or owned by the
    /// caller, and `NotFound` if the inbox or message is absent.
    pub async fn get(
        &self,
        inbox_id: &str,
        message_id: &str,
        caller: Option<AccountId>,
    ) -> Result<LabeledMessage> {
        let info = self
            .directory
            .resolve(inbox_id)
            .await?
            .ok_or(Error::NotFound)?;
        authorize_read(info, caller, "cannot read a message in someone else's inbox")?;

        let message = self
            .messages
            .get_by_external_id(info.inbox_seq, message_id)
            .await?
            .ok_or(Error::NotFound)?;

        let labels = self.labels.labels_for(&[message.seq], caller).await?;
        let label = labels.get(&message.seq).copied().unwrap_or(0);
        Ok(message.into_labeled(label))
    }

    /// Label a message. Overwrites the caller's previous label, if any.
    ///
    /// # Errors
    ///
    /// Returns `BadInput` for a label below 1, `Forbidden` unless the
    /// inbox is public or owned by the caller, and `NotFound` if the
    /// inbox or message is absent.
    pub async fn label(
        &self,
        inbox_id: &str,
        message_id: &str,
        label: i64,
        caller: AccountId,
    ) -> Result<()> {
        if label < 1 {
            return Err(Error::BadInput("label must be at least 1".into()));
        }

        let info = self
            .directory
            .resolve(inbox_id)
            .await?
            .ok_or(Error::NotFound)?;
        authorize_read(
            info,
            Some(caller),
            "cannot label a message in someone else's inbox",
        )?;

        let message = self
            .messages
            .get_by_external_id(info.inbox_seq, message_id)
            .await?
            .ok_or(Error::NotFound)?;

        self.labels.set(message.seq, caller, label).await
    }

    /// Query messages by tag, one page per call.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the inbox exists and is public or
    /// owned by the caller (an absent inbox is indistinguishable from
    /// someone else's), plus the engine's `BadSchema`, `CursorExpired`,
    /// and `RateLimited`.
    pub async fn query(
        &self,
        inbox_id: &str,
        caller: Option<AccountId>,
        request: QueryRequest,
    ) -> Result<QueryPage> {
        let info = self
            .directory
            .resolve(inbox_id)
            .await?
            .ok_or(Error::Forbidden("cannot query someone else's inbox"))?;
        authorize_read(info, caller, "cannot query someone else's inbox")?;

        self.engine.query(info.inbox_seq, caller, request).await
    }

    /// Export every message in an inbox, one page per call.
    ///
    /// Export is owner-only; the shared inbox can never be exported.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for the shared inbox, an absent inbox, or a
    /// non-owner caller, plus the engine's cursor errors.
    pub async fn export(
        &self,
        inbox_id: &str,
        caller: AccountId,
        cursor: Option<&str>,
    ) -> Result<QueryPage> {
        let info = self.directory.resolve(inbox_id).await?;
        if info.is_some_and(|i| i.is_public()) {
            return Err(Error::Forbidden("cannot export from the shared inbox"));
        }
        let info = info.ok_or(Error::Forbidden("cannot export from someone else's inbox"))?;
        if !info.is_owned_by(caller) {
            return Err(Error::Forbidden("cannot export from someone else's inbox"));
        }

        self.engine.export(info.inbox_seq, caller, cursor).await
    }
}

/// Allow reads for the inbox owner, or anyone if the inbox is public.
fn authorize_read(info: InboxInfo, caller: Option<AccountId>, denial: &'static str) -> Result<()> {
    if info.is_public() || caller.is_some_and(|c| info.is_owned_by(c)) {
        Ok(())
    } else {
        Err(Error::Forbidden(denial))
    }
}

/// Duplicate tags are a validation error, rejected before storage.
fn validate_tags(tags: &[Vec<u8>]) -> Result<()> {
    let mut seen = HashSet::with_capacity(tags.len());
    for tag in tags {
        if !seen.insert(tag.as_slice()) {
            return Err(Error::BadInput("duplicate tag".into()));
        }
    }
    Ok(())
}

/// Fresh random message id, 16 bytes base64url encoded.
fn generate_message_id() -> String {
    let random_bytes: Vec<u8> = (0..16).map(|_| rand::thread_rng().r#gen::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(random_bytes)
}
