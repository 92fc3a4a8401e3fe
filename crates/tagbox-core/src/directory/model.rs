//! Inbox directory data models.

/// Identifier of an authenticated account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create an account id from its raw value.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier of the shared, publicly readable inbox.
///
/// The shared inbox has no owner and never appears in the directory
/// table; it always resolves to sequence namespace 0.
pub const SHARED_INBOX_ID: &str = "shared";

/// Resolved directory entry for an inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboxInfo {
    /// Owning account, or `None` for the public shared inbox.
    pub owner: Option<AccountId>,
    /// Dense sequence namespace partitioning ledger rows per inbox.
    pub inbox_seq: i64,
}

impl InboxInfo {
    /// Entry for the shared inbox.
    #[must_use]
    pub const fn shared() -> Self {
        Self {
            owner: None,
            inbox_seq: 0,
        }
    }

    /// Whether this inbox is publicly readable.
    #[must_use]
    pub const fn is_public(&self) -> bool {
        self.owner.is_none()
    }

    /// Whether the given account owns this inbox.
    #[must_use]
    pub fn is_owned_by(&self, account: AccountId) -> bool {
        self.owner == Some(account)
    }
}
