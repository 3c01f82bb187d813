//! Key-value store contract.
//!
//! The engine needs a store with single-item conditional writes and one
//! ordered secondary index keyed by `TypeYearMonth`. [`SqliteStore`] is the
//! persistent implementation; [`MemoryStore`] keeps everything in process.

mod memory;
mod sqlite;

use crate::condition::{Condition, Update};
use crate::cursor::SeekPosition;
use crate::model::Email;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Failure signals a store can raise.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write's condition did not hold; nothing was changed.
    #[error("conditional check failed")]
    ConditionFailed,

    /// No item with the given key.
    #[error("item not found")]
    NotFound,

    /// The store is over capacity; the caller should back off.
    #[error("provisioned throughput exceeded")]
    Throttled,

    /// The item cannot be indexed.
    #[error("invalid item: {0}")]
    InvalidItem(String),

    /// A stored item could not be decoded.
    #[error("corrupt item {message_id}: {reason}")]
    Corrupt {
        /// Key of the offending item.
        message_id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Index scan direction over `(DateTime, MessageID)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Oldest first.
    Asc,
    /// Newest first.
    #[default]
    Desc,
}

impl Order {
    /// Parses `asc`/`desc`; empty selects the default.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" => Some(Self::default()),
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    /// Returns the order as a request parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// An ordered scan over the secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    /// Records whose `TypeYearMonth` starts with any of these prefixes.
    pub key_prefixes: Vec<String>,
    /// Scan trashed records instead of active ones.
    pub trashed: bool,
    /// Scan direction.
    pub order: Order,
    /// Maximum number of items to return.
    pub limit: usize,
    /// Resume strictly after this position.
    pub start_after: Option<SeekPosition>,
}

/// One page of an index scan.
#[derive(Debug, Clone, Default)]
pub struct IndexPage {
    /// Matching items in scan order.
    pub items: Vec<Email>,
    /// Whether more items follow the last one.
    pub has_more: bool,
}

/// A key-value store of email records with conditional writes.
///
/// Each method is a single request; conditional methods check and apply
/// atomically. Implementations report a missing item as
/// [`StoreError::NotFound`] and a failed check on an existing item as
/// [`StoreError::ConditionFailed`].
#[allow(async_fn_in_trait)]
pub trait EmailStore {
    /// Fetches a record by message ID.
    async fn get(&self, message_id: &str) -> StoreResult<Option<Email>>;

    /// Inserts a record, failing with `ConditionFailed` if the key exists.
    async fn insert(&self, email: &Email) -> StoreResult<()>;

    /// Applies `update` if `condition` holds.
    async fn update(
        &self,
        message_id: &str,
        update: &Update,
        condition: &Condition,
    ) -> StoreResult<()>;

    /// Deletes the record if `condition` holds.
    async fn delete(&self, message_id: &str, condition: &Condition) -> StoreResult<()>;

    /// Scans the index.
    async fn query(&self, query: &IndexQuery) -> StoreResult<IndexPage>;
}
