//! Error types for the core library.
//!
//! Store and blob failures are classified here into the domain taxonomy the
//! request layer understands. Conditional-write failures carry no meaning on
//! their own, so the operation that issued the write picks the domain error.

use std::time::Duration;

use thiserror::Error;

use crate::blob::BlobError;
use crate::store::StoreError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller supplied a malformed parameter (year, month, type, page size, cursor).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A composite index key could not be parsed.
    #[error("invalid email type: {0}")]
    InvalidEmailType(String),

    /// Record or blob does not exist.
    #[error("email not found")]
    NotFound,

    /// A record with the same message ID already exists.
    #[error("email already exists")]
    AlreadyExists,

    /// The store signalled that its throughput was exceeded.
    #[error("too many requests")]
    TooManyRequests,

    /// The record exists but is not in the trash.
    #[error("{kind} is not trashed")]
    NotTrashed {
        /// Kind of resource, e.g. `"email"`.
        kind: &'static str,
    },

    /// The record exists but is already in the trash.
    #[error("{kind} is already trashed")]
    AlreadyTrashed {
        /// Kind of resource, e.g. `"email"`.
        kind: &'static str,
    },

    /// The record's type never goes to the trash (drafts).
    #[error("{kind} cannot be trashed")]
    NotTrashable {
        /// Kind of resource, e.g. `"email"`.
        kind: &'static str,
    },

    /// Read/unread toggle did not apply to the record's current state or type.
    #[error("read action failed")]
    ReadActionFailed,

    /// The record exists but is not a draft.
    #[error("email is not a draft")]
    NotDraft,

    /// A store or blob call did not complete within the configured deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Unclassified store failure.
    #[error("store error: {0}")]
    Store(#[source] StoreError),

    /// Unclassified blob storage failure.
    #[error("blob storage error: {0}")]
    Blob(#[source] BlobError),

    /// Raw message could not be decoded.
    #[error("MIME error: {0}")]
    Mime(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    /// Maps the outcome of a conditional write.
    ///
    /// A failed condition becomes `on_condition`; every other store signal is
    /// classified the same way for all operations.
    #[must_use]
    pub fn from_conditional(err: StoreError, on_condition: Self) -> Self {
        match err {
            StoreError::ConditionFailed => on_condition,
            other => other.into(),
        }
    }

    /// Returns true if the caller may retry the same request later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TooManyRequests | Self::Timeout(_))
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::Throttled => Self::TooManyRequests,
            other => Self::Store(other),
        }
    }
}

impl From<BlobError> for Error {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(_) => Self::NotFound,
            BlobError::InvalidKey(key) => Self::InvalidInput(format!("invalid message ID: {key}")),
            other => Self::Blob(other),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
