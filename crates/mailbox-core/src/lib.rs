//! # mailbox-core
//!
//! Email record indexing, pagination and state transitions.
//!
//! This crate provides:
//! - Composite `type#yyyy-mm` index keys
//! - Opaque pagination cursors
//! - Paged listing by type, year and month
//! - Conditional lifecycle transitions (read/unread, trash/untrash, delete)
//! - Store backends (`SQLite`, in-memory) and raw message storage
//! - MIME decoding of stored messages

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod blob;
pub mod condition;
pub mod config;
pub mod content;
pub mod cursor;
mod error;
pub mod key;
mod mailbox;
pub mod model;
pub mod store;

pub use blob::{BlobError, BlobStore, FsBlobStore};
pub use condition::{Attribute, Condition, Predicate, Update};
pub use config::MailboxConfig;
pub use content::{Body, Disposition, Part, PartInfo, ParsedMessage};
pub use cursor::SeekPosition;
pub use error::{Error, Result};
pub use key::{EmailType, TypeYearMonth, YearMonth};
pub use mailbox::{EmailSummary, ListPage, ListParams, ListQuery, Mailbox, Period, ReadAction};
pub use model::{Email, EmailContent};
pub use store::{EmailStore, IndexPage, IndexQuery, MemoryStore, Order, SqliteStore, StoreError};
