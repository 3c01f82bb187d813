//! The mailbox engine.
//!
//! [`Mailbox`] exposes the request operations over an [`EmailStore`] and a
//! [`BlobStore`]. It holds no state of its own besides configuration: every
//! operation is one conditional request to the store (plus, for delete, one
//! blob call). One deadline bounds each operation as a whole, however many
//! calls it makes. Failures are classified and returned; nothing is retried.
//!
//! Operations are plain futures, so a caller wanting a tighter deadline for
//! one request can wrap it in its own `tokio::time::timeout`.

mod list;
mod state;

use std::future::Future;

use tracing::{debug, info, warn};

use crate::blob::BlobStore;
use crate::config::MailboxConfig;
use crate::content::{self, Body, Disposition, Part};
use crate::model::Email;
use crate::store::EmailStore;
use crate::{Condition, Error, Result};

pub use list::{EmailSummary, ListPage, ListParams, ListQuery, Period};
pub use state::ReadAction;

/// Email record engine.
pub struct Mailbox<S, B> {
    store: S,
    blobs: B,
    config: MailboxConfig,
}

impl<S: EmailStore, B: BlobStore> Mailbox<S, B> {
    /// Creates an engine over the given stores.
    #[must_use]
    pub const fn new(store: S, blobs: B, config: MailboxConfig) -> Self {
        Self {
            store,
            blobs,
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &MailboxConfig {
        &self.config
    }

    /// Returns the record store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the blob store.
    #[must_use]
    pub const fn blobs(&self) -> &B {
        &self.blobs
    }

    /// Runs one operation under the configured deadline.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        body: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = self.config.operation_timeout();
        tokio::time::timeout(timeout, body).await.unwrap_or_else(|_| {
            warn!(operation, ?timeout, "deadline exceeded");
            Err(Error::Timeout(timeout))
        })
    }

    /// Fetches a record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record has this ID.
    pub async fn get(&self, message_id: &str) -> Result<Email> {
        check_message_id(message_id)?;
        self.bounded("get", async {
            let email = self.store.get(message_id).await?.ok_or(Error::NotFound)?;
            debug!(message_id, email_type = %email.email_type, "fetched email");
            Ok(email)
        })
        .await
    }

    /// Inserts a new record, deriving its index key in the same write.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the ID is taken and `InvalidInput` if the
    /// record lacks its governing timestamp.
    pub async fn create(&self, email: &Email) -> Result<()> {
        self.bounded("create", self.insert(email)).await
    }

    async fn insert(&self, email: &Email) -> Result<()> {
        check_message_id(&email.message_id)?;
        let (key, _) = email.index_key()?;
        self.store
            .insert(email)
            .await
            .map_err(|err| Error::from_conditional(err, Error::AlreadyExists))?;
        info!(message_id = %email.message_id, %key, "created email");
        Ok(())
    }

    /// Inserts a new record and stores its raw message.
    ///
    /// The record is written first so an existing message is never
    /// overwritten; if storing the raw bytes fails the record is removed.
    ///
    /// # Errors
    ///
    /// As [`create`](Self::create), plus blob storage failures. The blob
    /// failure is returned even if removing the record fails too.
    pub async fn create_with_raw(&self, email: &Email, raw: &[u8]) -> Result<()> {
        self.bounded("create_with_raw", async {
            self.insert(email).await?;
            let Err(err) = self.blobs.put(&email.message_id, raw).await else {
                return Ok(());
            };
            let err = Error::from(err);
            warn!(message_id = %email.message_id, error = %err, "raw message not stored, removing record");
            if let Err(rollback) = self.store.delete(&email.message_id, &Condition::new()).await {
                warn!(message_id = %email.message_id, error = %rollback, "record left without raw message");
            }
            Err(err)
        })
        .await
    }

    /// Returns the raw MIME message.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no raw message is stored under this ID.
    pub async fn raw(&self, message_id: &str) -> Result<Vec<u8>> {
        check_message_id(message_id)?;
        self.bounded("raw", async { Ok(self.blobs.get(message_id).await?) })
            .await
    }

    /// Decodes the raw message into bodies and a part listing.
    ///
    /// # Errors
    ///
    /// As [`raw`](Self::raw), plus `Mime` if the message cannot be decoded.
    pub async fn body(&self, message_id: &str) -> Result<Body> {
        let raw = self.raw(message_id).await?;
        content::parse_body(&raw)
    }

    /// Returns one attachment, inline or other part by `Content-ID`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown disposition and `NotFound` if
    /// no part matches.
    pub async fn part(&self, message_id: &str, disposition: &str, content_id: &str) -> Result<Part> {
        let disposition: Disposition = disposition.parse()?;
        let raw = self.raw(message_id).await?;
        let part = content::find_part(&raw, disposition, content_id)?;
        debug!(message_id, %disposition, content_id, "found part");
        Ok(part)
    }
}

fn check_message_id(message_id: &str) -> Result<()> {
    if message_id.trim().is_empty() {
        return Err(Error::InvalidInput("message ID must not be empty".into()));
    }
    Ok(())
}
