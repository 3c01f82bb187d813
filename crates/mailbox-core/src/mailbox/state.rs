//! Lifecycle transitions.
//!
//! Each transition is one conditional write; the condition both checks the
//! record's state and guards the change. When it does not hold, the
//! operation's own domain error is returned and the record is untouched.

use std::str::FromStr;

use chrono::Utc;
use tracing::{debug, info};

use super::{Mailbox, check_message_id};
use crate::blob::BlobStore;
use crate::condition::{Condition, Update};
use crate::key::EmailType;
use crate::model::EmailContent;
use crate::store::EmailStore;
use crate::{Error, Result};

/// Read state toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAction {
    /// Mark as read.
    Read,
    /// Mark as unread.
    Unread,
}

impl FromStr for ReadAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(Self::Read),
            "unread" => Ok(Self::Unread),
            _ => Err(Error::InvalidInput(format!("invalid read action: {s:?}"))),
        }
    }
}

impl<S: EmailStore, B: BlobStore> Mailbox<S, B> {
    async fn conditional_update(
        &self,
        operation: &'static str,
        message_id: &str,
        update: &Update,
        condition: &Condition,
        on_condition: Error,
    ) -> Result<()> {
        check_message_id(message_id)?;
        self.store
            .update(message_id, update, condition)
            .await
            .map_err(|err| {
                debug!(message_id, operation, %condition, error = %err, "update rejected");
                Error::from_conditional(err, on_condition)
            })?;
        info!(message_id, operation, %update, "updated email");
        Ok(())
    }

    /// Marks an eligible record read or unread.
    ///
    /// # Errors
    ///
    /// Returns `ReadActionFailed` if the record is already in that state or
    /// its type is not eligible, and `NotFound` if it does not exist.
    pub async fn read(&self, message_id: &str, action: ReadAction) -> Result<()> {
        let eligible = &self.config.read_eligible_types;
        let (update, condition) = match action {
            ReadAction::Read => (Update::RemoveUnread, Condition::read(eligible)),
            ReadAction::Unread => (Update::SetUnread, Condition::unread(eligible)),
        };
        self.bounded(
            "read",
            self.conditional_update("read", message_id, &update, &condition, Error::ReadActionFailed),
        )
        .await
    }

    /// Moves a record to the trash.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyTrashed` if the record is trashed and `NotTrashable`
    /// if it is a draft.
    pub async fn trash(&self, message_id: &str) -> Result<()> {
        self.bounded("trash", async {
            let result = self
                .conditional_update(
                    "trash",
                    message_id,
                    &Update::SetTrashed(Utc::now()),
                    &Condition::trash(),
                    Error::AlreadyTrashed { kind: "email" },
                )
                .await;
            match result {
                Err(Error::AlreadyTrashed { .. }) => {}
                other => return other,
            }
            // The failed condition does not say which clause was false.
            match self.store.get(message_id).await? {
                Some(email) if email.email_type == EmailType::Draft => {
                    Err(Error::NotTrashable { kind: "email" })
                }
                Some(_) => Err(Error::AlreadyTrashed { kind: "email" }),
                None => Err(Error::NotFound),
            }
        })
        .await
    }

    /// Restores a record from the trash.
    ///
    /// # Errors
    ///
    /// Returns `NotTrashed` if the record is not trashed or is a draft.
    pub async fn untrash(&self, message_id: &str) -> Result<()> {
        self.bounded(
            "untrash",
            self.conditional_update(
                "untrash",
                message_id,
                &Update::RemoveTrashed,
                &Condition::untrash(),
                Error::NotTrashed { kind: "email" },
            ),
        )
        .await
    }

    /// Replaces a draft's content, moving it to the current month.
    ///
    /// # Errors
    ///
    /// Returns `NotDraft` if the record is not an active draft.
    pub async fn save_draft(&self, message_id: &str, content: EmailContent) -> Result<()> {
        let update = Update::ReviseDraft {
            content: Box::new(content),
            updated_at: Utc::now(),
        };
        self.bounded(
            "save_draft",
            self.conditional_update(
                "save_draft",
                message_id,
                &update,
                &Condition::revise_draft(),
                Error::NotDraft,
            ),
        )
        .await
    }

    /// Permanently removes a trashed record or a draft, then its raw message.
    ///
    /// # Errors
    ///
    /// Returns `NotTrashed` if the record is active and not a draft, or
    /// belongs to a thread. Returns `NotFound` if the record or its raw
    /// message does not exist. The deadline covers both deletions.
    pub async fn delete(&self, message_id: &str) -> Result<()> {
        check_message_id(message_id)?;
        let condition = Condition::delete();
        self.bounded("delete", async {
            self.store
                .delete(message_id, &condition)
                .await
                .map_err(|err| {
                    debug!(message_id, %condition, error = %err, "delete rejected");
                    Error::from_conditional(err, Error::NotTrashed { kind: "email" })
                })?;
            info!(message_id, "deleted email");
            Ok(self.blobs.delete(message_id).await?)
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::blob::FsBlobStore;
    use crate::config::MailboxConfig;
    use crate::model::Email;
    use crate::store::MemoryStore;

    async fn setup(
        dir: &tempfile::TempDir,
        config: MailboxConfig,
    ) -> Mailbox<MemoryStore, FsBlobStore> {
        let blobs = FsBlobStore::open(dir.path()).await.unwrap();
        Mailbox::new(MemoryStore::new(), blobs, config)
    }

    fn at(day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, day, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_read_action_parse() {
        assert_eq!("read".parse::<ReadAction>().unwrap(), ReadAction::Read);
        assert_eq!("unread".parse::<ReadAction>().unwrap(), ReadAction::Unread);
        assert!(matches!(
            "Read".parse::<ReadAction>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_read_toggles() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = setup(&dir, MailboxConfig::default()).await;
        mailbox
            .create(&Email::inbox("m1", at(5), EmailContent::default()))
            .await
            .unwrap();

        mailbox.read("m1", ReadAction::Read).await.unwrap();
        assert!(!mailbox.get("m1").await.unwrap().unread);
        assert!(matches!(
            mailbox.read("m1", ReadAction::Read).await,
            Err(Error::ReadActionFailed)
        ));

        mailbox.read("m1", ReadAction::Unread).await.unwrap();
        assert!(mailbox.get("m1").await.unwrap().unread);
        assert!(matches!(
            mailbox.read("m1", ReadAction::Unread).await,
            Err(Error::ReadActionFailed)
        ));

        assert!(matches!(
            mailbox.read("m9", ReadAction::Read).await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_read_respects_eligible_types() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = setup(&dir, MailboxConfig::default()).await;
        mailbox
            .create(&Email::sent("s1", at(5), EmailContent::default()))
            .await
            .unwrap();
        assert!(matches!(
            mailbox.read("s1", ReadAction::Unread).await,
            Err(Error::ReadActionFailed)
        ));

        let dir = tempfile::tempdir().unwrap();
        let config = MailboxConfig::default()
            .with_read_eligible_types([EmailType::Inbox, EmailType::Sent]);
        let mailbox = setup(&dir, config).await;
        mailbox
            .create(&Email::sent("s1", at(5), EmailContent::default()))
            .await
            .unwrap();
        mailbox.read("s1", ReadAction::Unread).await.unwrap();
    }

    #[tokio::test]
    async fn test_trash_and_untrash() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = setup(&dir, MailboxConfig::default()).await;
        mailbox
            .create(&Email::inbox("m1", at(5), EmailContent::default()))
            .await
            .unwrap();
        mailbox
            .create(&Email::draft("d1", at(5), EmailContent::default()))
            .await
            .unwrap();

        assert!(matches!(
            mailbox.untrash("m1").await,
            Err(Error::NotTrashed { kind: "email" })
        ));

        mailbox.trash("m1").await.unwrap();
        assert!(mailbox.get("m1").await.unwrap().is_trashed());
        assert!(matches!(
            mailbox.trash("m1").await,
            Err(Error::AlreadyTrashed { .. })
        ));

        mailbox.untrash("m1").await.unwrap();
        assert!(!mailbox.get("m1").await.unwrap().is_trashed());

        assert!(matches!(
            mailbox.trash("d1").await,
            Err(Error::NotTrashable { kind: "email" })
        ));
        assert!(!mailbox.get("d1").await.unwrap().is_trashed());
        assert!(matches!(mailbox.trash("m9").await, Err(Error::NotFound)));
        assert!(matches!(
            mailbox.untrash("d1").await,
            Err(Error::NotTrashed { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_draft() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = setup(&dir, MailboxConfig::default()).await;
        mailbox
            .create(&Email::draft("d1", at(5), EmailContent::default()))
            .await
            .unwrap();
        mailbox
            .create(&Email::inbox("m1", at(5), EmailContent::default()))
            .await
            .unwrap();

        let content = EmailContent {
            subject: "Revised".to_string(),
            ..EmailContent::default()
        };
        mailbox.save_draft("d1", content.clone()).await.unwrap();
        let draft = mailbox.get("d1").await.unwrap();
        assert_eq!(draft.content, content);
        assert!(draft.time_updated.unwrap() > at(5));

        assert!(matches!(
            mailbox.save_draft("m1", content.clone()).await,
            Err(Error::NotDraft)
        ));
        assert!(matches!(
            mailbox.save_draft("d9", content).await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = setup(&dir, MailboxConfig::default()).await;
        mailbox
            .create_with_raw(&Email::inbox("m1", at(5), EmailContent::default()), b"raw")
            .await
            .unwrap();
        mailbox
            .create_with_raw(&Email::draft("d1", at(5), EmailContent::default()), b"raw")
            .await
            .unwrap();

        assert!(matches!(
            mailbox.delete("m1").await,
            Err(Error::NotTrashed { kind: "email" })
        ));

        mailbox.trash("m1").await.unwrap();
        mailbox.delete("m1").await.unwrap();
        assert!(matches!(mailbox.get("m1").await, Err(Error::NotFound)));
        assert!(matches!(mailbox.raw("m1").await, Err(Error::NotFound)));
        assert!(matches!(mailbox.delete("m1").await, Err(Error::NotFound)));

        mailbox.delete("d1").await.unwrap();
        assert!(mailbox.store().is_empty().await);
    }
}
