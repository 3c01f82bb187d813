//! Integration tests for the mailbox engine.
//!
//! These run the public operations against both store backends and against
//! stores that misbehave (throttling, hanging, slow, failing).

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio::time::{Instant, sleep};

use mailbox_core::{
    BlobError, BlobStore, Condition, Email, EmailContent, EmailStore, EmailType, Error,
    FsBlobStore, IndexPage, IndexQuery, ListParams, ListQuery, Mailbox, MailboxConfig,
    MemoryStore, ReadAction, SqliteStore, StoreError, Update,
};

/// Store that reports every request as throttled.
struct ThrottledStore;

impl EmailStore for ThrottledStore {
    async fn get(&self, _: &str) -> Result<Option<Email>, StoreError> {
        Err(StoreError::Throttled)
    }

    async fn insert(&self, _: &Email) -> Result<(), StoreError> {
        Err(StoreError::Throttled)
    }

    async fn update(&self, _: &str, _: &Update, _: &Condition) -> Result<(), StoreError> {
        Err(StoreError::Throttled)
    }

    async fn delete(&self, _: &str, _: &Condition) -> Result<(), StoreError> {
        Err(StoreError::Throttled)
    }

    async fn query(&self, _: &IndexQuery) -> Result<IndexPage, StoreError> {
        Err(StoreError::Throttled)
    }
}

/// Store that never answers within a minute.
struct HangingStore;

impl HangingStore {
    async fn hang() {
        sleep(Duration::from_secs(60)).await;
    }
}

impl EmailStore for HangingStore {
    async fn get(&self, _: &str) -> Result<Option<Email>, StoreError> {
        Self::hang().await;
        Ok(None)
    }

    async fn insert(&self, _: &Email) -> Result<(), StoreError> {
        Self::hang().await;
        Ok(())
    }

    async fn update(&self, _: &str, _: &Update, _: &Condition) -> Result<(), StoreError> {
        Self::hang().await;
        Ok(())
    }

    async fn delete(&self, _: &str, _: &Condition) -> Result<(), StoreError> {
        Self::hang().await;
        Ok(())
    }

    async fn query(&self, _: &IndexQuery) -> Result<IndexPage, StoreError> {
        Self::hang().await;
        Ok(IndexPage::default())
    }
}

/// Store that accepts every request after a fixed delay and keeps nothing.
struct SlowStore(Duration);

impl EmailStore for SlowStore {
    async fn get(&self, _: &str) -> Result<Option<Email>, StoreError> {
        sleep(self.0).await;
        Ok(None)
    }

    async fn insert(&self, _: &Email) -> Result<(), StoreError> {
        sleep(self.0).await;
        Ok(())
    }

    async fn update(&self, _: &str, _: &Update, _: &Condition) -> Result<(), StoreError> {
        sleep(self.0).await;
        Ok(())
    }

    async fn delete(&self, _: &str, _: &Condition) -> Result<(), StoreError> {
        sleep(self.0).await;
        Ok(())
    }

    async fn query(&self, _: &IndexQuery) -> Result<IndexPage, StoreError> {
        sleep(self.0).await;
        Ok(IndexPage::default())
    }
}

/// Blob store that accepts every request after a fixed delay and keeps nothing.
struct SlowBlobs(Duration);

impl BlobStore for SlowBlobs {
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        sleep(self.0).await;
        Err(BlobError::NotFound(key.to_string()))
    }

    async fn put(&self, _: &str, _: &[u8]) -> Result<(), BlobError> {
        sleep(self.0).await;
        Ok(())
    }

    async fn delete(&self, _: &str) -> Result<(), BlobError> {
        sleep(self.0).await;
        Ok(())
    }
}

/// Store that accepts inserts and throttles everything else.
struct InsertOnlyStore;

impl EmailStore for InsertOnlyStore {
    async fn get(&self, _: &str) -> Result<Option<Email>, StoreError> {
        Err(StoreError::Throttled)
    }

    async fn insert(&self, _: &Email) -> Result<(), StoreError> {
        Ok(())
    }

    async fn update(&self, _: &str, _: &Update, _: &Condition) -> Result<(), StoreError> {
        Err(StoreError::Throttled)
    }

    async fn delete(&self, _: &str, _: &Condition) -> Result<(), StoreError> {
        Err(StoreError::Throttled)
    }

    async fn query(&self, _: &IndexQuery) -> Result<IndexPage, StoreError> {
        Err(StoreError::Throttled)
    }
}

/// Blob store whose disk is full.
struct FullBlobs;

impl BlobStore for FullBlobs {
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        Err(BlobError::NotFound(key.to_string()))
    }

    async fn put(&self, _: &str, _: &[u8]) -> Result<(), BlobError> {
        Err(BlobError::Io(std::io::Error::other("no space left on device")))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        Err(BlobError::NotFound(key.to_string()))
    }
}

async fn mailbox_with<S: EmailStore>(store: S, dir: &TempDir) -> Mailbox<S, FsBlobStore> {
    let blobs = FsBlobStore::open(dir.path().join("raw")).await.unwrap();
    Mailbox::new(store, blobs, MailboxConfig::default())
}

fn time(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, month, day, 9, 0, 0).unwrap()
}

fn content(subject: &str) -> EmailContent {
    EmailContent {
        subject: subject.to_string(),
        from: vec!["alice@example.com".to_string()],
        to: vec!["bob@example.com".to_string()],
        ..EmailContent::default()
    }
}

/// Creates 30 records over three types and two months, several sharing a
/// timestamp, and trashes some of them. Returns the records as stored.
async fn populate<S: EmailStore>(mailbox: &Mailbox<S, FsBlobStore>) -> Vec<Email> {
    let mut emails = Vec::new();
    for i in 0..30_u32 {
        let id = format!("m{i:02}");
        let at = time(1 + i % 2, 1 + i / 4);
        let email = match i % 3 {
            0 => Email::inbox(id, at, content("in")),
            1 => Email::sent(id, at, content("out")),
            _ => Email::draft(id, at, content("draft")),
        };
        mailbox.create(&email).await.unwrap();
        emails.push(email);
    }
    for email in &mut emails {
        if email.email_type != EmailType::Draft && email.message_id.ends_with(['0', '7']) {
            mailbox.trash(&email.message_id).await.unwrap();
            email.trashed_time = mailbox.get(&email.message_id).await.unwrap().trashed_time;
        }
    }
    emails
}

/// Follows cursors until the last page and returns every listed ID.
async fn list_all<S: EmailStore>(
    mailbox: &Mailbox<S, FsBlobStore>,
    params: ListParams<'_>,
) -> Vec<String> {
    let mut ids = Vec::new();
    let mut cursor = String::new();
    loop {
        let query = ListQuery::from_params(ListParams {
            cursor: &cursor,
            ..params
        })
        .unwrap();
        let page = mailbox.list(&query).await.unwrap();
        assert_eq!(page.count, page.items.len());
        assert_eq!(page.has_more, page.next_cursor.is_some());
        ids.extend(page.items.into_iter().map(|e| e.message_id));
        match page.next_cursor {
            Some(next) => cursor = next,
            None => break,
        }
    }
    ids
}

fn expected(emails: &[Email], keep: impl Fn(&Email) -> bool, descending: bool) -> Vec<String> {
    let mut matching: Vec<&Email> = emails.iter().filter(|e| keep(e)).collect();
    matching.sort_by(|a, b| {
        (a.timestamp(), &a.message_id).cmp(&(b.timestamp(), &b.message_id))
    });
    if descending {
        matching.reverse();
    }
    matching.into_iter().map(|e| e.message_id.clone()).collect()
}

async fn assert_paging_is_exhaustive<S: EmailStore>(mailbox: &Mailbox<S, FsBlobStore>) {
    let emails = populate(mailbox).await;

    for (order, descending) in [("asc", false), ("desc", true)] {
        for page_size in ["1", "4", "7", "100"] {
            let params = ListParams {
                order,
                page_size,
                ..ListParams::default()
            };
            assert_eq!(
                list_all(mailbox, params).await,
                expected(&emails, |e| !e.is_trashed(), descending),
                "order={order} page_size={page_size}"
            );

            let params = ListParams {
                email_type: "inbox",
                year: "2021",
                month: "2",
                order,
                page_size,
                ..ListParams::default()
            };
            assert_eq!(
                list_all(mailbox, params).await,
                expected(
                    &emails,
                    |e| e.email_type == EmailType::Inbox
                        && !e.is_trashed()
                        && e.timestamp().is_some_and(|t| t >= time(2, 1)),
                    descending
                ),
                "inbox February, order={order} page_size={page_size}"
            );

            let params = ListParams {
                order,
                page_size,
                trashed: true,
                ..ListParams::default()
            };
            assert_eq!(
                list_all(mailbox, params).await,
                expected(&emails, Email::is_trashed, descending),
                "trash, order={order} page_size={page_size}"
            );
        }
    }

    let params = ListParams {
        year: "2020",
        ..ListParams::default()
    };
    assert!(list_all(mailbox, params).await.is_empty());
}

#[tokio::test]
async fn test_paging_memory_store() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = mailbox_with(MemoryStore::new(), &dir).await;
    assert_paging_is_exhaustive(&mailbox).await;
}

#[tokio::test]
async fn test_paging_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = mailbox_with(SqliteStore::in_memory().await.unwrap(), &dir).await;
    assert_paging_is_exhaustive(&mailbox).await;
}

#[tokio::test]
async fn test_read_example() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = mailbox_with(SqliteStore::in_memory().await.unwrap(), &dir).await;
    mailbox
        .create(&Email::inbox("m1", time(1, 5), content("Hello")))
        .await
        .unwrap();

    let page = mailbox
        .list(
            &ListQuery::from_params(ListParams {
                email_type: "inbox",
                year: "2021",
                month: "01",
                ..ListParams::default()
            })
            .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(page.count, 1);
    assert!(page.items[0].unread);

    mailbox.read("m1", ReadAction::Read).await.unwrap();
    assert!(matches!(
        mailbox.read("m1", ReadAction::Read).await,
        Err(Error::ReadActionFailed)
    ));
}

#[tokio::test]
async fn test_concurrent_reads_race_on_condition() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = mailbox_with(SqliteStore::in_memory().await.unwrap(), &dir).await;
    mailbox
        .create(&Email::inbox("m1", time(1, 5), content("Hello")))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        mailbox.read("m1", ReadAction::Read),
        mailbox.read("m1", ReadAction::Read)
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(Error::ReadActionFailed)))
    );
}

#[tokio::test]
async fn test_untrash_and_delete_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = mailbox_with(SqliteStore::in_memory().await.unwrap(), &dir).await;
    let raw = b"Subject: hi\r\n\r\nbody";

    mailbox
        .create_with_raw(&Email::inbox("m1", time(1, 5), content("a")), raw)
        .await
        .unwrap();
    mailbox
        .create_with_raw(
            &Email::inbox("m2", time(1, 6), content("b")).with_thread("t1"),
            raw,
        )
        .await
        .unwrap();
    mailbox
        .create(&Email::inbox("m3", time(1, 7), content("c")))
        .await
        .unwrap();

    assert!(matches!(
        mailbox.untrash("m1").await,
        Err(Error::NotTrashed { kind: "email" })
    ));
    mailbox.trash("m1").await.unwrap();
    mailbox.untrash("m1").await.unwrap();
    assert!(mailbox.get("m1").await.unwrap().trashed_time.is_none());

    // Threaded records stay even when trashed.
    mailbox.trash("m2").await.unwrap();
    assert!(matches!(
        mailbox.delete("m2").await,
        Err(Error::NotTrashed { kind: "email" })
    ));
    assert_eq!(mailbox.raw("m2").await.unwrap(), raw);

    mailbox.trash("m1").await.unwrap();
    mailbox.delete("m1").await.unwrap();
    assert!(matches!(mailbox.get("m1").await, Err(Error::NotFound)));
    assert!(matches!(mailbox.raw("m1").await, Err(Error::NotFound)));

    // No raw message: the record goes, the missing blob is reported.
    mailbox.trash("m3").await.unwrap();
    assert!(matches!(mailbox.delete("m3").await, Err(Error::NotFound)));
    assert!(matches!(mailbox.get("m3").await, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_throttling_is_too_many_requests() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = mailbox_with(ThrottledStore, &dir).await;

    let results = [
        mailbox.get("m1").await.map(|_| ()),
        mailbox.read("m1", ReadAction::Read).await,
        mailbox.trash("m1").await,
        mailbox.untrash("m1").await,
        mailbox.delete("m1").await,
        mailbox
            .list(&ListQuery::default())
            .await
            .map(|_| ()),
    ];
    for result in results {
        let err = result.unwrap_err();
        assert!(matches!(err, Error::TooManyRequests), "{err}");
        assert!(err.is_transient());
    }
}

#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_store_calls() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = FsBlobStore::open(dir.path()).await.unwrap();
    let config = MailboxConfig::default().with_operation_timeout(Duration::from_secs(2));
    let mailbox = Mailbox::new(HangingStore, blobs, config);

    assert!(matches!(
        mailbox.read("m1", ReadAction::Unread).await,
        Err(Error::Timeout(d)) if d == Duration::from_secs(2)
    ));
    assert!(matches!(
        mailbox.list(&ListQuery::default()).await,
        Err(Error::Timeout(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_covers_whole_operation() {
    let step = Duration::from_millis(1500);
    let email = Email::inbox("m1", time(1, 5), content("slow"));

    let config = MailboxConfig::default().with_operation_timeout(Duration::from_secs(2));
    let mailbox = Mailbox::new(SlowStore(step), SlowBlobs(step), config);

    let start = Instant::now();
    assert!(matches!(
        mailbox.delete("m1").await,
        Err(Error::Timeout(d)) if d == Duration::from_secs(2)
    ));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2) && elapsed < step * 2, "{elapsed:?}");

    assert!(matches!(
        mailbox.create_with_raw(&email, b"raw").await,
        Err(Error::Timeout(_))
    ));

    let config = MailboxConfig::default().with_operation_timeout(Duration::from_secs(4));
    let mailbox = Mailbox::new(SlowStore(step), SlowBlobs(step), config);
    mailbox.delete("m1").await.unwrap();
    mailbox.create_with_raw(&email, b"raw").await.unwrap();
}

#[tokio::test]
async fn test_failed_rollback_reports_blob_error() {
    let mailbox = Mailbox::new(InsertOnlyStore, FullBlobs, MailboxConfig::default());
    let email = Email::inbox("m1", time(1, 5), content("lost"));

    let err = mailbox.create_with_raw(&email, b"raw").await.unwrap_err();
    assert!(matches!(err, Error::Blob(BlobError::Io(_))), "{err}");
}

#[tokio::test]
async fn test_invalid_list_requests() {
    let dir = tempfile::tempdir().unwrap();
    let mailbox = mailbox_with(MemoryStore::new(), &dir).await;

    let too_large = ListQuery::from_params(ListParams {
        page_size: "1001",
        ..ListParams::default()
    })
    .unwrap();
    assert!(matches!(
        mailbox.list(&too_large).await,
        Err(Error::InvalidInput(_))
    ));

    let garbage = ListQuery::from_params(ListParams {
        cursor: "definitely-not-a-cursor",
        ..ListParams::default()
    });
    assert!(matches!(garbage, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn test_sqlite_store_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mailbox.db");
    let path = path.to_str().unwrap();

    {
        let mailbox = mailbox_with(SqliteStore::new(path).await.unwrap(), &dir).await;
        mailbox
            .create(&Email::inbox("m1", time(1, 5), content("kept")))
            .await
            .unwrap();
        mailbox.read("m1", ReadAction::Read).await.unwrap();
    }

    let mailbox = mailbox_with(SqliteStore::new(path).await.unwrap(), &dir).await;
    let email = mailbox.get("m1").await.unwrap();
    assert_eq!(email.content.subject, "kept");
    assert!(!email.unread);
}
