//! `SQLite` email store.
//!
//! One row per record. The secondary index is `(type_year_month, date_time,
//! message_id)`; presence-based attributes are nullable columns. Conditional
//! writes run as a single `UPDATE`/`DELETE` whose `WHERE` clause carries the
//! condition, inside a transaction that also distinguishes a missing row
//! from a failed check.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use tracing::debug;

use super::{EmailStore, IndexPage, IndexQuery, Order, StoreError, StoreResult};
use crate::condition::{Attribute, Condition, Predicate, Update};
use crate::key::TypeYearMonth;
use crate::model::{Email, EmailContent, format_time, parse_time};

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

const COLUMNS: &str = "message_id, type_year_month, time_received, time_updated, unread, \
                       trashed_time, thread_id, subject, date_sent, source, destination, \
                       from_addresses, to_addresses, return_path, body_text, body_html";

/// Store backed by a `SQLite` database.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> StoreResult<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> StoreResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS emails (
                message_id TEXT PRIMARY KEY NOT NULL,
                type_year_month TEXT NOT NULL,
                date_time TEXT NOT NULL,
                time_received TEXT,
                time_updated TEXT,
                unread INTEGER,
                trashed_time TEXT,
                thread_id TEXT,
                subject TEXT NOT NULL DEFAULT '',
                date_sent TEXT NOT NULL DEFAULT '',
                source TEXT NOT NULL DEFAULT '',
                destination TEXT NOT NULL DEFAULT '[]',
                from_addresses TEXT NOT NULL DEFAULT '[]',
                to_addresses TEXT NOT NULL DEFAULT '[]',
                return_path TEXT NOT NULL DEFAULT '',
                body_text TEXT NOT NULL DEFAULT '',
                body_html TEXT NOT NULL DEFAULT ''
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Secondary index for type/month scoped scans
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_emails_type_year_month
            ON emails(type_year_month, date_time, message_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        // Chronological scans across types
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_emails_date_time
            ON emails(date_time, message_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Runs a conditional statement and classifies a zero-row outcome.
    async fn execute_conditional(
        &self,
        sql: &str,
        params: Vec<String>,
        message_id: &str,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param);
        }
        let result = query.execute(&mut *tx).await?;

        if result.rows_affected() == 0 {
            let exists = row_exists(&mut tx, message_id).await?;
            tx.rollback().await?;
            debug!(message_id, exists, "conditional write rejected");
            return Err(if exists {
                StoreError::ConditionFailed
            } else {
                StoreError::NotFound
            });
        }

        tx.commit().await?;
        Ok(())
    }
}

impl EmailStore for SqliteStore {
    async fn get(&self, message_id: &str) -> StoreResult<Option<Email>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM emails WHERE message_id = ?"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_email).transpose()
    }

    async fn insert(&self, email: &Email) -> StoreResult<()> {
        let (key, date_time) = email
            .index_key()
            .map_err(|e| StoreError::InvalidItem(e.to_string()))?;
        let content = &email.content;

        let result = sqlx::query(
            r"
            INSERT INTO emails
                (message_id, type_year_month, date_time, time_received, time_updated, unread,
                 trashed_time, thread_id, subject, date_sent, source, destination,
                 from_addresses, to_addresses, return_path, body_text, body_html)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(message_id) DO NOTHING
            ",
        )
        .bind(&email.message_id)
        .bind(key.to_string())
        .bind(format_time(&date_time))
        .bind(email.time_received.as_ref().map(format_time))
        .bind(email.time_updated.as_ref().map(format_time))
        .bind(email.unread.then_some(1_i64))
        .bind(email.trashed_time.as_ref().map(format_time))
        .bind(&email.thread_id)
        .bind(&content.subject)
        .bind(&content.date_sent)
        .bind(&content.source)
        .bind(to_json(&content.destination)?)
        .bind(to_json(&content.from)?)
        .bind(to_json(&content.to)?)
        .bind(&content.return_path)
        .bind(&content.text)
        .bind(&content.html)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ConditionFailed);
        }
        Ok(())
    }

    async fn update(
        &self,
        message_id: &str,
        update: &Update,
        condition: &Condition,
    ) -> StoreResult<()> {
        let mut params = Vec::new();
        let assignments = update_sql(update, &mut params)?;
        params.push(message_id.to_string());
        let predicate = condition_sql(condition, &mut params);

        let sql = format!("UPDATE emails SET {assignments} WHERE message_id = ? AND {predicate}");
        self.execute_conditional(&sql, params, message_id).await
    }

    async fn delete(&self, message_id: &str, condition: &Condition) -> StoreResult<()> {
        let mut params = vec![message_id.to_string()];
        let predicate = condition_sql(condition, &mut params);

        let sql = format!("DELETE FROM emails WHERE message_id = ? AND {predicate}");
        self.execute_conditional(&sql, params, message_id).await
    }

    async fn query(&self, query: &IndexQuery) -> StoreResult<IndexPage> {
        let mut params = Vec::new();
        let key_filter = if query.key_prefixes.is_empty() {
            "0".to_string()
        } else {
            let alternatives: Vec<String> = query
                .key_prefixes
                .iter()
                .map(|prefix| prefix_sql(prefix, "=", &mut params))
                .collect();
            format!("({})", alternatives.join(" OR "))
        };
        let trash_filter = if query.trashed {
            "trashed_time IS NOT NULL"
        } else {
            "trashed_time IS NULL"
        };
        let (comparison, direction) = match query.order {
            Order::Asc => (">", "ASC"),
            Order::Desc => ("<", "DESC"),
        };
        let seek = match &query.start_after {
            Some(position) => {
                params.push(format_time(&position.date_time));
                params.push(position.message_id.clone());
                format!(" AND (date_time, message_id) {comparison} (?, ?)")
            }
            None => String::new(),
        };
        let fetch = query.limit.saturating_add(1);

        let sql = format!(
            "SELECT {COLUMNS} FROM emails \
             WHERE {key_filter} AND {trash_filter}{seek} \
             ORDER BY date_time {direction}, message_id {direction} \
             LIMIT {fetch}"
        );

        let mut statement = sqlx::query(&sql);
        for param in params {
            statement = statement.bind(param);
        }
        let rows = statement.fetch_all(&self.pool).await?;

        let has_more = rows.len() > query.limit;
        let items = rows
            .iter()
            .take(query.limit)
            .map(row_to_email)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(IndexPage { items, has_more })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_throttled(&err) {
            Self::Throttled
        } else {
            Self::Database(err)
        }
    }
}

/// Busy/locked database or an exhausted pool means the store is over capacity.
fn is_throttled(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
        _ => false,
    }
}

async fn row_exists(tx: &mut Transaction<'_, Sqlite>, message_id: &str) -> StoreResult<bool> {
    let row = sqlx::query("SELECT 1 FROM emails WHERE message_id = ?")
        .bind(message_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.is_some())
}

const fn column(attribute: Attribute) -> &'static str {
    match attribute {
        Attribute::Unread => "unread",
        Attribute::TrashedTime => "trashed_time",
        Attribute::ThreadId => "thread_id",
    }
}

fn prefix_sql(prefix: &str, operator: &str, params: &mut Vec<String>) -> String {
    params.push(prefix.to_string());
    format!("substr(type_year_month, 1, {}) {operator} ?", prefix.len())
}

fn predicate_sql(predicate: &Predicate, params: &mut Vec<String>) -> String {
    match predicate {
        Predicate::Exists(attr) => format!("{} IS NOT NULL", column(*attr)),
        Predicate::NotExists(attr) => format!("{} IS NULL", column(*attr)),
        Predicate::TypeIs(t) => prefix_sql(&t.key_prefix(), "=", params),
        Predicate::TypeIsNot(t) => prefix_sql(&t.key_prefix(), "<>", params),
        Predicate::AnyOf(any) if any.is_empty() => "0".to_string(),
        Predicate::AnyOf(any) => {
            let alternatives: Vec<String> =
                any.iter().map(|p| predicate_sql(p, params)).collect();
            format!("({})", alternatives.join(" OR "))
        }
    }
}

fn condition_sql(condition: &Condition, params: &mut Vec<String>) -> String {
    if condition.predicates().is_empty() {
        return "1".to_string();
    }
    let clauses: Vec<String> = condition
        .predicates()
        .iter()
        .map(|p| predicate_sql(p, params))
        .collect();
    clauses.join(" AND ")
}

fn update_sql(update: &Update, params: &mut Vec<String>) -> StoreResult<String> {
    let sql = match update {
        Update::SetUnread => "unread = 1".to_string(),
        Update::RemoveUnread => "unread = NULL".to_string(),
        Update::SetTrashed(at) => {
            params.push(format_time(at));
            "trashed_time = ?".to_string()
        }
        Update::RemoveTrashed => "trashed_time = NULL".to_string(),
        Update::ReviseDraft {
            content,
            updated_at,
        } => {
            let (key, date_time) = update
                .index_key()
                .map_err(|e| StoreError::InvalidItem(e.to_string()))?
                .ok_or_else(|| StoreError::InvalidItem("draft revision has no key".into()))?;
            params.extend([
                content.subject.clone(),
                content.date_sent.clone(),
                content.source.clone(),
                to_json(&content.destination)?,
                to_json(&content.from)?,
                to_json(&content.to)?,
                content.return_path.clone(),
                content.text.clone(),
                content.html.clone(),
                format_time(updated_at),
                key.to_string(),
                format_time(&date_time),
            ]);
            "subject = ?, date_sent = ?, source = ?, destination = ?, from_addresses = ?, \
             to_addresses = ?, return_path = ?, body_text = ?, body_html = ?, \
             time_updated = ?, type_year_month = ?, date_time = ?"
                .to_string()
        }
    };
    Ok(sql)
}

fn to_json(list: &[String]) -> StoreResult<String> {
    serde_json::to_string(list).map_err(|e| StoreError::InvalidItem(e.to_string()))
}

fn row_to_email(row: &SqliteRow) -> StoreResult<Email> {
    let message_id: String = row.try_get("message_id")?;
    let corrupt = |reason: String| StoreError::Corrupt {
        message_id: message_id.clone(),
        reason,
    };

    let key: String = row.try_get("type_year_month")?;
    let key = TypeYearMonth::parse(&key).map_err(|e| corrupt(e.to_string()))?;

    let time = |column: &str| -> StoreResult<Option<DateTime<Utc>>> {
        row.try_get::<Option<String>, _>(column)?
            .map(|s| parse_time(&s).map_err(|e| corrupt(e.to_string())))
            .transpose()
    };
    let list = |column: &str| -> StoreResult<Vec<String>> {
        let json: String = row.try_get(column)?;
        serde_json::from_str(&json).map_err(|e| corrupt(e.to_string()))
    };

    Ok(Email {
        message_id: message_id.clone(),
        email_type: key.email_type(),
        time_received: time("time_received")?,
        time_updated: time("time_updated")?,
        unread: row.try_get::<Option<i64>, _>("unread")?.is_some(),
        trashed_time: time("trashed_time")?,
        thread_id: row.try_get("thread_id")?,
        content: EmailContent {
            subject: row.try_get("subject")?,
            date_sent: row.try_get("date_sent")?,
            source: row.try_get("source")?,
            destination: list("destination")?,
            from: list("from_addresses")?,
            to: list("to_addresses")?,
            return_path: row.try_get("return_path")?,
            text: row.try_get("body_text")?,
            html: row.try_get("body_html")?,
        },
    })
}
