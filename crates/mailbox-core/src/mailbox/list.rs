//! Paged listing over the type/month index.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::Mailbox;
use crate::blob::BlobStore;
use crate::cursor::{self, SeekPosition};
use crate::key::{EmailType, TypeYearMonth, YearMonth, parse_digits};
use crate::model::Email;
use crate::store::{EmailStore, IndexQuery, Order};
use crate::{Error, Result};

/// Raw list request parameters. Empty strings mean "not given".
#[derive(Debug, Clone, Copy, Default)]
pub struct ListParams<'a> {
    /// `inbox`, `sent` or `draft`; empty lists all types.
    pub email_type: &'a str,
    /// Four-digit year.
    pub year: &'a str,
    /// Month, one or two digits. Requires `year`.
    pub month: &'a str,
    /// `asc` or `desc`.
    pub order: &'a str,
    /// Positive page size.
    pub page_size: &'a str,
    /// Cursor from a previous page.
    pub cursor: &'a str,
    /// List trashed records instead of active ones.
    pub trashed: bool,
}

/// Time range of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    /// No time filter.
    #[default]
    Any,
    /// One calendar year.
    Year(u16),
    /// One calendar month.
    Month(YearMonth),
}

/// A validated list request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListQuery {
    /// Type filter; `None` lists all types.
    pub email_type: Option<EmailType>,
    /// Time filter.
    pub period: Period,
    /// Scan direction.
    pub order: Order,
    /// Page size; `None` uses the configured default.
    pub page_size: Option<usize>,
    /// Resume after this position.
    pub cursor: Option<SeekPosition>,
    /// List trashed records instead of active ones.
    pub trashed: bool,
}

impl ListQuery {
    /// Validates raw request parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown type or order, a malformed
    /// year, month, page size or cursor, or a month without a year.
    pub fn from_params(params: ListParams<'_>) -> Result<Self> {
        let email_type = match params.email_type {
            "" => None,
            s => Some(s.parse::<EmailType>()?),
        };

        let year = match params.year {
            "" => None,
            s => Some(
                parse_digits(s, 4)
                    .filter(|y| (YearMonth::MIN_YEAR..=YearMonth::MAX_YEAR).contains(y))
                    .ok_or_else(|| Error::InvalidInput(format!("invalid year: {s:?}")))?,
            ),
        };
        let period = match (year, params.month) {
            (None, "") => Period::Any,
            (None, _) => return Err(Error::InvalidInput("month requires a year".into())),
            (Some(year), "") => Period::Year(year),
            (Some(year), s) => Period::Month(
                (1..=2)
                    .find_map(|len| parse_digits(s, len))
                    .and_then(|m| u8::try_from(m).ok())
                    .and_then(|m| YearMonth::new(year, m))
                    .ok_or_else(|| Error::InvalidInput(format!("invalid month: {s:?}")))?,
            ),
        };

        let order = Order::parse(params.order)
            .ok_or_else(|| Error::InvalidInput(format!("invalid order: {:?}", params.order)))?;

        let page_size = match params.page_size {
            "" => None,
            s => Some(
                Some(s)
                    .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
                    .and_then(|s| s.parse::<usize>().ok())
                    .filter(|&n| n > 0)
                    .ok_or_else(|| Error::InvalidInput(format!("invalid page size: {s:?}")))?,
            ),
        };

        Ok(Self {
            email_type,
            period,
            order,
            page_size,
            cursor: cursor::decode(params.cursor)?,
            trashed: params.trashed,
        })
    }

    /// Index key prefixes this query scans.
    #[must_use]
    pub fn key_prefixes(&self) -> Vec<String> {
        let types = self
            .email_type
            .map_or_else(|| EmailType::ALL.to_vec(), |t| vec![t]);
        types
            .into_iter()
            .map(|t| match self.period {
                Period::Any => t.key_prefix(),
                Period::Year(year) => t.year_prefix(year),
                Period::Month(year_month) => TypeYearMonth::new(t, year_month).to_string(),
            })
            .collect()
    }
}

/// List projection of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSummary {
    /// Primary key.
    #[serde(rename = "messageID")]
    pub message_id: String,
    /// Record type.
    #[serde(rename = "type")]
    pub email_type: EmailType,
    /// Receipt time of inbox emails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_received: Option<DateTime<Utc>>,
    /// Update time of sent emails and drafts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_updated: Option<DateTime<Utc>>,
    /// Trash time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trashed_time: Option<DateTime<Utc>>,
    /// Subject line.
    pub subject: String,
    /// `From` addresses.
    pub from: Vec<String>,
    /// `To` addresses.
    pub to: Vec<String>,
    /// Unread flag.
    pub unread: bool,
    /// Thread membership.
    #[serde(rename = "threadID", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl From<Email> for EmailSummary {
    fn from(email: Email) -> Self {
        Self {
            message_id: email.message_id,
            email_type: email.email_type,
            time_received: email.time_received,
            time_updated: email.time_updated,
            trashed_time: email.trashed_time,
            subject: email.content.subject,
            from: email.content.from,
            to: email.content.to,
            unread: email.unread,
            thread_id: email.thread_id,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    /// Number of items on this page.
    pub count: usize,
    /// Items in the requested order.
    pub items: Vec<EmailSummary>,
    /// Cursor for the next page; absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Whether another page follows.
    pub has_more: bool,
}

impl<S: EmailStore, B: BlobStore> Mailbox<S, B> {
    /// Returns one page of records matching `query`.
    ///
    /// Following `next_cursor` until it is absent visits every matching
    /// record exactly once, provided the index does not change meanwhile.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the page size exceeds the configured
    /// maximum and `TooManyRequests` if the store is throttling.
    pub async fn list(&self, query: &ListQuery) -> Result<ListPage> {
        let page_size = query.page_size.unwrap_or(self.config.default_page_size);
        if page_size == 0 || page_size > self.config.max_page_size {
            return Err(Error::InvalidInput(format!(
                "page size must be between 1 and {}",
                self.config.max_page_size
            )));
        }

        let index_query = IndexQuery {
            key_prefixes: query.key_prefixes(),
            trashed: query.trashed,
            order: query.order,
            limit: page_size,
            start_after: query.cursor.clone(),
        };
        let page = self
            .bounded("list", async { Ok(self.store.query(&index_query).await?) })
            .await?;

        let next_cursor = match page.items.last() {
            Some(last) if page.has_more => Some(cursor::encode(&SeekPosition::of(last)?)?),
            _ => None,
        };
        debug!(
            prefixes = ?index_query.key_prefixes,
            order = query.order.as_str(),
            count = page.items.len(),
            has_more = page.has_more,
            "listed emails"
        );

        Ok(ListPage {
            count: page.items.len(),
            has_more: next_cursor.is_some(),
            items: page.items.into_iter().map(EmailSummary::from).collect(),
            next_cursor,
        })
    }
}
