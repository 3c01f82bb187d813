//! Email record model.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::key::{EmailType, TypeYearMonth};
use crate::{Error, Result};

/// Opaque payload of an email. The core never interprets these fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailContent {
    /// Subject line.
    pub subject: String,
    /// `Date` header as sent.
    pub date_sent: String,
    /// Envelope sender.
    pub source: String,
    /// Envelope recipients.
    pub destination: Vec<String>,
    /// `From` addresses.
    pub from: Vec<String>,
    /// `To` addresses.
    pub to: Vec<String>,
    /// `Return-Path` address.
    pub return_path: String,
    /// Plain text body.
    pub text: String,
    /// HTML body.
    pub html: String,
}

/// An email record as stored.
///
/// `unread` and `trashed_time` mirror presence-based store attributes:
/// the attribute exists exactly when the field is `true`/`Some`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    /// Primary key.
    #[serde(rename = "messageID")]
    pub message_id: String,
    /// Record type, fixed at creation.
    #[serde(rename = "type")]
    pub email_type: EmailType,
    /// When an inbox email was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_received: Option<DateTime<Utc>>,
    /// When a sent email or draft was last updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_updated: Option<DateTime<Utc>>,
    /// Whether the email is unread.
    #[serde(default)]
    pub unread: bool,
    /// When the email was moved to the trash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trashed_time: Option<DateTime<Utc>>,
    /// Thread this email belongs to.
    #[serde(default, rename = "threadID", skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Payload.
    #[serde(flatten)]
    pub content: EmailContent,
}

impl Email {
    /// A freshly received, unread inbox email.
    #[must_use]
    pub fn inbox(
        message_id: impl Into<String>,
        received: DateTime<Utc>,
        content: EmailContent,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            email_type: EmailType::Inbox,
            time_received: Some(received),
            time_updated: None,
            unread: true,
            trashed_time: None,
            thread_id: None,
            content,
        }
    }

    /// A sent email.
    #[must_use]
    pub fn sent(message_id: impl Into<String>, sent: DateTime<Utc>, content: EmailContent) -> Self {
        Self {
            message_id: message_id.into(),
            email_type: EmailType::Sent,
            time_received: None,
            time_updated: Some(sent),
            unread: false,
            trashed_time: None,
            thread_id: None,
            content,
        }
    }

    /// A draft.
    #[must_use]
    pub fn draft(
        message_id: impl Into<String>,
        updated: DateTime<Utc>,
        content: EmailContent,
    ) -> Self {
        Self {
            email_type: EmailType::Draft,
            ..Self::sent(message_id, updated, content)
        }
    }

    /// Marks the email as part of a thread.
    #[must_use]
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Timestamp that orders this record in the index.
    ///
    /// Inbox emails are ordered by receipt, sent emails and drafts by update.
    #[must_use]
    pub const fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.email_type {
            EmailType::Inbox => self.time_received,
            EmailType::Sent | EmailType::Draft => self.time_updated,
        }
    }

    /// Index key and sort timestamp of this record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the governing timestamp is missing or out of
    /// range.
    pub fn index_key(&self) -> Result<(TypeYearMonth, DateTime<Utc>)> {
        let time = self.timestamp().ok_or_else(|| {
            Error::InvalidInput(format!(
                "{} email {} has no {} time",
                self.email_type,
                self.message_id,
                if self.email_type == EmailType::Inbox {
                    "received"
                } else {
                    "updated"
                }
            ))
        })?;
        Ok((TypeYearMonth::from_time(self.email_type, &time)?, time))
    }

    /// Returns true if the email is in the trash.
    #[must_use]
    pub const fn is_trashed(&self) -> bool {
        self.trashed_time.is_some()
    }
}

/// Formats a timestamp with fixed width so that string order is time order.
#[must_use]
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parses a timestamp written by [`format_time`] (or any RFC 3339 string).
///
/// # Errors
///
/// Returns `InvalidInput` if the string is not RFC 3339.
pub fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("invalid timestamp {s:?}: {e}")))
}
