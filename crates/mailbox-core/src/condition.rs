//! Conditional write predicates and attribute updates.
//!
//! Every state transition is a single conditional write: the store applies
//! an [`Update`] only if the [`Condition`] holds, atomically. The constructors
//! on [`Condition`] are the lifecycle rules for each operation. They can be
//! evaluated against an in-memory [`Email`] and are rendered by each store
//! into its native form.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::key::{EmailType, TypeYearMonth};
use crate::model::{Email, EmailContent, format_time};
use crate::Result;

/// Presence-based record attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Present while the email is unread.
    Unread,
    /// Present while the email is in the trash.
    TrashedTime,
    /// Present when the email belongs to a thread.
    ThreadId,
}

impl Attribute {
    /// Attribute name in expressions.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unread => "Unread",
            Self::TrashedTime => "TrashedTime",
            Self::ThreadId => "ThreadID",
        }
    }

    /// Returns true if the attribute is present on `email`.
    #[must_use]
    pub const fn is_present(self, email: &Email) -> bool {
        match self {
            Self::Unread => email.unread,
            Self::TrashedTime => email.trashed_time.is_some(),
            Self::ThreadId => email.thread_id.is_some(),
        }
    }
}

/// A single predicate over a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `attribute_exists(attr)`
    Exists(Attribute),
    /// `attribute_not_exists(attr)`
    NotExists(Attribute),
    /// `begins_with(TypeYearMonth, type)`
    TypeIs(EmailType),
    /// `NOT begins_with(TypeYearMonth, type)`
    TypeIsNot(EmailType),
    /// Disjunction. Empty means false.
    AnyOf(Vec<Predicate>),
}

impl Predicate {
    /// Record type is one of `types`.
    #[must_use]
    pub fn type_in(types: &[EmailType]) -> Self {
        match types {
            [single] => Self::TypeIs(*single),
            _ => Self::AnyOf(types.iter().copied().map(Self::TypeIs).collect()),
        }
    }

    /// Evaluates the predicate against a record.
    #[must_use]
    pub fn evaluate(&self, email: &Email) -> bool {
        match self {
            Self::Exists(attr) => attr.is_present(email),
            Self::NotExists(attr) => !attr.is_present(email),
            Self::TypeIs(t) => email.email_type == *t,
            Self::TypeIsNot(t) => email.email_type != *t,
            Self::AnyOf(any) => any.iter().any(|p| p.evaluate(email)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists(attr) => write!(f, "attribute_exists({})", attr.name()),
            Self::NotExists(attr) => write!(f, "attribute_not_exists({})", attr.name()),
            Self::TypeIs(t) => write!(f, "begins_with(TypeYearMonth, {t:?})", t = t.as_str()),
            Self::TypeIsNot(t) => {
                write!(f, "NOT begins_with(TypeYearMonth, {t:?})", t = t.as_str())
            }
            Self::AnyOf(any) if any.is_empty() => f.write_str("false"),
            Self::AnyOf(any) => {
                f.write_str("(")?;
                for (i, p) in any.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" OR ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Conjunction of predicates. An empty condition always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Condition {
    predicates: Vec<Predicate>,
}

impl Condition {
    /// An empty condition.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Adds a predicate.
    #[must_use]
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Returns the predicates.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Evaluates every predicate against a record.
    #[must_use]
    pub fn evaluate(&self, email: &Email) -> bool {
        self.predicates.iter().all(|p| p.evaluate(email))
    }

    /// Mark read: unread and of an eligible type.
    #[must_use]
    pub fn read(eligible: &[EmailType]) -> Self {
        Self::new()
            .and(Predicate::Exists(Attribute::Unread))
            .and(Predicate::type_in(eligible))
    }

    /// Mark unread: read and of an eligible type.
    #[must_use]
    pub fn unread(eligible: &[EmailType]) -> Self {
        Self::new()
            .and(Predicate::NotExists(Attribute::Unread))
            .and(Predicate::type_in(eligible))
    }

    /// Trash: not already trashed and not a draft.
    #[must_use]
    pub fn trash() -> Self {
        Self::new()
            .and(Predicate::NotExists(Attribute::TrashedTime))
            .and(Predicate::TypeIsNot(EmailType::Draft))
    }

    /// Untrash: trashed and not a draft.
    #[must_use]
    pub fn untrash() -> Self {
        Self::new()
            .and(Predicate::Exists(Attribute::TrashedTime))
            .and(Predicate::TypeIsNot(EmailType::Draft))
    }

    /// Delete: trashed or a draft, and not part of a thread.
    #[must_use]
    pub fn delete() -> Self {
        Self::new()
            .and(Predicate::AnyOf(vec![
                Predicate::Exists(Attribute::TrashedTime),
                Predicate::TypeIs(EmailType::Draft),
            ]))
            .and(Predicate::NotExists(Attribute::ThreadId))
    }

    /// Revise a draft: the record is an active draft.
    #[must_use]
    pub fn revise_draft() -> Self {
        Self::new()
            .and(Predicate::TypeIs(EmailType::Draft))
            .and(Predicate::NotExists(Attribute::TrashedTime))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.predicates.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{p}")?;
        }
        Ok(())
    }
}

/// Attribute mutation applied by a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Set `Unread`.
    SetUnread,
    /// Remove `Unread`.
    RemoveUnread,
    /// Set `TrashedTime`.
    SetTrashed(DateTime<Utc>),
    /// Remove `TrashedTime`.
    RemoveTrashed,
    /// Replace a draft's content and bump `TimeUpdated`, re-deriving its index key.
    ReviseDraft {
        /// New payload.
        content: Box<EmailContent>,
        /// New `TimeUpdated`.
        updated_at: DateTime<Utc>,
    },
}

impl Update {
    /// New index key written together with this update, if it moves the record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the new timestamp is out of range.
    pub fn index_key(&self) -> Result<Option<(TypeYearMonth, DateTime<Utc>)>> {
        match self {
            Self::ReviseDraft { updated_at, .. } => Ok(Some((
                TypeYearMonth::from_time(EmailType::Draft, updated_at)?,
                *updated_at,
            ))),
            _ => Ok(None),
        }
    }

    /// Applies the update to an in-memory record.
    pub fn apply(&self, email: &mut Email) {
        match self {
            Self::SetUnread => email.unread = true,
            Self::RemoveUnread => email.unread = false,
            Self::SetTrashed(at) => email.trashed_time = Some(*at),
            Self::RemoveTrashed => email.trashed_time = None,
            Self::ReviseDraft {
                content,
                updated_at,
            } => {
                email.content = EmailContent::clone(content);
                email.time_updated = Some(*updated_at);
            }
        }
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetUnread => f.write_str("SET Unread = true"),
            Self::RemoveUnread => f.write_str("REMOVE Unread"),
            Self::SetTrashed(at) => write!(f, "SET TrashedTime = {}", format_time(at)),
            Self::RemoveTrashed => f.write_str("REMOVE TrashedTime"),
            Self::ReviseDraft { updated_at, .. } => write!(
                f,
                "SET <content>, TimeUpdated = {}, TypeYearMonth, DateTime",
                format_time(updated_at)
            ),
        }
    }
}
