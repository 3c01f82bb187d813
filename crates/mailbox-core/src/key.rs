//! Composite index keys.
//!
//! Records are indexed by `TypeYearMonth`, a string of the form
//! `<type>#<yyyy>-<mm>` derived from the record type and its governing
//! timestamp. Prefixes of the key (`inbox#`, `inbox#2021-`) select all
//! records of a type or of a type within a year.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Separator between the type and the year-month in an index key.
pub const KEY_SEPARATOR: char = '#';

/// Kind of email record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailType {
    /// Received email.
    Inbox,
    /// Email sent by the mailbox owner.
    Sent,
    /// Unsent draft.
    Draft,
}

impl EmailType {
    /// Every recognized type, in index order.
    pub const ALL: [Self; 3] = [Self::Inbox, Self::Sent, Self::Draft];

    /// Returns the type as it appears in index keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Draft => "draft",
        }
    }

    /// Parses a type name. Matching is exact.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbox" => Some(Self::Inbox),
            "sent" => Some(Self::Sent),
            "draft" => Some(Self::Draft),
            _ => None,
        }
    }

    /// Key prefix selecting every record of this type (`inbox#`).
    #[must_use]
    pub fn key_prefix(self) -> String {
        format!("{}{KEY_SEPARATOR}", self.as_str())
    }

    /// Key prefix selecting every record of this type in `year` (`inbox#2021-`).
    #[must_use]
    pub fn year_prefix(self, year: u16) -> String {
        format!("{}{KEY_SEPARATOR}{year:04}-", self.as_str())
    }
}

impl fmt::Display for EmailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidInput(format!("unknown email type: {s:?}")))
    }
}

/// Year and month of a record's governing timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: u16,
    month: u8,
}

impl YearMonth {
    /// Smallest representable year.
    pub const MIN_YEAR: u16 = 1000;
    /// Largest representable year.
    pub const MAX_YEAR: u16 = 9999;

    /// Creates a year-month, returning `None` if either part is out of range.
    #[must_use]
    pub const fn new(year: u16, month: u8) -> Option<Self> {
        if year < Self::MIN_YEAR || year > Self::MAX_YEAR || month < 1 || month > 12 {
            return None;
        }
        Some(Self { year, month })
    }

    /// Year-month of a UTC timestamp.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the year is outside `1000..=9999`.
    pub fn of(time: &DateTime<Utc>) -> Result<Self> {
        u16::try_from(time.year())
            .ok()
            .and_then(|year| u8::try_from(time.month()).ok().and_then(|m| Self::new(year, m)))
            .ok_or_else(|| Error::InvalidInput(format!("timestamp out of range: {time}")))
    }

    /// Parses `yyyy-mm` with exactly four year digits and two month digits.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (year, month) = s.split_once('-')?;
        let year = parse_digits(year, 4)?;
        let month = u8::try_from(parse_digits(month, 2)?).ok()?;
        Self::new(year, month)
    }

    /// Returns the year.
    #[must_use]
    pub const fn year(self) -> u16 {
        self.year
    }

    /// Returns the month (1-12).
    #[must_use]
    pub const fn month(self) -> u8 {
        self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Secondary index range key: `<type>#<yyyy>-<mm>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeYearMonth {
    email_type: EmailType,
    year_month: YearMonth,
}

impl TypeYearMonth {
    /// Creates a key from its parts.
    #[must_use]
    pub const fn new(email_type: EmailType, year_month: YearMonth) -> Self {
        Self {
            email_type,
            year_month,
        }
    }

    /// Key for a record of `email_type` whose governing timestamp is `time`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the timestamp's year is not representable.
    pub fn from_time(email_type: EmailType, time: &DateTime<Utc>) -> Result<Self> {
        Ok(Self::new(email_type, YearMonth::of(time)?))
    }

    /// Builds a key from request parameters.
    ///
    /// The year must have four digits; the month may be given with one or
    /// two digits.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the type is unknown or the year/month are
    /// malformed or out of range.
    pub fn build(email_type: &str, year: &str, month: &str) -> Result<Self> {
        let email_type = email_type.parse::<EmailType>()?;
        let year = parse_digits(year, 4)
            .ok_or_else(|| Error::InvalidInput(format!("invalid year: {year:?}")))?;
        let month = (1..=2)
            .find_map(|len| parse_digits(month, len))
            .and_then(|m| u8::try_from(m).ok())
            .ok_or_else(|| Error::InvalidInput(format!("invalid month: {month:?}")))?;
        let year_month = YearMonth::new(year, month)
            .ok_or_else(|| Error::InvalidInput(format!("year-month out of range: {year}-{month}")))?;
        Ok(Self::new(email_type, year_month))
    }

    /// Parses a stored key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEmailType` if the type is unknown, the year is not four
    /// digits in `1000..=9999` or the month is not two digits in `01..=12`.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidEmailType(s.to_string());
        let (email_type, year_month) = s.split_once(KEY_SEPARATOR).ok_or_else(invalid)?;
        let email_type = EmailType::parse(email_type).ok_or_else(invalid)?;
        let year_month = YearMonth::parse(year_month).ok_or_else(invalid)?;
        Ok(Self::new(email_type, year_month))
    }

    /// Returns the record type part.
    #[must_use]
    pub const fn email_type(self) -> EmailType {
        self.email_type
    }

    /// Returns the year-month part.
    #[must_use]
    pub const fn year_month(self) -> YearMonth {
        self.year_month
    }
}

impl fmt::Display for TypeYearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KEY_SEPARATOR}{}", self.email_type, self.year_month)
    }
}

impl FromStr for TypeYearMonth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TypeYearMonth {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<TypeYearMonth> for String {
    fn from(key: TypeYearMonth) -> Self {
        key.to_string()
    }
}

/// Parses exactly `len` ASCII digits.
pub(crate) fn parse_digits(s: &str, len: usize) -> Option<u16> {
    if s.len() != len || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
