//! Opaque pagination cursors.
//!
//! A cursor carries the index key of the last record on a page. Callers treat
//! it as an opaque string; the encoding is JSON wrapped in URL-safe base64
//! without padding.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::TypeYearMonth;
use crate::model::Email;
use crate::{Error, Result};

/// Position in the index after which the next page starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekPosition {
    /// Index key of the last returned record.
    #[serde(rename = "k")]
    pub type_year_month: TypeYearMonth,
    /// Sort timestamp of the last returned record.
    #[serde(rename = "t")]
    pub date_time: DateTime<Utc>,
    /// Message ID of the last returned record (tie breaker).
    #[serde(rename = "id")]
    pub message_id: String,
}

impl SeekPosition {
    /// Seek position just past `email`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the email has no valid index key.
    pub fn of(email: &Email) -> Result<Self> {
        let (type_year_month, date_time) = email.index_key()?;
        Ok(Self {
            type_year_month,
            date_time,
            message_id: email.message_id.clone(),
        })
    }
}

/// Encodes a seek position as an opaque token.
///
/// # Errors
///
/// Returns a serialization error if the position cannot be encoded.
pub fn encode(position: &SeekPosition) -> Result<String> {
    let json = serde_json::to_vec(position)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decodes a token produced by [`encode`].
///
/// An empty token means "start from the beginning".
///
/// # Errors
///
/// Returns `InvalidInput` if the token is not a valid cursor.
pub fn decode(token: &str) -> Result<Option<SeekPosition>> {
    if token.is_empty() {
        return Ok(None);
    }
    let json = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| Error::InvalidInput(format!("malformed cursor: {e}")))?;
    serde_json::from_slice(&json)
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("malformed cursor: {e}")))
}
