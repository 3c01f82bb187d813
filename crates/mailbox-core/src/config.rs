//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::key::EmailType;
use crate::{Error, Result};

/// Configuration passed to [`Mailbox`](crate::Mailbox) at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MailboxConfig {
    /// `SQLite` database file. Relative paths resolve against the data directory.
    pub database_path: PathBuf,
    /// Directory holding raw messages. Relative paths resolve against the data directory.
    pub blob_dir: PathBuf,
    /// Page size when the caller gives none.
    pub default_page_size: usize,
    /// Largest page size a caller may ask for.
    pub max_page_size: usize,
    /// Deadline for a whole operation, in milliseconds.
    pub operation_timeout_ms: u64,
    /// Types that may be marked read or unread.
    pub read_eligible_types: Vec<EmailType>,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("mailbox.db"),
            blob_dir: PathBuf::from("raw"),
            default_page_size: 100,
            max_page_size: 1000,
            operation_timeout_ms: 10_000,
            read_eligible_types: vec![EmailType::Inbox],
        }
    }
}

impl MailboxConfig {
    /// Loads a JSON config file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails
    /// [`validate`](Self::validate).
    pub async fn load(path: &Path) -> Result<Self> {
        let config: Self = match tokio::fs::read_to_string(path).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolves relative storage paths against `base`.
    #[must_use]
    pub fn resolve(mut self, base: &Path) -> Self {
        self.database_path = base.join(&self.database_path);
        self.blob_dir = base.join(&self.blob_dir);
        self
    }

    /// Checks that the limits are usable.
    ///
    /// # Errors
    ///
    /// Returns `Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 {
            return Err(Error::Config("maxPageSize must be positive".into()));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(Error::Config(format!(
                "defaultPageSize must be between 1 and {}",
                self.max_page_size
            )));
        }
        if self.operation_timeout_ms == 0 {
            return Err(Error::Config("operationTimeoutMs must be positive".into()));
        }
        if self.read_eligible_types.is_empty() {
            return Err(Error::Config("readEligibleTypes must not be empty".into()));
        }
        Ok(())
    }

    /// Deadline shared by all store and blob calls of one operation.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Sets the page size limits.
    #[must_use]
    pub const fn with_page_sizes(mut self, default: usize, max: usize) -> Self {
        self.default_page_size = default;
        self.max_page_size = max;
        self
    }

    /// Sets the per-operation deadline, rounded up to whole milliseconds.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms =
            u64::try_from(timeout.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX);
        self
    }

    /// Sets the types that may be marked read or unread.
    #[must_use]
    pub fn with_read_eligible_types(mut self, types: impl Into<Vec<EmailType>>) -> Self {
        self.read_eligible_types = types.into();
        self
    }
}
