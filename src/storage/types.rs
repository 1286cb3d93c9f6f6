use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The feed database is locked by another process. Please wait for it to finish and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// one of these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Feed Types
// ============================================================================

/// Wire format of a feed, decided by sniffing the fetched body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedType {
    Rss,
    Atom,
}

impl FeedType {
    /// Value stored in the `feeds.feed_type` column
    pub fn as_str(self) -> &'static str {
        match self {
            FeedType::Rss => "RSS",
            FeedType::Atom => "Atom",
        }
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown feed type: {0:?}")]
pub struct UnknownFeedType(pub String);

impl FromStr for FeedType {
    type Err = UnknownFeedType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSS" => Ok(FeedType::Rss),
            "Atom" => Ok(FeedType::Atom),
            other => Err(UnknownFeedType(other.to_string())),
        }
    }
}

/// A feed about to be subscribed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeed {
    pub url: String,
    pub feed_type: FeedType,
}

/// Feed data from database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub feed_type: FeedType,
    /// Unix seconds, set once on insert
    pub created_at: i64,
    /// Unix seconds of the last successful sync, `None` if never synced
    pub synced_at: Option<i64>,
}

/// A feed together with its entry counters (used by `listFeeds`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedStats {
    pub feed: Feed,
    pub total: i64,
    pub unread: i64,
}

/// Internal row type for Feed queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: i64,
    pub url: String,
    pub feed_type: String,
    pub created_at: i64,
    pub synced_at: Option<i64>,
}

impl FeedDbRow {
    pub(crate) fn into_feed(self) -> Feed {
        let feed_type = self.feed_type.parse::<FeedType>().unwrap_or_else(|e| {
            tracing::warn!(feed_id = self.id, error = %e, "Treating feed with unknown type as RSS");
            FeedType::Rss
        });
        Feed {
            id: self.id,
            url: self.url,
            feed_type,
            created_at: self.created_at,
            synced_at: self.synced_at,
        }
    }
}

/// Row type for the feed statistics query
pub(crate) type FeedStatsRow = (i64, String, String, i64, Option<i64>, i64, i64);

// ============================================================================
// Entry Types
// ============================================================================

/// An entry decoded from a feed document, not yet persisted.
///
/// `id`, `feed_id` and `read_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub guid: String,
    pub url: String,
    pub title: String,
    pub description: String,
    /// Unix seconds
    pub published_at: i64,
}

/// Entry data from database
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub published_at: i64,
    pub read_at: Option<i64>,
}

impl Entry {
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Read-state filter for entry listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Read,
    Unread,
}

/// Filter for [`Database::list_entries`](super::Database::list_entries).
///
/// The default filter matches every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub feed_id: Option<i64>,
    pub read_status: Option<ReadStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
