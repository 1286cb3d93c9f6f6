//! SQLite-backed store for feeds and their entries.
//!
//! Uniqueness does the deduplication: `feeds.url` and `entries.guid` are
//! `UNIQUE`, and every insert is `INSERT OR IGNORE`, so adding a feed or
//! syncing it again is idempotent. Entries are removed with their feed via
//! `ON DELETE CASCADE`.

mod entries;
mod feeds;
mod schema;
mod types;

pub use schema::Database;
pub use types::{
    DatabaseError, Entry, EntryFilter, Feed, FeedStats, FeedType, NewEntry, NewFeed, ReadStatus,
    UnknownFeedType,
};
