//! feeda: fetch RSS and Atom feeds, keep their entries in SQLite.
//!
//! The pieces, leaves first:
//!
//! - [`storage`] - feeds and entries, deduplicated by URL and GUID
//! - [`feed`] - HTTP fetch, format sniffing and XML decoding
//! - [`sync`] - concurrent fetch of many feeds with per-feed error isolation
//! - [`config`] - optional TOML configuration
//!
//! ```ignore
//! use feeda::{config::Config, feed, storage::Database, sync::{SyncOptions, Syncer}};
//!
//! let config = Config::default();
//! let db = Database::open("/tmp/feeds.sqlite").await?;
//! let client = feed::build_client(&config.user_agent, config.fetch_timeout())?;
//! let syncer = Syncer::new(db, client, SyncOptions::from(&config));
//!
//! syncer.add_feeds(&["https://blog.rust-lang.org/feed.xml"]).await?;
//! let report = syncer.sync(&[]).await?;
//! println!("{} new entries", report.total_added());
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod storage;
pub mod sync;
pub mod util;

pub use error::Error;
