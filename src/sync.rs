//! Feed synchronization: fetch every feed, decode it and store new entries.
//!
//! Each feed is one unit of work in a bounded concurrent stream. A unit's
//! failure (network, HTTP status, bad XML, a store error on its insert) is
//! recorded in that feed's [`FeedOutcome`] and never stops the others. Once
//! every unit has settled, the feeds that succeeded get their `synced_at`
//! stamped in a single batched update.

use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::sync::watch;

use crate::config::Config;
use crate::feed::fetcher::{DEFAULT_MAX_FEED_SIZE, DEFAULT_TIMEOUT};
use crate::feed::{detect_format, fetch_feed, parse_feed, FetchError, ParseError};
use crate::storage::{Database, Feed, FeedType, NewEntry, NewFeed};
use crate::util::validate_url;
use crate::Error;

/// Limits applied to every fetch of a sync or add run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub timeout: Duration,
    pub max_feed_size: usize,
    /// Feeds in flight at once (values below 1 are treated as 1)
    pub max_concurrent: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_feed_size: DEFAULT_MAX_FEED_SIZE,
            max_concurrent: 10,
        }
    }
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            timeout: config.fetch_timeout(),
            max_feed_size: config.max_feed_size_bytes,
            max_concurrent: config.max_concurrent_fetches,
        }
    }
}

/// Result of syncing one feed: entries newly stored, or why it failed.
#[derive(Debug)]
pub struct FeedOutcome {
    pub feed_id: i64,
    pub url: String,
    pub result: Result<u64, Error>,
}

/// Per-feed outcomes of a sync run, ordered by feed id.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<FeedOutcome>,
}

impl SyncReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FeedOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FeedOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    /// Entries inserted across all successful feeds
    pub fn total_added(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .sum()
    }
}

/// Result of fetching one URL passed to [`Syncer::add_feeds`].
#[derive(Debug)]
pub struct AddOutcome {
    /// Normalized URL, as stored
    pub url: String,
    pub result: Result<FeedType, Error>,
}

#[derive(Debug, Default)]
pub struct AddReport {
    /// One outcome per distinct URL, in argument order
    pub outcomes: Vec<AddOutcome>,
    /// Feeds that were not already subscribed
    pub inserted: u64,
}

/// Runs sync and add operations against one store with one HTTP client.
#[derive(Clone)]
pub struct Syncer {
    db: Database,
    client: reqwest::Client,
    options: SyncOptions,
}

impl Syncer {
    pub fn new(db: Database, client: reqwest::Client, options: SyncOptions) -> Self {
        Self {
            db,
            client,
            options,
        }
    }

    /// Sync the given feeds, or every feed when `ids` is empty.
    ///
    /// # Errors
    ///
    /// Only store failures outside a single feed's unit of work are returned
    /// here: loading the feed list and the final `synced_at` update. Per-feed
    /// failures are in the report.
    pub async fn sync(&self, ids: &[i64]) -> Result<SyncReport, Error> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.sync_with_cancel(ids, cancel_rx).await
    }

    /// [`sync`](Self::sync) that stops early once `cancel` becomes `true`.
    ///
    /// Feeds still in flight at that point are reported as
    /// [`FetchError::Cancelled`] and keep their previous `synced_at`; feeds
    /// that already finished are committed as usual.
    pub async fn sync_with_cancel(
        &self,
        ids: &[i64],
        cancel: watch::Receiver<bool>,
    ) -> Result<SyncReport, Error> {
        let feeds = self.db.list_feeds(ids).await?;

        if feeds.len() < ids.len() {
            let missing: Vec<i64> = ids
                .iter()
                .copied()
                .filter(|id| !feeds.iter().any(|f| f.id == *id))
                .collect();
            if !missing.is_empty() {
                tracing::warn!(ids = ?missing, "Requested feeds not found, skipping");
            }
        }

        if feeds.is_empty() {
            return Ok(SyncReport::default());
        }

        let total = feeds.len();
        let mut outcomes: Vec<FeedOutcome> = stream::iter(feeds)
            .map(|feed| {
                let mut cancel = cancel.clone();
                async move {
                    let result = tokio::select! {
                        biased;
                        _ = cancelled(&mut cancel) => Err(Error::Transport(FetchError::Cancelled)),
                        result = self.sync_feed(&feed) => result,
                    };

                    match &result {
                        Ok(added) => {
                            tracing::debug!(feed_id = feed.id, url = %feed.url, added = added, "Feed synced");
                        }
                        Err(e) => {
                            tracing::warn!(feed_id = feed.id, url = %feed.url, error = %e, "Feed sync failed");
                        }
                    }

                    FeedOutcome {
                        feed_id: feed.id,
                        url: feed.url,
                        result,
                    }
                }
            })
            .buffer_unordered(self.options.max_concurrent.max(1))
            .collect()
            .await;

        outcomes.sort_by_key(|o| o.feed_id);

        // Join point: one batched update for every feed that made it through
        let synced: Vec<i64> = outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.feed_id)
            .collect();
        self.db.set_feeds_synced_now(&synced).await?;

        let report = SyncReport { outcomes };
        tracing::info!(
            feeds = total,
            succeeded = synced.len(),
            failed = total - synced.len(),
            added = report.total_added(),
            "Sync finished"
        );
        Ok(report)
    }

    /// Fetch, detect, parse and store one feed. Returns entries inserted.
    async fn sync_feed(&self, feed: &Feed) -> Result<u64, Error> {
        let body = fetch_feed(
            &self.client,
            &feed.url,
            self.options.timeout,
            self.options.max_feed_size,
        )
        .await?;

        let (feed_type, entries) = decode(&body, &feed.url)?;
        let added = self.db.create_entries_if_absent(feed.id, &entries).await?;

        // Only recorded once the entries are stored
        if feed_type != feed.feed_type {
            tracing::info!(
                feed_id = feed.id,
                from = %feed.feed_type,
                to = %feed_type,
                "Feed format changed"
            );
            self.db.set_feed_type(feed.id, feed_type).await?;
        }

        Ok(added)
    }

    /// Subscribe to feeds by URL.
    ///
    /// Every URL is validated before any request is made. Each distinct URL is
    /// then fetched once to sniff its format; those that respond are inserted
    /// in one batch, already-subscribed URLs are left untouched.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUrl`] for the first malformed URL (nothing is fetched or
    /// stored), or a store error from the insert. Fetch failures are per-URL
    /// and reported in [`AddReport::outcomes`].
    pub async fn add_feeds<S: AsRef<str>>(&self, urls: &[S]) -> Result<AddReport, Error> {
        let mut targets: Vec<String> = Vec::with_capacity(urls.len());
        for raw in urls {
            let raw = raw.as_ref();
            let url = validate_url(raw).map_err(|source| Error::InvalidUrl {
                url: raw.to_string(),
                source,
            })?;
            let url = String::from(url);
            if !targets.contains(&url) {
                targets.push(url);
            }
        }

        let outcomes: Vec<AddOutcome> = stream::iter(targets)
            .map(|url| async move {
                let result = fetch_feed(
                    &self.client,
                    &url,
                    self.options.timeout,
                    self.options.max_feed_size,
                )
                .await
                .map(|body| detect_format(&body))
                .map_err(Error::from);

                if let Err(e) = &result {
                    tracing::warn!(url = %url, error = %e, "Could not fetch feed, not adding it");
                }

                AddOutcome { url, result }
            })
            .buffered(self.options.max_concurrent.max(1))
            .collect()
            .await;

        let new_feeds: Vec<NewFeed> = outcomes
            .iter()
            .filter_map(|o| {
                o.result.as_ref().ok().map(|&feed_type| NewFeed {
                    url: o.url.clone(),
                    feed_type,
                })
            })
            .collect();

        let inserted = self.db.create_feeds_if_absent(&new_feeds).await?;
        tracing::info!(
            requested = outcomes.len(),
            fetched = new_feeds.len(),
            inserted = inserted,
            "Added feeds"
        );

        Ok(AddReport { outcomes, inserted })
    }
}

/// Sniff the format and parse. When the sniff was wrong (an RSS document that
/// mentions `<feed` somewhere, such as `<feedburner:origLink>`), the root
/// element decides and the document is parsed again as that format.
fn decode(body: &[u8], url: &str) -> Result<(FeedType, Vec<NewEntry>), ParseError> {
    let sniffed = detect_format(body);
    match parse_feed(body, sniffed, url) {
        Ok(entries) => Ok((sniffed, entries)),
        Err(e) => match e.kind.found_format() {
            Some(actual) if actual != sniffed => {
                tracing::debug!(url = %url, sniffed = %sniffed, actual = %actual, "Format sniff was wrong, parsing again");
                Ok((actual, parse_feed(body, actual, url)?))
            }
            _ => Err(e),
        },
    }
}

/// Resolves once `cancel` holds `true`. If the sender goes away without
/// cancelling, never resolves.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|&c| c).await.is_err() {
        std::future::pending::<()>().await;
    }
}
