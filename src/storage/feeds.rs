use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedDbRow, FeedStats, FeedStatsRow, FeedType, NewFeed};

impl Database {
    // ========================================================================
    // Feed Mutations
    // ========================================================================

    /// Subscribe to feeds, skipping URLs that are already stored.
    ///
    /// Uses `INSERT OR IGNORE` against the `UNIQUE(url)` constraint so re-adding
    /// a feed is a silent no-op. Returns the number of feeds actually inserted.
    pub async fn create_feeds_if_absent(&self, feeds: &[NewFeed]) -> Result<u64, DatabaseError> {
        if feeds.is_empty() {
            return Ok(0);
        }

        const BATCH_SIZE: usize = 100;
        let now = chrono::Utc::now().timestamp();
        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in feeds.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT OR IGNORE INTO feeds (url, feed_type, created_at) ");

            builder.push_values(chunk, |mut b, feed| {
                b.push_bind(&feed.url)
                    .push_bind(feed.feed_type.as_str())
                    .push_bind(now);
            });

            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        tracing::debug!(requested = feeds.len(), inserted, "Created feeds");
        Ok(inserted)
    }

    /// Stamp `synced_at` with the current time for every feed in `ids`.
    ///
    /// Issued once per sync, after all feeds have settled. Returns the number
    /// of feeds updated.
    pub async fn set_feeds_synced_now(&self, ids: &[i64]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE feeds SET synced_at = ");
        builder.push_bind(now);
        builder.push(" WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Overwrite the stored format of a feed whose body changed format
    pub async fn set_feed_type(&self, feed_id: i64, feed_type: FeedType) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE feeds SET feed_type = ? WHERE id = ?")
            .bind(feed_type.as_str())
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete feeds by id. Their entries go with them (`ON DELETE CASCADE`).
    ///
    /// Unknown ids are ignored. Returns the number of feeds removed.
    pub async fn delete_feeds(&self, ids: &[i64]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("DELETE FROM feeds WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Feed Queries
    // ========================================================================

    /// List feeds ordered by id. An empty `ids` slice lists every feed.
    pub async fn list_feeds(&self, ids: &[i64]) -> Result<Vec<Feed>, DatabaseError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT id, url, feed_type, created_at, synced_at FROM feeds");

        if !ids.is_empty() {
            builder.push(" WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY id");

        let rows: Vec<FeedDbRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(FeedDbRow::into_feed).collect())
    }

    /// Every feed with its total and unread entry counts, ordered by id
    pub async fn feed_stats(&self) -> Result<Vec<FeedStats>, DatabaseError> {
        let rows: Vec<FeedStatsRow> = sqlx::query_as(
            r#"
                SELECT
                    f.id, f.url, f.feed_type, f.created_at, f.synced_at,
                    COUNT(e.id) AS total,
                    COUNT(CASE WHEN e.id IS NOT NULL AND e.read_at IS NULL THEN 1 END) AS unread
                FROM feeds f
                LEFT JOIN entries e ON f.id = e.feed_id
                GROUP BY f.id
                ORDER BY f.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let stats = rows
            .into_iter()
            .map(
                |(id, url, feed_type, created_at, synced_at, total, unread)| FeedStats {
                    feed: FeedDbRow {
                        id,
                        url,
                        feed_type,
                        created_at,
                        synced_at,
                    }
                    .into_feed(),
                    total,
                    unread,
                },
            )
            .collect();

        Ok(stats)
    }

    /// Total number of entries stored for a feed
    pub async fn count_total_by_feed(&self, feed_id: i64) -> Result<i64, DatabaseError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(id) FROM entries WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    /// Number of entries of a feed that have not been marked as read
    pub async fn count_unread_by_feed(&self, feed_id: i64) -> Result<i64, DatabaseError> {
        let (unread,): (i64,) = sqlx::query_as(
            "SELECT COUNT(id) FROM entries WHERE feed_id = ? AND read_at IS NULL",
        )
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(unread)
    }
}
