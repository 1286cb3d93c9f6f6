use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, Entry, EntryFilter, NewEntry, ReadStatus};

impl Database {
    // ========================================================================
    // Entry Mutations
    // ========================================================================

    /// Insert entries for a feed, skipping any whose guid is already stored.
    ///
    /// Duplicates are filtered by `INSERT OR IGNORE` against the table-wide
    /// `UNIQUE(guid)` constraint; they are neither counted nor reported as
    /// errors. Returns the number of entries actually inserted, so a repeated
    /// sync of an unchanged feed returns 0.
    ///
    /// Batch size of 50 keeps us well under SQLite's parameter limit
    /// (6 columns * 50 = 300). All batches of one call share a transaction.
    pub async fn create_entries_if_absent(
        &self,
        feed_id: i64,
        entries: &[NewEntry],
    ) -> Result<u64, DatabaseError> {
        if entries.is_empty() {
            return Ok(0);
        }

        const BATCH_SIZE: usize = 50;
        let mut total_inserted = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in entries.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO entries (feed_id, guid, url, title, description, published_at) ",
            );

            builder.push_values(chunk, |mut b, entry| {
                b.push_bind(feed_id)
                    .push_bind(&entry.guid)
                    .push_bind(&entry.url)
                    .push_bind(&entry.title)
                    .push_bind(&entry.description)
                    .push_bind(entry.published_at);
            });

            total_inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// Mark entries as read (idempotent), returns count of entries changed
    ///
    /// Uses `WHERE read_at IS NULL` so an entry that is already read keeps its
    /// original `read_at`.
    pub async fn set_entries_read_now(&self, ids: &[i64]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE entries SET read_at = ");
        builder.push_bind(now);
        builder.push(" WHERE read_at IS NULL AND id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Delete entries by id, returns count of entries removed
    pub async fn delete_entries(&self, ids: &[i64]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("DELETE FROM entries WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Entry Queries
    // ========================================================================

    /// List entries matching `filter`, oldest publication first.
    ///
    /// Ties on `published_at` fall back to insertion order. An `offset`
    /// without a `limit` skips entries and returns the rest.
    pub async fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<Entry>, DatabaseError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT id, feed_id, guid, url, title, description, published_at, read_at FROM entries",
        );

        let mut has_where = false;
        let mut push_condition = |builder: &mut QueryBuilder<sqlx::Sqlite>| {
            builder.push(if has_where { " AND " } else { " WHERE " });
            has_where = true;
        };

        if let Some(feed_id) = filter.feed_id {
            push_condition(&mut builder);
            builder.push("feed_id = ");
            builder.push_bind(feed_id);
        }

        match filter.read_status {
            Some(ReadStatus::Read) => {
                push_condition(&mut builder);
                builder.push("read_at IS NOT NULL");
            }
            Some(ReadStatus::Unread) => {
                push_condition(&mut builder);
                builder.push("read_at IS NULL");
            }
            None => {}
        }

        builder.push(" ORDER BY published_at ASC, id ASC");

        match (filter.limit, filter.offset) {
            (Some(limit), offset) => {
                builder.push(" LIMIT ");
                builder.push_bind(limit);
                if let Some(offset) = offset {
                    builder.push(" OFFSET ");
                    builder.push_bind(offset);
                }
            }
            // SQLite only accepts OFFSET after LIMIT; -1 means unbounded
            (None, Some(offset)) => {
                builder.push(" LIMIT -1 OFFSET ");
                builder.push_bind(offset);
            }
            (None, None) => {}
        }

        let entries = builder.build_query_as::<Entry>().fetch_all(&self.pool).await?;
        tracing::debug!(?filter, count = entries.len(), "Listed entries");
        Ok(entries)
    }
}
