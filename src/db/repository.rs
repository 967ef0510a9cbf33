use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Channel, ChannelFeed, Entry, Feed};

use super::schema::SCHEMA;

/// Typed query interface over the channels/feeds/entries tables. The
/// connection handle is cheap to clone, so each scheduler owns one.
#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Channel operations

    pub async fn find_channels_ordered_by_name(&self) -> Result<Vec<Channel>> {
        let channels = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name FROM channels ORDER BY name")?;
                let channels = stmt
                    .query_map([], |row| Ok(channel_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(channels)
            })
            .await?;
        Ok(channels)
    }

    pub async fn find_channel_by_name(&self, name: &str) -> Result<Option<Channel>> {
        let name = name.to_string();
        let channel = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT id, name FROM channels WHERE name = ?1")?;
                let channel = stmt
                    .query_row(params![name], |row| Ok(channel_from_row(row)))
                    .optional()?;
                Ok(channel)
            })
            .await?;
        Ok(channel)
    }

    pub async fn insert_channel(&self, name: &str) -> Result<i64> {
        let name = name.to_string();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute("INSERT INTO channels (name) VALUES (?1)", params![name])?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn delete_channel(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM channels WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Feed operations

    /// Rows for the listfeeds view, ordered by channel name then url so the
    /// caller can group them with a single pass.
    pub async fn find_feeds_with_channels(&self) -> Result<Vec<ChannelFeed>> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT c.name, f.url FROM feeds f \
                     JOIN channels c ON f.channel_id = c.id \
                     ORDER BY c.name, f.url",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(ChannelFeed {
                            channel: row.get(0)?,
                            url: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    pub async fn find_feed(&self, channel_id: i64, url: &str) -> Result<Option<Feed>> {
        let url = url.to_string();
        let feed = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, channel_id, url, updated_at FROM feeds \
                     WHERE channel_id = ?1 AND url = ?2",
                )?;
                let feed = stmt
                    .query_row(params![channel_id, url], |row| Ok(feed_from_row(row)))
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    pub async fn insert_feed(&self, channel_id: i64, url: &str) -> Result<i64> {
        let url = url.to_string();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO feeds (channel_id, url) VALUES (?1, ?2)",
                    params![channel_id, url],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn delete_feed(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM feeds WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn delete_feeds_for_channel(&self, channel_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM feeds WHERE channel_id = ?1", params![channel_id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Feeds whose last successful poll is older than `threshold` seconds,
    /// oldest first.
    pub async fn find_stale_feeds(&self, now: i64, threshold: i64) -> Result<Vec<Feed>> {
        let feeds = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, channel_id, url, updated_at FROM feeds \
                     WHERE ?1 - updated_at > ?2 ORDER BY updated_at",
                )?;
                let feeds = stmt
                    .query_map(params![now, threshold], |row| Ok(feed_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn mark_feed_updated(&self, id: i64, now: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE feeds SET updated_at = ?1 WHERE id = ?2",
                    params![now, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Entry operations

    pub async fn entry_exists(&self, feed_id: i64, link: &str) -> Result<bool> {
        let link = link.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE feed_id = ?1 AND link = ?2",
                    params![feed_id, link],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await?;
        Ok(exists)
    }

    pub async fn insert_entry(
        &self,
        feed_id: i64,
        title: &str,
        link: &str,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let title = title.to_string();
        let link = link.to_string();
        let created_at = created_at.unwrap_or_else(Utc::now).to_rfc3339();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO entries (feed_id, title, link, created_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![feed_id, title, link, created_at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn find_unsent_entries_for_channel(&self, channel_id: i64) -> Result<Vec<Entry>> {
        let entries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT e.id, e.feed_id, e.title, e.link, e.created_at, e.was_sent \
                     FROM entries e \
                     JOIN feeds f ON e.feed_id = f.id \
                     WHERE f.channel_id = ?1 AND e.was_sent = 0 \
                     ORDER BY e.created_at",
                )?;
                let entries = stmt
                    .query_map(params![channel_id], |row| Ok(entry_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    /// One batched update for all entries a channel delivered this cycle.
    pub async fn mark_entries_sent(&self, ids: Vec<i64>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.conn
            .call(move |conn| {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "UPDATE entries SET was_sent = 1 WHERE id IN ({})",
                    placeholders
                );
                conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn delete_entries_for_feed(&self, feed_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM entries WHERE feed_id = ?1", params![feed_id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn delete_entries_for_channel(&self, channel_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM entries WHERE feed_id IN \
                     (SELECT id FROM feeds WHERE channel_id = ?1)",
                    params![channel_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn channel_from_row(row: &Row) -> Channel {
    Channel {
        id: row.get(0).unwrap(),
        name: row.get(1).unwrap(),
    }
}

fn feed_from_row(row: &Row) -> Feed {
    Feed {
        id: row.get(0).unwrap(),
        channel_id: row.get(1).unwrap(),
        url: row.get(2).unwrap(),
        updated_at: row.get(3).unwrap(),
    }
}

fn entry_from_row(row: &Row) -> Entry {
    Entry {
        id: row.get(0).unwrap(),
        feed_id: row.get(1).unwrap(),
        title: row.get(2).unwrap(),
        link: row.get(3).unwrap(),
        created_at: row
            .get::<_, String>(4)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        was_sent: row.get::<_, i64>(5).unwrap() != 0,
    }
}
