use chrono::{DateTime, Utc};

/// A delivery destination managed by the admin. The stored name never
/// carries the leading `@`.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: i64,
    pub name: String,
}

/// A polled remote source owned by a channel. `updated_at` is the epoch
/// second of the last successful poll, 0 for never-polled feeds.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub id: i64,
    pub channel_id: i64,
    pub url: String,
    pub updated_at: i64,
}

/// One discovered feed item, deduplicated by (feed_id, link).
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub link: String,
    pub created_at: DateTime<Utc>,
    pub was_sent: bool,
}

/// An item as returned by the fetch boundary, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub link: String,
    pub title: String,
    pub published: Option<DateTime<Utc>>,
}

/// A (channel name, feed url) row used by the listfeeds grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelFeed {
    pub channel: String,
    pub url: String,
}
