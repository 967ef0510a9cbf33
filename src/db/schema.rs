pub const SCHEMA: &str = r#"
-- channels table
CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- feeds table
CREATE TABLE IF NOT EXISTS feeds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id INTEGER NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
    url TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT 0,
    UNIQUE(channel_id, url)
);

CREATE INDEX IF NOT EXISTS idx_feeds_channel_id ON feeds(channel_id);
CREATE INDEX IF NOT EXISTS idx_feeds_updated_at ON feeds(updated_at);

-- entries table
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    link TEXT NOT NULL,
    created_at TEXT NOT NULL,
    was_sent INTEGER NOT NULL DEFAULT 0,
    UNIQUE(feed_id, link)
);

CREATE INDEX IF NOT EXISTS idx_entries_feed_id ON entries(feed_id);
CREATE INDEX IF NOT EXISTS idx_entries_was_sent ON entries(was_sent);
"#;
