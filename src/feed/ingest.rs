use std::time::Duration;

use chrono::Utc;

use crate::db::Repository;
use crate::error::Result;
use crate::feed::FetchEntries;

/// Ingestion scheduler: polls stale feeds, persists previously unseen
/// entries, and advances each feed's freshness watermark.
pub struct Ingestor<F: FetchEntries> {
    repository: Repository,
    fetcher: F,
    parse_timeout: i64,
}

impl<F: FetchEntries> Ingestor<F> {
    pub fn new(repository: Repository, fetcher: F, parse_timeout: i64) -> Self {
        Self {
            repository,
            fetcher,
            parse_timeout,
        }
    }

    /// One ingestion cycle. Returns the number of entries created. A fetch
    /// failure skips that feed (its watermark stays put, so it is picked up
    /// again next cycle) without aborting the rest.
    pub async fn ingest_cycle(&self, now: i64) -> Result<u64> {
        let feeds = self
            .repository
            .find_stale_feeds(now, self.parse_timeout)
            .await?;
        if feeds.is_empty() {
            tracing::debug!("No stale feeds found");
            return Ok(0);
        }

        tracing::info!("Parsing {} stale feeds", feeds.len());
        let mut entries_count = 0u64;
        for feed in feeds {
            tracing::debug!("Parsing feed \"{}\"", feed.url);
            let entries = match self.fetcher.fetch(&feed.url).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::error!("Failed to parse feed \"{}\": {}", feed.url, e);
                    continue;
                }
            };

            for entry in entries {
                // Existence check before each insert, so duplicate links
                // within one batch cannot double-insert.
                if !self.repository.entry_exists(feed.id, &entry.link).await? {
                    self.repository
                        .insert_entry(feed.id, &entry.title, &entry.link, entry.published)
                        .await?;
                    entries_count += 1;
                }
            }
            self.repository.mark_feed_updated(feed.id, now).await?;
            tracing::debug!("Parsing feed \"{}\" finished", feed.url);
        }

        tracing::info!("Parsing feeds finished ({} entries created)", entries_count);
        Ok(entries_count)
    }

    pub async fn run(self, interval: Duration) {
        loop {
            if let Err(e) = self.ingest_cycle(Utc::now().timestamp()).await {
                tracing::error!("Ingestion cycle failed: {}", e);
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use crate::models::RemoteEntry;

    struct StubFetcher {
        feeds: HashMap<String, Vec<RemoteEntry>>,
    }

    impl StubFetcher {
        fn new() -> Self {
            Self {
                feeds: HashMap::new(),
            }
        }

        fn with_entries(mut self, url: &str, links: &[&str]) -> Self {
            let entries = links
                .iter()
                .map(|link| RemoteEntry {
                    link: link.to_string(),
                    title: format!("title of {}", link),
                    published: None,
                })
                .collect();
            self.feeds.insert(url.to_string(), entries);
            self
        }
    }

    #[async_trait]
    impl FetchEntries for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<RemoteEntry>> {
            self.feeds
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("fetch failed: {}", url).into())
        }
    }

    async fn temp_repository() -> (Repository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let repository = Repository::new(path.to_str().unwrap()).await.unwrap();
        (repository, dir)
    }

    #[tokio::test]
    async fn ingestion_is_idempotent() {
        let (repo, _dir) = temp_repository().await;
        let ch = repo.insert_channel("news").await.unwrap();
        repo.insert_feed(ch, "http://a/rss").await.unwrap();

        let fetcher = StubFetcher::new().with_entries("http://a/rss", &["http://a/1", "http://a/2"]);
        let ingestor = Ingestor::new(repo.clone(), fetcher, 60);

        assert_eq!(ingestor.ingest_cycle(1000).await.unwrap(), 2);
        // Unchanged remote content: second pass inserts nothing.
        assert_eq!(ingestor.ingest_cycle(2000).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_feed_stale() {
        let (repo, _dir) = temp_repository().await;
        let ch = repo.insert_channel("news").await.unwrap();
        let feed = repo.insert_feed(ch, "http://broken/rss").await.unwrap();

        let ingestor = Ingestor::new(repo.clone(), StubFetcher::new(), 60);
        assert_eq!(ingestor.ingest_cycle(1000).await.unwrap(), 0);
        assert_eq!(ingestor.ingest_cycle(2000).await.unwrap(), 0);

        // Watermark never advanced, so the feed is re-selected every cycle.
        let stale = repo.find_stale_feeds(3000, 60).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, feed);
        assert_eq!(stale[0].updated_at, 0);
    }

    #[tokio::test]
    async fn one_bad_feed_does_not_block_the_rest() {
        let (repo, _dir) = temp_repository().await;
        let ch = repo.insert_channel("news").await.unwrap();
        let good = repo.insert_feed(ch, "http://good/rss").await.unwrap();
        let bad = repo.insert_feed(ch, "http://bad/rss").await.unwrap();

        let fetcher =
            StubFetcher::new().with_entries("http://good/rss", &["http://good/1", "http://good/2"]);
        let ingestor = Ingestor::new(repo.clone(), fetcher, 60);

        assert_eq!(ingestor.ingest_cycle(1000).await.unwrap(), 2);

        let feeds: HashMap<i64, i64> = repo
            .find_stale_feeds(100_000, 60)
            .await
            .unwrap()
            .into_iter()
            .map(|f| (f.id, f.updated_at))
            .collect();
        assert_eq!(feeds[&good], 1000);
        assert_eq!(feeds[&bad], 0);
    }

    #[tokio::test]
    async fn empty_feed_still_advances_watermark() {
        let (repo, _dir) = temp_repository().await;
        let ch = repo.insert_channel("news").await.unwrap();
        let feed = repo.insert_feed(ch, "http://empty/rss").await.unwrap();

        let fetcher = StubFetcher::new().with_entries("http://empty/rss", &[]);
        let ingestor = Ingestor::new(repo.clone(), fetcher, 60);

        assert_eq!(ingestor.ingest_cycle(1000).await.unwrap(), 0);
        assert!(repo.find_stale_feeds(1030, 60).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_links_in_one_batch_insert_once() {
        let (repo, _dir) = temp_repository().await;
        let ch = repo.insert_channel("news").await.unwrap();
        repo.insert_feed(ch, "http://a/rss").await.unwrap();

        let fetcher = StubFetcher::new()
            .with_entries("http://a/rss", &["http://a/1", "http://a/1", "http://a/2"]);
        let ingestor = Ingestor::new(repo.clone(), fetcher, 60);

        assert_eq!(ingestor.ingest_cycle(1000).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn fresh_feeds_are_not_polled() {
        let (repo, _dir) = temp_repository().await;
        let ch = repo.insert_channel("news").await.unwrap();
        let feed = repo.insert_feed(ch, "http://a/rss").await.unwrap();
        repo.mark_feed_updated(feed, 990).await.unwrap();

        // Fetcher would fail for this url, but it must never be called.
        let ingestor = Ingestor::new(repo.clone(), StubFetcher::new(), 60);
        assert_eq!(ingestor.ingest_cycle(1000).await.unwrap(), 0);
    }
}
