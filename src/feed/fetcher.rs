use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;

use crate::error::Result;
use crate::models::RemoteEntry;

/// Boundary trait for pulling the current items of a remote feed. The
/// ingestion scheduler only depends on this, so tests can substitute a stub.
#[async_trait]
pub trait FetchEntries: Send + Sync {
    /// Returns the feed's items in document order.
    async fn fetch(&self, url: &str) -> Result<Vec<RemoteEntry>>;
}

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(proxy: Option<&str>) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("feedrelay/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        let client = builder.build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FetchEntries for FeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<RemoteEntry>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;

        // Document parsing is CPU-bound; keep it off the scheduler's event loop.
        let entries = tokio::task::spawn_blocking(move || parse_entries(&bytes))
            .await
            .map_err(|e| anyhow::anyhow!("Feed parse task failed: {}", e))??;

        Ok(entries)
    }
}

fn parse_entries(bytes: &[u8]) -> Result<Vec<RemoteEntry>> {
    let feed = parser::parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| RemoteEntry {
            link: entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default(),
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            published: entry.updated.or(entry.published),
        })
        .collect();

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <link>http://example.com/</link>
    <item>
      <title>First post</title>
      <link>http://example.com/1</link>
      <pubDate>Mon, 05 Jan 2026 08:30:00 GMT</pubDate>
    </item>
    <item>
      <link>http://example.com/2</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_entries_in_document_order() {
        let entries = parse_entries(RSS_DOC.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].link, "http://example.com/1");
        assert_eq!(entries[0].title, "First post");
        assert!(entries[0].published.is_some());
    }

    #[test]
    fn missing_title_defaults_to_empty() {
        let entries = parse_entries(RSS_DOC.as_bytes()).unwrap();
        assert_eq!(entries[1].link, "http://example.com/2");
        assert_eq!(entries[1].title, "");
        assert!(entries[1].published.is_none());
    }

    #[test]
    fn garbage_document_is_an_error() {
        assert!(parse_entries(b"not a feed at all").is_err());
    }
}
