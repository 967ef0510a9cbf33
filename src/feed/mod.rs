mod fetcher;
mod ingest;

pub use fetcher::{FeedFetcher, FetchEntries};
pub use ingest::Ingestor;
