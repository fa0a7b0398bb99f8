mod fetcher;
mod timestamp;

pub use fetcher::{FeedDocument, FeedFetcher, FeedItem, FeedSource};
pub use timestamp::parse_published_at;
