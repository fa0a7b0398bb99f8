use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::{parse_published_at, FeedSource};
use crate::models::NewPost;

/// Placeholder so no post is ever stored titleless.
const NO_TITLE: &str = "[NO TITLE]";

/// What one cycle did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub feed_id: i64,
    pub inserted: usize,
    pub skipped: usize,
}

/// The aggregation engine: on each tick, picks the stalest feed, stamps
/// it, fetches it, and ingests its items as posts.
pub struct Aggregator<'a, F> {
    repo: &'a Repository,
    fetcher: F,
}

impl<'a, F: FeedSource> Aggregator<'a, F> {
    pub fn new(repo: &'a Repository, fetcher: F) -> Self {
        Self { repo, fetcher }
    }

    /// Runs cycles forever at a fixed interval, the first one immediately.
    ///
    /// A failed cycle is logged and the loop keeps ticking; only the
    /// caller terminating the process stops it.
    pub async fn run(&self, interval: Duration) -> Result<()> {
        info!("collecting feeds every {}", humantime::format_duration(interval));

        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.run_cycle().await {
                Ok(outcome) => {
                    info!(
                        feed_id = outcome.feed_id,
                        inserted = outcome.inserted,
                        skipped = outcome.skipped,
                        "cycle complete"
                    );
                }
                Err(e) => warn!("aggregation cycle failed: {e}"),
            }
        }
    }

    /// One full cycle: select, stamp, fetch, ingest.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let feed = self
            .repo
            .next_feed_to_fetch()
            .await?
            .ok_or(AppError::NoFeeds)?;

        // Stamp before fetching so a feed that errors every time still
        // yields its turn to the others.
        self.repo.mark_feed_fetched(feed.id, Utc::now()).await?;

        info!(feed = %feed.name, url = %feed.url, "fetching feed");
        let document = self.fetcher.fetch(&feed.url).await?;

        let mut inserted = 0;
        let mut skipped = 0;
        for item in document.items {
            let title = if item.title.is_empty() {
                NO_TITLE.to_string()
            } else {
                item.title
            };

            // A malformed upstream timestamp must not kill a long-running
            // aggregator; the post is kept with an unknown publish date.
            let published_at = match item.published_at_raw.as_deref() {
                Some(raw) => match parse_published_at(raw) {
                    Ok(ts) => Some(ts),
                    Err(e) => {
                        warn!(title = %title, "{e}");
                        None
                    }
                },
                None => None,
            };

            let post = NewPost {
                feed_id: feed.id,
                title,
                url: item.link,
                description: item.description,
                published_at,
            };

            match self.repo.insert_post(post).await {
                Ok(true) => inserted += 1,
                Ok(false) => {
                    debug!("post already added based on its URL");
                    skipped += 1;
                }
                Err(e) => warn!("error inserting post: {e}"),
            }
        }

        Ok(CycleOutcome {
            feed_id: feed.id,
            inserted,
            skipped,
        })
    }
}
