use crate::{crawler::Crawler, db, ingest::Ingestor, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Background scheduler for channel crawling
pub struct Scheduler {
    ingestor: Ingestor,
    crawler: Arc<Crawler>,
    interval_seconds: u64,
}

/// Totals for one scheduler tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub channels: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub new_articles: usize,
}

impl Scheduler {
    pub fn new(ingestor: Ingestor, crawler: Arc<Crawler>, interval_seconds: u64) -> Self {
        Self {
            ingestor,
            crawler,
            interval_seconds,
        }
    }

    /// Start the scheduler in the background
    ///
    /// The first tick fires immediately.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Crawler scheduler started with interval: {}s",
                self.interval_seconds
            );

            let mut ticker = interval(Duration::from_secs(self.interval_seconds.max(1)));

            loop {
                ticker.tick().await;

                debug!("Scheduler tick: crawling channels");

                if let Err(e) = self.run_once().await {
                    error!("Error processing channels: {}", e);
                }
            }
        })
    }

    /// Crawl every channel that is not disabled, in batches
    ///
    /// Channels in error state are retried so they can recover.
    pub async fn run_once(&self) -> Result<TickSummary> {
        const BATCH_SIZE: i64 = 50;
        let pool = self.ingestor.pool();
        let mut offset = 0;
        let mut summary = TickSummary::default();

        loop {
            let channels = db::channels::list_channels(pool, None, BATCH_SIZE, offset).await?;
            if channels.is_empty() {
                break;
            }

            let batch_size = channels.len();
            debug!(
                "Processing batch of {} channels (offset: {})",
                batch_size, offset
            );

            for channel in channels.iter().filter(|c| c.status != "disabled") {
                summary.channels += 1;
                match self.crawler.crawl_channel(&self.ingestor, channel).await {
                    Ok(result) => {
                        summary.succeeded += 1;
                        summary.new_articles += result.new_articles;
                    }
                    Err(e) => {
                        summary.failed += 1;
                        warn!("Error crawling channel {}: {}", channel.url, e);
                    }
                }
            }

            offset += BATCH_SIZE;
            if (batch_size as i64) < BATCH_SIZE {
                break;
            }
        }

        info!(
            "Crawl tick complete: {} channels, {} succeeded, {} failed, {} new articles",
            summary.channels, summary.succeeded, summary.failed, summary.new_articles
        );

        Ok(summary)
    }
}
