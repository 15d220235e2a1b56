// News crawling: listing discovery, page fetching and article extraction

pub mod dates;
pub mod extract;
pub mod fetcher;
pub mod parser;
pub mod scheduler;

use crate::config::sources::{SourceEntry, SourceKind, SourcesConfig};
use crate::config::CrawlerConfig;
use crate::db::{self, models::*, DbPool};
use crate::error::{Error, Result};
use crate::ingest::Ingestor;
use crate::utils::validation;
use chrono::{DateTime, Utc};
use fetcher::{FetchOutcome, Fetcher, RateLimiter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

/// An article candidate found on a listing page or feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingItem {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
}

/// Result of crawling one channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlResult {
    pub channel_id: i64,
    pub new_articles: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Main crawler that turns channel listings into stored articles
pub struct Crawler {
    fetcher: Fetcher,
    rate_limiters: Arc<Mutex<HashMap<String, Arc<RateLimiter>>>>,
    config: CrawlerConfig,
    sources: Arc<SourcesConfig>,
}

impl Crawler {
    pub fn new(config: CrawlerConfig, sources: Arc<SourcesConfig>) -> Result<Self> {
        let fetcher = Fetcher::new(config.user_agent.clone(), config.max_page_size)?;

        Ok(Self {
            fetcher,
            rate_limiters: Arc::new(Mutex::new(HashMap::new())),
            config,
            sources,
        })
    }

    /// Replace the fetcher, e.g. one with a shorter retry backoff
    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn sources(&self) -> &SourcesConfig {
        &self.sources
    }

    fn validate_target(&self, url: &str) -> Result<Url> {
        if !self.config.allow_private_hosts {
            return validation::validate_url(url);
        }

        let parsed = Url::parse(url)?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            other => Err(Error::Validation(format!(
                "URL must use http or https scheme, got {other}"
            ))),
        }
    }

    /// Apply rate limiting for a domain
    async fn apply_rate_limit(&self, domain: &str) {
        let limiter = {
            let mut limiters = self.rate_limiters.lock().await;
            limiters
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::new(self.config.rate_limit)))
                .clone()
        };

        limiter.wait().await;
    }

    async fn prepare_request(&self, url: &str) -> Result<()> {
        let parsed = self.validate_target(url)?;
        let domain = parsed
            .host_str()
            .ok_or_else(|| Error::Validation(format!("URL has no host: {url}")))?;
        self.apply_rate_limit(domain).await;
        Ok(())
    }

    fn source_for(&self, channel: &Channel) -> Result<&SourceEntry> {
        self.sources.get(&channel.source).ok_or_else(|| {
            Error::Config(format!(
                "Channel {} refers to unknown source '{}'",
                channel.id, channel.source
            ))
        })
    }

    /// Crawl a single channel and hand new articles to the ingestor
    pub async fn crawl_channel(&self, ingestor: &Ingestor, channel: &Channel) -> Result<CrawlResult> {
        let pool = ingestor.pool();
        let source = self.source_for(channel)?;
        info!("Crawling channel {} ({}): {}", channel.id, source.name, channel.url);

        let items = match self.fetch_listing(pool, channel, source).await {
            Ok(Some(items)) => items,
            Ok(None) => {
                info!("Channel {} not modified since last crawl", channel.url);
                return Ok(CrawlResult {
                    channel_id: channel.id,
                    ..CrawlResult::default()
                });
            }
            Err(e) => {
                error!("Failed to load listing {}: {}", channel.url, e);
                db::channels::increment_error_count(pool, channel.id).await?;
                db::channels::update_channel_status(
                    pool,
                    channel.id,
                    "error",
                    channel.error_count + 1,
                    Some(e.to_string()),
                )
                .await?;
                return Err(e);
            }
        };

        let limit = source
            .limit
            .unwrap_or(self.config.max_articles_per_channel);
        let candidates: Vec<ListingItem> = items
            .into_iter()
            .filter(|item| {
                let skip = source.skips_url(&item.link);
                if skip {
                    debug!("Skipping excluded link {}", item.link);
                }
                !skip
            })
            .take(limit)
            .collect();

        let label = source.label_for(channel.category.as_deref());
        let mut result = CrawlResult {
            channel_id: channel.id,
            ..CrawlResult::default()
        };
        let mut batch = Vec::new();

        for item in candidates {
            if db::articles::find_by_title_and_url(pool, &item.title, &item.link)
                .await?
                .is_some()
            {
                debug!("Duplicate found for article '{}', skipping", item.title);
                result.duplicates += 1;
                continue;
            }

            match self.build_article(&item, source, &label).await {
                Ok(Some(article)) => batch.push(article),
                Ok(None) => {
                    warn!("No content extracted from {}", item.link);
                    result.failed += 1;
                }
                Err(e) => {
                    warn!("Failed to fetch article {}: {}", item.link, e);
                    result.failed += 1;
                }
            }
        }

        let report = ingestor.ingest(batch).await?;
        result.new_articles = report.inserted;
        result.duplicates += report.duplicates;
        result.failed += report.rejected;

        // A manual crawl of a disabled channel must not enlist it in the scheduler
        let status = if channel.status == "disabled" {
            "disabled"
        } else {
            "active"
        };
        db::channels::update_channel_status(pool, channel.id, status, 0, None).await?;

        info!(
            "Completed crawl of {}: {} new, {} duplicates, {} failed",
            channel.url, result.new_articles, result.duplicates, result.failed
        );

        Ok(result)
    }

    /// Fetch and parse a channel listing; `None` when the feed is unchanged
    async fn fetch_listing(
        &self,
        pool: &DbPool,
        channel: &Channel,
        source: &SourceEntry,
    ) -> Result<Option<Vec<ListingItem>>> {
        self.prepare_request(&channel.url).await?;

        match source.kind {
            SourceKind::Rss => {
                let if_modified_since = channel
                    .last_modified
                    .map(|dt| dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string());

                let fetched = match self
                    .fetcher
                    .fetch_with_conditions(
                        &channel.url,
                        channel.etag.as_deref(),
                        if_modified_since.as_deref(),
                    )
                    .await?
                {
                    FetchOutcome::Fetched(fetched) => fetched,
                    FetchOutcome::NotModified => {
                        db::channels::update_channel_fetch_info(
                            pool,
                            channel.id,
                            channel.etag.as_deref(),
                            channel.last_modified,
                        )
                        .await?;
                        return Ok(None);
                    }
                };

                let feed = parser::parse_feed(&fetched.content)?;

                let last_modified = fetched
                    .last_modified
                    .and_then(|s| DateTime::parse_from_rfc2822(&s).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                db::channels::update_channel_fetch_info(
                    pool,
                    channel.id,
                    fetched.etag.as_deref(),
                    last_modified,
                )
                .await?;

                debug!(
                    "Feed {} has {} entries",
                    feed.title.as_deref().unwrap_or(&channel.url),
                    feed.entries.len()
                );
                Ok(Some(feed.entries))
            }
            SourceKind::Html => {
                let item_selector = source.item_selector.as_deref().ok_or_else(|| {
                    Error::Config(format!("Source '{}' has no item_selector", source.name))
                })?;

                let page = self.fetcher.fetch(&channel.url).await?;
                let items = extract::extract_listing(
                    &page.content,
                    &channel.url,
                    item_selector,
                    source.title_attr.as_deref(),
                )?;

                db::channels::update_channel_fetch_info(pool, channel.id, None, None).await?;
                Ok(Some(items))
            }
        }
    }

    /// Fetch an article page and build the record to store
    async fn build_article(
        &self,
        item: &ListingItem,
        source: &SourceEntry,
        label: &str,
    ) -> Result<Option<NewArticle>> {
        self.prepare_request(&item.link).await?;
        let page = self.fetcher.fetch(&item.link).await?;

        let Some(content) = extract::extract_content(&page.content, &item.link, source)? else {
            return Ok(None);
        };

        let date = dates::resolve_article_date(dates::extract_page_date(&page.content), item.published);

        Ok(Some(NewArticle {
            title: item.title.clone(),
            content,
            source_url: item.link.clone(),
            source: label.to_string(),
            date,
        }))
    }

    /// Crawl every channel of one catalogue source, creating missing channels
    pub async fn crawl_source(&self, ingestor: &Ingestor, name: &str) -> Result<Vec<CrawlResult>> {
        let pool = ingestor.pool();
        let entry = self
            .sources
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Unknown source '{name}'")))?;

        let mut results = Vec::new();
        for spec in entry.channels() {
            let channel = match db::channels::get_channel_by_url(pool, &spec.url).await? {
                Some(channel) => channel,
                None => {
                    let status = if entry.enabled { "active" } else { "disabled" };
                    let new_channel = NewChannel {
                        url: spec.url.clone(),
                        source: spec.source.clone(),
                        category: spec.category.clone(),
                        kind: spec.kind.as_str().to_string(),
                    };
                    db::channels::create_channel_with_status(pool, &new_channel, status).await?
                }
            };

            match self.crawl_channel(ingestor, &channel).await {
                Ok(result) => results.push(result),
                Err(e) => warn!("Channel {} failed: {}", channel.url, e),
            }
        }

        Ok(results)
    }

    /// Crawl every enabled source once
    pub async fn crawl_all(&self, ingestor: &Ingestor) -> Result<Vec<CrawlResult>> {
        let mut results = Vec::new();
        for entry in self.sources.sources.iter().filter(|s| s.enabled) {
            results.extend(self.crawl_source(ingestor, &entry.name).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crawler(allow_private_hosts: bool) -> Crawler {
        let config = CrawlerConfig {
            allow_private_hosts,
            ..CrawlerConfig::default()
        };
        let sources = SourcesConfig {
            version: 1,
            sources: vec![],
        };
        Crawler::new(config, Arc::new(sources)).unwrap()
    }

    #[test]
    fn test_validate_target() {
        let strict = crawler(false);
        assert!(strict.validate_target("https://vnexpress.net/").is_ok());
        assert!(strict.validate_target("http://127.0.0.1:8080/").is_err());

        let relaxed = crawler(true);
        assert!(relaxed.validate_target("http://127.0.0.1:8080/").is_ok());
        assert!(relaxed.validate_target("ftp://127.0.0.1/").is_err());
    }

    #[tokio::test]
    async fn test_rate_limiters_are_per_domain() {
        let crawler = crawler(true);
        crawler.apply_rate_limit("a.example").await;
        crawler.apply_rate_limit("b.example").await;
        assert_eq!(crawler.rate_limiters.lock().await.len(), 2);
    }
}
