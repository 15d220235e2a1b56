use crate::crawler::{CrawlResult, Crawler};
use crate::db::{self, DbPool};
use crate::indexer::SearchIndex;
use crate::ingest::Ingestor;
use crate::vector::ArticleProcessor;
use crate::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const REINDEX_BATCH: i64 = 500;
const VECTORIZE_BATCH: i64 = 100;

/// Body sent to `POST /api/retrieve`
#[derive(Debug, Clone, Serialize)]
pub struct RetrieveParams {
    pub query: String,
    pub page: usize,
    pub limit: usize,
    pub sort_by: String,
    pub order: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Call a running server's retrieval endpoint; `None` when nothing matched
pub async fn retrieve(server_url: &str, params: &RetrieveParams) -> Result<Option<Vec<ArticleHit>>> {
    let client = Client::new();
    let url = format!("{}/api/retrieve", server_url.trim_end_matches('/'));

    let response = client.post(&url).json(params).send().await?;
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());
        return Err(if status == StatusCode::BAD_REQUEST {
            Error::Validation(message)
        } else {
            Error::Internal(format!("Server returned {status}: {message}"))
        });
    }

    Ok(Some(response.json().await?))
}

/// Search articles through the server and print the hits
pub async fn search(server_url: &str, params: &RetrieveParams) -> Result<()> {
    match retrieve(server_url, params).await? {
        Some(hits) => print_hits(&hits, params),
        None => println!("No articles found"),
    }
    Ok(())
}

/// Crawl one catalogue source, or every enabled source, once
pub async fn scrape(
    ingestor: &Ingestor,
    crawler: &Crawler,
    source: Option<&str>,
) -> Result<Vec<CrawlResult>> {
    let results = match source {
        Some(name) => crawler.crawl_source(ingestor, name).await?,
        None => crawler.crawl_all(ingestor).await?,
    };

    let new_articles: usize = results.iter().map(|r| r.new_articles).sum();
    let duplicates: usize = results.iter().map(|r| r.duplicates).sum();
    let failed: usize = results.iter().map(|r| r.failed).sum();

    println!(
        "\x1b[32m\u{2713}\x1b[0m Crawled {} channels: {} new, {} duplicates, {} failed",
        results.len(),
        new_articles,
        duplicates,
        failed
    );

    Ok(results)
}

/// Clear the text index and rebuild it from every stored article
pub async fn reindex(pool: &DbPool, index: &SearchIndex) -> Result<usize> {
    index.clear()?;
    info!("Search index cleared, rebuilding from database");

    let mut offset = 0;
    let mut indexed = 0;
    loop {
        let articles = db::articles::list_all_articles(pool, REINDEX_BATCH, offset).await?;
        if articles.is_empty() {
            break;
        }

        indexed += index.index_articles(&articles)?;
        for article in &articles {
            db::articles::mark_indexed(pool, article.id).await?;
        }

        offset += REINDEX_BATCH;
    }

    println!("\x1b[32m\u{2713}\x1b[0m Reindexed {indexed} articles");
    Ok(indexed)
}

/// Vectorize every article without a vectorized marker
///
/// Stops when a whole batch fails so a dead upstream cannot spin forever.
pub async fn vectorize(pool: &DbPool, processor: &ArticleProcessor) -> Result<usize> {
    let mut vectorized = 0;

    loop {
        let articles = db::articles::list_unvectorized(pool, VECTORIZE_BATCH).await?;
        if articles.is_empty() {
            break;
        }

        // Skipped articles are marked too, so they count as progress
        let mut batch_progress = 0;
        for article in &articles {
            match processor.process_and_store_article(article).await {
                Ok(stored) => {
                    db::articles::mark_vectorized(pool, article.id).await?;
                    batch_progress += 1;
                    if stored {
                        vectorized += 1;
                    }
                }
                Err(e) => warn!("Failed to vectorize article {}: {}", article.id, e.log_safe()),
            }
        }

        if batch_progress == 0 {
            warn!("No article in the last batch could be vectorized; stopping");
            break;
        }
    }

    println!(
        "\x1b[32m\u{2713}\x1b[0m Vectorized {} articles into {} namespace '{}'",
        vectorized,
        processor.store_name(),
        processor.namespace()
    );
    Ok(vectorized)
}

/// Delete the namespace's vectors and clear the markers so `vectorize` starts over
pub async fn purge_vectors(pool: &DbPool, processor: &ArticleProcessor) -> Result<u64> {
    processor.delete_all().await?;
    let reset = db::articles::reset_vectorized(pool).await?;

    println!(
        "\x1b[32m\u{2713}\x1b[0m Purged namespace '{}' ({} articles marked for re-vectorization)",
        processor.namespace(),
        reset
    );
    Ok(reset)
}

fn print_hits(hits: &[ArticleHit], params: &RetrieveParams) {
    println!(
        "\nPage {} ({} per page), sorted by {} {}:\n",
        params.page, params.limit, params.sort_by, params.order
    );
    println!("{:<6} {:<8} {:<12} {:<50}", "ID", "Score", "Date", "Title");
    println!("{}", "-".repeat(80));

    for hit in hits {
        println!(
            "{:<6} {:<8.3} {:<12} {:<50}",
            hit.id,
            hit.score,
            hit.date.get(..10).unwrap_or(&hit.date),
            truncate(&hit.title, 50)
        );
        println!("       {} | {}", hit.source, hit.source_url);
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

// Response types (matching API models)

#[derive(Debug, Clone, Deserialize)]
pub struct ArticleHit {
    pub id: i64,
    pub title: String,
    pub source_url: String,
    pub source: String,
    pub date: String,
    pub score: f32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}
