use crate::db::{self, models::*, DbPool};
use crate::error::{Error, Result};
use crate::indexer::SearchIndex;
use crate::vector::ArticleProcessor;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Counters from one ingestion batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub indexed: usize,
    pub vectorized: usize,
}

/// Persists scraped or submitted articles, then indexes and vectorizes the new ones
#[derive(Clone)]
pub struct Ingestor {
    pool: DbPool,
    search_index: Arc<SearchIndex>,
    processor: Option<Arc<ArticleProcessor>>,
}

impl Ingestor {
    pub fn new(
        pool: DbPool,
        search_index: Arc<SearchIndex>,
        processor: Option<Arc<ArticleProcessor>>,
    ) -> Self {
        Self {
            pool,
            search_index,
            processor,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn validate(article: &NewArticle) -> Result<()> {
        if article.title.trim().is_empty() {
            return Err(Error::Validation("Article title cannot be empty".to_string()));
        }
        if article.content.trim().is_empty() {
            return Err(Error::Validation(
                "Article content cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Store a batch; existing (title, source_url) pairs are counted and left alone
    pub async fn ingest(&self, articles: Vec<NewArticle>) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut created = Vec::new();

        for article in articles {
            if let Err(e) = Self::validate(&article) {
                warn!("Rejecting article from {}: {}", article.source_url, e);
                report.rejected += 1;
                continue;
            }

            let (stored, inserted) = db::articles::get_or_create_article(&self.pool, &article).await?;
            if inserted {
                debug!("Stored article {}: {}", stored.id, stored.title);
                report.inserted += 1;
                created.push(stored);
            } else {
                debug!("Duplicate article skipped: {}", stored.source_url);
                report.duplicates += 1;
            }
        }

        let (indexed, vectorized) = self.index_and_vectorize(&created).await;
        report.indexed = indexed;
        report.vectorized = vectorized;

        if report.inserted > 0 || report.rejected > 0 {
            info!(
                "Ingested batch: {} inserted, {} duplicates, {} rejected, {} indexed, {} vectorized",
                report.inserted,
                report.duplicates,
                report.rejected,
                report.indexed,
                report.vectorized
            );
        }

        Ok(report)
    }

    /// Store a single article, returning it and whether it was newly created
    pub async fn ingest_one(&self, article: NewArticle) -> Result<(Article, bool)> {
        Self::validate(&article)?;

        let (stored, inserted) = db::articles::get_or_create_article(&self.pool, &article).await?;
        if inserted {
            self.index_and_vectorize(std::slice::from_ref(&stored)).await;
        }

        Ok((stored, inserted))
    }

    /// Text-index articles in one commit, then push them to the vector store
    ///
    /// Failures are logged and leave the per-article markers unset so a later
    /// `reindex` or `vectorize` run picks them up.
    pub async fn index_and_vectorize(&self, articles: &[Article]) -> (usize, usize) {
        if articles.is_empty() {
            return (0, 0);
        }

        let indexed = match self.index_batch(articles).await {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to index {} articles: {}", articles.len(), e);
                0
            }
        };

        let mut vectorized = 0;
        if let Some(processor) = &self.processor {
            for article in articles {
                match processor.process_and_store_article(article).await {
                    Ok(true) => {
                        if let Err(e) = db::articles::mark_vectorized(&self.pool, article.id).await
                        {
                            warn!("Failed to mark article {} vectorized: {}", article.id, e);
                        }
                        vectorized += 1;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!("Failed to vectorize article {}: {}", article.id, e.log_safe());
                    }
                }
            }
        }

        (indexed, vectorized)
    }

    async fn index_batch(&self, articles: &[Article]) -> Result<usize> {
        let index = self.search_index.clone();
        let batch = articles.to_vec();
        let count = tokio::task::spawn_blocking(move || index.index_articles(&batch))
            .await
            .map_err(|e| Error::Internal(format!("Indexing task failed: {e}")))??;

        for article in articles {
            db::articles::mark_indexed(&self.pool, article.id).await?;
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, run_migrations};
    use crate::indexer::{SearchQuery, SortBy, SortOrder};
    use crate::vector::{EmbeddingProvider, MemoryStore};
    use async_trait::async_trait;
    use chrono::Utc;

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingProvider for UnitEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }

        fn dimension(&self) -> usize {
            3
        }

        fn name(&self) -> &str {
            "unit"
        }
    }

    async fn setup(with_vectors: bool) -> (Ingestor, Arc<MemoryStore>) {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let index = Arc::new(SearchIndex::in_memory().unwrap());
        let store = Arc::new(MemoryStore::new());
        let processor = with_vectors.then(|| {
            Arc::new(ArticleProcessor::new(
                store.clone(),
                Arc::new(UnitEmbedder),
                "title",
            ))
        });
        (Ingestor::new(pool, index, processor), store)
    }

    fn new_article(title: &str, url: &str) -> NewArticle {
        NewArticle {
            title: title.to_string(),
            content: format!("Nội dung của {title}"),
            source_url: url.to_string(),
            source: "VnExpress".to_string(),
            date: Utc::now(),
        }
    }

    fn query(q: &str) -> SearchQuery {
        SearchQuery {
            q: q.to_string(),
            page: 1,
            limit: 10,
            sort_by: SortBy::Score,
            order: SortOrder::Desc,
            source: None,
        }
    }

    #[tokio::test]
    async fn test_ingest_dedupes_indexes_and_vectorizes() {
        let (ingestor, store) = setup(true).await;

        let report = ingestor
            .ingest(vec![
                new_article("Giá vàng tăng", "https://vnexpress.net/a"),
                new_article("Bão số 3", "https://vnexpress.net/b"),
                new_article("Giá vàng tăng", "https://vnexpress.net/a"),
                NewArticle {
                    content: "  ".to_string(),
                    ..new_article("Rỗng", "https://vnexpress.net/c")
                },
            ])
            .await
            .unwrap();

        assert_eq!(
            report,
            IngestReport {
                inserted: 2,
                duplicates: 1,
                rejected: 1,
                indexed: 2,
                vectorized: 2,
            }
        );
        assert_eq!(store.len("title").await, 2);
        assert_eq!(ingestor.search_index.num_docs(), 2);

        let results = ingestor.search_index.search(&query("gia vang"), 100).unwrap();
        assert_eq!(results.total, 1);

        let article = db::articles::get_article(ingestor.pool(), results.hits[0].article_id)
            .await
            .unwrap();
        assert!(article.indexed_at.is_some());
        assert!(article.vectorized_at.is_some());

        // Second run is a no-op
        let again = ingestor
            .ingest(vec![new_article("Bão số 3", "https://vnexpress.net/b")])
            .await
            .unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.duplicates, 1);
        assert_eq!(ingestor.search_index.num_docs(), 2);
    }

    #[tokio::test]
    async fn test_ingest_one() {
        let (ingestor, _) = setup(false).await;

        let (article, created) = ingestor
            .ingest_one(new_article("Tin mới", "https://tuoitre.vn/x"))
            .await
            .unwrap();
        assert!(created);
        assert!(article.id > 0);

        let (same, created) = ingestor
            .ingest_one(new_article("Tin mới", "https://tuoitre.vn/x"))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(same.id, article.id);

        let empty = NewArticle {
            title: " ".to_string(),
            ..new_article("x", "https://tuoitre.vn/y")
        };
        assert!(matches!(
            ingestor.ingest_one(empty).await,
            Err(Error::Validation(_))
        ));
    }
}
