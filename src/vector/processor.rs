use crate::config::{VectorBackend, VectorConfig};
use crate::db::models::Article;
use crate::error::{Error, Result};
use crate::vector::{
    clean_query, clean_text, pad_or_resize, EmbeddingProvider, HttpEmbedder, MemoryStore,
    Metadata, PineconeStore, VectorMatch, VectorRecord, VectorStore,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Vectorizes article titles and runs similarity queries against them
pub struct ArticleProcessor {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    namespace: String,
}

impl ArticleProcessor {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            namespace: namespace.into(),
        }
    }

    /// Build the processor for the configured backend; `None` when disabled
    pub fn from_config(config: &VectorConfig) -> Result<Option<Self>> {
        let store: Arc<dyn VectorStore> = match config.backend {
            VectorBackend::Disabled => return Ok(None),
            VectorBackend::Memory => Arc::new(MemoryStore::new()),
            VectorBackend::Pinecone => {
                let (Some(key), Some(host)) = (&config.pinecone_api_key, &config.pinecone_host)
                else {
                    return Err(Error::Config(
                        "PINECONE_API_KEY and PINECONE_HOST must be set for the pinecone backend"
                            .to_string(),
                    ));
                };
                Arc::new(PineconeStore::new(key.clone(), host)?)
            }
        };

        let embedder = Arc::new(HttpEmbedder::from_config(config)?);
        info!(
            "Vector processor ready: {} store, {} embeddings, namespace '{}'",
            store.name(),
            embedder.name(),
            config.namespace
        );

        Ok(Some(Self::new(store, embedder, config.namespace.clone())))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Vector id of an article's title record
    pub fn record_id(source_url: &str) -> String {
        format!("{source_url}-title")
    }

    /// Embed `text` and fit it to the store's dimension
    ///
    /// Short vectors are zero-padded and long ones truncated. An empty
    /// embedding carries no signal and is an error.
    async fn embed_resized(&self, text: &str) -> Result<Vec<f32>> {
        let dimension = self.embedder.dimension();
        let raw = self.embedder.embed(text).await?;
        if raw.is_empty() {
            return Err(Error::Embedding(format!(
                "{} returned an empty embedding",
                self.embedder.name()
            )));
        }
        if raw.len() != dimension {
            debug!(
                "Resizing {}-dimensional embedding to {}",
                raw.len(),
                dimension
            );
        }
        Ok(pad_or_resize(raw, dimension))
    }

    /// Embed the article title and upsert it with the article as metadata
    ///
    /// Returns `false` when the article has no title or content to vectorize.
    pub async fn process_and_store_article(&self, article: &Article) -> Result<bool> {
        if article.title.trim().is_empty() || article.content.trim().is_empty() {
            warn!(
                "Skipping vectorization of {}: missing title or content",
                article.source_url
            );
            return Ok(false);
        }

        let title = clean_text(&article.title);
        debug!("Vectorizing title for article {}", article.source_url);
        let values = self.embed_resized(&title).await?;

        let metadata = match json!({
            "type": "title",
            "title": article.title,
            "content": article.content,
            "source_url": article.source_url,
            "date": article.date.to_rfc3339(),
            "source": article.source,
            "article_id": article.id,
        }) {
            serde_json::Value::Object(map) => map,
            _ => Metadata::new(),
        };

        let record = VectorRecord {
            id: Self::record_id(&article.source_url),
            values,
            metadata,
        };

        self.store.upsert(&[record], &self.namespace).await?;
        Ok(true)
    }

    /// Semantic search over stored titles
    pub async fn query_similar(&self, query: &str, top_k: usize) -> Result<Vec<VectorMatch>> {
        let cleaned = clean_query(query);
        if cleaned.is_empty() {
            return Err(Error::Validation(
                "Query must contain at least one meaningful word.".to_string(),
            ));
        }

        debug!("Semantic query '{}' (top_k {})", cleaned, top_k);
        let vector = self.embed_resized(&cleaned).await?;
        let matches = self.store.query(&vector, &self.namespace, top_k).await?;
        info!("Semantic query matched {} vectors", matches.len());
        Ok(matches)
    }

    pub async fn fetch_by_id(&self, id: &str) -> Result<Option<VectorRecord>> {
        self.store.fetch(id, &self.namespace).await
    }

    pub async fn delete_all(&self) -> Result<()> {
        self.store.delete_all(&self.namespace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    /// Embeds text as (word count, char count), padded by the processor
    struct CountingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![
                text.split_whitespace().count() as f32,
                text.chars().count() as f32,
            ])
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn article(title: &str, content: &str) -> Article {
        let date = Utc.with_ymd_and_hms(2024, 10, 7, 2, 10, 0).unwrap();
        Article {
            id: 42,
            title: title.to_string(),
            content: content.to_string(),
            source_url: "https://vnexpress.net/gia-vang.html".to_string(),
            source: "VnExpress".to_string(),
            date,
            content_hash: String::new(),
            created_at: date,
            indexed_at: None,
            vectorized_at: None,
        }
    }

    fn processor() -> (ArticleProcessor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let processor = ArticleProcessor::new(store.clone(), Arc::new(CountingEmbedder), "title");
        (processor, store)
    }

    #[tokio::test]
    async fn test_process_and_store_article() {
        let (processor, store) = processor();

        let stored = processor
            .process_and_store_article(&article("Giá vàng, hôm nay", "Nội dung"))
            .await
            .unwrap();
        assert!(stored);
        assert_eq!(store.len("title").await, 1);

        let record = processor
            .fetch_by_id("https://vnexpress.net/gia-vang.html-title")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.values.len(), 4);
        assert_eq!(record.values[0], 4.0);
        assert_eq!(record.metadata["type"], "title");
        assert_eq!(record.metadata["article_id"], 42);
        assert_eq!(record.metadata["date"], "2024-10-07T02:10:00+00:00");
    }

    #[tokio::test]
    async fn test_skips_articles_without_content() {
        let (processor, store) = processor();
        assert!(!processor
            .process_and_store_article(&article("Tiêu đề", "  "))
            .await
            .unwrap());
        assert_eq!(store.len("title").await, 0);
    }

    #[tokio::test]
    async fn test_query_similar_and_delete_all() {
        let (processor, store) = processor();
        processor
            .process_and_store_article(&article("Giá vàng", "x"))
            .await
            .unwrap();

        let matches = processor.query_similar("giá và vàng", 5).await.unwrap();
        assert_eq!(matches.len(), 1);

        assert!(matches!(
            processor.query_similar("và của", 5).await,
            Err(Error::Validation(_))
        ));

        processor.delete_all().await.unwrap();
        assert_eq!(store.len("title").await, 0);
    }

    struct EmptyEmbedder;

    #[async_trait]
    impl EmbeddingProvider for EmptyEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(Vec::new())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    #[tokio::test]
    async fn test_empty_embedding_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let processor = ArticleProcessor::new(store.clone(), Arc::new(EmptyEmbedder), "title");

        let result = processor
            .process_and_store_article(&article("Giá vàng", "Nội dung"))
            .await;
        assert!(matches!(result, Err(Error::Embedding(msg)) if msg.contains("empty")));
        assert_eq!(store.len("title").await, 0);

        assert!(matches!(
            processor.query_similar("giá vàng", 5).await,
            Err(Error::Embedding(_))
        ));
    }

    #[test]
    fn test_disabled_backend_builds_nothing() {
        let config = VectorConfig::default();
        assert!(ArticleProcessor::from_config(&config).unwrap().is_none());

        let config = VectorConfig {
            backend: VectorBackend::Pinecone,
            pinecone_api_key: None,
            ..VectorConfig::default()
        };
        assert!(ArticleProcessor::from_config(&config).is_err());
    }
}
