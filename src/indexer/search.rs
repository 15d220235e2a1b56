use crate::db::models::Article;
use crate::error::{Error, Result};
use crate::indexer::normalize::normalize_query;
use crate::indexer::schema::{news_analyzer, ArticleSchema, NEWS_TOKENIZER};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, OwnedValue};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info, warn};

const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Score,
    Date,
}

impl FromStr for SortBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "score" => Ok(SortBy::Score),
            "date" => Ok(SortBy::Date),
            other => Err(Error::Validation(format!(
                "Invalid sort_by '{other}'. Use 'score' or 'date'."
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(Error::Validation(format!(
                "Invalid order '{other}'. Use 'asc' or 'desc'."
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub page: usize,
    pub limit: usize,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub article_id: i64,
    pub score: f32,
    /// Unix seconds
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
}

/// Full-text index over article titles and bodies
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    schema: ArticleSchema,
    title_boost: f32,
    content_boost: f32,
}

impl SearchIndex {
    /// Create or open search index
    pub fn new(index_path: impl AsRef<Path>) -> Result<Self> {
        let path = index_path.as_ref();
        let schema = ArticleSchema::new();

        std::fs::create_dir_all(path)?;

        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)
                .map_err(|e| Error::Search(format!("Failed to open index: {e}")))?
        } else {
            Index::create_in_dir(path, schema.schema.clone())
                .map_err(|e| Error::Search(format!("Failed to create index: {e}")))?
        };

        let index_schema = index.schema();
        if index_schema.get_field("source").is_err() || index_schema.get_field("date").is_err() {
            return Err(Error::Search(format!(
                "Index at {} has an incompatible schema; remove it and run `aggsum reindex`",
                path.display()
            )));
        }

        Self::from_index(index, schema)
    }

    /// In-RAM index, for tests and one-off tooling
    pub fn in_memory() -> Result<Self> {
        let schema = ArticleSchema::new();
        let index = Index::create_in_ram(schema.schema.clone());
        Self::from_index(index, schema)
    }

    fn from_index(index: Index, schema: ArticleSchema) -> Result<Self> {
        index.tokenizers().register(NEWS_TOKENIZER, news_analyzer());

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| Error::Search(format!("Failed to create reader: {e}")))?;

        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| Error::Search(format!("Failed to create writer: {e}")))?;

        info!("Search index ready ({} documents)", reader.searcher().num_docs());

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            schema,
            title_boost: 20.0,
            content_boost: 5.0,
        })
    }

    /// Override the title/content weights
    pub fn with_boosts(mut self, title_boost: f32, content_boost: f32) -> Self {
        self.title_boost = title_boost;
        self.content_boost = content_boost;
        self
    }

    fn with_writer<T>(&self, f: impl FnOnce(&mut IndexWriter) -> Result<T>) -> Result<T> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::Search("Index writer lock poisoned".to_string()))?;
        f(&mut writer)
    }

    fn commit_and_reload(&self, writer: &mut IndexWriter) -> Result<()> {
        writer
            .commit()
            .map_err(|e| Error::Search(format!("Failed to commit: {e}")))?;
        self.reader
            .reload()
            .map_err(|e| Error::Search(format!("Failed to reload reader: {e}")))?;
        Ok(())
    }

    /// Index articles, replacing any previous document with the same id
    pub fn index_articles(&self, articles: &[Article]) -> Result<usize> {
        if articles.is_empty() {
            return Ok(0);
        }

        self.with_writer(|writer| {
            for article in articles {
                debug!("Indexing article: {}", article.id);
                writer.delete_term(Term::from_field_i64(self.schema.id, article.id));
                writer.add_document(doc!(
                    self.schema.id => article.id,
                    self.schema.title => article.title.as_str(),
                    self.schema.content => article.content.as_str(),
                    self.schema.source => article.source.as_str(),
                    self.schema.date => article.date.timestamp(),
                ))?;
            }
            self.commit_and_reload(writer)?;
            Ok(articles.len())
        })
    }

    /// Delete an article from the index
    pub fn delete_article(&self, article_id: i64) -> Result<()> {
        self.with_writer(|writer| {
            writer.delete_term(Term::from_field_i64(self.schema.id, article_id));
            self.commit_and_reload(writer)
        })
    }

    /// Remove every document
    pub fn clear(&self) -> Result<()> {
        self.with_writer(|writer| {
            writer.delete_all_documents()?;
            self.commit_and_reload(writer)
        })
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Whether the index can still take writes and serve fresh reads
    ///
    /// A writer that panicked mid-batch leaves its lock poisoned and every
    /// later write failing, so that counts as unhealthy.
    pub fn is_healthy(&self) -> bool {
        if self.writer.is_poisoned() {
            return false;
        }
        match self.reader.reload() {
            Ok(()) => true,
            Err(e) => {
                warn!("Search index reader failed to reload: {}", e);
                false
            }
        }
    }

    /// Ranked search with sort, source filter and pagination
    ///
    /// Candidates are the `max_results` best-scoring matches; sorting by date
    /// reorders those candidates rather than the whole corpus.
    pub fn search(&self, query: &SearchQuery, max_results: usize) -> Result<SearchResults> {
        if query.page == 0 {
            return Err(Error::Validation(
                "Page must be a positive integer.".to_string(),
            ));
        }
        if query.limit == 0 {
            return Err(Error::Validation(
                "Limit must be a positive integer.".to_string(),
            ));
        }

        let normalized = normalize_query(&query.q);
        if normalized.is_empty() {
            return Err(Error::Validation(
                "Query must contain at least one word.".to_string(),
            ));
        }

        let mut query_parser =
            QueryParser::for_index(&self.index, vec![self.schema.title, self.schema.content]);
        query_parser.set_field_boost(self.schema.title, self.title_boost);
        query_parser.set_field_boost(self.schema.content, self.content_boost);

        let text_query = query_parser
            .parse_query(&normalized)
            .map_err(|e| Error::Search(format!("Invalid query: {e}")))?;

        let tantivy_query: Box<dyn Query> = match &query.source {
            Some(source) => {
                let source_query = TermQuery::new(
                    Term::from_field_text(self.schema.source, source),
                    IndexRecordOption::Basic,
                );
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, text_query),
                    (Occur::Must, Box::new(source_query)),
                ]))
            }
            None => text_query,
        };

        let searcher = self.reader.searcher();
        let (total, top_docs) = searcher
            .search(
                &*tantivy_query,
                &(Count, TopDocs::with_limit(max_results.max(1))),
            )
            .map_err(|e| Error::Search(format!("Search failed: {e}")))?;

        let mut hits: Vec<SearchHit> = top_docs
            .into_iter()
            .filter_map(|(score, doc_address)| {
                let doc = searcher.doc::<TantivyDocument>(doc_address).ok()?;

                let article_id = match doc.get_first(self.schema.id)? {
                    OwnedValue::I64(id) => *id,
                    _ => return None,
                };

                let date = match doc.get_first(self.schema.date) {
                    Some(OwnedValue::I64(ts)) => *ts,
                    _ => 0,
                };

                Some(SearchHit {
                    article_id,
                    score,
                    date,
                })
            })
            .collect();

        sort_hits(&mut hits, query.sort_by, query.order);

        let retrievable = hits.len();
        let offset = (query.page - 1).saturating_mul(query.limit);
        let hits: Vec<SearchHit> = hits.into_iter().skip(offset).take(query.limit).collect();

        debug!(
            "Search '{}' matched {} documents, returning {} (page {})",
            normalized,
            total,
            hits.len(),
            query.page
        );

        Ok(SearchResults {
            hits,
            total,
            page: query.page,
            total_pages: retrievable.div_ceil(query.limit),
        })
    }
}

fn sort_hits(hits: &mut [SearchHit], sort_by: SortBy, order: SortOrder) {
    hits.sort_by(|a, b| {
        let primary = match sort_by {
            SortBy::Score => a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal),
            SortBy::Date => a.date.cmp(&b.date),
        };
        let ordering = primary.then_with(|| a.article_id.cmp(&b.article_id));
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn article(id: i64, title: &str, content: &str, source: &str, day: u32) -> Article {
        let date = Utc.with_ymd_and_hms(2024, 10, day, 8, 0, 0).unwrap();
        Article {
            id,
            title: title.to_string(),
            content: content.to_string(),
            source_url: format!("https://example.com/{id}"),
            source: source.to_string(),
            date,
            content_hash: String::new(),
            created_at: date,
            indexed_at: None,
            vectorized_at: None,
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

    #[test]
    fn test_create_index_on_disk() {
        let dir = tempdir().unwrap();
        let index = SearchIndex::new(dir.path());
        assert!(index.is_ok());

        // Reopening an existing directory must also work
        drop(index);
        assert!(SearchIndex::new(dir.path()).is_ok());
    }

    #[test]
    fn test_title_matches_outrank_content_matches() {
        let index = SearchIndex::in_memory().unwrap();
        index
            .index_articles(&[
                article(1, "Thị trường chứng khoán", "Giá vàng được nhắc tới", "A", 1),
                article(2, "Giá vàng tăng mạnh", "Thị trường sôi động", "A", 2),
            ])
            .unwrap();

        let results = index.search(&query("giá vàng"), 1000).unwrap();
        assert_eq!(results.total, 2);
        assert_eq!(results.hits[0].article_id, 2);
        assert!(results.hits[0].score > results.hits[1].score);
    }

    #[test]
    fn test_search_ignores_diacritics_and_case() {
        let index = SearchIndex::in_memory().unwrap();
        index
            .index_articles(&[article(7, "Tin Thế Giới", "Nội dung", "Tuổi Trẻ - Thế Giới", 1)])
            .unwrap();

        let results = index.search(&query("the gioi"), 1000).unwrap();
        assert_eq!(results.total, 1);

        let results = index.search(&query("THẾ GIỚI!!"), 1000).unwrap();
        assert_eq!(results.hits[0].article_id, 7);
    }

    #[test]
    fn test_sort_by_date_and_pagination() {
        let index = SearchIndex::in_memory().unwrap();
        let articles: Vec<Article> = (1..=7)
            .map(|i| article(i, &format!("Bão số {i}"), "Bão đổ bộ", "A", i as u32))
            .collect();
        index.index_articles(&articles).unwrap();

        let mut q = query("bão");
        q.sort_by = SortBy::Date;
        q.order = SortOrder::Desc;
        q.limit = 3;

        let page1 = index.search(&q, 1000).unwrap();
        let ids: Vec<i64> = page1.hits.iter().map(|h| h.article_id).collect();
        assert_eq!(ids, vec![7, 6, 5]);
        assert_eq!(page1.total, 7);
        assert_eq!(page1.total_pages, 3);

        q.page = 3;
        let page3 = index.search(&q, 1000).unwrap();
        let ids: Vec<i64> = page3.hits.iter().map(|h| h.article_id).collect();
        assert_eq!(ids, vec![1]);

        q.page = 4;
        assert!(index.search(&q, 1000).unwrap().hits.is_empty());

        q.page = 1;
        q.order = SortOrder::Asc;
        let asc = index.search(&q, 1000).unwrap();
        assert_eq!(asc.hits[0].article_id, 1);
    }

    #[test]
    fn test_source_filter() {
        let index = SearchIndex::in_memory().unwrap();
        index
            .index_articles(&[
                article(1, "Rust release", "compiler", "Hacker News", 1),
                article(2, "Rust release notes", "compiler", "TechCrunch", 2),
            ])
            .unwrap();

        let mut q = query("rust");
        q.source = Some("TechCrunch".to_string());
        let results = index.search(&q, 1000).unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].article_id, 2);
    }

    #[test]
    fn test_invalid_queries_rejected() {
        let index = SearchIndex::in_memory().unwrap();

        assert!(matches!(
            index.search(&query("   ?!  "), 1000),
            Err(Error::Validation(_))
        ));

        let mut q = query("rust");
        q.page = 0;
        assert!(matches!(index.search(&q, 1000), Err(Error::Validation(_))));

        let mut q = query("rust");
        q.limit = 0;
        assert!(matches!(index.search(&q, 1000), Err(Error::Validation(_))));
    }

    #[test]
    fn test_index_articles_deletes_before_adding() {
        let index = SearchIndex::in_memory().unwrap();

        let original = article(123, "UniqueHeadline12345", "first body", "A", 1);
        index.index_articles(&[original.clone()]).unwrap();
        assert_eq!(index.num_docs(), 1);

        let updated = Article {
            title: "UpdatedHeadline12345".to_string(),
            ..original
        };
        index.index_articles(&[updated]).unwrap();

        assert_eq!(index.num_docs(), 1);
        assert_eq!(
            index.search(&query("UniqueHeadline12345"), 1000).unwrap().total,
            0
        );
        assert_eq!(
            index.search(&query("UpdatedHeadline12345"), 1000).unwrap().total,
            1
        );
    }

    #[test]
    fn test_delete_and_clear() {
        let index = SearchIndex::in_memory().unwrap();
        index
            .index_articles(&[
                article(1, "one", "x", "A", 1),
                article(2, "two", "x", "A", 2),
            ])
            .unwrap();

        index.delete_article(1).unwrap();
        assert_eq!(index.num_docs(), 1);

        index.clear().unwrap();
        assert_eq!(index.num_docs(), 0);
    }

    #[test]
    fn test_poisoned_writer_is_unhealthy() {
        let index = SearchIndex::in_memory().unwrap();
        assert!(index.is_healthy());

        let crashed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            index.with_writer(|_| -> Result<()> { panic!("writer crashed mid-batch") })
        }));
        assert!(crashed.is_err());

        assert!(!index.is_healthy());
        assert!(index.delete_article(1).is_err());
    }

    #[test]
    fn test_sort_enums_parse() {
        assert_eq!("date".parse::<SortBy>().unwrap(), SortBy::Date);
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("newest".parse::<SortBy>().is_err());
        assert!("up".parse::<SortOrder>().is_err());
    }
}
