use crate::db::models::{Article, Channel, QueryRecord, SummaryRecord};
use crate::vector::VectorMatch;
use serde::{de, Deserialize, Deserializer, Serialize};

const DEFAULT_TOP_K: i64 = 5;

/// Integer field that also accepts its decimal string form (`5` or `"5"`)
///
/// Query strings always arrive as text, so this is what lets both extractors
/// share the request types. A blank string counts as absent.
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(n)) => Ok(Some(n)),
        Some(Raw::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Raw::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected an integer, got '{text}'"))),
    }
}

/// Paging parameters shared by list endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct PageParams {
    #[serde(default, deserialize_with = "lenient_int")]
    pub page: Option<i64>,
    /// Falls back to the configured default limit
    #[serde(default, deserialize_with = "lenient_int")]
    pub limit: Option<i64>,
}

/// Article list query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleListParams {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub page: Option<i64>,
    /// Falls back to the configured default limit
    #[serde(default, deserialize_with = "lenient_int")]
    pub limit: Option<i64>,
}

/// Channel list query parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelListParams {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub page: Option<i64>,
    /// Falls back to the configured default limit
    #[serde(default, deserialize_with = "lenient_int")]
    pub limit: Option<i64>,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticlesResponse {
    pub articles: Vec<Article>,
    pub pagination: Pagination,
}

/// Body of `POST /api/articles`
///
/// Every field is optional at the serde level so a missing field is
/// reported as a 400 with a readable message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateArticleRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<i64>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummariesResponse {
    pub summaries: Vec<SummaryRecord>,
    pub pagination: Pagination,
}

/// Stored query as exposed by the API; the row id stays internal
#[derive(Debug, Clone, Serialize)]
pub struct QueryItem {
    pub query: String,
    pub response: String,
    pub created_at: String,
}

impl From<QueryRecord> for QueryItem {
    fn from(record: QueryRecord) -> Self {
        Self {
            query: record.query,
            response: record.response,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueriesResponse {
    pub queries: Vec<QueryItem>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateQueryRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummarizeRequest {
    #[serde(default)]
    pub article_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub article_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

/// Body of `POST /api/retrieve`
///
/// Sort fields stay strings here and are parsed in the handler so an
/// unknown value yields a 400 rather than a deserialization rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, deserialize_with = "lenient_int")]
    pub page: Option<i64>,
    /// Falls back to the configured default limit
    #[serde(default, deserialize_with = "lenient_int")]
    pub limit: Option<i64>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// A retrieved article with its relevance score
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedArticle {
    #[serde(flatten)]
    pub article: Article,
    pub score: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SemanticSearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, deserialize_with = "lenient_int")]
    pub top_k: Option<i64>,
}

impl SemanticSearchRequest {
    pub fn top_k(&self) -> i64 {
        self.top_k.unwrap_or(DEFAULT_TOP_K)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticSearchResponse {
    pub matches: Vec<VectorMatch>,
}

/// Crawl channel state
#[derive(Debug, Clone, Serialize)]
pub struct ChannelCard {
    pub id: i64,
    pub url: String,
    pub source: String,
    pub category: Option<String>,
    pub kind: String,
    pub status: String,
    pub error_count: i64,
    pub error_message: Option<String>,
    pub last_fetched_at: Option<String>,
    pub created_at: String,
}

impl From<Channel> for ChannelCard {
    fn from(channel: Channel) -> Self {
        Self {
            id: channel.id,
            url: channel.url,
            source: channel.source,
            category: channel.category,
            kind: channel.kind,
            status: channel.status,
            error_count: channel.error_count,
            error_message: channel.error_message,
            last_fetched_at: channel.last_fetched_at.map(|dt| dt.to_rfc3339()),
            created_at: channel.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelsResponse {
    pub channels: Vec<ChannelCard>,
    pub pagination: Pagination,
}

/// System statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total_articles: i64,
    pub total_channels: i64,
    pub active_channels: i64,
    pub total_summaries: i64,
    pub total_queries: i64,
    pub indexed_documents: u64,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness check response
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database: String,
    pub search_index: String,
}
