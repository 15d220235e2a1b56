use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub source_url: String,
    pub source: String,
    pub date: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub indexed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub vectorized_at: Option<DateTime<Utc>>,
}

/// Normalized article produced by a scraper or the submission endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub source_url: String,
    pub source: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Channel {
    pub id: i64,
    pub url: String,
    pub source: String,
    pub category: Option<String>,
    pub kind: String,
    pub status: String,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub error_count: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChannel {
    pub url: String,
    pub source: String,
    pub category: Option<String>,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SummaryRecord {
    pub id: i64,
    pub article_id: Option<i64>,
    pub summary: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueryRecord {
    pub id: i64,
    pub query: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}
