// Full-text indexing and retrieval over stored articles

pub mod normalize;
pub mod schema;
pub mod search;

pub use normalize::{normalize_query, sanitize_query};
pub use schema::{news_analyzer, ArticleSchema, NEWS_TOKENIZER};
pub use search::{SearchHit, SearchIndex, SearchQuery, SearchResults, SortBy, SortOrder};
