use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    api::{
        extract::{ApiJson, ApiQuery},
        models::*,
    },
    config::Settings,
    crawler::dates::parse_published_date,
    db::{
        self,
        models::{Article, NewArticle},
        DbPool,
    },
    indexer::{SearchIndex, SearchQuery, SortBy, SortOrder},
    ingest::Ingestor,
    summarizer::{summarize_article, Summarizer},
    utils::validation::{validate_pagination, validate_source_url},
    vector::ArticleProcessor,
    Error, Result,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub search_index: Arc<SearchIndex>,
    pub ingestor: Ingestor,
    pub summarizer: Option<Arc<dyn Summarizer>>,
    pub processor: Option<Arc<ArticleProcessor>>,
    pub settings: Settings,
}

impl AppState {
    /// Resolve request paging against the configured defaults and ceiling
    fn resolve_page(&self, page: Option<i64>, limit: Option<i64>) -> Result<(usize, usize)> {
        let pagination = &self.settings.pagination;
        validate_pagination(
            page.unwrap_or(1),
            limit.unwrap_or(pagination.default_limit as i64),
            pagination.api_max_limit,
        )
    }

    /// SQL `LIMIT` and `OFFSET` for a resolved page
    fn page_window(page: usize, limit: usize) -> (i64, i64) {
        let offset = (page - 1).saturating_mul(limit);
        (limit as i64, offset as i64)
    }

    fn pagination(&self, page: usize, limit: usize, total: i64) -> Pagination {
        let total = total.max(0) as usize;
        Pagination {
            page,
            limit,
            total,
            total_pages: total
                .div_ceil(limit)
                .min(self.settings.pagination.max_pages),
        }
    }
}

fn required(field: Option<String>, name: &str) -> Result<String> {
    match field.map(|v| v.trim().to_string()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::Validation(format!("Field '{name}' is required."))),
    }
}

/// GET / - Service banner
pub async fn index() -> &'static str {
    "RAG AI News Aggregator Backend"
}

/// GET /api/articles - List articles, newest first
pub async fn list_articles(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ArticleListParams>,
) -> Result<Json<ArticlesResponse>> {
    debug!("List articles request: {:?}", params);

    let (page, page_size) = state.resolve_page(params.page, params.limit)?;
    let (limit, offset) = AppState::page_window(page, page_size);
    let source = params.source.as_deref().filter(|s| !s.is_empty());

    let articles = db::articles::list_articles(&state.pool, source, limit, offset).await?;
    let total = db::articles::count_articles(&state.pool, source).await?;

    Ok(Json(ArticlesResponse {
        articles,
        pagination: state.pagination(page, page_size, total),
    }))
}

/// GET /api/articles/:id - Get one article
pub async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    debug!("Get article request: {}", id);

    let id: i64 = id
        .parse()
        .map_err(|_| Error::Validation("Invalid article ID.".to_string()))?;
    let article = db::articles::get_article(&state.pool, id).await?;

    Ok(Json(article).into_response())
}

/// POST /api/articles - Submit an article
pub async fn create_article(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateArticleRequest>,
) -> Result<Response> {
    let title = required(body.title, "title")?;
    let content = required(body.content, "content")?;
    let raw_date = required(body.date, "date")?;
    let source_url = validate_source_url(&required(body.source_url, "source_url")?)?;

    let date = parse_published_date(&raw_date).ok_or_else(|| {
        Error::Validation("Field 'date' must be an RFC 3339 timestamp.".to_string())
    })?;

    let source = body
        .source
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            url::Url::parse(&source_url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
        })
        .unwrap_or_default();

    let (article, created) = state
        .ingestor
        .ingest_one(NewArticle {
            title,
            content,
            source_url,
            source,
            date,
        })
        .await?;

    if !created {
        return Err(Error::Conflict(
            "Article with the same title and source_url already exists.".to_string(),
        ));
    }

    info!("Article {} added via API", article.id);
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Article added successfully".to_string(),
            id: Some(article.id),
        }),
    )
        .into_response())
}

/// GET /api/summaries - List stored summaries
pub async fn list_summaries(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> Result<Json<SummariesResponse>> {
    let (page, page_size) = state.resolve_page(params.page, params.limit)?;
    let (limit, offset) = AppState::page_window(page, page_size);

    let summaries = db::summaries::list_summaries(&state.pool, limit, offset).await?;
    let total = db::summaries::count_summaries(&state.pool).await?;

    Ok(Json(SummariesResponse {
        summaries,
        pagination: state.pagination(page, page_size, total),
    }))
}

/// GET /api/queries - List stored queries
pub async fn list_queries(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PageParams>,
) -> Result<Json<QueriesResponse>> {
    let (page, page_size) = state.resolve_page(params.page, params.limit)?;
    let (limit, offset) = AppState::page_window(page, page_size);

    let queries = db::queries::list_queries(&state.pool, limit, offset).await?;
    let total = db::queries::count_queries(&state.pool).await?;

    Ok(Json(QueriesResponse {
        queries: queries.into_iter().map(QueryItem::from).collect(),
        pagination: state.pagination(page, page_size, total),
    }))
}

/// POST /api/queries - Store a query and its response
pub async fn create_query(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateQueryRequest>,
) -> Result<Response> {
    let query = required(body.query, "query")?;
    let response = required(body.response, "response")?;

    db::queries::create_query(&state.pool, &query, &response).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Query added successfully")),
    )
        .into_response())
}

/// POST /api/summarize - Summarize raw text or a stored article
pub async fn summarize(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SummarizeRequest>,
) -> Result<Json<SummaryResponse>> {
    let text = body
        .article_text
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let (text, article_id) = match (text, body.article_id) {
        (Some(text), None) => (text, None),
        (Some(text), Some(id)) => {
            let article = db::articles::get_article(&state.pool, id).await?;
            (text, Some(article.id))
        }
        (None, Some(id)) => {
            let article = db::articles::get_article(&state.pool, id).await?;
            (article.content, Some(id))
        }
        (None, None) => {
            return Err(Error::Validation("No article text provided.".to_string()));
        }
    };

    let summarizer = state
        .summarizer
        .as_ref()
        .ok_or_else(|| Error::Unavailable("Summarizer is not configured.".to_string()))?;

    let summary = summarize_article(summarizer.as_ref(), &text).await;
    if summary.generated {
        db::summaries::create_summary(&state.pool, article_id, &summary.text, summarizer.model())
            .await?;
    }

    Ok(Json(SummaryResponse {
        summary: summary.text,
    }))
}

/// POST /api/retrieve - Full-text retrieval with paging, sorting and source filter
pub async fn retrieve(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RetrieveRequest>,
) -> Result<Response> {
    debug!("Retrieve request: {:?}", body);

    let (page, limit) = state.resolve_page(body.page, body.limit)?;
    let sort_by = match body.sort_by.as_deref() {
        Some(value) => value.parse::<SortBy>()?,
        None => SortBy::default(),
    };
    let order = match body.order.as_deref() {
        Some(value) => value.parse::<SortOrder>()?,
        None => SortOrder::default(),
    };

    let query = SearchQuery {
        q: body.query,
        page,
        limit,
        sort_by,
        order,
        source: body.source.filter(|s| !s.is_empty()),
    };

    let results = state
        .search_index
        .search(&query, state.settings.pagination.max_search_results)?;

    let ids: Vec<i64> = results.hits.iter().map(|h| h.article_id).collect();
    let mut by_id: HashMap<i64, Article> = db::articles::get_articles_by_ids(&state.pool, &ids)
        .await?
        .into_iter()
        .map(|a| (a.id, a))
        .collect();

    // Hits whose article row is gone are dropped
    let retrieved: Vec<RetrievedArticle> = results
        .hits
        .iter()
        .filter_map(|hit| {
            by_id.remove(&hit.article_id).map(|article| RetrievedArticle {
                article,
                score: hit.score,
            })
        })
        .collect();

    if retrieved.is_empty() {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(MessageResponse::new("No articles found")),
        )
            .into_response());
    }

    Ok(Json(retrieved).into_response())
}

/// POST /api/semantic-search - Nearest titles from the vector store
pub async fn semantic_search(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SemanticSearchRequest>,
) -> Result<Json<SemanticSearchResponse>> {
    let processor = state
        .processor
        .as_ref()
        .ok_or_else(|| Error::Unavailable("Semantic search is not enabled.".to_string()))?;

    let max = state.settings.pagination.api_max_limit;
    let top_k = usize::try_from(body.top_k())
        .ok()
        .filter(|k| (1..=max).contains(k))
        .ok_or_else(|| Error::Validation(format!("top_k must be between 1 and {max}.")))?;

    let matches = processor.query_similar(&body.query, top_k).await?;
    Ok(Json(SemanticSearchResponse { matches }))
}

/// GET /api/channels - List crawl channels
pub async fn list_channels(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ChannelListParams>,
) -> Result<Json<ChannelsResponse>> {
    debug!("List channels request: {:?}", params);

    let (page, page_size) = state.resolve_page(params.page, params.limit)?;
    let (limit, offset) = AppState::page_window(page, page_size);
    let status = params.status.as_deref().filter(|s| !s.is_empty());

    let channels = db::channels::list_channels(&state.pool, status, limit, offset).await?;
    let total = db::channels::count_channels(&state.pool, status).await?;

    Ok(Json(ChannelsResponse {
        channels: channels.into_iter().map(ChannelCard::from).collect(),
        pagination: state.pagination(page, page_size, total),
    }))
}

/// GET /api/channels/:id - Get one crawl channel
pub async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ChannelCard>> {
    let channel = db::channels::get_channel(&state.pool, id).await?;
    Ok(Json(channel.into()))
}

/// GET /api/stats - Get system statistics
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<Stats>> {
    debug!("Get stats request");

    Ok(Json(Stats {
        total_articles: db::articles::count_all_articles(&state.pool).await?,
        total_channels: db::channels::count_channels(&state.pool, None).await?,
        active_channels: db::channels::count_channels(&state.pool, Some("active")).await?,
        total_summaries: db::summaries::count_summaries(&state.pool).await?,
        total_queries: db::queries::count_queries(&state.pool).await?,
        indexed_documents: state.search_index.num_docs(),
    }))
}

/// GET /health - Health check endpoint
pub async fn health_check() -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

/// GET /ready - Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> Response {
    let db_healthy = sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok();

    let index_healthy = state.search_index.is_healthy();

    let ready = db_healthy && index_healthy;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            database: if db_healthy { "ok" } else { "error" }.to_string(),
            search_index: if index_healthy { "ok" } else { "error" }.to_string(),
        }),
    )
        .into_response()
}
