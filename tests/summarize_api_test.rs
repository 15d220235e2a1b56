// Summarization through the HTTP API with a mocked Gemini endpoint
use aggsum::api::{create_router, AppState};
use aggsum::config::{Settings, SummarizerConfig};
use aggsum::db::{self, models::NewArticle};
use aggsum::indexer::SearchIndex;
use aggsum::ingest::Ingestor;
use aggsum::summarizer::{GeminiSummarizer, Summarizer, QUOTA_EXHAUSTED_FALLBACK};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const GENERATE_PATH: &str = "/v1beta/models/gemini-1.5-pro:generateContent";

fn summarizer_config(base_url: String) -> SummarizerConfig {
    SummarizerConfig {
        api_key: Some("gm-test".to_string()),
        base_url,
        max_retries: 1,
        initial_backoff_ms: 0,
        ..SummarizerConfig::default()
    }
}

async fn setup(base_url: String) -> (Router, AppState) {
    let pool = db::init_pool("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let search_index = Arc::new(SearchIndex::in_memory().unwrap());

    let summarizer = GeminiSummarizer::from_config(&summarizer_config(base_url))
        .unwrap()
        .unwrap();

    let settings = Settings::default();
    let state = AppState {
        ingestor: Ingestor::new(pool.clone(), search_index.clone(), None),
        pool,
        search_index,
        summarizer: Some(Arc::new(summarizer) as Arc<dyn Summarizer>),
        processor: None,
        settings: settings.clone(),
    };

    (create_router(state.clone(), &settings), state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn gemini_reply(text: &str) -> String {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
    .to_string()
}

#[tokio::test]
async fn test_summarize_stored_article() {
    let mut server = Server::new_async().await;
    let (app, state) = setup(format!("{}/v1beta", server.url())).await;

    let (article, _) = state
        .ingestor
        .ingest_one(NewArticle {
            title: "Giá vàng tăng".to_string(),
            content: "Giá vàng miếng SJC tăng thêm 500.000 đồng mỗi lượng.".to_string(),
            source_url: "https://vnexpress.net/gia-vang.html".to_string(),
            source: "VnExpress".to_string(),
            date: Utc::now(),
        })
        .await
        .unwrap();

    let mock = server
        .mock("POST", GENERATE_PATH)
        .match_query(Matcher::UrlEncoded("key".into(), "gm-test".into()))
        .match_body(Matcher::Regex("SJC tăng thêm".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(gemini_reply("Summary: Giá vàng SJC tăng 500.000 đồng."))
        .expect(1)
        .create_async()
        .await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/summarize",
        Some(json!({ "article_id": article.id })),
    )
    .await;
    mock.assert_async().await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"], "Giá vàng SJC tăng 500.000 đồng.");

    let stored = db::summaries::latest_for_article(&state.pool, article.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.model, "gemini-1.5-pro");
    assert_eq!(stored.summary, "Giá vàng SJC tăng 500.000 đồng.");

    let (status, body) = send(&app, Method::GET, "/api/summaries", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
}

#[tokio::test]
async fn test_quota_exhaustion_returns_fallback_without_storing() {
    let mut server = Server::new_async().await;
    let (app, state) = setup(format!("{}/v1beta", server.url())).await;

    // One initial attempt plus one retry
    let mock = server
        .mock("POST", GENERATE_PATH)
        .match_query(Matcher::Any)
        .with_status(429)
        .with_body(r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED"}}"#)
        .expect(2)
        .create_async()
        .await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/summarize",
        Some(json!({ "article_text": "Bão số 3 đổ bộ vào Quảng Ninh." })),
    )
    .await;
    mock.assert_async().await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"], QUOTA_EXHAUSTED_FALLBACK);
    assert_eq!(db::summaries::count_summaries(&state.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_summarize_unknown_article() {
    let server = Server::new_async().await;
    let (app, _state) = setup(format!("{}/v1beta", server.url())).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/summarize",
        Some(json!({ "article_id": 999 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Article not found.");
}
