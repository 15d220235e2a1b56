use crate::config::SummarizerConfig;
use crate::error::{Error, Result};
use crate::summarizer::{clean_summary, SummarizeError, Summarizer};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const HARM_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

/// Failure of a single call, split by whether another attempt may help
enum CallError {
    Transient(SummarizeError),
    Fatal(SummarizeError),
}

/// Summarizer backed by the Gemini `generateContent` REST endpoint
pub struct GeminiSummarizer {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    prompt: String,
    generation_config: Value,
    max_retries: u32,
    initial_backoff: Duration,
}

impl GeminiSummarizer {
    pub fn new(api_key: impl Into<String>, config: &SummarizerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            prompt: config.prompt.clone(),
            generation_config: json!({
                "temperature": config.temperature,
                "topP": config.top_p,
                "topK": config.top_k,
                "maxOutputTokens": config.max_output_tokens,
                "responseMimeType": "text/plain",
            }),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        })
    }

    /// `None` when no API key is configured
    pub fn from_config(config: &SummarizerConfig) -> Result<Option<Self>> {
        match &config.api_key {
            Some(key) => Ok(Some(Self::new(key.clone(), config)?)),
            None => Ok(None),
        }
    }

    fn request_body(&self, article_text: &str) -> Value {
        let safety_settings: Vec<Value> = HARM_CATEGORIES
            .iter()
            .map(|category| json!({ "category": category, "threshold": "BLOCK_NONE" }))
            .collect();

        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("{}\n\n{}", self.prompt, article_text) }],
            }],
            "generationConfig": self.generation_config,
            "safetySettings": safety_settings,
        })
    }

    async fn call_once(&self, body: &Value) -> std::result::Result<String, CallError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = match self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // The request URL carries the key
                let transient = e.is_timeout() || e.is_connect();
                let err = SummarizeError::Unexpected(e.without_url().to_string());
                return Err(if transient {
                    CallError::Transient(err)
                } else {
                    CallError::Fatal(err)
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = format!("HTTP {status}: {body}");
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                CallError::Transient(SummarizeError::QuotaExhausted(detail))
            } else if status.is_server_error() {
                CallError::Transient(SummarizeError::Server(detail))
            } else {
                CallError::Fatal(SummarizeError::Api(detail))
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            CallError::Fatal(SummarizeError::Unexpected(format!(
                "Malformed response: {}",
                e.without_url()
            )))
        })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CallError::Fatal(SummarizeError::Api(
                "Response contained no candidates".to_string(),
            )));
        }

        Ok(clean_summary(&text))
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, text: &str) -> std::result::Result<String, SummarizeError> {
        let body = self.request_body(text);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match self.call_once(&body).await {
                Ok(summary) => {
                    debug!("Gemini returned a {} char summary", summary.len());
                    return Ok(summary);
                }
                Err(CallError::Transient(e)) if retries < self.max_retries => {
                    retries += 1;
                    warn!(
                        "Summarization attempt {}/{} failed: {}. Retrying in {:?}",
                        retries, self.max_retries, e, backoff
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(CallError::Transient(e)) | Err(CallError::Fatal(e)) => return Err(e),
            }
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
