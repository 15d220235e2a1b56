// Article summarization through a generative model

pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

pub use gemini::GeminiSummarizer;

pub const QUOTA_EXHAUSTED_FALLBACK: &str = "Quota exhausted, summary not available.";
pub const SERVER_ERROR_FALLBACK: &str =
    "An internal error occurred while processing the article summary.";
pub const API_ERROR_FALLBACK: &str = "An error occurred while processing the article summary.";
pub const UNEXPECTED_ERROR_FALLBACK: &str =
    "An unexpected error occurred while processing the article summary.";

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Provider server error: {0}")]
    Server(String),

    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Unexpected summarization failure: {0}")]
    Unexpected(String),
}

impl SummarizeError {
    /// Fixed user-facing text standing in for a summary
    pub fn fallback_message(&self) -> &'static str {
        match self {
            SummarizeError::QuotaExhausted(_) => QUOTA_EXHAUSTED_FALLBACK,
            SummarizeError::Server(_) => SERVER_ERROR_FALLBACK,
            SummarizeError::Api(_) => API_ERROR_FALLBACK,
            SummarizeError::Unexpected(_) => UNEXPECTED_ERROR_FALLBACK,
        }
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError>;

    /// Model identifier recorded alongside stored summaries
    fn model(&self) -> &str;
}

/// Summary text plus whether it came from the model or a fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleSummary {
    pub text: String,
    pub generated: bool,
}

/// Trim model output and drop a leading "Summary:" label
pub fn clean_summary(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_prefix("Summary:") {
        Some(rest) => rest.trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// Summarize an article, substituting a fixed message on any provider failure
pub async fn summarize_article<S: Summarizer + ?Sized>(
    provider: &S,
    article_text: &str,
) -> ArticleSummary {
    match provider.summarize(article_text).await {
        Ok(summary) => {
            info!(
                "Summarized {} chars into {} chars with {}",
                article_text.len(),
                summary.len(),
                provider.model()
            );
            ArticleSummary {
                text: summary,
                generated: true,
            }
        }
        Err(e) => {
            error!("Summarization failed: {}", e);
            ArticleSummary {
                text: e.fallback_message().to_string(),
                generated: false,
            }
        }
    }
}
