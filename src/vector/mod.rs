//! Title embeddings and the vector store they live in
//!
//! Articles are vectorized by title only. The body travels along as record
//! metadata so semantic matches can be shown without a database round-trip.

pub mod embedding;
pub mod memory;
pub mod pinecone;
pub mod processor;

use crate::error::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub use embedding::HttpEmbedder;
pub use memory::MemoryStore;
pub use pinecone::PineconeStore;
pub use processor::ArticleProcessor;

/// Free-form record metadata, stored as a JSON object
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Vietnamese linking words dropped from semantic queries
const STOP_WORDS: &[&str] = &[
    "và", "nhưng", "hoặc", "cũng", "để", "đến", "là", "của", "có", "khi", "vì", "do", "nếu",
    "bởi", "đã",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Turns text into a dense vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimension vectors are resized to before storage
    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

/// Namespaced nearest-neighbour store
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, records: &[VectorRecord], namespace: &str) -> Result<usize>;

    async fn query(&self, vector: &[f32], namespace: &str, top_k: usize) -> Result<Vec<VectorMatch>>;

    async fn fetch(&self, id: &str, namespace: &str) -> Result<Option<VectorRecord>>;

    async fn delete_all(&self, namespace: &str) -> Result<()>;

    fn name(&self) -> &str;
}

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("valid regex"))
}

/// Replace punctuation with spaces and collapse whitespace
pub fn clean_text(text: &str) -> String {
    non_word()
        .replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `clean_text` with Vietnamese stop words removed
pub fn clean_query(text: &str) -> String {
    clean_text(text)
        .split(' ')
        .filter(|word| !STOP_WORDS.contains(&word.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncate or zero-pad a vector to exactly `dim` entries
pub fn pad_or_resize(mut vector: Vec<f32>, dim: usize) -> Vec<f32> {
    vector.resize(dim, 0.0);
    vector
}

/// Cosine similarity in [-1, 1]; 0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
