pub mod config;
pub mod db;
pub mod error;

// Collection
pub mod crawler;
pub mod ingest;

// Retrieval
pub mod indexer;
pub mod vector;

// Summarization
pub mod summarizer;

// Interfaces
pub mod api;
pub mod cli;

// Utilities
pub mod utils;

// Re-exports
pub use config::Settings;
pub use error::{Error, Result};
