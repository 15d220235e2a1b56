pub mod sources;
pub mod sync;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_SUMMARY_PROMPT: &str = "Summarize the following article in 5 sentences or less. \
Keep it concise and in natural language. Only provide the summary without any extra information or framing.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub crawler: CrawlerConfig,
    pub search: SearchConfig,
    pub pagination: PaginationConfig,
    pub summarizer: SummarizerConfig,
    pub vector: VectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub external_url: Option<String>,
    pub api_rate_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    pub interval_seconds: u64,
    pub max_page_size: usize,
    /// Requests per second against a single target domain
    pub rate_limit: u64,
    pub user_agent: String,
    pub max_articles_per_channel: usize,
    /// Disables the private-address URL guard (intranet mirrors, tests)
    pub allow_private_hosts: bool,
    pub sources_config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub index_path: PathBuf,
    pub title_boost: f32,
    pub content_boost: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub api_max_limit: usize,
    pub default_limit: usize,
    pub max_search_results: usize,
    pub max_request_body_size: usize,
    pub max_pages: usize, // Maximum pages to prevent overflow
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub timeout_seconds: u64,
    pub prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Pinecone,
    Memory,
    Disabled,
}

impl FromStr for VectorBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pinecone" => Ok(Self::Pinecone),
            "memory" => Ok(Self::Memory),
            "disabled" | "none" | "" => Ok(Self::Disabled),
            other => Err(Error::Config(format!(
                "Unknown VECTOR_BACKEND '{other}'. Expected pinecone, memory or disabled"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    pub backend: VectorBackend,
    #[serde(skip_serializing)]
    pub pinecone_api_key: Option<String>,
    pub pinecone_host: Option<String>,
    pub namespace: String,
    pub dimension: usize,
    pub embedding_url: String,
    pub embedding_model: String,
    #[serde(skip_serializing)]
    pub embedding_api_key: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:./data/aggsum.db".to_string(),
            max_connections: 25,
            min_connections: 5,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            external_url: None,
            api_rate_limit: 100,
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 180,
            max_page_size: 5_242_880,
            rate_limit: 2,
            user_agent: format!("aggsum/{}", env!("CARGO_PKG_VERSION")),
            max_articles_per_channel: 20,
            allow_private_hosts: false,
            sources_config_path: "config/sources.yaml".into(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_path: "./data/index".into(),
            title_boost: 20.0,
            content_boost: 5.0,
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            api_max_limit: 100,
            default_limit: 5,
            max_search_results: 1000,
            max_request_body_size: 10_485_760,
            max_pages: 10_000,
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-pro".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            top_k: 50,
            max_output_tokens: 512,
            max_retries: 3,
            initial_backoff_ms: 1000,
            timeout_seconds: 60,
            prompt: DEFAULT_SUMMARY_PROMPT.to_string(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Disabled,
            pinecone_api_key: None,
            pinecone_host: None,
            namespace: "title".to_string(),
            dimension: 768,
            embedding_url: "http://localhost:11434/v1/embeddings".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_api_key: None,
        }
    }
}

/// Read `name` from the environment, falling back to `default` when unset
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("Invalid {name} value"))),
        Err(_) => Ok(default),
    }
}

/// Optional string variable; empty values count as unset
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Settings::default();

        let database = DatabaseConfig {
            url: env_or("DATABASE_URL", defaults.database.url)?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", defaults.database.max_connections)?,
            min_connections: env_or("DATABASE_MIN_CONNECTIONS", defaults.database.min_connections)?,
            connection_timeout_seconds: env_or(
                "DATABASE_CONNECTION_TIMEOUT",
                defaults.database.connection_timeout_seconds,
            )?,
            idle_timeout_seconds: env_or(
                "DATABASE_IDLE_TIMEOUT",
                defaults.database.idle_timeout_seconds,
            )?,
        };

        let server = ServerConfig {
            host: env_or("HOST", defaults.server.host)?,
            port: env_or("PORT", defaults.server.port)?,
            external_url: env_opt("EXTERNAL_URL"),
            api_rate_limit: env_or("API_RATE_LIMIT", defaults.server.api_rate_limit)?,
        };

        let crawler = CrawlerConfig {
            interval_seconds: env_or("CRAWLER_INTERVAL", defaults.crawler.interval_seconds)?,
            max_page_size: env_or("MAX_PAGE_SIZE", defaults.crawler.max_page_size)?,
            rate_limit: env_or("RATE_LIMIT", defaults.crawler.rate_limit)?,
            user_agent: env_or("CRAWLER_USER_AGENT", defaults.crawler.user_agent)?,
            max_articles_per_channel: env_or(
                "CRAWLER_MAX_ARTICLES",
                defaults.crawler.max_articles_per_channel,
            )?,
            allow_private_hosts: env_or(
                "CRAWLER_ALLOW_PRIVATE_HOSTS",
                defaults.crawler.allow_private_hosts,
            )?,
            sources_config_path: env_opt("SOURCES_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.crawler.sources_config_path),
        };

        let search = SearchConfig {
            index_path: env_opt("INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.search.index_path),
            title_boost: env_or("SEARCH_TITLE_BOOST", defaults.search.title_boost)?,
            content_boost: env_or("SEARCH_CONTENT_BOOST", defaults.search.content_boost)?,
        };

        let pagination = PaginationConfig {
            api_max_limit: env_or("API_MAX_LIMIT", defaults.pagination.api_max_limit)?,
            default_limit: env_or("DEFAULT_LIMIT", defaults.pagination.default_limit)?,
            max_search_results: env_or(
                "MAX_SEARCH_RESULTS",
                defaults.pagination.max_search_results,
            )?,
            max_request_body_size: env_or(
                "MAX_REQUEST_BODY_SIZE",
                defaults.pagination.max_request_body_size,
            )?,
            max_pages: env_or("MAX_PAGES", defaults.pagination.max_pages)?,
        };

        let summarizer = SummarizerConfig {
            api_key: env_opt("GEMINI_API_KEY"),
            model: env_or("GEMINI_MODEL", defaults.summarizer.model)?,
            base_url: env_or("GEMINI_BASE_URL", defaults.summarizer.base_url)?,
            temperature: env_or("SUMMARY_TEMPERATURE", defaults.summarizer.temperature)?,
            top_p: env_or("SUMMARY_TOP_P", defaults.summarizer.top_p)?,
            top_k: env_or("SUMMARY_TOP_K", defaults.summarizer.top_k)?,
            max_output_tokens: env_or(
                "SUMMARY_MAX_OUTPUT_TOKENS",
                defaults.summarizer.max_output_tokens,
            )?,
            max_retries: env_or("SUMMARY_MAX_RETRIES", defaults.summarizer.max_retries)?,
            initial_backoff_ms: env_or(
                "SUMMARY_INITIAL_BACKOFF_MS",
                defaults.summarizer.initial_backoff_ms,
            )?,
            timeout_seconds: env_or("SUMMARY_TIMEOUT", defaults.summarizer.timeout_seconds)?,
            prompt: env_opt("SUMMARY_PROMPT").unwrap_or(defaults.summarizer.prompt),
        };

        let pinecone_api_key = env_opt("PINECONE_API_KEY");
        let pinecone_host = env_opt("PINECONE_HOST");
        let backend = match env_opt("VECTOR_BACKEND") {
            Some(raw) => raw.parse()?,
            None if pinecone_api_key.is_some() && pinecone_host.is_some() => {
                VectorBackend::Pinecone
            }
            None => VectorBackend::Disabled,
        };

        let vector = VectorConfig {
            backend,
            pinecone_api_key,
            pinecone_host,
            namespace: env_or("VECTOR_NAMESPACE", defaults.vector.namespace)?,
            dimension: env_or("VECTOR_DIMENSION", defaults.vector.dimension)?,
            embedding_url: env_or("EMBEDDING_URL", defaults.vector.embedding_url)?,
            embedding_model: env_or("EMBEDDING_MODEL", defaults.vector.embedding_model)?,
            embedding_api_key: env_opt("EMBEDDING_API_KEY"),
        };

        Ok(Settings {
            database,
            server,
            crawler,
            search,
            pagination,
            summarizer,
            vector,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Config("Port must be non-zero".to_string()));
        }

        if self.crawler.rate_limit == 0 {
            return Err(Error::Config("Rate limit must be non-zero".to_string()));
        }

        if self.crawler.interval_seconds == 0 {
            return Err(Error::Config(
                "Crawler interval must be non-zero".to_string(),
            ));
        }

        if self.pagination.default_limit == 0 || self.pagination.api_max_limit == 0 {
            return Err(Error::Config(
                "Pagination limits must be at least 1".to_string(),
            ));
        }

        if self.pagination.default_limit > self.pagination.api_max_limit {
            return Err(Error::Config(
                "Default limit must not exceed the API max limit".to_string(),
            ));
        }

        if self.search.title_boost <= 0.0 || self.search.content_boost <= 0.0 {
            return Err(Error::Config("Search boosts must be positive".to_string()));
        }

        if self.vector.dimension == 0 {
            return Err(Error::Config(
                "Vector dimension must be non-zero".to_string(),
            ));
        }

        if self.vector.backend == VectorBackend::Pinecone
            && (self.vector.pinecone_api_key.is_none() || self.vector.pinecone_host.is_none())
        {
            return Err(Error::Config(
                "Pinecone backend requires PINECONE_API_KEY and PINECONE_HOST".to_string(),
            ));
        }

        Ok(())
    }

    /// Base URL of a running server, used by CLI client commands
    pub fn server_url(&self) -> String {
        self.server
            .external_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server.host, self.server.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());

        settings.server.port = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.pagination.default_limit = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.pagination.default_limit = settings.pagination.api_max_limit + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_pinecone_backend_requires_credentials() {
        let mut settings = Settings::default();
        settings.vector.backend = VectorBackend::Pinecone;
        assert!(settings.validate().is_err());

        settings.vector.pinecone_api_key = Some("k".to_string());
        settings.vector.pinecone_host = Some("index.svc.pinecone.io".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_defaults_match_service_expectations() {
        let settings = Settings::default();
        assert_eq!(settings.crawler.interval_seconds, 180);
        assert_eq!(settings.pagination.default_limit, 5);
        assert_eq!(settings.search.title_boost, 20.0);
        assert_eq!(settings.search.content_boost, 5.0);
        assert_eq!(settings.vector.namespace, "title");
        assert_eq!(settings.vector.dimension, 768);
        assert_eq!(settings.summarizer.model, "gemini-1.5-pro");
    }

    #[test]
    fn test_vector_backend_parse() {
        assert_eq!(
            "Pinecone".parse::<VectorBackend>().unwrap(),
            VectorBackend::Pinecone
        );
        assert_eq!(
            "memory".parse::<VectorBackend>().unwrap(),
            VectorBackend::Memory
        );
        assert_eq!(
            "none".parse::<VectorBackend>().unwrap(),
            VectorBackend::Disabled
        );
        assert!("milvus".parse::<VectorBackend>().is_err());
    }
}
