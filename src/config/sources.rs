use crate::error::{Error, Result};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use url::Url;

/// News source catalogue loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub version: u32,
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Unique key, referenced by channels and the `scrape` command
    pub name: String,
    /// Value stored in the article `source` field
    pub label: String,
    pub kind: SourceKind,
    /// RSS listings, one per category
    #[serde(default)]
    pub feeds: Vec<FeedEntry>,
    /// HTML listing page
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub item_selector: Option<String>,
    /// Attribute holding the headline on listing links (falls back to link text)
    #[serde(default)]
    pub title_attr: Option<String>,
    #[serde(default)]
    pub content_selectors: Vec<String>,
    #[serde(default)]
    pub paragraph_selector: Option<String>,
    #[serde(default)]
    pub sapo_selector: Option<String>,
    #[serde(default)]
    pub label_with_category: bool,
    /// Discovered links containing any of these are ignored (e.g. video pages)
    #[serde(default)]
    pub skip_url_substrings: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEntry {
    pub category: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    Html,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Rss => "rss",
            SourceKind::Html => "html",
        }
    }
}

/// A single crawlable listing derived from a source entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub source: String,
    pub category: Option<String>,
    pub url: String,
    pub kind: SourceKind,
}

fn default_true() -> bool {
    true
}

impl SourcesConfig {
    /// Load source configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read sources config from {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content).map_err(|e| {
            Error::Config(format!(
                "Invalid sources config {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: SourcesConfig =
            serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(Error::Config(format!(
                "Unsupported config version: {}. Expected version 1",
                self.version
            )));
        }

        let mut names = HashSet::new();
        let mut urls = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate source name: {}",
                    source.name
                )));
            }
            source
                .validate()
                .map_err(|e| Error::Config(format!("Source '{}': {}", source.name, e)))?;

            for url in source.listing_urls() {
                if !urls.insert(url) {
                    return Err(Error::Config(format!("Duplicate listing URL: {url}")));
                }
            }
        }

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SourceEntry> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn enabled_count(&self) -> usize {
        self.sources.iter().filter(|s| s.enabled).count()
    }

    /// Expand every enabled source into its crawl channels
    pub fn channels(&self) -> Vec<ChannelSpec> {
        self.sources
            .iter()
            .filter(|s| s.enabled)
            .flat_map(SourceEntry::channels)
            .collect()
    }
}

impl SourceEntry {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("name cannot be empty".to_string()));
        }
        if self.label.trim().is_empty() {
            return Err(Error::Config("label cannot be empty".to_string()));
        }

        match self.kind {
            SourceKind::Rss => {
                if self.feeds.is_empty() {
                    return Err(Error::Config(
                        "rss sources need at least one feed".to_string(),
                    ));
                }
            }
            SourceKind::Html => {
                if self.url.is_none() {
                    return Err(Error::Config("html sources need a url".to_string()));
                }
                if self.item_selector.is_none() {
                    return Err(Error::Config(
                        "html sources need an item_selector".to_string(),
                    ));
                }
            }
        }

        for url in self.listing_urls() {
            let parsed = Url::parse(url)
                .map_err(|e| Error::Config(format!("Invalid URL '{url}': {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
                return Err(Error::Config(format!(
                    "URL must be http(s) with a host: {url}"
                )));
            }
        }

        let selectors = self
            .item_selector
            .iter()
            .chain(self.content_selectors.iter())
            .chain(self.paragraph_selector.iter())
            .chain(self.sapo_selector.iter());
        for css in selectors {
            Selector::parse(css)
                .map_err(|e| Error::Config(format!("Invalid selector '{css}': {e}")))?;
        }

        if self.limit == Some(0) {
            return Err(Error::Config("limit must be at least 1".to_string()));
        }

        Ok(())
    }

    fn listing_urls(&self) -> Vec<&str> {
        match self.kind {
            SourceKind::Rss => self.feeds.iter().map(|f| f.url.as_str()).collect(),
            SourceKind::Html => self.url.iter().map(String::as_str).collect(),
        }
    }

    pub fn channels(&self) -> Vec<ChannelSpec> {
        match self.kind {
            SourceKind::Rss => self
                .feeds
                .iter()
                .map(|feed| ChannelSpec {
                    source: self.name.clone(),
                    category: Some(feed.category.clone()),
                    url: feed.url.clone(),
                    kind: self.kind,
                })
                .collect(),
            SourceKind::Html => self
                .url
                .iter()
                .map(|url| ChannelSpec {
                    source: self.name.clone(),
                    category: None,
                    url: url.clone(),
                    kind: self.kind,
                })
                .collect(),
        }
    }

    pub fn skips_url(&self, url: &str) -> bool {
        self.skip_url_substrings
            .iter()
            .any(|needle| url.contains(needle.as_str()))
    }

    /// Label stored on articles crawled from the given category
    pub fn label_for(&self, category: Option<&str>) -> String {
        match category {
            Some(category) if self.label_with_category => {
                format!("{} - {}", self.label, category)
            }
            _ => self.label.clone(),
        }
    }
}
