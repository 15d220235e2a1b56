use crate::crawler::extract::clean_title;
use crate::crawler::ListingItem;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub entries: Vec<ListingItem>,
}

/// Parse an RSS or Atom feed into listing items
pub fn parse_feed(content: &str) -> Result<ParsedFeed> {
    let feed = parser::parse(content.as_bytes())
        .map_err(|e| Error::FeedParse(format!("Failed to parse feed: {e}")))?;

    debug!(
        "Parsed feed: {}",
        feed.title
            .as_ref()
            .map(|t| t.content.as_str())
            .unwrap_or("Untitled")
    );

    let title = feed.title.map(|t| clean_title(&t.content));
    let updated = feed.updated;

    let entries: Vec<ListingItem> = feed
        .entries
        .into_iter()
        .filter_map(|entry| match parse_entry(entry) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Skipping feed entry: {}", e);
                None
            }
        })
        .collect();

    Ok(ParsedFeed {
        title,
        updated,
        entries,
    })
}

fn parse_entry(entry: feed_rs::model::Entry) -> Result<ListingItem> {
    let title = entry
        .title
        .map(|t| clean_title(&t.content))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::FeedParse(format!("Entry '{}' missing title", entry.id)))?;

    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate") || l.rel.is_none())
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
        .ok_or_else(|| Error::FeedParse(format!("Entry '{title}' missing link")))?;

    Ok(ListingItem {
        title,
        link,
        published: entry.published.or(entry.updated),
    })
}
