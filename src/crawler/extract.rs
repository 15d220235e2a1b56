use crate::config::sources::SourceEntry;
use crate::crawler::ListingItem;
use crate::error::{Error, Result};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

const GENERIC_FALLBACK_CHARS: usize = 1000;

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::Extract(format!("Invalid selector '{css}': {e}")))
}

/// Concatenated text of an element, trimmed
fn inline_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Non-empty text nodes of an element, one per line
fn text_lines(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fragment_text(fragment: &str, separator: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    parsed
        .root_element()
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Strip tags from an HTML fragment and decode its entities
///
/// Input that looks like a URL or file path yields an empty string.
pub fn clean_html(fragment: &str) -> String {
    let looks_like_path = ["http://", "https://", "/", "./", "../"]
        .iter()
        .any(|prefix| fragment.starts_with(prefix));
    if looks_like_path {
        warn!("Refusing to clean input that resembles a URL or path: {}", fragment);
        return String::new();
    }

    fragment_text(fragment, "\n")
}

/// Plain single-line title from a possibly marked-up headline
pub fn clean_title(raw: &str) -> String {
    collapse_whitespace(&fragment_text(raw, " "))
}

/// Discover article links on an HTML listing page
///
/// Items without a title or a resolvable link are skipped, as are links
/// already seen earlier on the page.
pub fn extract_listing(
    html: &str,
    base_url: &str,
    item_selector: &str,
    title_attr: Option<&str>,
) -> Result<Vec<ListingItem>> {
    let base = Url::parse(base_url)?;
    let item_selector = parse_selector(item_selector)?;
    let link_selector = parse_selector("a[href]")?;

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for element in document.select(&item_selector) {
        let href = element.value().attr("href").or_else(|| {
            element
                .select(&link_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
        });
        let Some(href) = href.map(str::trim).filter(|h| !h.is_empty()) else {
            debug!("Listing item without a link, skipping");
            continue;
        };

        let title = title_attr
            .and_then(|attr| element.value().attr(attr))
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| collapse_whitespace(&inline_text(element)));
        if title.is_empty() {
            debug!("Listing item without a title, skipping: {}", href);
            continue;
        }

        let link = match base.join(href) {
            Ok(link) => link.to_string(),
            Err(e) => {
                debug!("Unresolvable link '{}' on {}: {}", href, base_url, e);
                continue;
            }
        };

        if !seen.insert(link.clone()) {
            continue;
        }

        items.push(ListingItem {
            title,
            link,
            published: None,
        });
    }

    debug!("Found {} listing items on {}", items.len(), base_url);
    Ok(items)
}

/// Extract the body text of an article page
///
/// Returns `None` when nothing but whitespace could be extracted.
pub fn extract_content(html: &str, url: &str, source: &SourceEntry) -> Result<Option<String>> {
    let document = Html::parse_document(html);

    let body = if source.content_selectors.is_empty() {
        extract_by_domain(&document, url)?
    } else {
        extract_with_selectors(&document, source)?
    };

    let Some(body) = body.filter(|b| !b.trim().is_empty()) else {
        return Ok(None);
    };

    let sapo = match &source.sapo_selector {
        Some(css) => {
            let selector = parse_selector(css)?;
            document
                .select(&selector)
                .next()
                .map(inline_text)
                .filter(|s| !s.is_empty())
        }
        None => None,
    };

    Ok(Some(match sapo {
        Some(sapo) => format!("{sapo}\n\n{body}"),
        None => body,
    }))
}

fn extract_with_selectors(document: &Html, source: &SourceEntry) -> Result<Option<String>> {
    let paragraph_selector = source
        .paragraph_selector
        .as_deref()
        .map(parse_selector)
        .transpose()?;

    for css in &source.content_selectors {
        let selector = parse_selector(css)?;
        let Some(container) = document.select(&selector).next() else {
            continue;
        };

        let text = match &paragraph_selector {
            Some(paragraphs) => container
                .select(paragraphs)
                .map(inline_text)
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            None => text_lines(container),
        };

        if !text.is_empty() {
            return Ok(Some(text));
        }
    }

    Ok(None)
}

fn extract_by_domain(document: &Html, url: &str) -> Result<Option<String>> {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_default();

    match host.as_str() {
        "medium.com" => {
            debug!("Using medium.com extractor for {}", url);
            extract_article_paragraphs(document)
        }
        "github.com" => {
            debug!("Using github.com extractor for {}", url);
            let article = parse_selector("article")?;
            Ok(document.select(&article).next().map(text_lines))
        }
        _ => extract_generic(document),
    }
}

fn extract_article_paragraphs(document: &Html) -> Result<Option<String>> {
    let article = parse_selector("article")?;
    let paragraphs = parse_selector("p")?;

    Ok(document.select(&article).next().map(|container| {
        container
            .select(&paragraphs)
            .map(inline_text)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }))
}

fn extract_generic(document: &Html) -> Result<Option<String>> {
    let blocks = parse_selector("p, pre, blockquote")?;

    let content = document
        .select(&blocks)
        .map(inline_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if !content.is_empty() {
        return Ok(Some(content));
    }

    let body = parse_selector("body")?;
    let fallback: String = document
        .select(&body)
        .next()
        .map(|b| collapse_whitespace(&b.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default()
        .chars()
        .take(GENERIC_FALLBACK_CHARS)
        .collect();

    Ok(Some(fallback).filter(|f| !f.is_empty()))
}
