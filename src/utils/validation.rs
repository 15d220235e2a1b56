// Validation helpers shared by the crawler and the HTTP layer
use crate::error::{Error, Result};
use std::net::IpAddr;
use tracing::warn;
use url::Url;

// Ports a crawl target may never point at
const BLOCKED_PORTS: &[u16] = &[
    22,    // SSH
    23,    // Telnet
    25,    // SMTP
    3306,  // MySQL
    5432,  // PostgreSQL
    6379,  // Redis
    27017, // MongoDB
];

/// Check if an IP address is in a private, loopback or link-local range
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                // fe80::/10
                || (ipv6.segments()[0] & 0xffc0) == 0xfe80
                // fc00::/7
                || (ipv6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

/// Parse an http(s) URL that has a host
fn parse_web_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Validation(format!(
            "URL must use http or https scheme: {url_str}"
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::Validation("URL must have a valid host".to_string()));
    }

    Ok(url)
}

/// Validate a crawl target: http(s), and not aimed at internal infrastructure
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = parse_web_url(url_str).map_err(|e| {
        warn!("Security: Rejected crawl target {}: {}", url_str, e);
        e
    })?;
    let host = url.host_str().unwrap_or_default();

    if host == "localhost" || host.ends_with(".localhost") {
        warn!("Security: Blocked localhost URL: {}", url_str);
        return Err(Error::Validation(
            "Localhost URLs are not allowed".to_string(),
        ));
    }

    // Strip brackets from IPv6 hosts like "[::1]"
    let host_for_ip = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host_for_ip.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            warn!("Security: Blocked private address {} in URL: {}", ip, url_str);
            return Err(Error::Validation(
                "Private, loopback and unspecified addresses are not allowed".to_string(),
            ));
        }
    }

    if let Some(port) = url.port() {
        if BLOCKED_PORTS.contains(&port) {
            warn!(
                "Security: Blocked restricted port {} in URL: {}",
                port, url_str
            );
            return Err(Error::Validation(format!(
                "Port {port} is not allowed for security reasons"
            )));
        }
    }

    Ok(url)
}

/// Validate the `source_url` of a submitted article
///
/// The URL is stored, never fetched, so only its shape is checked.
pub fn validate_source_url(url_str: &str) -> Result<String> {
    let trimmed = url_str.trim();
    parse_web_url(trimmed)
        .map_err(|_| Error::Validation("source_url must be a valid http(s) URL.".to_string()))?;
    Ok(trimmed.to_string())
}

/// Check 1-based paging parameters against the configured ceiling
///
/// Takes the raw signed values from the request so negatives get the same
/// message as zero. Returns them as sizes once valid.
pub fn validate_pagination(page: i64, limit: i64, max_limit: usize) -> Result<(usize, usize)> {
    let page = usize::try_from(page)
        .ok()
        .filter(|&p| p > 0)
        .ok_or_else(|| Error::Validation("Page must be a positive integer.".to_string()))?;
    let limit = usize::try_from(limit)
        .ok()
        .filter(|&l| l > 0)
        .ok_or_else(|| Error::Validation("Limit must be a positive integer.".to_string()))?;
    if limit > max_limit {
        return Err(Error::Validation(format!(
            "Limit must not exceed {max_limit}."
        )));
    }
    Ok((page, limit))
}
