use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use scraper::{Html, Selector};
use tracing::debug;

/// Offset applied to timestamps that carry no zone (Vietnam, UTC+7)
const LOCAL_OFFSET_SECONDS: i32 = 7 * 3600;

/// Formats carrying an explicit offset, after RFC 2822 and RFC 3339
const OFFSET_FORMATS: &[&str] = &[
    "%a, %d %b %y %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%d/%m/%Y - %H:%M %z",
    "%d %b %Y %H:%M:%S %z",
];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y - %H:%M",
    "%d/%m/%Y  -  %H:%M",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M",
];

const NAIVE_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// Selectors probed, in order, for a publication date on an article page
const PAGE_DATE_SELECTORS: &[&str] = &[
    "div.publish-date",
    "time",
    r#"meta[property="article:published_time"]"#,
    r#"meta[name="pubdate"]"#,
    r#"meta[name="og:pubdate"]"#,
];

fn local_offset() -> Option<FixedOffset> {
    FixedOffset::east_opt(LOCAL_OFFSET_SECONDS)
}

fn from_local(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    local_offset()?
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_exact(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // A trailing Z means UTC even when the fraction defeats RFC 3339
    if let Some(stripped) = s.strip_suffix('Z') {
        if let Ok(naive) = NaiveDateTime::parse_from_str(stripped, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return from_local(naive);
        }
    }
    for fmt in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return from_local(date.and_hms_opt(0, 0, 0)?);
        }
    }

    None
}

/// Parse the publication date formats used by feeds and Vietnamese news pages
///
/// Zone-less values are read as Vietnam local time. A leading weekday such as
/// "Thứ hai, " is ignored when the full string does not parse.
pub fn parse_published_date(raw: &str) -> Option<DateTime<Utc>> {
    let cleaned = raw.replace("GMT+7", "+0700");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    parse_exact(cleaned).or_else(|| {
        let (_, rest) = cleaned.split_once(", ")?;
        parse_exact(rest.trim())
    })
}

/// Find a publication date in an article page
pub fn extract_page_date(html: &str) -> Option<DateTime<Utc>> {
    let document = Html::parse_document(html);

    for css in PAGE_DATE_SELECTORS {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        let Some(element) = document.select(&selector).next() else {
            continue;
        };

        let value = element.value();
        let raw = if value.name() == "meta" {
            value.attr("content").map(str::to_string)
        } else {
            value
                .attr("datetime")
                .map(str::to_string)
                .or_else(|| Some(element.text().collect::<String>()))
        };

        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            continue;
        };

        match parse_published_date(&raw) {
            Some(date) => return Some(date),
            None => debug!("Unparseable page date '{}' from {}", raw.trim(), css),
        }
    }

    None
}

/// Page date first, then the listing date, then now
pub fn resolve_article_date(
    page_date: Option<DateTime<Utc>>,
    listing_date: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    page_date.or(listing_date).unwrap_or_else(Utc::now)
}
