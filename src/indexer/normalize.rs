use crate::indexer::schema::news_analyzer;
use regex::Regex;
use std::sync::OnceLock;
use tantivy::tokenizer::TokenStream;

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("valid regex"))
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Replace punctuation with spaces and collapse runs of whitespace
///
/// Unicode letters are kept as-is, so Vietnamese text survives unchanged.
pub fn sanitize_query(input: &str) -> String {
    let stripped = non_word().replace_all(input, " ");
    whitespace().replace_all(stripped.trim(), " ").into_owned()
}

/// Normalize free text into the token form stored in the index
///
/// Punctuation is stripped by [`sanitize_query`] before the analyzer runs,
/// leaving lowercased, ASCII-folded tokens joined by single spaces.
/// An empty result means the query carries no searchable terms.
pub fn normalize_query(input: &str) -> String {
    let sanitized = sanitize_query(input);
    let mut analyzer = news_analyzer();
    let mut stream = analyzer.token_stream(&sanitized);
    let mut tokens: Vec<String> = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    tokens.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("Giá vàng hôm nay?"), "gia vang hom nay");
        assert_eq!(normalize_query("  Thế   giới!!  "), "the gioi");
        assert_eq!(normalize_query("Rust's async-await"), "rust s async await");
        assert_eq!(normalize_query("?!..."), "");
    }

    #[test]
    fn test_sanitize_query_keeps_letters() {
        assert_eq!(sanitize_query("Giá vàng, hôm nay?"), "Giá vàng hôm nay");
        assert_eq!(sanitize_query("a\t\tb"), "a b");
    }

    #[test]
    fn test_normalize_query_strips_punctuation_before_analysis() {
        // Underscores are word characters to the sanitizer but split by the tokenizer
        assert_eq!(normalize_query("\"Bão số 3\" (cập nhật)"), "bao so 3 cap nhat");
        assert_eq!(normalize_query("giá_vàng"), "gia vang");
        assert_eq!(
            normalize_query("Tin nóng: đường sắt...!"),
            normalize_query(&sanitize_query("Tin nóng: đường sắt...!"))
        );
    }
}
