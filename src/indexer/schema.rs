use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED,
    STRING,
};
use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer,
};

/// Name under which the news analyzer is registered on the index
pub const NEWS_TOKENIZER: &str = "news";

/// Lowercasing, diacritic-folding analyzer shared by indexing and query normalization
///
/// "Thế giới" and "the gioi" produce the same tokens, as do "Đà Nẵng" and "da nang".
pub fn news_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(AsciiFoldingFilter)
        .build()
}

/// Schema for the article search index
#[derive(Clone)]
pub struct ArticleSchema {
    pub schema: Schema,
    pub id: Field,
    pub title: Field,
    pub content: Field,
    pub source: Field,
    pub date: Field,
}

impl ArticleSchema {
    pub fn new() -> Self {
        let mut schema_builder = Schema::builder();

        // Article ID (indexed so updates can delete by term)
        let id = schema_builder.add_i64_field("id", INDEXED | STORED | FAST);

        let indexing = TextFieldIndexing::default()
            .set_tokenizer(NEWS_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);

        let title = schema_builder.add_text_field(
            "title",
            TextOptions::default()
                .set_indexing_options(indexing.clone())
                .set_stored(),
        );

        // Body text is searchable only; the database holds the canonical copy
        let content = schema_builder
            .add_text_field("content", TextOptions::default().set_indexing_options(indexing));

        // Exact source label, used as a filter
        let source = schema_builder.add_text_field("source", STRING | STORED);

        // Publication time as unix seconds, used for date sorting
        let date = schema_builder.add_i64_field("date", STORED | FAST);

        let schema = schema_builder.build();

        Self {
            schema,
            id,
            title,
            content,
            source,
            date,
        }
    }
}

impl Default for ArticleSchema {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::tokenizer::TokenStream;

    #[test]
    fn test_schema_creation() {
        let schema = ArticleSchema::new();
        assert!(schema.schema.get_field("title").is_ok());
        assert!(schema.schema.get_field("content").is_ok());
        assert!(schema.schema.get_field("source").is_ok());
        assert!(schema.schema.get_field("date").is_ok());
    }

    #[test]
    fn test_analyzer_folds_vietnamese() {
        let mut analyzer = news_analyzer();
        let mut stream = analyzer.token_stream("Thế Giới: Đà Nẵng!");
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        assert_eq!(tokens, vec!["the", "gioi", "da", "nang"]);
    }
}
