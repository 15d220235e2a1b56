// Command-line interface

pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "aggsum")]
#[command(about = "aggsum - news aggregation, retrieval and summarization backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server and the background crawler
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "HOST")]
        host: Option<String>,
    },

    /// Run database migrations
    Migrate,

    /// Crawl sources once and exit
    Scrape {
        /// Source name from the catalogue; all enabled sources when omitted
        source: Option<String>,
    },

    /// Query a running server's retrieval endpoint
    Search {
        /// Search query
        query: String,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 5)]
        limit: usize,

        /// score or date
        #[arg(long, default_value = "score")]
        sort_by: String,

        /// desc or asc
        #[arg(long, default_value = "desc")]
        order: String,

        /// Only return articles with this source label
        #[arg(long)]
        source: Option<String>,
    },

    /// Rebuild the text index from the database
    Reindex,

    /// Push articles that are not yet vectorized to the vector store
    Vectorize,

    /// Delete every vector in the configured namespace
    PurgeVectors,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from([
            "aggsum", "search", "giá vàng", "--limit", "10", "--sort-by", "date",
        ]);
        match cli.command {
            Commands::Search {
                query,
                page,
                limit,
                sort_by,
                order,
                source,
            } => {
                assert_eq!(query, "giá vàng");
                assert_eq!(page, 1);
                assert_eq!(limit, 10);
                assert_eq!(sort_by, "date");
                assert_eq!(order, "desc");
                assert!(source.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_scrape_and_maintenance() {
        let cli = Cli::parse_from(["aggsum", "scrape", "vnexpress"]);
        assert!(matches!(cli.command, Commands::Scrape { source: Some(s) } if s == "vnexpress"));

        let cli = Cli::parse_from(["aggsum", "scrape"]);
        assert!(matches!(cli.command, Commands::Scrape { source: None }));

        let cli = Cli::parse_from(["aggsum", "purge-vectors"]);
        assert!(matches!(cli.command, Commands::PurgeVectors));
    }
}
