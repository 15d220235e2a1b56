use aggsum::{
    api::{create_router, AppState},
    cli::{
        commands::{self, RetrieveParams},
        Cli, Commands,
    },
    config::{sources::SourcesConfig, sync, Settings},
    crawler::{scheduler::Scheduler, Crawler},
    db::{self, DbPool},
    indexer::SearchIndex,
    ingest::Ingestor,
    summarizer::{GeminiSummarizer, Summarizer},
    vector::ArticleProcessor,
    Error, Result,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,aggsum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let settings = Settings::from_env()?;
    settings.validate()?;

    match cli.command {
        Commands::Serve { port, host } => serve(settings, port, host).await?,
        Commands::Migrate => migrate(settings).await?,
        Commands::Scrape { source } => scrape(settings, source).await?,
        Commands::Search {
            query,
            page,
            limit,
            sort_by,
            order,
            source,
        } => {
            let params = RetrieveParams {
                query,
                page,
                limit,
                sort_by,
                order,
                source,
            };
            commands::search(&settings.server_url(), &params).await?
        }
        Commands::Reindex => reindex(settings).await?,
        Commands::Vectorize => vectorize(settings).await?,
        Commands::PurgeVectors => purge_vectors(settings).await?,
    }

    Ok(())
}

async fn open_database(settings: &Settings) -> Result<DbPool> {
    let pool = db::init_pool_with_config(&settings.database).await?;
    info!(
        "Database connection established (max_connections: {}, min_connections: {})",
        settings.database.max_connections, settings.database.min_connections
    );

    db::run_migrations(&pool).await?;
    info!("Database migrations completed");
    Ok(pool)
}

fn open_search_index(settings: &Settings) -> Result<Arc<SearchIndex>> {
    let index = SearchIndex::new(&settings.search.index_path)?
        .with_boosts(settings.search.title_boost, settings.search.content_boost);
    info!("Search index initialized at {:?}", settings.search.index_path);
    Ok(Arc::new(index))
}

/// Vector processor, or `None` when disabled or misconfigured
fn build_processor(settings: &Settings) -> Option<Arc<ArticleProcessor>> {
    match ArticleProcessor::from_config(&settings.vector) {
        Ok(Some(processor)) => Some(Arc::new(processor)),
        Ok(None) => {
            info!("Vector backend disabled");
            None
        }
        Err(e) => {
            warn!("Failed to initialize vector backend: {}", e.log_safe());
            None
        }
    }
}

fn load_sources(settings: &Settings) -> SourcesConfig {
    let path = &settings.crawler.sources_config_path;
    match SourcesConfig::from_file(path) {
        Ok(sources) => {
            info!(
                "Loaded source catalogue: {} sources ({} enabled)",
                sources.sources.len(),
                sources.enabled_count()
            );
            sources
        }
        Err(e) => {
            warn!("Failed to load sources from {}: {}", path.display(), e);
            warn!("Continuing with an empty source catalogue");
            SourcesConfig {
                version: 1,
                sources: Vec::new(),
            }
        }
    }
}

async fn serve(mut settings: Settings, port: Option<u16>, host: Option<String>) -> Result<()> {
    if let Some(port) = port {
        settings.server.port = port;
    }
    if let Some(host) = host {
        settings.server.host = host;
    }

    info!("Starting aggsum server");
    info!("Database: {}", settings.database.url);
    info!("Server: {}:{}", settings.server.host, settings.server.port);

    let pool = open_database(&settings).await?;

    let sources = Arc::new(load_sources(&settings));
    match sync::sync_channels_from_config(&pool, &sources).await {
        Ok(report) => {
            report.log_summary();
        }
        Err(e) => warn!("Failed to sync channels from config: {}", e),
    }

    let search_index = open_search_index(&settings)?;
    let processor = build_processor(&settings);

    let summarizer: Option<Arc<dyn Summarizer>> =
        match GeminiSummarizer::from_config(&settings.summarizer) {
            Ok(Some(summarizer)) => {
                info!("Summarizer ready (model: {})", summarizer.model());
                Some(Arc::new(summarizer))
            }
            Ok(None) => {
                warn!("GEMINI_API_KEY not set; /api/summarize will return 503");
                None
            }
            Err(e) => {
                warn!("Failed to initialize summarizer: {}", e.log_safe());
                None
            }
        };

    let ingestor = Ingestor::new(pool.clone(), search_index.clone(), processor.clone());

    let crawler = Arc::new(Crawler::new(settings.crawler.clone(), sources)?);
    let scheduler = Arc::new(Scheduler::new(
        ingestor.clone(),
        crawler,
        settings.crawler.interval_seconds,
    ));
    let _scheduler_handle = scheduler.start();
    info!(
        "Background scheduler started (interval: {}s)",
        settings.crawler.interval_seconds
    );

    let state = AppState {
        pool,
        search_index,
        ingestor,
        summarizer,
        processor,
        settings: settings.clone(),
    };

    let app = create_router(state, &settings);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    println!("\n========================================");
    println!("aggsum news backend");
    println!("========================================");
    println!("Address: http://{addr}");
    println!(
        "Background Crawler: Active ({}s interval)",
        settings.crawler.interval_seconds
    );
    println!("\nAPI Endpoints:");
    println!("  GET  /api/articles        POST /api/articles");
    println!("  GET  /api/articles/:id");
    println!("  POST /api/retrieve        POST /api/semantic-search");
    println!("  POST /api/summarize       GET  /api/summaries");
    println!("  GET  /api/queries         POST /api/queries");
    println!("  GET  /api/channels        GET  /api/stats");
    println!("\nPress Ctrl+C to stop");
    println!("========================================\n");

    info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| Error::Internal(format!("Server error: {e}")))?;

    info!("Shutting down...");
    Ok(())
}

async fn migrate(settings: Settings) -> Result<()> {
    info!("Running database migrations");

    let pool = db::init_pool(&settings.database.url).await?;
    db::run_migrations(&pool).await?;

    println!("\x1b[32m\u{2713}\x1b[0m Database migrations completed successfully");
    Ok(())
}

async fn scrape(settings: Settings, source: Option<String>) -> Result<()> {
    let pool = open_database(&settings).await?;
    let search_index = open_search_index(&settings)?;
    let ingestor = Ingestor::new(pool, search_index, build_processor(&settings));

    let sources = Arc::new(load_sources(&settings));
    let crawler = Crawler::new(settings.crawler.clone(), sources)?;

    commands::scrape(&ingestor, &crawler, source.as_deref()).await?;
    Ok(())
}

async fn reindex(settings: Settings) -> Result<()> {
    let pool = open_database(&settings).await?;
    let search_index = open_search_index(&settings)?;

    commands::reindex(&pool, &search_index).await?;
    Ok(())
}

fn require_processor(settings: &Settings) -> Result<Arc<ArticleProcessor>> {
    ArticleProcessor::from_config(&settings.vector)?
        .map(Arc::new)
        .ok_or_else(|| Error::Config("VECTOR_BACKEND is disabled".to_string()))
}

async fn vectorize(settings: Settings) -> Result<()> {
    let processor = require_processor(&settings)?;
    let pool = open_database(&settings).await?;

    commands::vectorize(&pool, &processor).await?;
    Ok(())
}

async fn purge_vectors(settings: Settings) -> Result<()> {
    let processor = require_processor(&settings)?;
    let pool = open_database(&settings).await?;

    commands::purge_vectors(&pool, &processor).await?;
    Ok(())
}
