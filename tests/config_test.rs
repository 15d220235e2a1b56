use aggsum::config::{sources::SourcesConfig, sync::sync_channels_from_config};
use aggsum::db;
use std::collections::HashSet;
use std::path::Path;

fn bundled_sources() -> SourcesConfig {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/sources.yaml");
    SourcesConfig::from_file(path).expect("bundled sources.yaml should load")
}

#[test]
fn test_bundled_sources_are_valid() {
    let config = bundled_sources();

    let enabled: HashSet<&str> = config
        .sources
        .iter()
        .filter(|s| s.enabled)
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(
        enabled,
        HashSet::from(["vnexpress", "tuoitre", "vietnamnet", "thanhnien"])
    );
    assert_eq!(config.enabled_count(), 4);

    // Disabled sources stay addressable for manual scrapes
    assert!(config.get("dantri").is_some());
    assert!(config.get("hackernews").is_some());

    let channels = config.channels();
    assert_eq!(channels.len(), 13);
    assert!(channels.iter().all(|c| enabled.contains(c.source.as_str())));
}

#[tokio::test]
async fn test_bundled_sources_sync_into_database() {
    let pool = db::init_pool("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let config = bundled_sources();
    let report = sync_channels_from_config(&pool, &config).await.unwrap();
    assert_eq!(report.added, 13);
    assert!(report.errors.is_empty());

    // A second run at startup changes nothing
    let report = sync_channels_from_config(&pool, &config).await.unwrap();
    assert_eq!(report.added, 0);
    assert_eq!(report.unchanged, 13);

    let tuoitre = db::channels::list_channels_by_source(&pool, "tuoitre")
        .await
        .unwrap();
    assert_eq!(tuoitre.len(), 3);
    assert!(tuoitre.iter().all(|c| c.kind == "rss" && c.status == "active"));

    let vnexpress = db::channels::list_channels_by_source(&pool, "vnexpress")
        .await
        .unwrap();
    assert_eq!(vnexpress.len(), 1);
    assert_eq!(vnexpress[0].kind, "html");
    assert_eq!(vnexpress[0].category, None);
}
