use aggsum::db::{self, models::NewArticle, DbPool};
use aggsum::indexer::{SearchIndex, SearchQuery, SortBy, SortOrder};
use aggsum::ingest::Ingestor;
use chrono::{TimeZone, Utc};
use std::sync::Arc;

fn article(title: &str, url: &str, content: &str) -> NewArticle {
    NewArticle {
        title: title.to_string(),
        content: content.to_string(),
        source_url: url.to_string(),
        source: "Thanh Niên - Trang Chủ".to_string(),
        date: Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap(),
    }
}

async fn setup() -> (Ingestor, Arc<SearchIndex>, DbPool) {
    let pool = db::init_pool("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let index = Arc::new(SearchIndex::in_memory().unwrap());
    (Ingestor::new(pool.clone(), index.clone(), None), index, pool)
}

#[tokio::test]
async fn test_recrawl_does_not_duplicate() {
    let (ingestor, index, pool) = setup().await;

    let batch = || {
        vec![
            article("Giá vàng tăng", "https://thanhnien.vn/gia-vang.htm", "Nội dung A"),
            article("Bão số 3", "https://thanhnien.vn/bao-so-3.htm", "Nội dung B"),
        ]
    };

    let first = ingestor.ingest(batch()).await.unwrap();
    assert_eq!(first.inserted, 2);
    assert_eq!(first.indexed, 2);

    let second = ingestor.ingest(batch()).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(second.indexed, 0);

    assert_eq!(db::articles::count_all_articles(&pool).await.unwrap(), 2);
    assert_eq!(index.num_docs(), 2);
}

#[tokio::test]
async fn test_duplicates_within_one_batch() {
    let (ingestor, _index, pool) = setup().await;

    let report = ingestor
        .ingest(vec![
            article("Giá vàng tăng", "https://thanhnien.vn/gia-vang.htm", "Bản 1"),
            article("Giá vàng tăng", "https://thanhnien.vn/gia-vang.htm", "Bản 2"),
        ])
        .await
        .unwrap();

    assert_eq!(report.inserted, 1);
    assert_eq!(report.duplicates, 1);

    // First copy wins
    let stored = db::articles::find_by_title_and_url(
        &pool,
        "Giá vàng tăng",
        "https://thanhnien.vn/gia-vang.htm",
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(stored.content, "Bản 1");
}

#[tokio::test]
async fn test_key_is_title_and_url_together() {
    let (ingestor, index, pool) = setup().await;

    let report = ingestor
        .ingest(vec![
            article("Giá vàng tăng", "https://thanhnien.vn/gia-vang.htm", "Cùng nội dung"),
            // Headline edited after publication
            article("Giá vàng tăng mạnh", "https://thanhnien.vn/gia-vang.htm", "Cùng nội dung"),
            // Syndicated under another URL
            article("Giá vàng tăng", "https://tuoitre.vn/gia-vang.htm", "Cùng nội dung"),
        ])
        .await
        .unwrap();
    assert_eq!(report.inserted, 3);

    // Same title and content hash to the same value regardless of URL
    let hash = db::articles::calculate_content_hash("Giá vàng tăng", "Cùng nội dung");
    let same_story = db::articles::find_by_content_hash(&pool, &hash).await.unwrap();
    assert_eq!(same_story.len(), 2);

    let results = index
        .search(
            &SearchQuery {
                q: "giá vàng".to_string(),
                page: 1,
                limit: 10,
                sort_by: SortBy::Score,
                order: SortOrder::Desc,
                source: None,
            },
            100,
        )
        .unwrap();
    assert_eq!(results.total, 3);
}

#[tokio::test]
async fn test_invalid_articles_are_rejected() {
    let (ingestor, _index, pool) = setup().await;

    let report = ingestor
        .ingest(vec![
            article("  ", "https://thanhnien.vn/trong.htm", "Nội dung"),
            article("Không có nội dung", "https://thanhnien.vn/rong.htm", " "),
            article("Hợp lệ", "https://thanhnien.vn/hop-le.htm", "Nội dung"),
        ])
        .await
        .unwrap();

    assert_eq!(report.rejected, 2);
    assert_eq!(report.inserted, 1);
    assert_eq!(db::articles::count_all_articles(&pool).await.unwrap(), 1);
}
