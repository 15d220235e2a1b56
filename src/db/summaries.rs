use crate::db::{models::SummaryRecord, DbPool};
use crate::error::Result;
use chrono::Utc;

/// Store a generated summary
pub async fn create_summary(
    pool: &DbPool,
    article_id: Option<i64>,
    summary: &str,
    model: &str,
) -> Result<SummaryRecord> {
    let record = sqlx::query_as::<_, SummaryRecord>(
        r#"
        INSERT INTO summaries (article_id, summary, model, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(article_id)
    .bind(summary)
    .bind(model)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// List summaries, newest first
pub async fn list_summaries(pool: &DbPool, limit: i64, offset: i64) -> Result<Vec<SummaryRecord>> {
    let records = sqlx::query_as::<_, SummaryRecord>(
        "SELECT * FROM summaries ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Most recent summary for an article
pub async fn latest_for_article(pool: &DbPool, article_id: i64) -> Result<Option<SummaryRecord>> {
    let record = sqlx::query_as::<_, SummaryRecord>(
        "SELECT * FROM summaries WHERE article_id = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(article_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

pub async fn count_summaries(pool: &DbPool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM summaries")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, run_migrations};

    #[tokio::test]
    async fn test_summary_storage() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        create_summary(&pool, None, "First", "gemini-1.5-pro")
            .await
            .unwrap();
        create_summary(&pool, None, "Second", "gemini-1.5-pro")
            .await
            .unwrap();

        let listed = list_summaries(&pool, 10, 0).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].summary, "Second");
        assert_eq!(count_summaries(&pool).await.unwrap(), 2);
        assert!(latest_for_article(&pool, 1).await.unwrap().is_none());
    }
}
