use crate::db::{models::QueryRecord, DbPool};
use crate::error::Result;
use chrono::Utc;

/// Store a query/response pair
pub async fn create_query(pool: &DbPool, query: &str, response: &str) -> Result<QueryRecord> {
    let record = sqlx::query_as::<_, QueryRecord>(
        r#"
        INSERT INTO queries (query, response, created_at)
        VALUES (?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(query)
    .bind(response)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// List stored queries in insertion order
pub async fn list_queries(pool: &DbPool, limit: i64, offset: i64) -> Result<Vec<QueryRecord>> {
    let records =
        sqlx::query_as::<_, QueryRecord>("SELECT * FROM queries ORDER BY id LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

    Ok(records)
}

pub async fn count_queries(pool: &DbPool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM queries")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, run_migrations};

    #[tokio::test]
    async fn test_query_log() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let record = create_query(&pool, "giá vàng hôm nay", "Giá vàng tăng nhẹ")
            .await
            .unwrap();
        assert_eq!(record.query, "giá vàng hôm nay");

        let listed = list_queries(&pool, 10, 0).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].response, "Giá vàng tăng nhẹ");
        assert_eq!(count_queries(&pool).await.unwrap(), 1);
    }
}
