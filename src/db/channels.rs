use crate::db::{models::*, DbPool};
use crate::error::{Error, Result};
use chrono::Utc;

/// Create a new channel
pub async fn create_channel(pool: &DbPool, new_channel: &NewChannel) -> Result<Channel> {
    create_channel_with_status(pool, new_channel, "active").await
}

/// Create a new channel with an explicit initial status
pub async fn create_channel_with_status(
    pool: &DbPool,
    new_channel: &NewChannel,
    status: &str,
) -> Result<Channel> {
    let now = Utc::now();

    let channel = sqlx::query_as::<_, Channel>(
        r#"
        INSERT INTO channels (url, source, category, kind, status, error_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 0, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new_channel.url)
    .bind(&new_channel.source)
    .bind(&new_channel.category)
    .bind(&new_channel.kind)
    .bind(status)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(channel)
}

/// Get channel by ID
pub async fn get_channel(pool: &DbPool, channel_id: i64) -> Result<Channel> {
    let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = ?")
        .bind(channel_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Channel {channel_id} not found")))?;

    Ok(channel)
}

/// Get channel by URL
pub async fn get_channel_by_url(pool: &DbPool, url: &str) -> Result<Option<Channel>> {
    let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE url = ?")
        .bind(url)
        .fetch_optional(pool)
        .await?;

    Ok(channel)
}

/// List channels
pub async fn list_channels(
    pool: &DbPool,
    status: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Channel>> {
    let channels = if let Some(status) = status {
        sqlx::query_as::<_, Channel>(
            "SELECT * FROM channels WHERE status = ? ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, Channel>("SELECT * FROM channels ORDER BY id LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?
    };

    Ok(channels)
}

/// List every channel belonging to a source, regardless of status
pub async fn list_channels_by_source(pool: &DbPool, source: &str) -> Result<Vec<Channel>> {
    let channels =
        sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE source = ? ORDER BY id")
            .bind(source)
            .fetch_all(pool)
            .await?;

    Ok(channels)
}

/// Count channels
pub async fn count_channels(pool: &DbPool, status: Option<&str>) -> Result<i64> {
    let count = if let Some(status) = status {
        sqlx::query_scalar("SELECT COUNT(*) FROM channels WHERE status = ?")
            .bind(status)
            .fetch_one(pool)
            .await?
    } else {
        sqlx::query_scalar("SELECT COUNT(*) FROM channels")
            .fetch_one(pool)
            .await?
    };

    Ok(count)
}

/// Update channel status
pub async fn update_channel_status(
    pool: &DbPool,
    channel_id: i64,
    status: &str,
    error_count: i64,
    error_message: Option<String>,
) -> Result<()> {
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE channels
        SET status = ?, error_count = ?, error_message = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status)
    .bind(error_count)
    .bind(error_message)
    .bind(now)
    .bind(channel_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Update source, category and kind when the catalogue changes
pub async fn update_channel(
    pool: &DbPool,
    channel_id: i64,
    update: &NewChannel,
    status: &str,
) -> Result<()> {
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE channels
        SET source = ?, category = ?, kind = ?, status = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&update.source)
    .bind(&update.category)
    .bind(&update.kind)
    .bind(status)
    .bind(now)
    .bind(channel_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Update channel fetch time and caching headers
pub async fn update_channel_fetch_info(
    pool: &DbPool,
    channel_id: i64,
    etag: Option<&str>,
    last_modified: Option<chrono::DateTime<Utc>>,
) -> Result<()> {
    let now = Utc::now();

    sqlx::query(
        r#"
        UPDATE channels
        SET last_fetched_at = ?, etag = ?, last_modified = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(now)
    .bind(etag)
    .bind(last_modified)
    .bind(now)
    .bind(channel_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Increment channel error count
pub async fn increment_error_count(pool: &DbPool, channel_id: i64) -> Result<()> {
    sqlx::query("UPDATE channels SET error_count = error_count + 1 WHERE id = ?")
        .bind(channel_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Delete a channel
pub async fn delete_channel(pool: &DbPool, channel_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM channels WHERE id = ?")
        .bind(channel_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_pool, run_migrations};

    #[tokio::test]
    async fn test_channel_crud() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        // Create
        let new_channel = NewChannel {
            url: "https://tuoitre.vn/rss/the-gioi.rss".to_string(),
            source: "tuoitre".to_string(),
            category: Some("Thế Giới".to_string()),
            kind: "rss".to_string(),
        };
        let channel = create_channel(&pool, &new_channel).await.unwrap();
        assert_eq!(channel.url, new_channel.url);
        assert_eq!(channel.status, "active");

        // Get
        let retrieved = get_channel(&pool, channel.id).await.unwrap();
        assert_eq!(retrieved.category.as_deref(), Some("Thế Giới"));

        // Status and errors
        increment_error_count(&pool, channel.id).await.unwrap();
        update_channel_status(&pool, channel.id, "error", 1, Some("HTTP 500".into()))
            .await
            .unwrap();
        let retrieved = get_channel(&pool, channel.id).await.unwrap();
        assert_eq!(retrieved.status, "error");
        assert_eq!(retrieved.error_count, 1);

        // List and count
        assert_eq!(list_channels(&pool, None, 10, 0).await.unwrap().len(), 1);
        assert_eq!(count_channels(&pool, Some("active")).await.unwrap(), 0);
        assert_eq!(
            list_channels_by_source(&pool, "tuoitre").await.unwrap().len(),
            1
        );

        // Delete
        delete_channel(&pool, channel.id).await.unwrap();
        assert_eq!(count_channels(&pool, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_info_roundtrip() {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let channel = create_channel(
            &pool,
            &NewChannel {
                url: "https://thanhnien.vn/rss/home.rss".to_string(),
                source: "thanhnien".to_string(),
                category: None,
                kind: "rss".to_string(),
            },
        )
        .await
        .unwrap();

        update_channel_fetch_info(&pool, channel.id, Some("\"abc\""), None)
            .await
            .unwrap();

        let channel = get_channel_by_url(&pool, "https://thanhnien.vn/rss/home.rss")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(channel.etag.as_deref(), Some("\"abc\""));
        assert!(channel.last_fetched_at.is_some());
    }
}
