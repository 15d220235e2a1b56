use crate::db::{models::*, DbPool};
use crate::error::{Error, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;

/// Calculate the content hash used to spot the same story under different URLs
pub fn calculate_content_hash(title: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.trim().as_bytes());
    hasher.update(b"\n");
    hasher.update(content.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Insert a new article
///
/// Fails with `Error::Conflict` when (title, source_url) already exists.
pub async fn create_article(pool: &DbPool, new_article: &NewArticle) -> Result<Article> {
    let now = Utc::now();
    let content_hash = calculate_content_hash(&new_article.title, &new_article.content);

    let article = sqlx::query_as::<_, Article>(
        r#"
        INSERT INTO articles (title, content, source_url, source, date, content_hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new_article.title)
    .bind(&new_article.content)
    .bind(&new_article.source_url)
    .bind(&new_article.source)
    .bind(new_article.date)
    .bind(&content_hash)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => Error::Conflict(
            format!(
                "Article '{}' from {} already exists",
                new_article.title, new_article.source_url
            ),
        ),
        other => Error::Database(other),
    })?;

    Ok(article)
}

/// Get article by ID
pub async fn get_article(pool: &DbPool, article_id: i64) -> Result<Article> {
    let article = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = ?")
        .bind(article_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound("Article not found.".to_string()))?;

    Ok(article)
}

/// Find an article by its deduplication key
pub async fn find_by_title_and_url(
    pool: &DbPool,
    title: &str,
    source_url: &str,
) -> Result<Option<Article>> {
    let article =
        sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE title = ? AND source_url = ?")
            .bind(title)
            .bind(source_url)
            .fetch_optional(pool)
            .await?;

    Ok(article)
}

/// Find articles sharing a content hash
pub async fn find_by_content_hash(pool: &DbPool, content_hash: &str) -> Result<Vec<Article>> {
    let articles =
        sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE content_hash = ? ORDER BY id")
            .bind(content_hash)
            .fetch_all(pool)
            .await?;

    Ok(articles)
}

/// Get or create article by (title, source_url)
///
/// Returns the stored article and whether it was inserted by this call.
pub async fn get_or_create_article(
    pool: &DbPool,
    new_article: &NewArticle,
) -> Result<(Article, bool)> {
    if let Some(article) =
        find_by_title_and_url(pool, &new_article.title, &new_article.source_url).await?
    {
        return Ok((article, false));
    }

    match create_article(pool, new_article).await {
        Ok(article) => Ok((article, true)),
        // Lost a race with a concurrent insert of the same key
        Err(Error::Conflict(_)) => {
            let article =
                find_by_title_and_url(pool, &new_article.title, &new_article.source_url)
                    .await?
                    .ok_or_else(|| {
                        Error::Internal("Article vanished after unique conflict".to_string())
                    })?;
            Ok((article, false))
        }
        Err(e) => Err(e),
    }
}

/// Fetch articles by ID, preserving the order of `ids`
pub async fn get_articles_by_ids(pool: &DbPool, ids: &[i64]) -> Result<Vec<Article>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT * FROM articles WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let rows = builder
        .build_query_as::<Article>()
        .fetch_all(pool)
        .await?;

    let mut by_id: HashMap<i64, Article> = rows.into_iter().map(|a| (a.id, a)).collect();
    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// List articles newest first, optionally filtered by source label
pub async fn list_articles(
    pool: &DbPool,
    source: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Article>> {
    let articles = if let Some(source) = source {
        sqlx::query_as::<_, Article>(
            "SELECT * FROM articles WHERE source = ? ORDER BY date DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(source)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, Article>(
            "SELECT * FROM articles ORDER BY date DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?
    };

    Ok(articles)
}

/// Count articles, optionally by source label
pub async fn count_articles(pool: &DbPool, source: Option<&str>) -> Result<i64> {
    let count = if let Some(source) = source {
        sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE source = ?")
            .bind(source)
            .fetch_one(pool)
            .await?
    } else {
        sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(pool)
            .await?
    };

    Ok(count)
}

/// Count all articles
pub async fn count_all_articles(pool: &DbPool) -> Result<i64> {
    count_articles(pool, None).await
}

/// List all articles in insertion order (used for reindexing)
pub async fn list_all_articles(pool: &DbPool, limit: i64, offset: i64) -> Result<Vec<Article>> {
    let articles =
        sqlx::query_as::<_, Article>("SELECT * FROM articles ORDER BY id LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

    Ok(articles)
}

/// Articles not yet pushed to the vector store
pub async fn list_unvectorized(pool: &DbPool, limit: i64) -> Result<Vec<Article>> {
    let articles = sqlx::query_as::<_, Article>(
        "SELECT * FROM articles WHERE vectorized_at IS NULL ORDER BY id LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(articles)
}

/// Mark article as indexed
pub async fn mark_indexed(pool: &DbPool, article_id: i64) -> Result<()> {
    sqlx::query("UPDATE articles SET indexed_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(article_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Mark article as vectorized
pub async fn mark_vectorized(pool: &DbPool, article_id: i64) -> Result<()> {
    sqlx::query("UPDATE articles SET vectorized_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(article_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Clear vectorized markers after the vector namespace was purged
pub async fn reset_vectorized(pool: &DbPool) -> Result<u64> {
    let result = sqlx::query("UPDATE articles SET vectorized_at = NULL")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Delete article
pub async fn delete_article(pool: &DbPool, article_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM articles WHERE id = ?")
        .bind(article_id)
        .execute(pool)
        .await?;

    Ok(())
}
