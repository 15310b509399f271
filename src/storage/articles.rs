use super::schema::Database;
use super::types::{
    format_stored_timestamp, Article, DatabaseError, SaveOutcome, SavedArticleRow,
};

/// Upper bound on rows returned by `search`; `list_all` stays unbounded
const MAX_SEARCH_RESULTS: i64 = 500;

const SELECT_COLUMNS: &str =
    "SELECT _id, title, description, content, url, urlToImage, publishedAt FROM saved_articles";

impl Database {
    // ========================================================================
    // Mutations
    // ========================================================================

    /// Save an article, overwriting any existing row with the same URL.
    ///
    /// Each step is a single statement: update the existing row, otherwise
    /// insert with `ON CONFLICT DO NOTHING`. If a concurrent save wins the
    /// insert, the next round updates its row instead.
    pub async fn insert(&self, article: &Article) -> Result<SaveOutcome, DatabaseError> {
        const MAX_ROUNDS: usize = 3;

        for _ in 0..MAX_ROUNDS {
            if let Some(id) = self.update_returning_id(article).await? {
                tracing::debug!(url = %article.url, id, "Updated saved article");
                return Ok(SaveOutcome::Updated(id));
            }

            let inserted: Option<i64> = sqlx::query_scalar(
                r#"
                INSERT INTO saved_articles
                    (title, description, content, url, urlToImage, publishedAt)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(url) DO NOTHING
                RETURNING _id
            "#,
            )
            .bind(&article.title)
            .bind(&article.description)
            .bind(&article.content)
            .bind(&article.url)
            .bind(&article.image_url)
            .bind(format_stored_timestamp(article.published_at.as_ref()))
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            if let Some(id) = inserted {
                tracing::debug!(url = %article.url, id, "Inserted saved article");
                return Ok(SaveOutcome::Inserted(id));
            }
        }

        // Only reachable if another writer keeps deleting and re-inserting this URL
        Err(DatabaseError::Other(sqlx::Error::RowNotFound))
    }

    /// Overwrite every column of the row matching `article.url`.
    ///
    /// Returns the number of rows affected; 0 when no such row exists.
    pub async fn update(&self, article: &Article) -> Result<u64, DatabaseError> {
        let affected = match self.update_returning_id(article).await? {
            Some(_) => 1,
            None => {
                tracing::trace!(url = %article.url, "Update matched no saved article");
                0
            }
        };
        Ok(affected)
    }

    async fn update_returning_id(&self, article: &Article) -> Result<Option<i64>, DatabaseError> {
        let id = sqlx::query_scalar(
            r#"
            UPDATE saved_articles
            SET title = ?, description = ?, content = ?, urlToImage = ?, publishedAt = ?
            WHERE url = ?
            RETURNING _id
        "#,
        )
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.content)
        .bind(&article.image_url)
        .bind(format_stored_timestamp(article.published_at.as_ref()))
        .bind(&article.url)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(id)
    }

    /// Remove the article with this URL, returning rows removed (0 or 1).
    pub async fn delete(&self, url: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM saved_articles WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// All saved articles in insertion order
    pub async fn list_all(&self) -> Result<Vec<Article>, DatabaseError> {
        let rows = sqlx::query_as::<_, SavedArticleRow>(&format!("{SELECT_COLUMNS} ORDER BY _id"))
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().map(SavedArticleRow::into_article).collect())
    }

    pub async fn get(&self, url: &str) -> Result<Option<Article>, DatabaseError> {
        let row = sqlx::query_as::<_, SavedArticleRow>(&format!("{SELECT_COLUMNS} WHERE url = ?"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(SavedArticleRow::into_article))
    }

    pub async fn contains(&self, url: &str) -> Result<bool, DatabaseError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM saved_articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(found.is_some())
    }

    pub async fn count(&self) -> Result<i64, DatabaseError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM saved_articles")
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(count)
    }

    /// Case-insensitive substring search over title and description.
    ///
    /// `%` and `_` in the query match literally. A blank query matches nothing.
    pub async fn search(&self, query: &str) -> Result<Vec<Article>, DatabaseError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query_as::<_, SavedArticleRow>(&format!(
            "{SELECT_COLUMNS} \
             WHERE title LIKE ?1 ESCAPE '\\' OR description LIKE ?1 ESCAPE '\\' \
             ORDER BY _id LIMIT ?2"
        ))
        .bind(&pattern)
        .bind(MAX_SEARCH_RESULTS)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tracing::debug!(query = %query, results = rows.len(), "Searched saved articles");
        Ok(rows.into_iter().map(SavedArticleRow::into_article).collect())
    }
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn sample(url: &str, title: &str) -> Article {
        Article::new(url, title)
            .with_description(format!("About {title}"))
            .with_image_url(format!("{url}.jpg"))
            .with_published_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_insert_then_update_reports_outcome() {
        let db = test_db().await;
        let article = sample("https://example.com/a", "First");

        let first = db.insert(&article).await.unwrap();
        assert!(matches!(first, SaveOutcome::Inserted(_)));

        let second = db.insert(&article.with_content("body")).await.unwrap();
        assert_eq!(second, SaveOutcome::Updated(first.id()));
    }

    #[tokio::test]
    async fn test_update_missing_row_is_noop() {
        let db = test_db().await;
        let affected = db.update(&sample("https://example.com/none", "Ghost")).await.unwrap();
        assert_eq!(affected, 0);
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_overwrites_all_columns() {
        let db = test_db().await;
        db.insert(&sample("https://example.com/a", "Old")).await.unwrap();

        let replacement = Article::new("https://example.com/a", "New").with_content("text");
        assert_eq!(db.update(&replacement).await.unwrap(), 1);

        let stored = db.get("https://example.com/a").await.unwrap().unwrap();
        assert_eq!(stored, replacement);
    }

    #[tokio::test]
    async fn test_get_and_contains() {
        let db = test_db().await;
        db.insert(&sample("https://example.com/a", "A")).await.unwrap();

        assert!(db.contains("https://example.com/a").await.unwrap());
        assert!(!db.contains("https://example.com/b").await.unwrap());
        assert!(db.get("https://example.com/b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_matches_title_and_description() {
        let db = test_db().await;
        db.insert(&sample("https://example.com/1", "Rust 2024 edition")).await.unwrap();
        db.insert(&Article::new("https://example.com/2", "Weather").with_description("rain in RUST belt"))
            .await
            .unwrap();
        db.insert(&sample("https://example.com/3", "Gardening")).await.unwrap();

        let found = db.search("rust").await.unwrap();
        let urls: Vec<&str> = found.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, ["https://example.com/1", "https://example.com/2"]);
    }

    #[tokio::test]
    async fn test_search_wildcards_are_literal() {
        let db = test_db().await;
        db.insert(&Article::new("https://example.com/1", "100% growth")).await.unwrap();
        db.insert(&Article::new("https://example.com/2", "1000 growth")).await.unwrap();

        let found = db.search("0%").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://example.com/1");

        assert!(db.search("   ").await.unwrap().is_empty());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("a_b%c\\d"), "a\\_b\\%c\\\\d");
        assert_eq!(escape_like("plain"), "plain");
    }
}
