use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The saved-articles database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The file was written by a newer schema than this build understands
    #[error("Database schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: i64, supported: i64 },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Map a sqlx error, folding lock conditions into `InstanceLocked`
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) surface as these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Article
// ============================================================================

/// A single news item, identified by its source URL.
///
/// Values are never mutated in place: enrichment builds a new `Article`
/// through [`Article::with_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    /// `None` for rows carried over from a version-1 database
    pub published_at: Option<DateTime<Utc>>,
}

impl Article {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            content: None,
            url: url.into(),
            image_url: None,
            published_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    /// Returns a copy of this article whose body is `content`.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..self.clone()
        }
    }

    /// Two articles are the same logical item when their URLs match,
    /// whatever the other fields say.
    pub fn same_article(&self, other: &Article) -> bool {
        self.url == other.url
    }

    /// Length of the body in characters (0 when absent)
    pub fn content_len(&self) -> usize {
        self.content.as_deref().map_or(0, |c| c.chars().count())
    }
}

// ============================================================================
// Row Types
// ============================================================================

/// Outcome of [`Database::insert`](super::Database::insert)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new row was created with this `_id`
    Inserted(i64),
    /// The existing row with this `_id` was overwritten
    Updated(i64),
}

impl SaveOutcome {
    pub fn id(&self) -> i64 {
        match self {
            SaveOutcome::Inserted(id) | SaveOutcome::Updated(id) => *id,
        }
    }
}

/// Internal row type for `saved_articles` queries (used by sqlx FromRow).
///
/// Column names follow the on-disk schema, which predates this crate.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SavedArticleRow {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub url: String,
    #[sqlx(rename = "urlToImage")]
    pub url_to_image: Option<String>,
    #[sqlx(rename = "publishedAt")]
    pub published_at: Option<String>,
}

impl SavedArticleRow {
    pub(crate) fn into_article(self) -> Article {
        let published_at = self
            .published_at
            .as_deref()
            .and_then(|raw| parse_stored_timestamp(raw, &self.url));
        Article {
            title: self.title,
            description: self.description,
            content: self.content,
            url: self.url,
            image_url: self.url_to_image,
            published_at,
        }
    }
}

/// Format a timestamp for the `publishedAt` column.
///
/// The column is `NOT NULL` on fresh databases, so a missing timestamp is
/// stored as the empty string.
pub(crate) fn format_stored_timestamp(published_at: Option<&DateTime<Utc>>) -> String {
    published_at.map(DateTime::to_rfc3339).unwrap_or_default()
}

fn parse_stored_timestamp(raw: &str, url: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            tracing::warn!(url = %url, value = %raw, error = %e, "Unparseable publishedAt in saved article");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_with_content_keeps_identity_fields() {
        let published = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let article = Article::new("https://example.com/a", "Title")
            .with_description("desc")
            .with_image_url("https://example.com/a.png")
            .with_published_at(published);

        let enriched = article.with_content("full body");
        assert_eq!(enriched.content.as_deref(), Some("full body"));
        assert_eq!(enriched.title, article.title);
        assert_eq!(enriched.description, article.description);
        assert_eq!(enriched.image_url, article.image_url);
        assert_eq!(enriched.published_at, article.published_at);
        assert!(enriched.same_article(&article));
        // Original is untouched
        assert!(article.content.is_none());
    }

    #[test]
    fn test_same_article_ignores_other_fields() {
        let a = Article::new("https://example.com/a", "One");
        let b = Article::new("https://example.com/a", "Two").with_description("x");
        let c = Article::new("https://example.com/c", "One");
        assert!(a.same_article(&b));
        assert!(!a.same_article(&c));
    }

    #[test]
    fn test_content_len_counts_chars() {
        let article = Article::new("https://example.com/a", "T").with_content("héllo");
        assert_eq!(article.content_len(), 5);
        assert_eq!(Article::new("https://example.com/b", "T").content_len(), 0);
    }

    #[test]
    fn test_timestamp_round_trip_and_tolerance() {
        let ts = Utc.with_ymd_and_hms(2023, 11, 5, 8, 30, 0).unwrap();
        let stored = format_stored_timestamp(Some(&ts));
        assert_eq!(parse_stored_timestamp(&stored, "u"), Some(ts));

        assert_eq!(format_stored_timestamp(None), "");
        assert_eq!(parse_stored_timestamp("", "u"), None);
        assert_eq!(parse_stored_timestamp("yesterday", "u"), None);
        // Offsets normalize to UTC
        assert_eq!(
            parse_stored_timestamp("2023-11-05T10:30:00+02:00", "u"),
            Some(ts)
        );
    }

    #[test]
    fn test_lock_messages_detected() {
        assert!(is_lock_message("error returned from database: database is locked"));
        assert!(is_lock_message("Unable to open database file"));
        assert!(!is_lock_message("no such table: saved_articles"));
    }
}
