use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqlitePool, Transaction,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError};

/// Schema version written to `PRAGMA user_version` after migrations.
pub const SCHEMA_VERSION: i64 = 2;

pub(crate) const MEMORY_PATH: &str = ":memory:";

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database shared by the pool's
    /// connections, for environments without persistent storage.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process has the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::UnsupportedVersion` if the file was written by
    /// a newer schema.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Pre-create the file user-only so there is no window with umask permissions
        #[cfg(unix)]
        if path != MEMORY_PATH {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() && db_path.parent().is_some_and(|p| p.exists()) {
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok(); // SQLite reports the real error at connect_with.
            }
        }

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10));
        if path == MEMORY_PATH {
            // The shared-cache database is freed when its last connection closes
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tracing::debug!(path = %path, "Opened saved-articles database");

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Current `PRAGMA user_version` of the open database
    pub async fn schema_version(&self) -> Result<i64, DatabaseError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(version)
    }

    /// Bring the schema up to [`SCHEMA_VERSION`] inside one transaction.
    ///
    /// - version 0: fresh file, create the current table
    /// - version 1: add the `urlToImage` and `publishedAt` columns; existing
    ///   rows read NULL for both
    async fn migrate(&self) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&mut *tx)
            .await
            .map_err(migration_error)?;

        if version > SCHEMA_VERSION {
            return Err(DatabaseError::UnsupportedVersion {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }

        if version == SCHEMA_VERSION {
            tracing::trace!(version, "Schema up to date");
            return Ok(());
        }

        if version == 0 {
            create_current_schema(&mut tx).await.map_err(migration_error)?;
        } else {
            upgrade_v1_to_v2(&mut tx).await.map_err(migration_error)?;
        }

        // PRAGMA does not accept bound parameters
        sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
            .execute(&mut *tx)
            .await
            .map_err(migration_error)?;

        tx.commit().await.map_err(migration_error)?;
        tracing::info!(from = version, to = SCHEMA_VERSION, "Migrated saved-articles schema");
        Ok(())
    }
}

async fn create_current_schema(tx: &mut Transaction<'_, Sqlite>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS saved_articles (
            _id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            content TEXT,
            url TEXT NOT NULL UNIQUE,
            urlToImage TEXT,
            publishedAt TEXT NOT NULL
        )
    "#,
    )
    .execute(&mut **tx)
    .await?;

    // A table created by another tool at user_version 0 may still lack the v2 columns
    add_column_if_missing(tx, "urlToImage").await?;
    add_column_if_missing(tx, "publishedAt").await?;
    Ok(())
}

async fn upgrade_v1_to_v2(tx: &mut Transaction<'_, Sqlite>) -> Result<(), sqlx::Error> {
    add_column_if_missing(tx, "urlToImage").await?;
    add_column_if_missing(tx, "publishedAt").await?;
    Ok(())
}

async fn add_column_if_missing(
    tx: &mut Transaction<'_, Sqlite>,
    column: &'static str,
) -> Result<(), sqlx::Error> {
    let present: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('saved_articles') WHERE name = ?",
    )
    .bind(column)
    .fetch_one(&mut **tx)
    .await?;

    if present == 0 {
        tracing::debug!(column, "Adding column to saved_articles");
        sqlx::query(&format!("ALTER TABLE saved_articles ADD COLUMN {column} TEXT"))
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

fn migration_error(e: sqlx::Error) -> DatabaseError {
    if is_lock_message(&e.to_string()) {
        DatabaseError::InstanceLocked
    } else {
        DatabaseError::Migration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_database_is_current_version() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(db.schema_version().await.unwrap(), SCHEMA_VERSION);

        let columns: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info('saved_articles') ORDER BY cid")
                .fetch_all(&db.pool)
                .await
                .unwrap();
        let columns: Vec<&str> = columns.iter().map(|(c,)| c.as_str()).collect();
        assert_eq!(
            columns,
            [
                "_id",
                "title",
                "description",
                "content",
                "url",
                "urlToImage",
                "publishedAt"
            ]
        );
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.schema_version().await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_url_is_unique() {
        let db = Database::open(":memory:").await.unwrap();
        let insert = "INSERT INTO saved_articles (title, url, publishedAt) VALUES ('t', 'https://example.com/a', '')";
        sqlx::query(insert).execute(&db.pool).await.unwrap();
        assert!(sqlx::query(insert).execute(&db.pool).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_pool_never_drops_last_connection() {
        let db = Database::open(MEMORY_PATH).await.unwrap();
        let options = db.pool.options();
        assert_eq!(options.get_min_connections(), 1);
        assert_eq!(options.get_idle_timeout(), None);
        assert_eq!(options.get_max_lifetime(), None);
        assert!(db.pool.size() >= 1);
    }

    #[tokio::test]
    async fn test_file_pool_keeps_default_reaping() {
        let path = std::env::temp_dir().join(format!(
            "newsdesk_schema_{}_reaping.db",
            std::process::id()
        ));
        std::fs::remove_file(&path).ok();

        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert_eq!(db.pool.options().get_min_connections(), 0);
        assert!(db.pool.options().get_idle_timeout().is_some());

        db.pool.close().await;
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_newer_schema_rejected() {
        let db = Database::open(":memory:").await.unwrap();
        sqlx::query("PRAGMA user_version = 7")
            .execute(&db.pool)
            .await
            .unwrap();

        let err = db.migrate().await.unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::UnsupportedVersion {
                found: 7,
                supported: SCHEMA_VERSION
            }
        ));
    }
}
