use tokio::sync::OnceCell;

use super::schema::{Database, MEMORY_PATH};
use super::types::DatabaseError;

/// Lazily-opened, memoized database handle.
///
/// The first call to [`StoreHandle::get`] opens the database; concurrent
/// first callers wait on the same initialization, so exactly one pool is
/// ever created. A failed open leaves the handle empty and the next caller
/// retries.
pub struct StoreHandle {
    path: String,
    db: OnceCell<Database>,
}

impl StoreHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            db: OnceCell::new(),
        }
    }

    /// Handle for a non-persistent in-memory store
    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.db.initialized()
    }

    pub async fn get(&self) -> Result<&Database, DatabaseError> {
        self.db
            .get_or_try_init(|| async {
                tracing::debug!(path = %self.path, "Initializing saved-articles store");
                Database::open(&self.path).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Article;

    #[tokio::test]
    async fn test_lazy_open() {
        let handle = StoreHandle::in_memory();
        assert!(!handle.is_open());
        handle.get().await.unwrap();
        assert!(handle.is_open());
    }

    #[tokio::test]
    async fn test_memoized_across_calls() {
        let handle = StoreHandle::in_memory();
        let first = handle.get().await.unwrap();
        first
            .insert(&Article::new("https://example.com/a", "A"))
            .await
            .unwrap();

        // Same pool, so the row written through the first reference is visible
        let second = handle.get().await.unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(second.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_opens_once() {
        let handle = std::sync::Arc::new(StoreHandle::in_memory());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    let db = handle.get().await.unwrap();
                    db as *const Database as usize
                })
            })
            .collect();

        let mut addresses = Vec::new();
        for task in tasks {
            addresses.push(task.await.unwrap());
        }
        addresses.dedup();
        assert_eq!(addresses.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_open_can_retry() {
        let dir = std::env::temp_dir().join(format!("newsdesk_handle_{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        let handle = StoreHandle::new(dir.join("saved.db").to_str().unwrap());

        // Parent directory missing: open fails and nothing is memoized
        assert!(handle.get().await.is_err());
        assert!(!handle.is_open());

        std::fs::create_dir_all(&dir).unwrap();
        let db = handle.get().await.unwrap();
        assert!(handle.is_open());
        assert_eq!(db.count().await.unwrap(), 0);

        std::fs::remove_dir_all(&dir).ok();
    }
}
