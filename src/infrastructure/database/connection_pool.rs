use crate::shared::config::DatabaseConfig;
use crate::shared::error::AppError;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Shared handle to the offline database.
///
/// The pool is opened and migrated on first use. Concurrent first callers wait on the
/// same open; a failed open is not remembered, so the next caller tries again.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    url: String,
    max_connections: u32,
    acquire_timeout: Duration,
    cell: OnceCell<SqlitePool>,
}

impl ConnectionPool {
    pub fn lazy(config: &DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                url: config.url.clone(),
                max_connections: config.max_connections.max(1),
                acquire_timeout: Duration::from_secs(config.connection_timeout.max(1)),
                cell: OnceCell::new(),
            }),
        }
    }

    /// Wrap a pool that is already open. The caller is responsible for migrating it.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                url: String::new(),
                max_connections: 1,
                acquire_timeout: Duration::from_secs(30),
                cell: OnceCell::new_with(Some(pool)),
            }),
        }
    }

    pub async fn from_memory() -> Result<Self, AppError> {
        let pool = Self::lazy(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            connection_timeout: 30,
        });
        pool.get().await?;
        Ok(pool)
    }

    pub fn is_open(&self) -> bool {
        self.inner.cell.initialized()
    }

    pub async fn get(&self) -> Result<&SqlitePool, AppError> {
        self.inner
            .cell
            .get_or_try_init(|| self.inner.open())
            .await
    }

    pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }

    pub async fn close(&self) {
        if let Some(pool) = self.inner.cell.get() {
            pool.close().await;
        }
    }
}

impl PoolInner {
    async fn open(&self) -> Result<SqlitePool, AppError> {
        let options = SqliteConnectOptions::from_str(&self.url)
            .map_err(AppError::storage_unavailable)?
            .create_if_missing(true);

        if !self.url.contains(":memory:") {
            if let Some(parent) = Path::new(options.get_filename()).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(AppError::storage_unavailable)?;
                }
            }
        }

        // In-memory databases vanish with their last connection, so connections are kept for
        // the life of the pool.
        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(AppError::storage_unavailable)?;

        tracing::info!(target: "offline::store", url = %self.url, "offline database connected");

        if let Err(err) = ConnectionPool::migrate(&pool).await {
            pool.close().await;
            return Err(err.into());
        }

        tracing::debug!(target: "offline::store", "offline database migrations completed");
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn opens_lazily_and_creates_missing_directories() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("offline.db");
        let pool = ConnectionPool::lazy(&DatabaseConfig {
            url: format!("sqlite://{}", db_path.display()),
            max_connections: 1,
            connection_timeout: 5,
        });

        assert!(!pool.is_open());
        let (a, b) = tokio::join!(pool.get(), pool.get());
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert!(pool.is_open());
        assert!(db_path.exists());

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'pending_%' ORDER BY name",
        )
        .fetch_all(pool.get().await.unwrap())
        .await
        .unwrap();
        assert_eq!(
            tables.into_iter().map(|(name,)| name).collect::<Vec<_>>(),
            vec!["pending_attachments", "pending_mutations"]
        );
    }

    #[tokio::test]
    async fn failed_open_is_storage_unavailable_and_retried() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let pool = ConnectionPool::lazy(&DatabaseConfig {
            url: format!("sqlite://{}", blocker.join("offline.db").display()),
            max_connections: 1,
            connection_timeout: 5,
        });

        let err = pool.get().await.unwrap_err();
        assert!(matches!(err, AppError::StorageUnavailable(_)));
        assert!(!pool.is_open());

        std::fs::remove_file(&blocker).unwrap();
        assert!(pool.get().await.is_ok());
    }
}
