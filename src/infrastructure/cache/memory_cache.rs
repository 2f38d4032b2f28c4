use crate::application::ports::query_cache::QueryCacheInvalidator;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Clone)]
struct CacheEntry<T> {
    data: T,
    expires_at: Instant,
}

/// TTL cache keyed by string.
pub struct MemoryCacheService<T: Clone> {
    cache: Arc<RwLock<HashMap<String, CacheEntry<T>>>>,
    default_ttl: Duration,
}

impl<T> MemoryCacheService<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            default_ttl,
        }
    }

    pub async fn set(&self, key: String, value: T) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, key: String, value: T, ttl: Duration) {
        let entry = CacheEntry {
            data: value,
            expires_at: Instant::now() + ttl,
        };

        let mut cache = self.cache.write().await;
        cache.insert(key, entry);
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        let cache = self.cache.read().await;

        if let Some(entry) = cache.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(entry.data.clone());
            }
        }

        None
    }

    /// Remove every key starting with `prefix`.
    pub async fn delete_prefix(&self, prefix: &str) -> usize {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|key, _| !key.starts_with(prefix));
        before - cache.len()
    }

    pub async fn cleanup_expired(&self) {
        let mut cache = self.cache.write().await;
        let now = Instant::now();

        cache.retain(|_, entry| entry.expires_at > now);
    }

    pub async fn size(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }
}

/// Cached remote query results, grouped by the table they were read from.
pub struct MemoryQueryCache {
    cache: MemoryCacheService<Value>,
}

impl MemoryQueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: MemoryCacheService::new(ttl),
        }
    }

    fn key(table: &str, query: &str) -> String {
        format!("{table}:{query}")
    }

    pub async fn put(&self, table: &str, query: &str, rows: Value) {
        self.cache.set(Self::key(table, query), rows).await;
    }

    pub async fn get(&self, table: &str, query: &str) -> Option<Value> {
        self.cache.get(&Self::key(table, query)).await
    }

    pub async fn cleanup_expired(&self) {
        self.cache.cleanup_expired().await;
    }

    pub async fn size(&self) -> usize {
        self.cache.size().await
    }
}

impl Default for MemoryQueryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl QueryCacheInvalidator for MemoryQueryCache {
    async fn invalidate_table(&self, table: &str) {
        let removed = self.cache.delete_prefix(&format!("{table}:")).await;
        if removed > 0 {
            tracing::debug!(target: "offline::cache", table, removed, "query cache invalidated");
        }
    }
}
