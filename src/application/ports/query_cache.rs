use async_trait::async_trait;

/// Cached remote reads that must be dropped once a sync pass changes the underlying table.
#[async_trait]
pub trait QueryCacheInvalidator: Send + Sync {
    async fn invalidate_table(&self, table: &str);
}
