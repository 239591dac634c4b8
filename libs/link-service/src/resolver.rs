use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use shortener_api::{Cache, LinkStore, is_valid_code};

use crate::ServiceError;

/// Cache-aside чтение: код → целевой URL.
pub struct CacheAsideReader {
    cache: Arc<dyn Cache>,
    store: Arc<dyn LinkStore>,
    ttl: Duration,
    code_length: usize,
}

impl CacheAsideReader {
    pub fn new(cache: Arc<dyn Cache>, store: Arc<dyn LinkStore>, ttl: Duration, code_length: usize) -> Self {
        Self { cache, store, ttl, code_length }
    }

    /// Истёкшая и несуществующая запись неразличимы: обе `NotFound`.
    pub async fn resolve(&self, code: &str) -> Result<String, ServiceError> {
        if !is_valid_code(code, self.code_length) {
            return Err(ServiceError::NotFound);
        }

        match self.cache.get(code).await {
            Ok(Some(target)) => return Ok(target),
            Ok(None) => {}
            Err(e) => tracing::warn!(code, error = %e, "cache read failed, treating as miss"),
        }

        let target = self.store.resolve(code).await?.ok_or(ServiceError::NotFound)?;

        // Запись в кэше не переживает саму ссылку.
        if let Some(ttl) = target.cache_ttl(Utc::now(), self.ttl) {
            if let Err(e) = self.cache.set(code, &target.long_url, ttl).await {
                tracing::warn!(code, error = %e, "cache write-back failed");
            }
        }
        Ok(target.long_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingStore, FailingCache, link, short_lived_link};
    use storage_memory::MemoryCache;

    const TTL: Duration = Duration::from_secs(60);

    fn reader(cache: Arc<dyn Cache>, store: Arc<CountingStore>) -> CacheAsideReader {
        CacheAsideReader::new(cache, store, TTL, 5)
    }

    #[tokio::test]
    async fn miss_path_reads_store_and_writes_back() {
        let cache = Arc::new(MemoryCache::default());
        let store = Arc::new(CountingStore::default());
        store.insert(link("abc12", "http://example.com/x", 30)).await;
        let reader = reader(cache.clone(), store.clone());

        assert_eq!(reader.resolve("abc12").await.unwrap(), "http://example.com/x");
        assert_eq!(cache.get("abc12").await.unwrap().as_deref(), Some("http://example.com/x"));

        // Второй раз из кэша.
        assert_eq!(reader.resolve("abc12").await.unwrap(), "http://example.com/x");
        assert_eq!(store.resolve_calls(), 1);
    }

    #[tokio::test]
    async fn expired_row_is_not_found() {
        let store = Arc::new(CountingStore::default());
        store.insert(link("abc12", "http://old", -1)).await;
        let reader = reader(Arc::new(MemoryCache::default()), store.clone());

        assert!(matches!(reader.resolve("abc12").await, Err(ServiceError::NotFound)));
        assert!(matches!(reader.resolve("abc13").await, Err(ServiceError::NotFound)));
    }

    #[tokio::test]
    async fn cached_target_expires_with_the_link() {
        let cache = Arc::new(MemoryCache::default());
        let store = Arc::new(CountingStore::default());
        store.insert(short_lived_link("abc12", "http://example.com/x", 300)).await;
        let reader = reader(cache.clone(), store.clone());

        assert_eq!(reader.resolve("abc12").await.unwrap(), "http://example.com/x");
        assert_eq!(cache.get("abc12").await.unwrap().as_deref(), Some("http://example.com/x"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(cache.get("abc12").await.unwrap(), None);
        assert!(matches!(reader.resolve("abc12").await, Err(ServiceError::NotFound)));
    }

    #[tokio::test]
    async fn failing_cache_degrades_to_store() {
        let store = Arc::new(CountingStore::default());
        store.insert(link("abc12", "http://a", 30)).await;
        let reader = reader(Arc::new(FailingCache), store);

        assert_eq!(reader.resolve("abc12").await.unwrap(), "http://a");
    }

    #[tokio::test]
    async fn malformed_code_never_touches_store() {
        let store = Arc::new(CountingStore::default());
        let reader = reader(Arc::new(MemoryCache::default()), store.clone());

        assert!(matches!(reader.resolve("abc").await, Err(ServiceError::NotFound)));
        assert!(matches!(reader.resolve("abc0O").await, Err(ServiceError::NotFound)));
        assert_eq!(store.resolve_calls(), 0);
    }
}
