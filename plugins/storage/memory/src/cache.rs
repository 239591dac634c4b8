use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use shortener_api::{Cache, CacheError};

// ═══════════════════════════════════════════════════════════════
//  MemoryCacheConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_entries() -> usize {
    100_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryCacheConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryCache
// ═══════════════════════════════════════════════════════════════

/// In-memory кэш с TTL на запись. При переполнении сначала
/// выбрасываются истёкшие записи, затем ближайшая к истечению.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
    max_entries: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

impl MemoryCache {
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: config.max_entries.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().await.values().filter(|(_, exp)| *exp > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let entries = self.entries.read().await;
            Ok(entries
                .get(&key)
                .filter(|(_, exp)| *exp > Instant::now())
                .map(|(v, _)| v.clone()))
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let now = Instant::now();
            let mut entries = self.entries.write().await;
            if entries.len() >= self.max_entries && !entries.contains_key(key) {
                entries.retain(|_, (_, exp)| *exp > now);
                if entries.len() >= self.max_entries {
                    let victim = entries
                        .iter()
                        .min_by_key(|(_, (_, exp))| *exp)
                        .map(|(k, _)| k.clone());
                    if let Some(k) = victim {
                        entries.remove(&k);
                    }
                }
            }
            entries.insert(key.to_string(), (value.to_string(), now + ttl));
            Ok(())
        })
    }
}
