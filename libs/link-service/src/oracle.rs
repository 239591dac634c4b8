use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use shortener_api::{Cache, LinkStore, StoreError};

/// Отвечает на вопрос «занят ли код». Кэш первым: положительный ответ
/// кэша окончателен. Промах или ошибка кэша → store. Отрицательный
/// ответ никогда не кэшируется. Ответ «свободен» ничего не резервирует.
pub struct ExistenceOracle {
    cache: Arc<dyn Cache>,
    store: Arc<dyn LinkStore>,
    ttl: Duration,
}

impl ExistenceOracle {
    pub fn new(cache: Arc<dyn Cache>, store: Arc<dyn LinkStore>, ttl: Duration) -> Self {
        Self { cache, store, ttl }
    }

    pub async fn probe(&self, code: &str) -> Result<bool, StoreError> {
        match self.cache.get(code).await {
            Ok(Some(_)) => return Ok(true),
            Ok(None) => {}
            Err(e) => tracing::warn!(code, error = %e, "cache probe failed, asking store"),
        }

        if !self.store.exists(code).await? {
            return Ok(false);
        }

        // Положительный ответ: в кэш кладётся цель, если запись ещё жива.
        match self.store.resolve(code).await {
            Ok(Some(target)) => {
                if let Some(ttl) = target.cache_ttl(Utc::now(), self.ttl) {
                    if let Err(e) = self.cache.set(code, &target.long_url, ttl).await {
                        tracing::warn!(code, error = %e, "cache write-back failed");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(code, error = %e, "resolve after positive probe failed"),
        }
        Ok(true)
    }
}
