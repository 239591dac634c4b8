//! Redis как общий кэш code → long URL.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use serde::Deserialize;

use shortener_api::{Cache, CacheError};

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// e.g., "redis://localhost:6379/0"
    pub url: String,
}

impl RedisConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err("cache.url must start with redis:// or rediss://".into());
        }
        Ok(())
    }
}

fn cache_error(e: redis::RedisError) -> CacheError {
    CacheError::Unavailable(e.to_string())
}

/// TTL в миллисекундах для PSETEX. Redis не принимает 0.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Одно multiplexed соединение на процесс; клон на каждый запрос.
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str()).map_err(cache_error)?;
        let conn = client.get_multiplexed_async_connection().await.map_err(cache_error)?;
        tracing::info!("redis cache ready");
        Ok(Self { conn })
    }
}

impl Cache for RedisCache {
    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>> {
        let key = key.to_string();
        let mut conn = self.conn.clone();
        Box::pin(async move { conn.get::<_, Option<String>>(key).await.map_err(cache_error) })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str, ttl: Duration)
        -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            conn.pset_ex::<_, _, ()>(key, value, ttl_millis(ttl))
                .await
                .map_err(cache_error)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_keeps_sub_second_precision() {
        assert_eq!(ttl_millis(Duration::from_millis(800)), 800);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(86400)), 86_400_000);
    }

    #[test]
    fn config_validation() {
        let config: RedisConfig = serde_json::from_str(r#"{"url": "redis://localhost:6379"}"#).unwrap();
        assert!(config.validate().is_ok());
        assert!(RedisConfig { url: "http://x".into() }.validate().is_err());
    }
}
