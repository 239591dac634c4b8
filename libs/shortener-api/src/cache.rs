use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::CacheError;

/// Key-value кэш с TTL. Ошибки кэша никогда не доходят до клиента:
/// вызывающая сторона считает их промахом.
pub trait Cache: Send + Sync {
    fn get(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>>;

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>>;
}
