use std::time::Duration;

use serde::Deserialize;

// ═══════════════════════════════════════════════════════════════
//  Failure Policy
// ═══════════════════════════════════════════════════════════════

/// Что делать с offset'ами batch'а, если store вернул ошибку.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Не отмечать batch: сессия завершается, партиции перечитываются
    /// с последнего checkpoint'а после `retry_backoff_ms`.
    #[default]
    Redeliver,
    /// Отметить batch несмотря на ошибку. Записи теряются.
    CommitAnyway,
}

// ═══════════════════════════════════════════════════════════════
//  Ingest Config
// ═══════════════════════════════════════════════════════════════

/// Конфигурация batch ingestor'а.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Имя consumer group.
    #[serde(default = "default_group")]
    pub group: String,
    /// Окно накопления для ссылок.
    #[serde(default = "default_link_window_ms")]
    pub link_window_ms: u64,
    /// Окно накопления для пользователей.
    #[serde(default = "default_account_window_ms")]
    pub account_window_ms: u64,
    /// TTL записей кэша, заполняемых после вставки ссылок.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_group() -> String {
    "storage".into()
}
fn default_link_window_ms() -> u64 {
    300
}
fn default_account_window_ms() -> u64 {
    500
}
fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_retry_backoff_ms() -> u64 {
    1000
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            group: default_group(),
            link_window_ms: default_link_window_ms(),
            account_window_ms: default_account_window_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            failure_policy: FailurePolicy::default(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl IngestConfig {
    pub fn link_window(&self) -> Duration {
        Duration::from_millis(self.link_window_ms)
    }

    pub fn account_window(&self) -> Duration {
        Duration::from_millis(self.account_window_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.link_window_ms == 0 || self.account_window_ms == 0 {
            return Err("ingest windows must be > 0".into());
        }
        if self.cache_ttl_secs == 0 {
            return Err("ingest.cache_ttl_secs must be > 0".into());
        }
        if self.group.is_empty() {
            return Err("ingest.group must not be empty".into());
        }
        Ok(())
    }
}
