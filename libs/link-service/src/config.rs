use std::time::Duration;

use serde::Deserialize;

use shortener_api::ANONYMOUS_OWNER;

// ═══════════════════════════════════════════════════════════════
//  Shortener Config
// ═══════════════════════════════════════════════════════════════

/// Параметры выдачи коротких ссылок.
#[derive(Debug, Clone, Deserialize)]
pub struct ShortenerConfig {
    /// Префикс коротких ссылок в ответах (e.g., "http://localhost:8080").
    #[serde(default = "default_redirect_host")]
    pub redirect_host: String,
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    /// Максимум попыток generate → probe на один запрос.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Общий дедлайн цикла генерации.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Срок жизни ссылок без токена, в днях.
    #[serde(default = "default_anonymous_ttl_days")]
    pub anonymous_ttl_days: u32,
    /// Допустимые сроки для авторизованных запросов; первый используется по умолчанию.
    #[serde(default = "default_allowed_ttl_days")]
    pub allowed_ttl_days: Vec<u32>,
    /// TTL для записи в кэш на пути чтения.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_anonymous_owner")]
    pub anonymous_owner: String,
}

fn default_redirect_host() -> String {
    "http://localhost:8080".into()
}
fn default_code_length() -> usize {
    5
}
fn default_max_attempts() -> u32 {
    16
}
fn default_deadline_ms() -> u64 {
    2000
}
fn default_anonymous_ttl_days() -> u32 {
    30
}
fn default_allowed_ttl_days() -> Vec<u32> {
    vec![30, 90, 365]
}
fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_anonymous_owner() -> String {
    ANONYMOUS_OWNER.into()
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            redirect_host: default_redirect_host(),
            code_length: default_code_length(),
            max_attempts: default_max_attempts(),
            deadline_ms: default_deadline_ms(),
            anonymous_ttl_days: default_anonymous_ttl_days(),
            allowed_ttl_days: default_allowed_ttl_days(),
            cache_ttl_secs: default_cache_ttl_secs(),
            anonymous_owner: default_anonymous_owner(),
        }
    }
}

impl ShortenerConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn short_url(&self, code: &str) -> String {
        format!("{}/{code}", self.redirect_host.trim_end_matches('/'))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.code_length == 0 {
            return Err("shortener.code_length must be > 0".into());
        }
        if self.max_attempts == 0 {
            return Err("shortener.max_attempts must be > 0".into());
        }
        if self.allowed_ttl_days.is_empty() {
            return Err("shortener.allowed_ttl_days must not be empty".into());
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Identity Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// HMAC секрет для HS256.
    pub secret: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// bcrypt cost для паролей.
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,
}

fn default_token_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}
fn default_password_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl IdentityConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.len() < 16 {
            return Err("identity.secret must be at least 16 bytes".into());
        }
        if !(4..=31).contains(&self.password_cost) {
            return Err("identity.password_cost must be in 4..=31".into());
        }
        Ok(())
    }
}
