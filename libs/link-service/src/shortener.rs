use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use log_engine::WriteBuffer;
use shortener_api::{Cache, IdentityError, IdentityOracle, LinkRecord, LinkStore, TopicNames};

use crate::config::ShortenerConfig;
use crate::generator::generate;
use crate::oracle::ExistenceOracle;
use crate::resolver::CacheAsideReader;
use crate::ServiceError;

// ═══════════════════════════════════════════════════════════════
//  Requests / responses
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct ShortenRequest {
    pub url: String,
    /// Срок жизни в днях. Учитывается только с валидным токеном.
    #[serde(default)]
    pub expiration_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Shortened {
    pub short_code: String,
    pub short_url: String,
    pub expiration_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub short_url: String,
    pub long_url: String,
    pub expiration_date: DateTime<Utc>,
}

/// Абсолютный http(s) URL без пробелов.
pub(crate) fn validate_url(url: &str) -> Result<(), ServiceError> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| ServiceError::Validation("url must be an absolute http(s) url".into()))?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || url.len() > 2048 || url.chars().any(char::is_whitespace) {
        return Err(ServiceError::Validation("bad url".into()));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
//  LinkService
// ═══════════════════════════════════════════════════════════════

/// Создание ссылок, редирект и история владельца.
pub struct LinkService {
    config: ShortenerConfig,
    topic: String,
    oracle: ExistenceOracle,
    reader: CacheAsideReader,
    store: Arc<dyn LinkStore>,
    identity: Arc<dyn IdentityOracle>,
    buffer: WriteBuffer,
}

impl LinkService {
    pub fn new(
        config: ShortenerConfig,
        topics: &TopicNames,
        store: Arc<dyn LinkStore>,
        cache: Arc<dyn Cache>,
        identity: Arc<dyn IdentityOracle>,
        buffer: WriteBuffer,
    ) -> Self {
        let oracle = ExistenceOracle::new(cache.clone(), store.clone(), config.cache_ttl());
        let reader = CacheAsideReader::new(cache, store.clone(), config.cache_ttl(), config.code_length);
        Self {
            topic: topics.links.clone(),
            oracle,
            reader,
            store,
            identity,
            buffer,
            config,
        }
    }

    pub fn config(&self) -> &ShortenerConfig {
        &self.config
    }

    /// Владелец по токену. Невалидный или непроверяемый токен → None (аноним).
    async fn owner_for(&self, token: Option<&str>) -> Option<String> {
        let token = token?;
        match self.identity.validate(token).await {
            Ok(owner) => Some(owner),
            Err(IdentityError::Invalid(reason)) => {
                tracing::info!(reason = %reason, "invalid token, shortening anonymously");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "identity unavailable, shortening anonymously");
                None
            }
        }
    }

    /// Создать ссылку. Возвращается до того, как запись попадёт в store:
    /// редирект заработает после ближайшего flush'а ingestor'а.
    pub async fn shorten(&self, token: Option<&str>, req: ShortenRequest) -> Result<Shortened, ServiceError> {
        validate_url(&req.url)?;

        let (owner, days) = match self.owner_for(token).await {
            Some(owner) => {
                let days = match req.expiration_days {
                    Some(days) => days,
                    None => self.config.allowed_ttl_days.first().copied().ok_or_else(|| {
                        ServiceError::Validation("no expiration periods are configured".into())
                    })?,
                };
                if !self.config.allowed_ttl_days.contains(&days) {
                    return Err(ServiceError::Validation(format!(
                        "expiration must be one of {:?} days",
                        self.config.allowed_ttl_days
                    )));
                }
                (owner, days)
            }
            None => (self.config.anonymous_owner.clone(), self.config.anonymous_ttl_days),
        };

        let code = self.allocate_code().await?;
        let record = LinkRecord {
            owner,
            short_code: code.clone(),
            long_url: req.url,
            expiration_date: Utc::now() + ChronoDuration::days(i64::from(days)),
        };
        self.buffer.submit_json(&self.topic, &record.short_code, &record).await?;

        tracing::info!(code = %code, owner = %record.owner, days, "link submitted");
        Ok(Shortened {
            short_url: self.config.short_url(&code),
            short_code: code,
            expiration_date: record.expiration_date,
        })
    }

    /// generate → probe, пока код не окажется свободным.
    /// Ограничено числом попыток и дедлайном.
    async fn allocate_code(&self) -> Result<String, ServiceError> {
        let deadline = Instant::now() + self.config.deadline();

        for attempt in 1..=self.config.max_attempts {
            let code = generate(self.config.code_length);
            match tokio::time::timeout_at(deadline, self.oracle.probe(&code)).await {
                Ok(Ok(false)) => return Ok(code),
                Ok(Ok(true)) => tracing::debug!(code = %code, attempt, "short code collision"),
                Ok(Err(e)) => tracing::warn!(attempt, error = %e, "existence probe failed"),
                Err(_) => {
                    tracing::warn!(attempt, "short code allocation deadline exceeded");
                    break;
                }
            }
        }
        Err(ServiceError::Unavailable("could not allocate a short code".into()))
    }

    pub async fn resolve(&self, code: &str) -> Result<String, ServiceError> {
        self.reader.resolve(code).await
    }

    /// Неистёкшие ссылки владельца токена. Без токена: Unauthenticated.
    pub async fn history(&self, token: Option<&str>) -> Result<Vec<HistoryEntry>, ServiceError> {
        let token = token.ok_or_else(|| ServiceError::Unauthenticated("token required".into()))?;
        let owner = self.identity.validate(token).await?;
        let links = self.store.history(&owner).await?;
        Ok(links
            .into_iter()
            .map(|r| HistoryEntry {
                short_url: self.config.short_url(&r.short_code),
                long_url: r.long_url,
                expiration_date: r.expiration_date,
            })
            .collect())
    }
}
