use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;

use shortener_api::{
    AccountRecord, AccountStore, Cache, InsertOutcome, LinkRecord, LinkStore, StoreError,
};

// ═══════════════════════════════════════════════════════════════
//  BatchSink
// ═══════════════════════════════════════════════════════════════

/// Итог одного persist-вызова.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub stored: usize,
    pub conflicts: usize,
    pub cache_errors: usize,
}

/// Куда уходит декодированный batch одного типа записей.
pub trait BatchSink: Send + Sync + 'static {
    type Record: DeserializeOwned + Send + Sync;

    /// Имя типа записей для логов.
    fn kind(&self) -> &'static str;

    /// Один batched insert. Ошибка = ни одна запись не подтверждена.
    fn persist<'a>(
        &'a self,
        records: &'a [Self::Record],
    ) -> Pin<Box<dyn Future<Output = Result<FlushSummary, StoreError>> + Send + 'a>>;
}

// ═══════════════════════════════════════════════════════════════
//  LinkSink: store + cache
// ═══════════════════════════════════════════════════════════════

pub struct LinkSink {
    store: Arc<dyn LinkStore>,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
}

impl LinkSink {
    pub fn new(store: Arc<dyn LinkStore>, cache: Arc<dyn Cache>, cache_ttl: Duration) -> Self {
        Self { store, cache, cache_ttl }
    }
}

impl BatchSink for LinkSink {
    type Record = LinkRecord;

    fn kind(&self) -> &'static str {
        "link"
    }

    fn persist<'a>(
        &'a self,
        records: &'a [LinkRecord],
    ) -> Pin<Box<dyn Future<Output = Result<FlushSummary, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let report = self.store.insert_links(records).await?;
            let now = Utc::now();
            let mut summary = FlushSummary::default();

            for (record, outcome) in records.iter().zip(report.outcomes.iter()) {
                match outcome {
                    InsertOutcome::Inserted | InsertOutcome::Duplicate => {
                        summary.stored += 1;
                        // TTL ограничен сроком жизни ссылки; истёкшие не кэшируются.
                        let Some(ttl) = record.cache_ttl(now, self.cache_ttl) else {
                            continue;
                        };
                        if let Err(e) = self
                            .cache
                            .set(&record.short_code, &record.long_url, ttl)
                            .await
                        {
                            summary.cache_errors += 1;
                            tracing::warn!(code = %record.short_code, error = %e, "cache populate failed");
                        }
                    }
                    InsertOutcome::Conflict => {
                        summary.conflicts += 1;
                        tracing::warn!(
                            code = %record.short_code,
                            owner = %record.owner,
                            "short code already taken by another link, record rejected"
                        );
                    }
                }
            }
            Ok(summary)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  AccountSink
// ═══════════════════════════════════════════════════════════════

pub struct AccountSink {
    store: Arc<dyn AccountStore>,
}

impl AccountSink {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }
}

impl BatchSink for AccountSink {
    type Record = AccountRecord;

    fn kind(&self) -> &'static str {
        "account"
    }

    fn persist<'a>(
        &'a self,
        records: &'a [AccountRecord],
    ) -> Pin<Box<dyn Future<Output = Result<FlushSummary, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let report = self.store.insert_accounts(records).await?;
            let mut summary = FlushSummary::default();
            for (record, outcome) in records.iter().zip(report.outcomes.iter()) {
                match outcome {
                    InsertOutcome::Inserted | InsertOutcome::Duplicate => summary.stored += 1,
                    InsertOutcome::Conflict => {
                        summary.conflicts += 1;
                        tracing::warn!(id = %record.id, email = %record.email, "email already registered, record rejected");
                    }
                }
            }
            Ok(summary)
        })
    }
}
