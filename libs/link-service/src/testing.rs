//! Test doubles shared by unit tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use storage_memory::MemoryStore;

use shortener_api::{Cache, CacheError, InsertReport, LinkRecord, LinkStore, LinkTarget, StoreError};

pub(crate) fn link(code: &str, url: &str, days: i64) -> LinkRecord {
    LinkRecord {
        owner: "u1".into(),
        short_code: code.into(),
        long_url: url.into(),
        expiration_date: Utc::now() + chrono::Duration::days(days),
    }
}

/// Ссылка, которая истекает через `millis` мс.
pub(crate) fn short_lived_link(code: &str, url: &str, millis: i64) -> LinkRecord {
    LinkRecord {
        expiration_date: Utc::now() + chrono::Duration::milliseconds(millis),
        ..link(code, url, 0)
    }
}

/// Кэш, который всегда недоступен.
pub(crate) struct FailingCache;

impl Cache for FailingCache {
    fn get(&self, _key: &str) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>> {
        Box::pin(async { Err(CacheError::Unavailable("connection refused".into())) })
    }

    fn set<'a>(&'a self, _key: &'a str, _value: &'a str, _ttl: Duration)
        -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + 'a>> {
        Box::pin(async { Err(CacheError::Unavailable("connection refused".into())) })
    }
}

/// MemoryStore со счётчиками вызовов.
#[derive(Default)]
pub(crate) struct CountingStore {
    pub(crate) inner: MemoryStore,
    pub(crate) exists: AtomicUsize,
    pub(crate) resolves: AtomicUsize,
    /// Все коды считаются занятыми.
    pub(crate) always_taken: bool,
}

impl CountingStore {
    pub(crate) async fn insert(&self, record: LinkRecord) {
        self.inner.insert_links(&[record]).await.unwrap();
    }

    pub(crate) fn exists_calls(&self) -> usize {
        self.exists.load(Ordering::SeqCst)
    }

    pub(crate) fn resolve_calls(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

impl LinkStore for CountingStore {
    fn exists(&self, code: &str) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + '_>> {
        self.exists.fetch_add(1, Ordering::SeqCst);
        if self.always_taken {
            return Box::pin(async { Ok(true) });
        }
        self.inner.exists(code)
    }

    fn insert_links<'a>(&'a self, records: &'a [LinkRecord])
        -> Pin<Box<dyn Future<Output = Result<InsertReport, StoreError>> + Send + 'a>> {
        self.inner.insert_links(records)
    }

    fn resolve(&self, code: &str) -> Pin<Box<dyn Future<Output = Result<Option<LinkTarget>, StoreError>> + Send + '_>> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(code)
    }

    fn history(&self, owner: &str) -> Pin<Box<dyn Future<Output = Result<Vec<LinkRecord>, StoreError>> + Send + '_>> {
        self.inner.history(owner)
    }
}
