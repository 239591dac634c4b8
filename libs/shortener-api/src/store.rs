use std::future::Future;
use std::pin::Pin;

use crate::{AccountRecord, Credentials, InsertReport, LinkRecord, LinkTarget, StoreError};

// ════════════════════════════════════════════════════════════════
//  Durable store
// ════════════════════════════════════════════════════════════════

/// Хранилище ссылок.
///
/// Реализации: MemoryStore (storage-memory), PostgresStore (storage-postgres).
pub trait LinkStore: Send + Sync {
    /// Есть ли запись с таким кодом (без учёта срока жизни).
    fn exists(&self, code: &str) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + '_>>;

    /// Вставить batch. Идемпотентно по `short_code`: повтор той же записи
    /// даёт `Duplicate`, другая запись с тем же кодом даёт `Conflict`.
    fn insert_links<'a>(
        &'a self,
        records: &'a [LinkRecord],
    ) -> Pin<Box<dyn Future<Output = Result<InsertReport, StoreError>> + Send + 'a>>;

    /// Целевой URL и срок жизни неистёкшей записи.
    fn resolve(&self, code: &str) -> Pin<Box<dyn Future<Output = Result<Option<LinkTarget>, StoreError>> + Send + '_>>;

    /// Неистёкшие ссылки владельца.
    fn history(&self, owner: &str) -> Pin<Box<dyn Future<Output = Result<Vec<LinkRecord>, StoreError>> + Send + '_>>;
}

/// Хранилище пользователей. Уникальность по email.
pub trait AccountStore: Send + Sync {
    fn account_exists(&self, email: &str) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + '_>>;

    /// Вставить batch. Повтор с тем же `id` даёт `Duplicate`,
    /// занятый email с другим `id` даёт `Conflict`.
    fn insert_accounts<'a>(
        &'a self,
        records: &'a [AccountRecord],
    ) -> Pin<Box<dyn Future<Output = Result<InsertReport, StoreError>> + Send + 'a>>;

    fn credentials(&self, email: &str) -> Pin<Box<dyn Future<Output = Result<Option<Credentials>, StoreError>> + Send + '_>>;
}
