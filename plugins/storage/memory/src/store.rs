use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use tokio::sync::RwLock;

use shortener_api::{
    AccountRecord, AccountStore, Credentials, InsertOutcome, InsertReport,
    LinkRecord, LinkStore, LinkTarget, StoreError,
};

// ═══════════════════════════════════════════════════════════════
//  MemoryStore
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
struct Accounts {
    by_id: HashMap<String, AccountRecord>,
    /// email → id
    emails: HashMap<String, String>,
}

/// In-memory store ссылок и пользователей. Для тестов и
/// single-node запуска без PostgreSQL.
#[derive(Default)]
pub struct MemoryStore {
    links: RwLock<HashMap<String, LinkRecord>>,
    accounts: RwLock<Accounts>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Число строк в таблице ссылок, включая истёкшие.
    pub async fn link_count(&self) -> usize {
        self.links.read().await.len()
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.by_id.len()
    }
}

impl LinkStore for MemoryStore {
    fn exists(&self, code: &str) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + '_>> {
        let code = code.to_string();
        Box::pin(async move { Ok(self.links.read().await.contains_key(&code)) })
    }

    fn insert_links<'a>(
        &'a self,
        records: &'a [LinkRecord],
    ) -> Pin<Box<dyn Future<Output = Result<InsertReport, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut links = self.links.write().await;
            let mut report = InsertReport::default();
            for record in records {
                let outcome = match links.get(&record.short_code) {
                    None => {
                        links.insert(record.short_code.clone(), record.clone());
                        InsertOutcome::Inserted
                    }
                    Some(existing) if existing.same_row(record) => InsertOutcome::Duplicate,
                    Some(_) => InsertOutcome::Conflict,
                };
                report.outcomes.push(outcome);
            }
            Ok(report)
        })
    }

    fn resolve(&self, code: &str) -> Pin<Box<dyn Future<Output = Result<Option<LinkTarget>, StoreError>> + Send + '_>> {
        let code = code.to_string();
        Box::pin(async move {
            let now = Utc::now();
            let links = self.links.read().await;
            Ok(links
                .get(&code)
                .filter(|r| !r.is_expired_at(now))
                .map(|r| LinkTarget {
                    long_url: r.long_url.clone(),
                    expiration_date: r.expiration_date,
                }))
        })
    }

    fn history(&self, owner: &str) -> Pin<Box<dyn Future<Output = Result<Vec<LinkRecord>, StoreError>> + Send + '_>> {
        let owner = owner.to_string();
        Box::pin(async move {
            let now = Utc::now();
            let links = self.links.read().await;
            let mut result: Vec<LinkRecord> = links
                .values()
                .filter(|r| r.owner == owner && !r.is_expired_at(now))
                .cloned()
                .collect();
            result.sort_by(|a, b| b.expiration_date.cmp(&a.expiration_date));
            Ok(result)
        })
    }
}

impl AccountStore for MemoryStore {
    fn account_exists(&self, email: &str) -> Pin<Box<dyn Future<Output = Result<bool, StoreError>> + Send + '_>> {
        let email = email.to_string();
        Box::pin(async move { Ok(self.accounts.read().await.emails.contains_key(&email)) })
    }

    fn insert_accounts<'a>(
        &'a self,
        records: &'a [AccountRecord],
    ) -> Pin<Box<dyn Future<Output = Result<InsertReport, StoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut accounts = self.accounts.write().await;
            let mut report = InsertReport::default();
            for record in records {
                let outcome = if accounts.by_id.contains_key(&record.id) {
                    InsertOutcome::Duplicate
                } else if accounts.emails.contains_key(&record.email) {
                    InsertOutcome::Conflict
                } else {
                    accounts.emails.insert(record.email.clone(), record.id.clone());
                    accounts.by_id.insert(record.id.clone(), record.clone());
                    InsertOutcome::Inserted
                };
                report.outcomes.push(outcome);
            }
            Ok(report)
        })
    }

    fn credentials(&self, email: &str) -> Pin<Box<dyn Future<Output = Result<Option<Credentials>, StoreError>> + Send + '_>> {
        let email = email.to_string();
        Box::pin(async move {
            let accounts = self.accounts.read().await;
            Ok(accounts
                .emails
                .get(&email)
                .and_then(|id| accounts.by_id.get(id))
                .map(|a| Credentials {
                    owner_id: a.id.clone(),
                    hashed_password: a.hashed_password.clone(),
                }))
        })
    }
}
