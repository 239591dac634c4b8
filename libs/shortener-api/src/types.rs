use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  Overflow Policy
// ════════════════════════════════════════════════════════════════

/// Стратегия поведения при переполнении bounded канала.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// try_send(): если канал полон, дропнуть сообщение, залогировать.
    Drop,
    /// .send().await: ждать пока появится место (back-pressure).
    #[serde(alias = "backpressure")]
    BackPressure,
}

// ════════════════════════════════════════════════════════════════
//  Short codes
// ════════════════════════════════════════════════════════════════

/// Reader-friendly алфавит: без `0`, `O`, `I`, `l`.
pub const ALPHABET: &[u8] = b"123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ_-";

/// Владелец ссылок, созданных без токена.
pub const ANONYMOUS_OWNER: &str = "db092ed4-306a-4d4f-be5f-fd2f1487edbe";

/// Код корректен, если он нужной длины и состоит только из символов алфавита.
pub fn is_valid_code(code: &str, length: usize) -> bool {
    code.len() == length && code.bytes().all(|b| ALPHABET.contains(&b))
}

fn anonymous_owner() -> String {
    ANONYMOUS_OWNER.to_string()
}

// ════════════════════════════════════════════════════════════════
//  Records
// ════════════════════════════════════════════════════════════════

/// Запись о созданной короткой ссылке. Неизменяема после публикации.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    #[serde(default = "anonymous_owner")]
    pub owner: String,
    pub short_code: String,
    pub long_url: String,
    pub expiration_date: DateTime<Utc>,
}

impl LinkRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date <= now
    }

    /// Та же строка, что уже лежит в store (повторная доставка).
    pub fn same_row(&self, other: &LinkRecord) -> bool {
        self.short_code == other.short_code
            && self.long_url == other.long_url
            && self.owner == other.owner
    }

    pub fn cache_ttl(&self, now: DateTime<Utc>, max: Duration) -> Option<Duration> {
        bounded_ttl(self.expiration_date, now, max)
    }
}

/// Живая запись, как её отдаёт `LinkStore::resolve`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub long_url: String,
    pub expiration_date: DateTime<Utc>,
}

impl LinkTarget {
    pub fn cache_ttl(&self, now: DateTime<Utc>, max: Duration) -> Option<Duration> {
        bounded_ttl(self.expiration_date, now, max)
    }
}

/// TTL записи кэша: не дольше `max` и не дольше срока жизни ссылки.
/// None, если ссылка уже истекла.
pub fn bounded_ttl(expiration_date: DateTime<Utc>, now: DateTime<Utc>, max: Duration) -> Option<Duration> {
    let left = (expiration_date - now).to_std().ok()?;
    if left.is_zero() {
        return None;
    }
    Some(left.min(max))
}

/// Запись о регистрации пользователя.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub hashed_password: String,
}

/// Данные для проверки пароля.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub owner_id: String,
    pub hashed_password: String,
}

// ════════════════════════════════════════════════════════════════
//  Insert results
// ════════════════════════════════════════════════════════════════

/// Результат вставки одной записи batch'а.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Запись уже есть и совпадает: повторная доставка, не ошибка.
    Duplicate,
    /// Ключ занят другой записью.
    Conflict,
}

/// Исходы вставки, по одному на каждую входную запись (в том же порядке).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub outcomes: Vec<InsertOutcome>,
}

impl InsertReport {
    pub fn count(&self, outcome: InsertOutcome) -> usize {
        self.outcomes.iter().filter(|o| **o == outcome).count()
    }
}

// ════════════════════════════════════════════════════════════════
//  Log messages
// ════════════════════════════════════════════════════════════════

/// Уровень подтверждения публикации.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Acks {
    None,
    Leader,
    #[default]
    All,
}

/// Сообщение, отправляемое в лог.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub topic: String,
    /// Ключ партиционирования.
    pub key: String,
    pub payload: Vec<u8>,
}

/// Сообщение, прочитанное из партиции лога.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
    pub ts_ms: i64,
}

/// Имена topic'ов по типу записи.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicNames {
    #[serde(default = "default_links_topic")]
    pub links: String,
    #[serde(default = "default_accounts_topic")]
    pub accounts: String,
}

fn default_links_topic() -> String {
    "urls".into()
}
fn default_accounts_topic() -> String {
    "users".into()
}

impl Default for TopicNames {
    fn default() -> Self {
        Self {
            links: default_links_topic(),
            accounts: default_accounts_topic(),
        }
    }
}

impl TopicNames {
    pub fn all(&self) -> Vec<String> {
        vec![self.links.clone(), self.accounts.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_excludes_ambiguous_glyphs() {
        for c in [b'0', b'O', b'I', b'l'] {
            assert!(!ALPHABET.contains(&c));
        }
        assert_eq!(ALPHABET.len(), 60);
    }

    #[test]
    fn code_validation() {
        assert!(is_valid_code("abc12", 5));
        assert!(is_valid_code("A_-zZ", 5));
        assert!(!is_valid_code("abc1", 5));
        assert!(!is_valid_code("abc0d", 5));
        assert!(!is_valid_code("abcdé", 5));
    }

    #[test]
    fn cache_ttl_never_outlives_the_link() {
        let now = Utc::now();
        let day = Duration::from_secs(86400);
        let soon = now + chrono::Duration::milliseconds(800);
        assert_eq!(bounded_ttl(soon, now, day), Some(Duration::from_millis(800)));
        assert_eq!(bounded_ttl(now + chrono::Duration::days(30), now, day), Some(day));
        assert_eq!(bounded_ttl(now, now, day), None);
        assert_eq!(bounded_ttl(now - chrono::Duration::seconds(1), now, day), None);
    }

    #[test]
    fn link_record_wire_fields() {
        let json = r#"{
            "owner": "u1",
            "short_code": "abc12",
            "long_url": "http://example.com/x",
            "expiration_date": "2030-01-01T00:00:00Z",
            "unknown": 1
        }"#;
        let rec: LinkRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.owner, "u1");
        assert_eq!(rec.short_code, "abc12");

        let value = serde_json::to_value(&rec).unwrap();
        assert!(value.get("long_url").is_some());
        assert!(value.get("expiration_date").is_some());
    }

    #[test]
    fn missing_owner_means_anonymous() {
        let json = r#"{"short_code":"abc12","long_url":"http://a.b","expiration_date":"2030-01-01T00:00:00Z"}"#;
        let rec: LinkRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.owner, ANONYMOUS_OWNER);
    }

    #[test]
    fn report_counts() {
        let report = InsertReport {
            outcomes: vec![InsertOutcome::Inserted, InsertOutcome::Conflict, InsertOutcome::Inserted],
        };
        assert_eq!(report.count(InsertOutcome::Inserted), 2);
        assert_eq!(report.count(InsertOutcome::Duplicate), 0);
    }
}
