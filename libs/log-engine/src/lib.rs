pub mod config;
mod group;
mod producer;

use std::collections::HashMap;
use std::future::Future;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use shortener_api::{Acks, LogError, LogMessage, LogPublisher, OutgoingMessage, now_ms};

pub use config::{LogConfig, WriteBufferConfig};
pub use group::GroupMember;
pub use producer::{WriteBuffer, WriteBufferStats};

use group::GroupState;

// ═══════════════════════════════════════════════════════════════
//  Partition
// ═══════════════════════════════════════════════════════════════

struct Entry {
    key: String,
    payload: Vec<u8>,
    ts_ms: i64,
}

/// Append-only последовательность записей. Offset = индекс в векторе.
struct Partition {
    entries: RwLock<Vec<Entry>>,
    /// Будит fetcher'ы после append.
    notify: Notify,
}

impl Partition {
    fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    async fn read_from(&self, topic: &str, partition: u32, offset: u64, max: usize) -> Vec<LogMessage> {
        let entries = self.entries.read().await;
        let start = (offset as usize).min(entries.len());
        entries[start..]
            .iter()
            .take(max)
            .enumerate()
            .map(|(i, e)| LogMessage {
                topic: topic.to_string(),
                partition,
                offset: (start + i) as u64,
                key: e.key.clone(),
                payload: e.payload.clone(),
                ts_ms: e.ts_ms,
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════
//  TopicLog
// ═══════════════════════════════════════════════════════════════

struct TopicLog {
    partitions: Vec<Partition>,
    /// Сообщения без ключа идут round-robin.
    next_unkeyed: AtomicU64,
}

impl TopicLog {
    fn new(partitions: u32) -> Self {
        Self {
            partitions: (0..partitions).map(|_| Partition::new()).collect(),
            next_unkeyed: AtomicU64::new(0),
        }
    }

    fn partition_for(&self, key: &str) -> u32 {
        let n = self.partitions.len() as u64;
        if key.is_empty() {
            return (self.next_unkeyed.fetch_add(1, Ordering::Relaxed) % n) as u32;
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % n) as u32
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryLog
// ═══════════════════════════════════════════════════════════════

const DRAIN_POLL: Duration = Duration::from_millis(10);

struct LogInner {
    config: LogConfig,
    topics: HashMap<String, TopicLog>,
    groups: Mutex<HashMap<String, Arc<GroupState>>>,
}

impl LogInner {
    fn partition(&self, topic: &str, partition: u32) -> Option<&Partition> {
        self.topics.get(topic)?.partitions.get(partition as usize)
    }
}

/// Партиционированный append-only лог с consumer group'ами.
///
/// Набор topic'ов фиксируется при создании. Сообщения с одним ключом
/// попадают в одну партицию и читаются в порядке записи.
#[derive(Clone)]
pub struct MemoryLog {
    inner: Arc<LogInner>,
}

impl MemoryLog {
    pub fn new(config: LogConfig, topics: &[String]) -> Self {
        let partitions = config.partitions.max(1);
        let topics = topics
            .iter()
            .map(|name| (name.clone(), TopicLog::new(partitions)))
            .collect();
        Self {
            inner: Arc::new(LogInner {
                config,
                topics,
                groups: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.topics.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn partitions(&self, topic: &str) -> Option<u32> {
        self.inner.topics.get(topic).map(|t| t.partitions.len() as u32)
    }

    /// Следующий offset для записи в партицию (= число записей).
    pub async fn end_offset(&self, topic: &str, partition: u32) -> Option<u64> {
        let part = self.inner.partition(topic, partition)?;
        Some(part.entries.read().await.len() as u64)
    }

    /// Зарегистрировать участника группы. Участник покидает группу,
    /// когда `token` отменён.
    pub async fn group_member(&self, group: &str, token: CancellationToken) -> GroupMember {
        let state = {
            let mut groups = self.inner.groups.lock().await;
            groups
                .entry(group.to_string())
                .or_insert_with(|| Arc::new(GroupState::new(group, &self.inner.topics)))
                .clone()
        };
        GroupMember::new(self.inner.clone(), state, token)
    }

    /// Checkpoint группы: следующий offset, который получит новый claim.
    pub async fn committed(&self, group: &str, topic: &str, partition: u32) -> u64 {
        let groups = self.inner.groups.lock().await;
        groups
            .get(group)
            .map(|g| g.committed(topic, partition))
            .unwrap_or(0)
    }

    /// Сколько записанных сообщений группа ещё не отметила, по всем topic'ам.
    pub async fn lag(&self, group: &str) -> u64 {
        let state = self.inner.groups.lock().await.get(group).cloned();
        let mut lag = 0;
        for (name, topic) in &self.inner.topics {
            for (p, part) in topic.partitions.iter().enumerate() {
                let end = part.entries.read().await.len() as u64;
                let committed = state.as_ref().map(|g| g.committed(name, p as u32)).unwrap_or(0);
                lag += end.saturating_sub(committed);
            }
        }
        lag
    }

    /// Дождаться, пока группа отметит всё, что есть в логе.
    /// false, если к `deadline` что-то осталось.
    pub async fn wait_drained(&self, group: &str, deadline: Instant) -> bool {
        loop {
            if self.lag(group).await == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep_until(deadline.min(now + DRAIN_POLL)).await;
        }
    }

    async fn append(&self, messages: Vec<OutgoingMessage>) -> Result<usize, LogError> {
        // Проверить все topic'и до записи: batch либо целиком, либо никак.
        for msg in &messages {
            if !self.inner.topics.contains_key(&msg.topic) {
                return Err(LogError::UnknownTopic(msg.topic.clone()));
            }
        }

        let mut grouped: HashMap<(String, u32), Vec<Entry>> = HashMap::new();
        let ts_ms = now_ms();
        let count = messages.len();
        for msg in messages {
            let Some(topic) = self.inner.topics.get(&msg.topic) else { continue };
            let partition = topic.partition_for(&msg.key);
            grouped
                .entry((msg.topic, partition))
                .or_default()
                .push(Entry { key: msg.key, payload: msg.payload, ts_ms });
        }

        for ((topic, partition), entries) in grouped {
            if let Some(part) = self.inner.partition(&topic, partition) {
                part.entries.write().await.extend(entries);
                part.notify.notify_waiters();
            }
        }
        Ok(count)
    }
}

impl LogPublisher for MemoryLog {
    fn publish_batch(
        &self,
        acks: Acks,
        messages: Vec<OutgoingMessage>,
    ) -> Pin<Box<dyn Future<Output = Result<(), LogError>> + Send + '_>> {
        Box::pin(async move {
            // Запись в память видна всем читателям сразу, любой уровень acks выполнен.
            let count = self.append(messages).await?;
            tracing::debug!(count, acks = ?acks, "published batch");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(partitions: u32) -> MemoryLog {
        MemoryLog::new(
            LogConfig { partitions, ..Default::default() },
            &["urls".to_string(), "users".to_string()],
        )
    }

    fn msg(topic: &str, key: &str, payload: &str) -> OutgoingMessage {
        OutgoingMessage {
            topic: topic.into(),
            key: key.into(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn same_key_lands_in_one_partition_in_order() {
        let log = log(4);
        log.publish_batch(Acks::All, vec![msg("urls", "k", "1"), msg("urls", "k", "2")])
            .await
            .unwrap();
        log.publish_batch(Acks::All, vec![msg("urls", "k", "3")]).await.unwrap();

        let mut found = None;
        for p in 0..4 {
            if log.end_offset("urls", p).await == Some(3) {
                found = Some(p);
            }
        }
        let p = found.expect("all three messages in one partition");
        let part = log.inner.partition("urls", p).unwrap();
        let read = part.read_from("urls", p, 1, 10).await;
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].offset, 1);
        assert_eq!(read[0].payload, b"2");
        assert_eq!(read[1].payload, b"3");
    }

    #[tokio::test]
    async fn unknown_topic_rejects_whole_batch() {
        let log = log(1);
        let err = log
            .publish_batch(Acks::All, vec![msg("urls", "a", "1"), msg("audit", "a", "2")])
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::UnknownTopic(t) if t == "audit"));
        assert_eq!(log.end_offset("urls", 0).await, Some(0));
    }

    #[tokio::test]
    async fn unkeyed_messages_spread_across_partitions() {
        let log = log(2);
        log.publish_batch(Acks::None, vec![msg("users", "", "1"), msg("users", "", "2")])
            .await
            .unwrap();
        assert_eq!(log.end_offset("users", 0).await, Some(1));
        assert_eq!(log.end_offset("users", 1).await, Some(1));
    }
}
