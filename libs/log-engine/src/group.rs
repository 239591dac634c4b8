use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use shortener_api::{
    Claim, ConsumerGroup, GroupHandler, GroupSession, HandlerError, LogError,
    LogMessage, SessionEnd,
};

use crate::{LogInner, TopicLog};

static MEMBER_SEQ: AtomicU64 = AtomicU64::new(0);

// ═══════════════════════════════════════════════════════════════
//  GroupState: checkpoints + membership
// ═══════════════════════════════════════════════════════════════

pub(crate) struct GroupState {
    name: String,
    /// (topic, partition) → следующий необработанный offset.
    offsets: HashMap<(String, u32), AtomicU64>,
    /// member id → topics. BTreeMap: одинаковый порядок у всех участников.
    members: Mutex<BTreeMap<String, Vec<String>>>,
    generation: watch::Sender<u64>,
}

impl GroupState {
    pub(crate) fn new(name: &str, topics: &HashMap<String, TopicLog>) -> Self {
        let mut offsets = HashMap::new();
        for (topic, log) in topics {
            for p in 0..log.partitions.len() as u32 {
                offsets.insert((topic.clone(), p), AtomicU64::new(0));
            }
        }
        let (generation, _) = watch::channel(0);
        Self {
            name: name.to_string(),
            offsets,
            members: Mutex::new(BTreeMap::new()),
            generation,
        }
    }

    pub(crate) fn committed(&self, topic: &str, partition: u32) -> u64 {
        self.offsets
            .get(&(topic.to_string(), partition))
            .map(|o| o.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    fn bump_generation(&self) {
        self.generation.send_modify(|g| *g += 1);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Session / Claim
// ═══════════════════════════════════════════════════════════════

struct MemorySession {
    group: Arc<GroupState>,
    member_id: String,
    generation: u64,
}

impl GroupSession for MemorySession {
    fn member_id(&self) -> &str {
        &self.member_id
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn mark(&self, message: &LogMessage) {
        // После rebalance партиция может принадлежать другому участнику.
        let current = *self.group.generation.borrow();
        if current != self.generation {
            tracing::debug!(
                member = %self.member_id,
                generation = self.generation,
                current,
                partition = message.partition,
                offset = message.offset,
                "stale session, mark ignored"
            );
            return;
        }
        if let Some(offset) = self.group.offsets.get(&(message.topic.clone(), message.partition)) {
            offset.fetch_max(message.offset + 1, Ordering::AcqRel);
        }
    }
}

struct MemoryClaim {
    topic: String,
    partition: u32,
    initial_offset: u64,
    rx: mpsc::Receiver<LogMessage>,
}

impl Claim for MemoryClaim {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partition(&self) -> u32 {
        self.partition
    }

    fn initial_offset(&self) -> u64 {
        self.initial_offset
    }

    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<LogMessage>> + Send + '_>> {
        Box::pin(async move { self.rx.recv().await })
    }
}

/// Читает партицию с `next` и отдаёт сообщения в claim, пока сессия жива.
async fn fetch_loop(
    log: Arc<LogInner>,
    topic: String,
    partition: u32,
    mut next: u64,
    tx: mpsc::Sender<LogMessage>,
    token: CancellationToken,
) {
    let Some(part) = log.partition(&topic, partition) else { return };
    loop {
        // Подписаться на notify до чтения, чтобы не пропустить append между ними.
        let notified = part.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let batch = part.read_from(&topic, partition, next, log.config.fetch_batch).await;
        if batch.is_empty() {
            tokio::select! {
                _ = &mut notified => continue,
                _ = token.cancelled() => return,
            }
        }
        for msg in batch {
            next = msg.offset + 1;
            tokio::select! {
                sent = tx.send(msg) => {
                    if sent.is_err() {
                        return;
                    }
                }
                _ = token.cancelled() => return,
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  GroupMember
// ═══════════════════════════════════════════════════════════════

/// Участник consumer group в MemoryLog.
///
/// Партиции распределяются round-robin по отсортированному списку
/// участников. Любое изменение состава увеличивает generation, и все
/// участники завершают текущую сессию (rebalance).
pub struct GroupMember {
    log: Arc<LogInner>,
    group: Arc<GroupState>,
    member_id: String,
    token: CancellationToken,
}

impl GroupMember {
    pub(crate) fn new(log: Arc<LogInner>, group: Arc<GroupState>, token: CancellationToken) -> Self {
        let seq = MEMBER_SEQ.fetch_add(1, Ordering::Relaxed);
        let member_id = format!("{}-{seq}", group.name);
        Self { log, group, member_id, token }
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    async fn join(&self, topics: &[String]) {
        let mut members = self.group.members.lock().await;
        if members.get(&self.member_id).map(|t| t.as_slice()) != Some(topics) {
            members.insert(self.member_id.clone(), topics.to_vec());
            self.group.bump_generation();
            tracing::info!(group = %self.group.name, member = %self.member_id, "joined group");
        }
    }

    /// Покинуть группу: оставшиеся участники получат rebalance.
    pub async fn leave(&self) {
        let mut members = self.group.members.lock().await;
        if members.remove(&self.member_id).is_some() {
            self.group.bump_generation();
            tracing::info!(group = %self.group.name, member = %self.member_id, "left group");
        }
    }

    async fn assignment(&self, topics: &[String]) -> Vec<(String, u32)> {
        let members = self.group.members.lock().await;
        let Some(index) = members.keys().position(|id| *id == self.member_id) else {
            return Vec::new();
        };
        let count = members.len();

        let mut sorted: Vec<&String> = topics.iter().collect();
        sorted.sort();
        let mut all = Vec::new();
        for topic in sorted {
            if let Some(log) = self.log.topics.get(topic) {
                for p in 0..log.partitions.len() as u32 {
                    all.push((topic.clone(), p));
                }
            }
        }
        all.into_iter()
            .enumerate()
            .filter(|(i, _)| i % count == index)
            .map(|(_, tp)| tp)
            .collect()
    }

    async fn run_session(
        &self,
        topics: &[String],
        handler: Arc<dyn GroupHandler>,
    ) -> Result<SessionEnd, LogError> {
        self.join(topics).await;

        let mut gen_rx = self.group.generation.subscribe();
        let generation = *gen_rx.borrow_and_update();
        let assignment = self.assignment(topics).await;

        let session = Arc::new(MemorySession {
            group: self.group.clone(),
            member_id: self.member_id.clone(),
            generation,
        });

        if let Err(e) = handler.setup(session.as_ref()).await {
            return match e {
                HandlerError::Retry(reason) => Ok(SessionEnd::Retry(reason)),
                HandlerError::Fatal(reason) => Err(LogError::Handler(reason)),
            };
        }

        tracing::info!(
            group = %self.group.name,
            member = %self.member_id,
            generation,
            partitions = ?assignment,
            "session started"
        );

        let session_token = self.token.child_token();
        let mut fetchers: Vec<JoinHandle<()>> = Vec::new();
        let mut claims: JoinSet<Result<(), HandlerError>> = JoinSet::new();

        for (topic, partition) in assignment {
            let start = self.group.committed(&topic, partition);
            let (tx, rx) = mpsc::channel(self.log.config.claim_buffer);
            fetchers.push(tokio::spawn(fetch_loop(
                self.log.clone(),
                topic.clone(),
                partition,
                start,
                tx,
                session_token.clone(),
            )));

            let claim = MemoryClaim { topic, partition, initial_offset: start, rx };
            let h = handler.clone();
            let s: Arc<dyn GroupSession> = session.clone();
            claims.spawn(async move { h.consume_claim(s, Box::new(claim)).await });
        }

        let end = loop {
            tokio::select! {
                changed = gen_rx.changed() => {
                    if changed.is_err() || *gen_rx.borrow_and_update() != generation {
                        break Ok(SessionEnd::Rebalance);
                    }
                }
                _ = self.token.cancelled() => break Ok(SessionEnd::Shutdown),
                Some(joined) = claims.join_next(), if !claims.is_empty() => {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(HandlerError::Retry(reason))) => break Ok(SessionEnd::Retry(reason)),
                        Ok(Err(HandlerError::Fatal(reason))) => break Err(LogError::Handler(reason)),
                        Err(e) => break Err(LogError::Handler(format!("claim task: {e}"))),
                    }
                }
            }
        };

        // Teardown: закрыть fetcher'ы → claims получают None → дождаться всех.
        session_token.cancel();
        while let Some(joined) = claims.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(member = %self.member_id, error = %e, "claim ended with error during teardown"),
                Err(e) => tracing::error!(member = %self.member_id, error = %e, "claim task failed"),
            }
        }
        for f in fetchers {
            let _ = f.await;
        }
        handler.cleanup(session.as_ref()).await;

        tracing::info!(group = %self.group.name, member = %self.member_id, generation, end = ?end, "session ended");
        end
    }
}

impl ConsumerGroup for GroupMember {
    fn consume<'a>(
        &'a self,
        topics: &'a [String],
        handler: Arc<dyn GroupHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<SessionEnd, LogError>> + Send + 'a>> {
        Box::pin(async move {
            for topic in topics {
                if !self.log.topics.contains_key(topic) {
                    return Err(LogError::UnknownTopic(topic.clone()));
                }
            }
            if self.token.is_cancelled() {
                self.leave().await;
                return Ok(SessionEnd::Shutdown);
            }

            let end = self.run_session(topics, handler).await;
            match &end {
                Ok(SessionEnd::Rebalance) | Ok(SessionEnd::Retry(_)) => {}
                Ok(SessionEnd::Shutdown) | Err(_) => self.leave().await,
            }
            end
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use shortener_api::{Acks, LogPublisher, OutgoingMessage};

    use super::*;
    use crate::{LogConfig, MemoryLog};

    /// Отмечает всё, что получил; сообщает о каждом сообщении в канал.
    struct MarkAll {
        seen: mpsc::UnboundedSender<LogMessage>,
        fail_on: Option<String>,
    }

    impl GroupHandler for MarkAll {
        fn setup<'a>(&'a self, _session: &'a dyn GroupSession)
            -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
            Box::pin(async { Ok(()) })
        }

        fn consume_claim(
            &self,
            session: Arc<dyn GroupSession>,
            mut claim: Box<dyn Claim>,
        ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
            Box::pin(async move {
                while let Some(msg) = claim.recv().await {
                    if self.fail_on.as_deref() == Some(std::str::from_utf8(&msg.payload).unwrap()) {
                        return Err(HandlerError::Retry("boom".into()));
                    }
                    session.mark(&msg);
                    let _ = self.seen.send(msg);
                }
                Ok(())
            })
        }

        fn cleanup<'a>(&'a self, _session: &'a dyn GroupSession)
            -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            Box::pin(async {})
        }
    }

    fn topics() -> Vec<String> {
        vec!["urls".to_string()]
    }

    async fn publish(log: &MemoryLog, key: &str, payload: &str) {
        log.publish_batch(
            Acks::All,
            vec![OutgoingMessage { topic: "urls".into(), key: key.into(), payload: payload.as_bytes().to_vec() }],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn consumes_and_commits_then_leaves_on_shutdown() {
        let log = MemoryLog::new(LogConfig { partitions: 1, ..Default::default() }, &topics());
        publish(&log, "a", "1").await;

        let token = CancellationToken::new();
        let member = Arc::new(log.group_member("g", token.clone()).await);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = Arc::new(MarkAll { seen: tx, fail_on: None });

        let m = member.clone();
        let task = tokio::spawn(async move {
            let topics = topics();
            m.consume(&topics, handler).await
        });

        assert_eq!(rx.recv().await.unwrap().payload, b"1");
        publish(&log, "a", "2").await;
        assert_eq!(rx.recv().await.unwrap().payload, b"2");

        token.cancel();
        assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Shutdown);
        assert_eq!(log.committed("g", "urls", 0).await, 2);
    }

    #[tokio::test]
    async fn wait_drained_returns_once_group_catches_up() {
        let log = MemoryLog::new(LogConfig { partitions: 2, ..Default::default() }, &topics());
        publish(&log, "a", "1").await;
        publish(&log, "b", "2").await;
        assert_eq!(log.lag("g").await, 2);
        let soon = tokio::time::Instant::now() + Duration::from_millis(30);
        assert!(!log.wait_drained("g", soon).await);

        let token = CancellationToken::new();
        let member = log.group_member("g", token.clone()).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler = Arc::new(MarkAll { seen: tx, fail_on: None });
        let task = tokio::spawn(async move { member.consume(&topics(), handler).await });

        let later = tokio::time::Instant::now() + Duration::from_secs(5);
        assert!(log.wait_drained("g", later).await);
        assert_eq!(log.lag("g").await, 0);

        token.cancel();
        assert_eq!(task.await.unwrap().unwrap(), SessionEnd::Shutdown);
    }

    #[tokio::test]
    async fn retry_rereads_from_checkpoint() {
        let log = MemoryLog::new(LogConfig { partitions: 1, ..Default::default() }, &topics());
        publish(&log, "a", "1").await;
        publish(&log, "a", "bad").await;

        let token = CancellationToken::new();
        let member = log.group_member("g", token.clone()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = Arc::new(MarkAll { seen: tx, fail_on: Some("bad".into()) });

        let end = member.consume(&topics(), handler).await.unwrap();
        assert_eq!(end, SessionEnd::Retry("boom".into()));
        assert_eq!(rx.recv().await.unwrap().payload, b"1");
        assert_eq!(log.committed("g", "urls", 0).await, 1);

        // Следующая сессия начинает с checkpoint'а: "1" не перечитывается.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = Arc::new(MarkAll { seen: tx, fail_on: Some("bad".into()) });
        let end = member.consume(&topics(), handler).await.unwrap();
        assert_eq!(end, SessionEnd::Retry("boom".into()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn second_member_triggers_rebalance() {
        let log = MemoryLog::new(LogConfig { partitions: 2, ..Default::default() }, &topics());
        let token = CancellationToken::new();
        let first = Arc::new(log.group_member("g", token.clone()).await);
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler: Arc<dyn GroupHandler> = Arc::new(MarkAll { seen: tx, fail_on: None });

        let f = first.clone();
        let h = handler.clone();
        let task = tokio::spawn(async move {
            let topics = topics();
            f.consume(&topics, h).await
        });
        // Дать первому участнику войти в группу.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = log.group_member("g", token.clone()).await;
        let second_task = tokio::spawn(async move {
            let topics = topics();
            let (tx, _rx) = mpsc::unbounded_channel();
            let h: Arc<dyn GroupHandler> = Arc::new(MarkAll { seen: tx, fail_on: None });
            second.consume(&topics, h).await
        });

        let end = tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();
        assert_eq!(end, SessionEnd::Rebalance);

        token.cancel();
        let end = tokio::time::timeout(Duration::from_secs(5), second_task).await.unwrap().unwrap().unwrap();
        assert_eq!(end, SessionEnd::Shutdown);
    }

    #[tokio::test]
    async fn stale_session_cannot_move_checkpoint() {
        let log = MemoryLog::new(LogConfig { partitions: 1, ..Default::default() }, &topics());
        let group = Arc::new(GroupState::new("g", &log.inner.topics));
        let session = MemorySession {
            group: group.clone(),
            member_id: "g-old".into(),
            generation: *group.generation.borrow(),
        };
        let msg = LogMessage {
            topic: "urls".into(),
            partition: 0,
            offset: 4,
            key: String::new(),
            payload: Vec::new(),
            ts_ms: 0,
        };

        session.mark(&msg);
        assert_eq!(group.committed("urls", 0), 5);

        group.bump_generation();
        session.mark(&LogMessage { offset: 9, ..msg });
        assert_eq!(group.committed("urls", 0), 5);
    }

    #[tokio::test]
    async fn unknown_topic_is_rejected() {
        let log = MemoryLog::new(LogConfig::default(), &topics());
        let member = log.group_member("g", CancellationToken::new()).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = member
            .consume(&["audit".to_string()], Arc::new(MarkAll { seen: tx, fail_on: None }))
            .await
            .unwrap_err();
        assert!(matches!(err, LogError::UnknownTopic(_)));
    }
}
