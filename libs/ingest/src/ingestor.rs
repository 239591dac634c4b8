use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use shortener_api::{
    AccountStore, Cache, Claim, ConsumerGroup, GroupHandler, GroupSession,
    HandlerError, LinkStore, SessionEnd, TopicNames,
};

use crate::claim::{ClaimLoop, IntervalTicker};
use crate::config::IngestConfig;
use crate::sink::{AccountSink, LinkSink};
use crate::stats::IngestStats;
use crate::IngestError;

// ═══════════════════════════════════════════════════════════════
//  BatchIngestor: GroupHandler
// ═══════════════════════════════════════════════════════════════

/// Обработчик consumer group: маршрутизирует claim по topic'у
/// в цикл нужного типа записей.
pub struct BatchIngestor {
    topics: TopicNames,
    config: IngestConfig,
    links: Arc<LinkSink>,
    accounts: Arc<AccountSink>,
    stats: Arc<IngestStats>,
    token: CancellationToken,
}

impl BatchIngestor {
    pub fn new(
        topics: TopicNames,
        config: IngestConfig,
        link_store: Arc<dyn LinkStore>,
        account_store: Arc<dyn AccountStore>,
        cache: Arc<dyn Cache>,
        token: CancellationToken,
    ) -> Self {
        let links = Arc::new(LinkSink::new(link_store, cache, config.cache_ttl()));
        let accounts = Arc::new(AccountSink::new(account_store));
        Self {
            topics,
            config,
            links,
            accounts,
            stats: Arc::new(IngestStats::default()),
            token,
        }
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.all()
    }

    async fn route(
        &self,
        session: Arc<dyn GroupSession>,
        claim: Box<dyn Claim>,
    ) -> Result<(), IngestError> {
        let topic = claim.topic().to_string();
        let policy = self.config.failure_policy;

        if topic == self.topics.links {
            ClaimLoop::new(
                self.links.clone(),
                IntervalTicker::new(self.config.link_window()),
                claim,
                session,
                self.token.clone(),
                policy,
                self.stats.clone(),
            )
            .run()
            .await
        } else if topic == self.topics.accounts {
            ClaimLoop::new(
                self.accounts.clone(),
                IntervalTicker::new(self.config.account_window()),
                claim,
                session,
                self.token.clone(),
                policy,
                self.stats.clone(),
            )
            .run()
            .await
        } else {
            tracing::error!(topic = %topic, partition = claim.partition(), "claim on unknown topic");
            Err(IngestError::UnknownTopic(topic))
        }
    }
}

impl GroupHandler for BatchIngestor {
    fn setup<'a>(&'a self, session: &'a dyn GroupSession)
        -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(member = %session.member_id(), generation = session.generation(), "ingestor session setup");
            Ok(())
        })
    }

    fn consume_claim(
        &self,
        session: Arc<dyn GroupSession>,
        claim: Box<dyn Claim>,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        Box::pin(async move {
            self.route(session, claim)
                .await
                .map_err(IngestError::into_handler_error)
        })
    }

    fn cleanup<'a>(&'a self, session: &'a dyn GroupSession)
        -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let stats = self.stats.snapshot();
            tracing::info!(
                member = %session.member_id(),
                generation = session.generation(),
                batches = stats.batches,
                records = stats.records,
                decode_errors = stats.decode_errors,
                store_errors = stats.store_errors,
                "ingestor session cleanup"
            );
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Run loop
// ═══════════════════════════════════════════════════════════════

/// Крутить сессии группы до отмены `token`.
///
/// Rebalance: сразу новая сессия. Retry: пауза `retry_backoff`,
/// затем новая сессия с последнего checkpoint'а. Ошибка группы
/// (включая claim на неизвестном topic'е) завершает ingestor.
pub async fn run(
    group: Arc<dyn ConsumerGroup>,
    ingestor: Arc<BatchIngestor>,
    token: CancellationToken,
) -> Result<(), IngestError> {
    let topics = ingestor.topics();
    let backoff = ingestor.config.retry_backoff();
    tracing::info!(topics = ?topics, group = %ingestor.config.group, "ingestor started");

    loop {
        let handler: Arc<dyn GroupHandler> = ingestor.clone();
        match group.consume(&topics, handler).await {
            Ok(SessionEnd::Shutdown) => break,
            Ok(SessionEnd::Rebalance) => {
                tracing::info!("rebalance, rejoining");
            }
            Ok(SessionEnd::Retry(reason)) => {
                tracing::warn!(reason = %reason, backoff_ms = backoff.as_millis() as u64, "session aborted, redelivering from checkpoint");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = token.cancelled() => {}
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "consumer group failed");
                return Err(IngestError::Log(e));
            }
        }
        if token.is_cancelled() {
            // Ещё одна итерация: consume() увидит отмену и покинет группу.
            let handler: Arc<dyn GroupHandler> = ingestor.clone();
            if let Err(e) = group.consume(&topics, handler).await {
                tracing::warn!(error = %e, "leaving consumer group failed");
            }
            break;
        }
    }

    tracing::info!(stats = ?ingestor.stats.snapshot(), "ingestor stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use shortener_api::{LogError, LogMessage};
    use storage_memory::{MemoryCache, MemoryStore};

    use super::*;

    struct EmptyClaim {
        topic: String,
    }

    impl Claim for EmptyClaim {
        fn topic(&self) -> &str {
            &self.topic
        }
        fn partition(&self) -> u32 {
            0
        }
        fn initial_offset(&self) -> u64 {
            0
        }
        fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<LogMessage>> + Send + '_>> {
            Box::pin(async { None })
        }
    }

    struct NoopSession;

    impl GroupSession for NoopSession {
        fn member_id(&self) -> &str {
            "m-0"
        }
        fn generation(&self) -> u64 {
            1
        }
        fn mark(&self, _message: &LogMessage) {}
    }

    /// Группа, которая отдаёт заранее заданные исходы сессий.
    struct ScriptedGroup {
        outcomes: Mutex<VecDeque<Result<SessionEnd, LogError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedGroup {
        fn new(outcomes: Vec<Result<SessionEnd, LogError>>) -> Self {
            Self { outcomes: Mutex::new(outcomes.into()), calls: Mutex::new(0) }
        }
    }

    impl ConsumerGroup for ScriptedGroup {
        fn consume<'a>(&'a self, _topics: &'a [String], _handler: Arc<dyn GroupHandler>)
            -> Pin<Box<dyn Future<Output = Result<SessionEnd, LogError>> + Send + 'a>> {
            *self.calls.lock().unwrap() += 1;
            let next = self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(SessionEnd::Shutdown));
            Box::pin(async move { next })
        }
    }

    fn ingestor(token: CancellationToken) -> Arc<BatchIngestor> {
        let store = Arc::new(MemoryStore::default());
        Arc::new(BatchIngestor::new(
            TopicNames::default(),
            IngestConfig { retry_backoff_ms: 10, ..Default::default() },
            store.clone(),
            store,
            Arc::new(MemoryCache::default()),
            token,
        ))
    }

    #[tokio::test]
    async fn claim_on_unknown_topic_is_fatal() {
        let ingestor = ingestor(CancellationToken::new());
        let result = ingestor
            .consume_claim(Arc::new(NoopSession), Box::new(EmptyClaim { topic: "clicks".into() }))
            .await;
        assert!(matches!(result, Err(HandlerError::Fatal(_))));
    }

    #[tokio::test]
    async fn known_topic_claim_ends_with_session() {
        let ingestor = ingestor(CancellationToken::new());
        let result = ingestor
            .consume_claim(Arc::new(NoopSession), Box::new(EmptyClaim { topic: "urls".into() }))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn run_rejoins_after_rebalance_and_retry() {
        let token = CancellationToken::new();
        let group = Arc::new(ScriptedGroup::new(vec![
            Ok(SessionEnd::Rebalance),
            Ok(SessionEnd::Retry("store down".into())),
            Ok(SessionEnd::Shutdown),
        ]));
        run(group.clone(), ingestor(token.clone()), token).await.unwrap();
        assert_eq!(*group.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn failed_leave_on_shutdown_does_not_fail_run() {
        let token = CancellationToken::new();
        token.cancel();
        let group = Arc::new(ScriptedGroup::new(vec![
            Ok(SessionEnd::Rebalance),
            Err(LogError::Unavailable("group gone".into())),
        ]));
        run(group.clone(), ingestor(token.clone()), token).await.unwrap();
        assert_eq!(*group.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn run_stops_on_group_error() {
        let token = CancellationToken::new();
        let group = Arc::new(ScriptedGroup::new(vec![Err(LogError::Handler("claim on unknown topic".into()))]));
        let err = run(group, ingestor(token.clone()), token).await.unwrap_err();
        assert!(matches!(err, IngestError::Log(LogError::Handler(_))));
    }
}
