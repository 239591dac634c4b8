use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use shortener_api::{Claim, GroupSession, LogMessage};

use crate::config::FailurePolicy;
use crate::sink::BatchSink;
use crate::stats::IngestStats;
use crate::IngestError;

// ═══════════════════════════════════════════════════════════════
//  Ticker
// ═══════════════════════════════════════════════════════════════

/// Источник тиков окна накопления.
pub trait Ticker: Send {
    fn tick(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Периодический тик. Первый тик через полный период после старта.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl Ticker for IntervalTicker {
    fn tick(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.interval.tick().await;
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  ClaimLoop: per-partition state machine
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    AwaitingInput,
    Accumulating,
    Flushing,
    Cancelled,
}

/// Цикл обработки одного claim'а.
///
/// ```text
/// AwaitingInput ──msg──▶ Accumulating ──tick──▶ Flushing ──▶ AwaitingInput
///        └──────────── cancel / stream closed ──────────▶ Cancelled
/// ```
///
/// Batch принадлежит только этому циклу. Offset'ы отмечаются после
/// вызова store; незавершённый batch при отмене не отмечается.
pub struct ClaimLoop<S: BatchSink, T: Ticker> {
    sink: Arc<S>,
    ticker: T,
    claim: Box<dyn Claim>,
    session: Arc<dyn GroupSession>,
    token: CancellationToken,
    policy: FailurePolicy,
    stats: Arc<IngestStats>,
    batch: Vec<LogMessage>,
    state: ClaimState,
}

impl<S: BatchSink, T: Ticker> ClaimLoop<S, T> {
    pub fn new(
        sink: Arc<S>,
        ticker: T,
        claim: Box<dyn Claim>,
        session: Arc<dyn GroupSession>,
        token: CancellationToken,
        policy: FailurePolicy,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            sink,
            ticker,
            claim,
            session,
            token,
            policy,
            stats,
            batch: Vec::new(),
            state: ClaimState::AwaitingInput,
        }
    }

    fn transition(&mut self, next: ClaimState) {
        if self.state != next {
            tracing::trace!(
                topic = %self.claim.topic(),
                partition = self.claim.partition(),
                from = ?self.state,
                to = ?next,
                "claim state"
            );
            self.state = next;
        }
    }

    pub async fn run(mut self) -> Result<(), IngestError> {
        tracing::info!(
            kind = self.sink.kind(),
            topic = %self.claim.topic(),
            partition = self.claim.partition(),
            offset = self.claim.initial_offset(),
            member = %self.session.member_id(),
            "claim started"
        );

        loop {
            tokio::select! {
                msg = self.claim.recv() => match msg {
                    Some(msg) => {
                        self.batch.push(msg);
                        self.transition(ClaimState::Accumulating);
                    }
                    None => break,
                },
                _ = self.ticker.tick() => {
                    if !self.batch.is_empty() {
                        self.flush().await?;
                    }
                }
                _ = self.token.cancelled() => break,
            }
        }

        self.transition(ClaimState::Cancelled);
        tracing::info!(
            kind = self.sink.kind(),
            topic = %self.claim.topic(),
            partition = self.claim.partition(),
            unflushed = self.batch.len(),
            "claim stopped"
        );
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), IngestError> {
        self.transition(ClaimState::Flushing);
        let batch = std::mem::take(&mut self.batch);

        let mut records = Vec::with_capacity(batch.len());
        for msg in &batch {
            match serde_json::from_slice::<S::Record>(&msg.payload) {
                Ok(record) => records.push(record),
                Err(e) => {
                    self.stats.decode_error();
                    tracing::warn!(
                        kind = self.sink.kind(),
                        topic = %msg.topic,
                        partition = msg.partition,
                        offset = msg.offset,
                        error = %e,
                        "undecodable message dropped"
                    );
                }
            }
        }

        let result = if records.is_empty() {
            Ok(Default::default())
        } else {
            self.sink.persist(&records).await
        };
        self.transition(ClaimState::AwaitingInput);

        match result {
            Ok(summary) => {
                self.stats.batch(records.len());
                self.stats.conflicts(summary.conflicts);
                self.stats.cache_errors(summary.cache_errors);
                self.mark_all(&batch);
                tracing::debug!(
                    kind = self.sink.kind(),
                    partition = self.claim.partition(),
                    messages = batch.len(),
                    stored = summary.stored,
                    conflicts = summary.conflicts,
                    "batch flushed"
                );
                Ok(())
            }
            Err(e) => {
                self.stats.store_error();
                tracing::error!(
                    kind = self.sink.kind(),
                    partition = self.claim.partition(),
                    size = records.len(),
                    policy = ?self.policy,
                    error = %e,
                    "batch insert failed"
                );
                match self.policy {
                    FailurePolicy::CommitAnyway => {
                        self.mark_all(&batch);
                        Ok(())
                    }
                    FailurePolicy::Redeliver => Err(IngestError::Store {
                        kind: self.sink.kind(),
                        size: records.len(),
                        source: e,
                    }),
                }
            }
        }
    }

    fn mark_all(&self, batch: &[LogMessage]) {
        for msg in batch {
            self.session.mark(msg);
        }
    }
}
