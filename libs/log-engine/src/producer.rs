use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use shortener_api::{Acks, LogError, LogPublisher, OutgoingMessage, OverflowPolicy};

use crate::WriteBufferConfig;

// ═══════════════════════════════════════════════════════════════
//  Stats
// ═══════════════════════════════════════════════════════════════

/// Счётчики producer'а. Ошибки публикации видны только здесь и в логах.
#[derive(Debug, Default)]
pub struct WriteBufferStats {
    pub submitted: AtomicU64,
    pub published: AtomicU64,
    pub batches: AtomicU64,
    pub publish_errors: AtomicU64,
    pub dropped: AtomicU64,
}

impl WriteBufferStats {
    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

// ═══════════════════════════════════════════════════════════════
//  WriteBuffer
// ═══════════════════════════════════════════════════════════════

/// Асинхронный producer: `submit` кладёт сообщение в bounded канал и
/// сразу возвращается, фоновая задача склеивает всё, что пришло за
/// flush window, в один `publish_batch`.
#[derive(Clone)]
pub struct WriteBuffer {
    tx: mpsc::Sender<OutgoingMessage>,
    overflow: OverflowPolicy,
    stats: Arc<WriteBufferStats>,
}

impl WriteBuffer {
    /// Запустить flush task. Task завершается после отмены `token`,
    /// предварительно опубликовав всё, что осталось в канале.
    pub fn spawn(
        publisher: Arc<dyn LogPublisher>,
        config: &WriteBufferConfig,
        token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let stats = Arc::new(WriteBufferStats::default());
        let handle = tokio::spawn(flush_loop(
            publisher,
            rx,
            config.flush_window(),
            config.max_batch.max(1),
            config.acks,
            stats.clone(),
            token,
        ));
        let buffer = Self {
            tx,
            overflow: config.overflow,
            stats,
        };
        (buffer, handle)
    }

    pub fn stats(&self) -> Arc<WriteBufferStats> {
        self.stats.clone()
    }

    /// Поставить сообщение в очередь. Не ждёт доставки в лог.
    pub async fn submit(&self, message: OutgoingMessage) -> Result<(), LogError> {
        match self.overflow {
            OverflowPolicy::Drop => match self.tx.try_send(message) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(msg)) => {
                    tracing::warn!(topic = %msg.topic, "write buffer full, dropping");
                    WriteBufferStats::add(&self.stats.dropped, 1);
                    return Ok(());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return Err(LogError::Closed),
            },
            OverflowPolicy::BackPressure => {
                self.tx.send(message).await.map_err(|_| LogError::Closed)?;
            }
        }
        WriteBufferStats::add(&self.stats.submitted, 1);
        Ok(())
    }

    /// Сериализовать запись в JSON и поставить в очередь.
    pub async fn submit_json<T: Serialize>(&self, topic: &str, key: &str, record: &T) -> Result<(), LogError> {
        let payload = serde_json::to_vec(record)
            .map_err(|e| LogError::Unavailable(format!("encode record: {e}")))?;
        self.submit(OutgoingMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        })
        .await
    }
}

async fn publish(
    publisher: &dyn LogPublisher,
    acks: Acks,
    pending: &mut Vec<OutgoingMessage>,
    stats: &WriteBufferStats,
) {
    if pending.is_empty() {
        return;
    }
    let batch = std::mem::take(pending);
    let count = batch.len();
    match publisher.publish_batch(acks, batch).await {
        Ok(()) => {
            WriteBufferStats::add(&stats.published, count);
            WriteBufferStats::add(&stats.batches, 1);
            tracing::debug!(count, "write buffer flushed");
        }
        Err(e) => {
            WriteBufferStats::add(&stats.publish_errors, count);
            tracing::error!(count, error = %e, "publish failed, records lost");
        }
    }
}

async fn flush_loop(
    publisher: Arc<dyn LogPublisher>,
    mut rx: mpsc::Receiver<OutgoingMessage>,
    window: Duration,
    max_batch: usize,
    acks: Acks,
    stats: Arc<WriteBufferStats>,
    token: CancellationToken,
) {
    let mut pending: Vec<OutgoingMessage> = Vec::new();

    loop {
        // Окно открывается первым сообщением.
        let first = tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = token.cancelled() => break,
        };
        pending.push(first);

        let deadline = Instant::now() + window;
        loop {
            if pending.len() >= max_batch {
                break;
            }
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => pending.push(msg),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => break,
                _ = token.cancelled() => break,
            }
        }

        publish(publisher.as_ref(), acks, &mut pending, &stats).await;
        if token.is_cancelled() {
            break;
        }
    }

    // Drain: то, что успели поставить в очередь до остановки.
    rx.close();
    while let Ok(msg) = rx.try_recv() {
        pending.push(msg);
        if pending.len() >= max_batch {
            publish(publisher.as_ref(), acks, &mut pending, &stats).await;
        }
    }
    publish(publisher.as_ref(), acks, &mut pending, &stats).await;
    tracing::info!(
        published = WriteBufferStats::get(&stats.published),
        errors = WriteBufferStats::get(&stats.publish_errors),
        "write buffer stopped"
    );
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;

    use tokio::sync::Mutex;

    use super::*;

    /// Запоминает каждый вызов publish_batch.
    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<Vec<OutgoingMessage>>>,
        fail: bool,
    }

    impl LogPublisher for Recording {
        fn publish_batch(
            &self,
            _acks: Acks,
            messages: Vec<OutgoingMessage>,
        ) -> Pin<Box<dyn Future<Output = Result<(), LogError>> + Send + '_>> {
            Box::pin(async move {
                if self.fail {
                    return Err(LogError::Unavailable("broker down".into()));
                }
                self.calls.lock().await.push(messages);
                Ok(())
            })
        }
    }

    fn msg(n: usize) -> OutgoingMessage {
        OutgoingMessage {
            topic: "urls".into(),
            key: format!("k{n}"),
            payload: vec![n as u8],
        }
    }

    fn config(window_ms: u64) -> WriteBufferConfig {
        WriteBufferConfig {
            flush_window_ms: window_ms,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn submissions_within_window_are_one_publish() {
        let publisher = Arc::new(Recording::default());
        let token = CancellationToken::new();
        let (buffer, handle) = WriteBuffer::spawn(publisher.clone(), &config(500), token.clone());

        for n in 0..5 {
            buffer.submit(msg(n)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(600)).await;

        {
            let calls = publisher.calls.lock().await;
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].len(), 5);
        }

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_submissions_are_separate_publishes() {
        let publisher = Arc::new(Recording::default());
        let token = CancellationToken::new();
        let (buffer, handle) = WriteBuffer::spawn(publisher.clone(), &config(100), token.clone());

        buffer.submit(msg(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        buffer.submit(msg(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(publisher.calls.lock().await.len(), 2);
        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn pending_records_are_flushed_on_shutdown() {
        let publisher = Arc::new(Recording::default());
        let token = CancellationToken::new();
        let (buffer, handle) = WriteBuffer::spawn(publisher.clone(), &config(10_000), token.clone());

        buffer.submit(msg(1)).await.unwrap();
        buffer.submit(msg(2)).await.unwrap();
        token.cancel();
        handle.await.unwrap();

        let calls = publisher.calls.lock().await;
        let total: usize = calls.iter().map(|c| c.len()).sum();
        assert_eq!(total, 2);
        assert!(buffer.submit(msg(3)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn publish_errors_are_counted_not_returned() {
        let publisher = Arc::new(Recording { fail: true, ..Default::default() });
        let token = CancellationToken::new();
        let (buffer, handle) = WriteBuffer::spawn(publisher, &config(50), token.clone());

        buffer.submit(msg(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(WriteBufferStats::get(&buffer.stats().publish_errors), 1);

        token.cancel();
        handle.await.unwrap();
    }
}
