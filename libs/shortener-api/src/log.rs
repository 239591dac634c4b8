use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{Acks, HandlerError, LogError, LogMessage, OutgoingMessage};

// ════════════════════════════════════════════════════════════════
//  Producer side
// ════════════════════════════════════════════════════════════════

/// Публикация сообщений в партиционированный лог.
pub trait LogPublisher: Send + Sync {
    /// Опубликовать пачку сообщений одним вызовом.
    /// Партиция выбирается по ключу сообщения.
    fn publish_batch(
        &self,
        acks: Acks,
        messages: Vec<OutgoingMessage>,
    ) -> Pin<Box<dyn Future<Output = Result<(), LogError>> + Send + '_>>;
}

// ════════════════════════════════════════════════════════════════
//  Consumer group
// ════════════════════════════════════════════════════════════════

/// Поток сообщений одной партиции, выданной участнику группы.
pub trait Claim: Send {
    fn topic(&self) -> &str;
    fn partition(&self) -> u32;
    /// Offset, с которого начато чтение (последний checkpoint).
    fn initial_offset(&self) -> u64;
    /// Следующее сообщение. None = сессия завершена (rebalance, shutdown).
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<LogMessage>> + Send + '_>>;
}

/// Сессия участника группы в рамках одного поколения (generation).
pub trait GroupSession: Send + Sync {
    fn member_id(&self) -> &str;
    fn generation(&self) -> u64;
    /// Отметить сообщение обработанным: checkpoint сдвигается за него.
    fn mark(&self, message: &LogMessage);
}

/// Обработчик claim'ов. Координатор вызывает setup, затем
/// consume_claim на каждую партицию (конкурентно), затем cleanup.
pub trait GroupHandler: Send + Sync {
    fn setup<'a>(&'a self, session: &'a dyn GroupSession)
        -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;

    fn consume_claim(
        &self,
        session: Arc<dyn GroupSession>,
        claim: Box<dyn Claim>,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>>;

    fn cleanup<'a>(&'a self, session: &'a dyn GroupSession)
        -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Почему закончилась сессия.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Процесс завершается, участник покинул группу.
    Shutdown,
    /// Состав группы изменился, нужно присоединиться заново.
    Rebalance,
    /// Обработчик попросил перечитать партиции с checkpoint'а.
    Retry(String),
}

/// Участник consumer group.
pub trait ConsumerGroup: Send + Sync {
    /// Одна сессия: join → assign → claims → teardown.
    /// Вызывается в цикле, пока не вернёт `SessionEnd::Shutdown` или ошибку.
    fn consume<'a>(
        &'a self,
        topics: &'a [String],
        handler: Arc<dyn GroupHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<SessionEnd, LogError>> + Send + 'a>>;
}
