/// Категория ошибки. По ней граница (HTTP, ingestor) решает,
/// что делать: отклонить запрос, повторить, пропустить запись.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Некорректный ввод, отклоняется синхронно.
    Validation,
    /// Нарушение уникальности.
    Conflict,
    /// Нет такой записи (или она истекла).
    NotFound,
    /// Нет/невалидный токен, неверные учётные данные.
    Unauthenticated,
    /// Внешняя зависимость недоступна или не ответила вовремя.
    UpstreamUnavailable,
    /// Битое сообщение в логе, пропускается поштучно.
    Decode,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => f.write_str("validation"),
            ErrorKind::Conflict => f.write_str("conflict"),
            ErrorKind::NotFound => f.write_str("not_found"),
            ErrorKind::Unauthenticated => f.write_str("unauthenticated"),
            ErrorKind::UpstreamUnavailable => f.write_str("upstream_unavailable"),
            ErrorKind::Decode => f.write_str("decode"),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Capability errors
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected batch: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Unavailable(_) => ErrorKind::UpstreamUnavailable,
            StoreError::Rejected(_) => ErrorKind::Validation,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::UpstreamUnavailable
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("identity unavailable: {0}")]
    Unavailable(String),
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::Invalid(_) => ErrorKind::Unauthenticated,
            IdentityError::Unavailable(_) => ErrorKind::UpstreamUnavailable,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LogError {
    #[error("topic '{0}' not found")]
    UnknownTopic(String),

    #[error("log closed")]
    Closed,

    #[error("log unavailable: {0}")]
    Unavailable(String),

    #[error("group handler: {0}")]
    Handler(String),
}

impl LogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LogError::UnknownTopic(_) => ErrorKind::Validation,
            _ => ErrorKind::UpstreamUnavailable,
        }
    }
}

/// Ошибка обработчика claim'а, как её видит координатор группы.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    /// Сессия завершается, участник остаётся в группе и перечитывает
    /// партиции с последнего checkpoint'а.
    #[error("retry: {0}")]
    Retry(String),

    /// Участник покидает группу, consume() возвращает ошибку.
    #[error("fatal: {0}")]
    Fatal(String),
}
