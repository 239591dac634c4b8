use shortener_api::{HandlerError, LogError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("claim on unknown topic '{0}'")]
    UnknownTopic(String),

    #[error("store ({kind} batch of {size}): {source}")]
    Store {
        kind: &'static str,
        size: usize,
        #[source]
        source: StoreError,
    },

    #[error("log: {0}")]
    Log(#[from] LogError),
}

impl IngestError {
    /// Как ошибку claim'а увидит координатор группы.
    pub fn into_handler_error(self) -> HandlerError {
        match self {
            IngestError::Store { .. } => HandlerError::Retry(self.to_string()),
            IngestError::UnknownTopic(_) | IngestError::Log(_) => HandlerError::Fatal(self.to_string()),
        }
    }
}
