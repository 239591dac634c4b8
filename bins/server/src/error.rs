use shortener_api::{CacheError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Cache(#[from] CacheError),

    #[error("ingest: {0}")]
    Ingest(#[from] ingest::IngestError),

    #[error("http: {0}")]
    Http(String),

    #[error("task {0}: {1}")]
    Task(&'static str, String),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
