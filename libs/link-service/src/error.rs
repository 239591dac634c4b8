use shortener_api::{ErrorKind, IdentityError, LogError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Unavailable(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::NotFound => ErrorKind::NotFound,
            ServiceError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            ServiceError::Unavailable(_) => ErrorKind::UpstreamUnavailable,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e.kind() {
            ErrorKind::Validation => ServiceError::Validation(e.to_string()),
            _ => ServiceError::Unavailable(e.to_string()),
        }
    }
}

impl From<LogError> for ServiceError {
    fn from(e: LogError) -> Self {
        ServiceError::Unavailable(e.to_string())
    }
}

impl From<IdentityError> for ServiceError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Invalid(_) => ServiceError::Unauthenticated("invalid token".into()),
            IdentityError::Unavailable(msg) => ServiceError::Unavailable(msg),
        }
    }
}
