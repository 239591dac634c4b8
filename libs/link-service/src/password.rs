use crate::ServiceError;

/// Хэшировать пароль на blocking pool: bcrypt занимает десятки миллисекунд.
pub async fn hash(password: String, cost: u32) -> Result<String, ServiceError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ServiceError::Unavailable(format!("hash task: {e}")))?
        .map_err(|e| ServiceError::Unavailable(format!("hash password: {e}")))
}

/// false: пароль не совпал или хэш повреждён.
pub async fn verify(password: String, hashed: String) -> Result<bool, ServiceError> {
    let result = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hashed))
        .await
        .map_err(|e| ServiceError::Unavailable(format!("verify task: {e}")))?;
    match result {
        Ok(ok) => Ok(ok),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash unreadable");
            Ok(false)
        }
    }
}
