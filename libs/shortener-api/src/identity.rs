use std::future::Future;
use std::pin::Pin;

use crate::IdentityError;

/// Выдача и проверка токенов. Токен несёт идентификатор владельца.
pub trait IdentityOracle: Send + Sync {
    fn issue(&self, owner_id: &str) -> Pin<Box<dyn Future<Output = Result<String, IdentityError>> + Send + '_>>;

    /// Возвращает owner id из валидного токена.
    fn validate(&self, token: &str) -> Pin<Box<dyn Future<Output = Result<String, IdentityError>> + Send + '_>>;
}
