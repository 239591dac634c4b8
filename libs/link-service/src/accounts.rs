use std::sync::Arc;

use serde::{Deserialize, Serialize};

use log_engine::WriteBuffer;
use shortener_api::{AccountRecord, AccountStore, IdentityOracle, TopicNames};

use crate::password;
use crate::ServiceError;

const WRONG_CREDENTIALS: &str = "wrong email or password";

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Выданный токен и владелец, которому он принадлежит.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub owner_id: String,
    pub token: String,
}

fn validate_email(email: &str) -> Result<(), ServiceError> {
    let bad = || ServiceError::Validation("bad email".into());
    let (local, domain) = email.split_once('@').ok_or_else(bad)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.len() > 254
        || email.chars().any(char::is_whitespace)
    {
        return Err(bad());
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ServiceError> {
    let len = password.chars().count();
    if !(8..64).contains(&len) {
        return Err(ServiceError::Validation("password must be 8..63 characters".into()));
    }
    Ok(())
}

fn validate_registration(req: &RegisterRequest) -> Result<(), ServiceError> {
    let name_len = req.name.chars().count();
    if !(1..300).contains(&name_len) {
        return Err(ServiceError::Validation("name must be 1..299 characters".into()));
    }
    validate_email(&req.email)?;
    validate_password(&req.password)?;
    if req.password != req.confirm_password {
        return Err(ServiceError::Validation("passwords do not match".into()));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
//  AccountService
// ═══════════════════════════════════════════════════════════════

/// Регистрация и вход. Новые аккаунты идут в store через лог,
/// так же как ссылки.
pub struct AccountService {
    topic: String,
    store: Arc<dyn AccountStore>,
    identity: Arc<dyn IdentityOracle>,
    buffer: WriteBuffer,
    password_cost: u32,
}

impl AccountService {
    pub fn new(
        topics: &TopicNames,
        store: Arc<dyn AccountStore>,
        identity: Arc<dyn IdentityOracle>,
        buffer: WriteBuffer,
        password_cost: u32,
    ) -> Self {
        Self {
            topic: topics.accounts.clone(),
            store,
            identity,
            buffer,
            password_cost,
        }
    }

    /// Проверка email идёт по store: аккаунт, ещё не сброшенный
    /// ingestor'ом, не виден. Повторная регистрация в этом окне
    /// отсекается на вставке как Conflict.
    pub async fn register(&self, req: RegisterRequest) -> Result<Session, ServiceError> {
        validate_registration(&req)?;

        if self.store.account_exists(&req.email).await? {
            return Err(ServiceError::Conflict("email already registered".into()));
        }

        let hashed_password = password::hash(req.password, self.password_cost).await?;
        let record = AccountRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: req.name,
            email: req.email,
            hashed_password,
        };
        self.buffer.submit_json(&self.topic, &record.email, &record).await?;

        let token = self.identity.issue(&record.id).await?;
        tracing::info!(owner = %record.id, "account submitted");
        Ok(Session { owner_id: record.id, token })
    }

    /// Owner id по учётным данным. NotFound и Unauthenticated различаются.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<String, ServiceError> {
        let credentials = self.store.credentials(email).await?.ok_or(ServiceError::NotFound)?;
        if !password::verify(password.to_string(), credentials.hashed_password).await? {
            return Err(ServiceError::Unauthenticated(WRONG_CREDENTIALS.into()));
        }
        Ok(credentials.owner_id)
    }

    /// Вход. Неизвестный email и неверный пароль неразличимы снаружи.
    pub async fn login(&self, req: LoginRequest) -> Result<Session, ServiceError> {
        validate_email(&req.email)?;
        validate_password(&req.password)?;

        let owner_id = match self.authenticate(&req.email, &req.password).await {
            Ok(owner_id) => owner_id,
            Err(ServiceError::NotFound) | Err(ServiceError::Unauthenticated(_)) => {
                return Err(ServiceError::Unauthenticated(WRONG_CREDENTIALS.into()));
            }
            Err(e) => return Err(e),
        };
        let token = self.identity.issue(&owner_id).await?;
        Ok(Session { owner_id, token })
    }
}

#[cfg(test)]
mod tests {
    use log_engine::{LogConfig, MemoryLog, WriteBufferConfig};
    use shortener_api::LogPublisher;
    use storage_memory::MemoryStore;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::IdentityConfig;
    use crate::identity::JwtIdentity;

    fn service(store: Arc<MemoryStore>) -> (AccountService, MemoryLog, Arc<JwtIdentity>, CancellationToken) {
        let topics = TopicNames::default();
        let log = MemoryLog::new(LogConfig { partitions: 1, ..Default::default() }, &topics.all());
        let token = CancellationToken::new();
        let publisher: Arc<dyn LogPublisher> = Arc::new(log.clone());
        let (buffer, _handle) = WriteBuffer::spawn(
            publisher,
            &WriteBufferConfig { flush_window_ms: 10, ..Default::default() },
            token.clone(),
        );
        let identity = Arc::new(JwtIdentity::new(&IdentityConfig {
            secret: "0123456789abcdef".into(),
            token_ttl_secs: 60,
            password_cost: 4,
        }));
        let service = AccountService::new(&topics, store, identity.clone(), buffer, 4);
        (service, log, identity, token)
    }

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Ann".into(),
            email: email.into(),
            password: "password1".into(),
            confirm_password: "password1".into(),
        }
    }

    #[test]
    fn email_validation() {
        assert!(validate_email("a@b.io").is_ok());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("@b.io").is_err());
        assert!(validate_email("a@@b.io").is_err());
        assert!(validate_email("a b@c.io").is_err());
    }

    #[test]
    fn registration_validation() {
        assert!(validate_registration(&request("a@b.io")).is_ok());

        let mut req = request("a@b.io");
        req.confirm_password = "password2".into();
        assert!(matches!(validate_registration(&req), Err(ServiceError::Validation(_))));

        let mut req = request("a@b.io");
        req.password = "short".into();
        req.confirm_password = "short".into();
        assert!(validate_registration(&req).is_err());

        let mut req = request("a@b.io");
        req.name = String::new();
        assert!(validate_registration(&req).is_err());
    }

    #[tokio::test]
    async fn register_publishes_and_issues_token() {
        let (service, log, identity, token) = service(Arc::new(MemoryStore::default()));

        let session = service.register(request("a@b.io")).await.unwrap();
        assert!(uuid::Uuid::parse_str(&session.owner_id).is_ok());
        assert_eq!(identity.validate(&session.token).await.unwrap(), session.owner_id);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(log.end_offset("users", 0).await, Some(1));
        token.cancel();
    }

    #[tokio::test]
    async fn register_existing_email_is_conflict() {
        let store = Arc::new(MemoryStore::default());
        store
            .insert_accounts(&[AccountRecord {
                id: "u1".into(),
                name: "Ann".into(),
                email: "a@b.io".into(),
                hashed_password: "x".into(),
            }])
            .await
            .unwrap();
        let (service, _log, _identity, token) = service(store);

        let err = service.register(request("a@b.io")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        token.cancel();
    }

    #[tokio::test]
    async fn login_hides_which_credential_was_wrong() {
        let store = Arc::new(MemoryStore::default());
        store
            .insert_accounts(&[AccountRecord {
                id: "u1".into(),
                name: "Ann".into(),
                email: "a@b.io".into(),
                hashed_password: password::hash("password1".into(), 4).await.unwrap(),
            }])
            .await
            .unwrap();
        let (service, _log, identity, token) = service(store);

        let unknown = service
            .login(LoginRequest { email: "x@b.io".into(), password: "password1".into() })
            .await
            .unwrap_err();
        let wrong = service
            .login(LoginRequest { email: "a@b.io".into(), password: "password2".into() })
            .await
            .unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(wrong, ServiceError::Unauthenticated(_)));

        assert!(matches!(service.authenticate("x@b.io", "password1").await, Err(ServiceError::NotFound)));

        let session = service
            .login(LoginRequest { email: "a@b.io".into(), password: "password1".into() })
            .await
            .unwrap();
        assert_eq!(session.owner_id, "u1");
        assert_eq!(identity.validate(&session.token).await.unwrap(), "u1");
        token.cancel();
    }
}
