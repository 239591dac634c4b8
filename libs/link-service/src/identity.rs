use std::future::Future;
use std::pin::Pin;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use shortener_api::{IdentityError, IdentityOracle};

use crate::config::IdentityConfig;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Owner id.
    sub: String,
    iat: u64,
    exp: u64,
}

/// HS256 JWT с owner id в `sub`.
pub struct JwtIdentity {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl JwtIdentity {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            ttl_secs: config.token_ttl_secs,
        }
    }

    fn issue_sync(&self, owner_id: &str) -> Result<String, IdentityError> {
        let now = jsonwebtoken::get_current_timestamp();
        let claims = Claims {
            sub: owner_id.to_string(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| IdentityError::Unavailable(format!("sign token: {e}")))
    }

    fn validate_sync(&self, token: &str) -> Result<String, IdentityError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| IdentityError::Invalid(e.to_string()))?;
        if data.claims.sub.is_empty() {
            return Err(IdentityError::Invalid("empty subject".into()));
        }
        Ok(data.claims.sub)
    }
}

impl IdentityOracle for JwtIdentity {
    fn issue(&self, owner_id: &str) -> Pin<Box<dyn Future<Output = Result<String, IdentityError>> + Send + '_>> {
        let result = self.issue_sync(owner_id);
        Box::pin(async move { result })
    }

    fn validate(&self, token: &str) -> Pin<Box<dyn Future<Output = Result<String, IdentityError>> + Send + '_>> {
        let result = self.validate_sync(token);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(secret: &str, ttl: u64) -> JwtIdentity {
        JwtIdentity::new(&IdentityConfig { secret: secret.into(), token_ttl_secs: ttl, password_cost: 4 })
    }

    #[tokio::test]
    async fn issued_token_validates_to_owner() {
        let id = identity("0123456789abcdef", 60);
        let token = id.issue("u1").await.unwrap();
        assert_eq!(id.validate(&token).await.unwrap(), "u1");
    }

    #[tokio::test]
    async fn foreign_or_garbage_token_is_invalid() {
        let ours = identity("0123456789abcdef", 60);
        let theirs = identity("fedcba9876543210", 60);
        let token = theirs.issue("u1").await.unwrap();

        assert!(matches!(ours.validate(&token).await, Err(IdentityError::Invalid(_))));
        assert!(matches!(ours.validate("not.a.jwt").await, Err(IdentityError::Invalid(_))));
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let id = identity("0123456789abcdef", 0);
        let now = jsonwebtoken::get_current_timestamp();
        let claims = Claims { sub: "u1".into(), iat: now - 100, exp: now - 10 };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &id.encoding).unwrap();
        assert!(matches!(id.validate(&token).await, Err(IdentityError::Invalid(_))));
    }
}
