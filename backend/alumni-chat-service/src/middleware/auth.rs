//! Bearer token validation and caller resolution.

use crate::config::JwtKey;
use crate::error::AppError;
use crate::models::UserProfile;
use crate::services::UserDirectory;
use actix_web::{web, HttpRequest};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Access token claims issued by the identity service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn from_rsa_pem(pem: &str) -> Result<Self, AppError> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AppError::Config(format!("invalid JWT public key: {e}")))?;
        Ok(Self {
            key,
            validation: Validation::new(Algorithm::RS256),
        })
    }

    pub fn from_secret(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn from_config(key: &JwtKey) -> Result<Self, AppError> {
        match key {
            JwtKey::RsaPublicPem(pem) => Self::from_rsa_pem(pem),
            JwtKey::Secret(secret) => Ok(Self::from_secret(secret)),
        }
    }

    /// Validate signature and expiry, returning the subject user id
    pub fn validate(&self, token: &str) -> Result<Uuid, AppError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            AppError::Unauthenticated
        })?;
        Uuid::parse_str(&data.claims.sub).map_err(|e| {
            tracing::warn!(error = %e, "token subject is not a UUID");
            AppError::Unauthenticated
        })
    }
}

/// Turns a bearer token into the caller's profile
pub struct Authenticator {
    validator: JwtValidator,
    users: Arc<dyn UserDirectory>,
}

impl Authenticator {
    pub fn new(validator: JwtValidator, users: Arc<dyn UserDirectory>) -> Self {
        Self { validator, users }
    }

    /// Validate `token` and load `{id, name, email, avatar, role}` for its subject.
    pub async fn resolve_user(&self, token: &str) -> Result<UserProfile, AppError> {
        let user_id = self.validator.validate(token)?;
        let found = self.users.find_users_by_ids(&[user_id]).await?;
        found.into_iter().find(|u| u.id == user_id).ok_or_else(|| {
            tracing::warn!(user_id = %user_id, "token subject unknown to identity-service");
            AppError::Unauthenticated
        })
    }
}

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// WebSocket upgrade token: the `Authorization` header, or the `token` query
/// parameter for browser clients that cannot set headers on upgrade.
pub fn ws_token(req: &HttpRequest) -> Option<String> {
    bearer_token(req).or_else(|| {
        web::Query::<HashMap<String, String>>::from_query(req.query_string())
            .ok()
            .and_then(|q| q.get("token").cloned())
            .filter(|t| !t.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::InMemoryUserDirectory;
    use actix_web::test::TestRequest;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "unit-test-secret";

    fn token_for(sub: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            exp: now + exp_offset,
            iat: now,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_yields_subject() {
        let id = Uuid::new_v4();
        let validator = JwtValidator::from_secret(SECRET);
        assert_eq!(validator.validate(&token_for(&id.to_string(), 600)).unwrap(), id);
    }

    #[test]
    fn test_expired_and_malformed_tokens_rejected() {
        let validator = JwtValidator::from_secret(SECRET);
        let expired = token_for(&Uuid::new_v4().to_string(), -3600);
        assert_eq!(validator.validate(&expired), Err(AppError::Unauthenticated));
        assert_eq!(validator.validate("not.a.jwt"), Err(AppError::Unauthenticated));
        assert_eq!(
            validator.validate(&token_for("user-42", 600)),
            Err(AppError::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn test_unknown_subject_is_unauthenticated() {
        let known = UserProfile {
            id: Uuid::new_v4(),
            name: "Ana".into(),
            email: "ana@example.edu".into(),
            avatar: None,
            role: Role::Alumni,
        };
        let directory = Arc::new(InMemoryUserDirectory::with_users([known.clone()]));
        let auth = Authenticator::new(JwtValidator::from_secret(SECRET), directory);

        let resolved = auth
            .resolve_user(&token_for(&known.id.to_string(), 600))
            .await
            .unwrap();
        assert_eq!(resolved, known);

        let stranger = token_for(&Uuid::new_v4().to_string(), 600);
        assert_eq!(
            auth.resolve_user(&stranger).await,
            Err(AppError::Unauthenticated)
        );
    }

    #[test]
    fn test_ws_token_prefers_header_then_query() {
        let req = TestRequest::default()
            .uri("/ws?token=from-query")
            .insert_header(("Authorization", "Bearer from-header"))
            .to_http_request();
        assert_eq!(ws_token(&req).as_deref(), Some("from-header"));

        let req = TestRequest::default()
            .uri("/ws?token=from-query")
            .to_http_request();
        assert_eq!(ws_token(&req).as_deref(), Some("from-query"));

        let req = TestRequest::default().uri("/ws").to_http_request();
        assert!(ws_token(&req).is_none());
    }
}
