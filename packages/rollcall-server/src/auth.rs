use axum::{
    extract::{FromRequestParts, Request, State},
    http::header::AUTHORIZATION,
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rollcall_core::UserRole;
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::bootstrap::config::AuthConfig;
use crate::db::{Users, token_ops};
use crate::error::AppError;
use crate::state::AppState;

/// 会话 JWT Claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// 当前登录用户，由 [`auth_middleware`] 写入请求扩展
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
}

impl CurrentUser {
    pub fn require_role(&self, role: UserRole) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "only users with role {role} can perform this action"
            )))
        }
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))
    }
}

/// 当前请求所用 bearer token 的哈希
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

impl<S> FromRequestParts<S> for SessionToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionToken>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))
    }
}

/// 新签发的 token 及其过期时间
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// 签名与校验密钥，以及 token 有效期
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: chrono::Duration,
}

impl TokenKeys {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            ttl: config.token_ttl,
        }
    }

    pub fn issue(
        &self,
        user_id: Uuid,
        email: &str,
        name: &str,
        role: UserRole,
    ) -> Result<IssuedToken, AppError> {
        let now = Utc::now();
        let expires_at = now + self.ttl;

        let claims = Claims {
            sub: user_id.to_string(),
            user_id,
            email: email.to_string(),
            name: name.to_string(),
            role,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            error!("Failed to encode JWT: {}", e);
            AppError::Internal("failed to create token".to_string())
        })?;

        Ok(IssuedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);

        let token_data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!("JWT verification failed: {}", e);
            AppError::Unauthorized("invalid or expired token".to_string())
        })?;

        Ok(token_data.claims)
    }
}

/// bcrypt，工作因子来自配置
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: u32,
    // 未知邮箱登录时用来比对，使耗时与真实账户一致
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        let dummy_hash = bcrypt::hash("rollcall-unknown-account", cost).unwrap_or_else(|e| {
            error!("Failed to prepare dummy password hash: {}", e);
            String::new()
        });
        Self { cost, dummy_hash }
    }

    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        bcrypt::hash(password, self.cost).map_err(|e| {
            error!("Failed to hash password: {}", e);
            AppError::Internal("failed to hash password".to_string())
        })
    }

    /// 存储的哈希格式错误时视为不匹配
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }

    /// 对不存在的账户做一次同等代价的校验，结果总是 false
    pub fn verify_unknown(&self, password: &str) -> bool {
        self.verify(password, &self.dummy_hash);
        false
    }
}

pub fn generate_token_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn extract_bearer_token(request: &Request) -> Result<String, AppError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing authorization header".to_string()))?;

    match auth_header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(AppError::Unauthorized(
            "invalid authorization header format".to_string(),
        )),
    }
}

/// JWT 认证中间件，拒绝无有效会话的请求
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&request)?;
    let claims = state.tokens.verify(&token)?;

    let token_hash = generate_token_hash(&token);
    let session = token_ops::find_live_token(&state.db, &token_hash)
        .await?
        .filter(|session| session.user_id == claims.user_id)
        .ok_or_else(|| AppError::Unauthorized("session revoked or expired".to_string()))?;

    let user = Users::find_by_id(claims.user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("account no longer exists".to_string()))?;

    token_ops::update_token_last_used(&state.db, session).await?;

    request.extensions_mut().insert(CurrentUser {
        id: user.id,
        email: user.email,
        name: user.name,
        role: user.role.into(),
    });
    request.extensions_mut().insert(SessionToken(token_hash));

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn keys(ttl_secs: i64) -> TokenKeys {
        let config = AuthConfig::new(SECRET.into(), "rollcall".into(), ttl_secs, 4).unwrap();
        TokenKeys::new(&config)
    }

    #[test]
    fn test_generate_token_hash() {
        let hash1 = generate_token_hash("test_token");
        let hash2 = generate_token_hash("test_token");

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
        assert_ne!(hash1, generate_token_hash("other_token"));
    }

    #[test]
    fn test_extract_bearer_token_valid() {
        let request = axum::http::Request::builder()
            .header(AUTHORIZATION, "Bearer test_token")
            .body(axum::body::Body::empty())
            .unwrap();

        assert_eq!(extract_bearer_token(&request).unwrap(), "test_token");
    }

    #[test]
    fn test_extract_bearer_token_rejects_other_schemes() {
        let missing = axum::http::Request::builder()
            .body(axum::body::Body::empty())
            .unwrap();
        assert!(extract_bearer_token(&missing).is_err());

        let basic = axum::http::Request::builder()
            .header(AUTHORIZATION, "Basic test_token")
            .body(axum::body::Body::empty())
            .unwrap();
        assert!(extract_bearer_token(&basic).is_err());

        let empty = axum::http::Request::builder()
            .header(AUTHORIZATION, "Bearer ")
            .body(axum::body::Body::empty())
            .unwrap();
        assert!(extract_bearer_token(&empty).is_err());
    }

    #[test]
    fn test_issue_and_verify_round_trip_claims() {
        let keys = keys(60);
        let user_id = Uuid::new_v4();
        let issued = keys
            .issue(user_id, "ana@example.com", "Ana", UserRole::Organizer)
            .unwrap();

        let claims = keys.verify(&issued.token).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "ana@example.com");
        assert_eq!(claims.role, UserRole::Organizer);
        assert_eq!(claims.iss, "rollcall");
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn test_verify_rejects_foreign_issuer_and_garbage() {
        let keys = keys(60);
        let other = TokenKeys::new(
            &AuthConfig::new(SECRET.into(), "someone-else".into(), 60, 4).unwrap(),
        );
        let issued = other
            .issue(Uuid::new_v4(), "a@example.com", "A", UserRole::Participant)
            .unwrap();

        assert!(matches!(
            keys.verify(&issued.token),
            Err(AppError::Unauthorized(_))
        ));
        assert!(keys.verify("not.a.jwt").is_err());
    }

    #[test]
    fn test_password_hasher() {
        let hasher = PasswordHasher::new(4);
        let hash = hasher.hash("secret1").unwrap();
        assert_ne!(hash, "secret1");
        assert!(hasher.verify("secret1", &hash));
        assert!(!hasher.verify("secret2", &hash));
        assert!(!hasher.verify("secret1", "not-a-bcrypt-hash"));
    }

    #[test]
    fn test_unknown_account_check_runs_bcrypt() {
        let hasher = PasswordHasher::new(4);
        assert!(hasher.dummy_hash.starts_with("$2"));
        assert!(bcrypt::verify("rollcall-unknown-account", &hasher.dummy_hash).unwrap());
        assert!(!hasher.verify_unknown("rollcall-unknown-account"));
        assert!(!hasher.verify_unknown("secret1"));
    }

    #[test]
    fn test_require_role() {
        let user = CurrentUser {
            id: Uuid::new_v4(),
            email: "p@example.com".into(),
            name: "P".into(),
            role: UserRole::Participant,
        };
        assert!(user.require_role(UserRole::Participant).is_ok());
        assert!(matches!(
            user.require_role(UserRole::Organizer),
            Err(AppError::Forbidden(_))
        ));
    }
}
