//! Bearer-token identity and the authorization guards every mutating
//! operation calls before doing anything else.

use std::sync::Arc;
use std::time::Duration;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Service,
    #[serde(other)]
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: u64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// HS256 keys shared by every service of the deployment.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Token expired".to_string())
                }
                _ => AppError::Unauthorized("Invalid token".to_string()),
            })
    }

    pub fn issue(&self, subject: &str, role: Role, ttl: Duration) -> Result<String, AppError> {
        let exp = jsonwebtoken::get_current_timestamp() + ttl.as_secs();
        let claims = Claims {
            sub: subject.to_string(),
            role,
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("could not sign token: {e}")))
    }
}

/// The identity behind a request, if it presented one.
#[derive(Debug, Clone, Default)]
pub struct Caller(pub Option<Claims>);

impl Caller {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn from_claims(claims: Claims) -> Self {
        Self(Some(claims))
    }

    pub fn identity(&self) -> Result<&Claims, AppError> {
        self.0
            .as_ref()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }

    pub fn admin(&self) -> Result<&Claims, AppError> {
        let claims = self.identity()?;
        if !claims.is_admin() {
            return Err(AppError::Forbidden("Admin role required".to_string()));
        }
        Ok(claims)
    }

    /// Peer services and admins only.
    pub fn service(&self) -> Result<&Claims, AppError> {
        let claims = self.identity()?;
        if !matches!(claims.role, Role::Service | Role::Admin) {
            return Err(AppError::Forbidden("Service role required".to_string()));
        }
        Ok(claims)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    Arc<TokenKeys>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
            return Ok(Caller::anonymous());
        };

        let header = header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;

        let mut parts_iter = header.split_whitespace();
        let token = match (parts_iter.next(), parts_iter.next(), parts_iter.next()) {
            (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => token,
            _ => {
                return Err(AppError::Unauthorized(
                    "Invalid authorization header format. Use 'Bearer <token>'".to_string(),
                ))
            }
        };

        let keys = Arc::<TokenKeys>::from_ref(state);
        keys.verify(token).map(Caller::from_claims)
    }
}
