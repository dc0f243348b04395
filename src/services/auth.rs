use crate::{
    config::Config,
    error::{AppError, Result},
    models::user::AuthorProfile,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,        // 用户ID
    pub exp: i64,           // 过期时间
    pub iat: i64,           // 签发时间
    #[serde(default)]
    pub roles: Vec<String>, // 角色
    pub username: Option<String>,
    pub display_name: Option<String>,
}

/// 已认证的调用者
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub roles: Vec<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|role| role == ADMIN_ROLE)
    }

    /// Snapshot of the display fields carried in the token.
    pub fn profile(&self, now: DateTime<Utc>) -> AuthorProfile {
        AuthorProfile {
            user_id: self.id.clone(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            updated_at: now,
        }
    }
}

impl From<Claims> for User {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
            display_name: claims.display_name,
            roles: if claims.roles.is_empty() {
                vec!["user".to_string()]
            } else {
                claims.roles
            },
        }
    }
}

impl AuthService {
    pub fn new(config: &Config) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
        }
    }

    pub fn verify_jwt(&self, token: &str) -> Result<Claims> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);

        match decode::<Claims>(token, &decoding_key, &validation) {
            Ok(token_data) => {
                debug!("JWT token verified for user: {}", token_data.claims.sub);
                Ok(token_data.claims)
            }
            Err(e) => {
                warn!("JWT verification failed: {}", e);
                Err(AppError::unauthorized("Invalid token"))
            }
        }
    }

    /// Resolves a bearer token to the caller it names.
    pub fn authenticate(&self, token: &str) -> Result<User> {
        self.verify_jwt(token).map(User::from)
    }
}

// Axum extractor for authentication. The auth middleware places the caller
// in the request extensions; a missing caller means the request is anonymous.
#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}
