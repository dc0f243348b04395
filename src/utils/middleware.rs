use crate::{error::AppError, services::auth::User, state::AppState};
use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// 认证中间件
///
/// A valid bearer token puts the caller into the request extensions and
/// refreshes their author profile. A missing or invalid token lets the
/// request through as anonymous; handlers decide whether that is enough.
pub async fn auth_middleware(
    State(app_state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next<Body>,
) -> Result<Response, AppError> {
    if let Some(token) = bearer_token(&headers) {
        match app_state.auth_service.authenticate(token) {
            Ok(user) => {
                debug!("Authenticated user: {}", user.id);

                // 确保作者资料存在
                let profile = user.profile(app_state.clock.now());
                if let Err(e) = app_state.db.upsert_author(&profile).await {
                    warn!("Failed to refresh author profile for user {}: {}", user.id, e);
                }

                request.extensions_mut().insert(user);
            }
            Err(e) => {
                debug!("JWT verification failed: {}", e);
                // 不返回错误，让请求继续处理（作为未认证请求）
            }
        }
    }

    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 可选认证提取器
pub struct OptionalAuth(pub Option<User>);

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let user = parts.extensions.get::<User>().cloned();
        Ok(OptionalAuth(user))
    }
}
