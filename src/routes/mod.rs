pub mod articles;
pub mod bookmarks;
pub mod comments;
pub mod health;

use crate::{state::AppState, utils::middleware::auth_middleware};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;

/// 构建应用路由 - 使用/api/blog/前缀避免网关路由冲突
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .nest("/api/blog/articles", articles::router())
        .nest("/api/blog/comments", comments::router())
        .nest("/api/blog/bookmarks", bookmarks::router())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/", get(health::health_check))
        .route("/health", get(health::health_check))
        .merge(api)
        .with_state(state)
}
