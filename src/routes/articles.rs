use crate::{
    error::{AppError, Result},
    models::{article::*, engagement::*},
    state::AppState,
    utils::{
        extract::{AppJson, OptionalJson},
        middleware::OptionalAuth,
    },
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_article))
        .route("/:id", get(get_article).put(update_article))
        .route("/:id/reaction", get(reaction_status).post(toggle_reaction))
        .route("/:id/bookmark", get(bookmark_status).post(toggle_bookmark))
        .route("/:id/schedule", post(schedule_article).delete(cancel_schedule))
        .route("/:id/publish", post(publish_article))
        .route("/:id/archive", post(archive_article))
}

fn ok(data: impl serde::Serialize) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": data
    }))
}

/// 创建草稿
/// POST /api/blog/articles
async fn create_article(
    State(app_state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    AppJson(request): AppJson<CreateArticleRequest>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    let article = app_state.article_service.create_article(&user, request).await?;
    Ok(ok(article))
}

/// 文章详情
/// GET /api/blog/articles/:id
async fn get_article(
    State(app_state): State<Arc<AppState>>,
    Path(article_id): Path<String>,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<Value>> {
    debug!("Fetching article view: {}", article_id);
    let view = app_state
        .article_service
        .article_view(&article_id, user.as_ref())
        .await?;
    Ok(ok(view))
}

/// PUT /api/blog/articles/:id
async fn update_article(
    State(app_state): State<Arc<AppState>>,
    Path(article_id): Path<String>,
    OptionalAuth(user): OptionalAuth,
    AppJson(request): AppJson<UpdateArticleRequest>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    let article = app_state
        .article_service
        .update_article(&article_id, &user, request)
        .await?;
    Ok(ok(article))
}

async fn toggle_reaction(
    State(app_state): State<Arc<AppState>>,
    Path(article_id): Path<String>,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    let result = app_state
        .engagement_service
        .toggle_reaction(&user, &article_id)
        .await?;
    Ok(ok(ToggleResponse::from(result)))
}

async fn reaction_status(
    State(app_state): State<Arc<AppState>>,
    Path(article_id): Path<String>,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<Value>> {
    let status = app_state
        .engagement_service
        .status(EngagementKind::Reaction, user.as_ref(), &article_id)
        .await?;
    Ok(ok(status))
}

/// 收藏/取消收藏，可选的收藏夹名称
async fn toggle_bookmark(
    State(app_state): State<Arc<AppState>>,
    Path(article_id): Path<String>,
    OptionalAuth(user): OptionalAuth,
    OptionalJson(body): OptionalJson<ToggleBookmarkRequest>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    let request = body.unwrap_or_default();
    let result = app_state
        .engagement_service
        .toggle_bookmark(&user, &article_id, request)
        .await?;
    Ok(ok(ToggleResponse::from(result)))
}

async fn bookmark_status(
    State(app_state): State<Arc<AppState>>,
    Path(article_id): Path<String>,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<Value>> {
    let status = app_state
        .engagement_service
        .status(EngagementKind::Bookmark, user.as_ref(), &article_id)
        .await?;
    Ok(ok(status))
}

/// 定时发布
/// POST /api/blog/articles/:id/schedule
async fn schedule_article(
    State(app_state): State<Arc<AppState>>,
    Path(article_id): Path<String>,
    OptionalAuth(user): OptionalAuth,
    AppJson(request): AppJson<ScheduleArticleRequest>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    let article = app_state
        .article_service
        .schedule(&article_id, &user, &request.scheduled_for)
        .await?;
    Ok(ok(article))
}

async fn cancel_schedule(
    State(app_state): State<Arc<AppState>>,
    Path(article_id): Path<String>,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    let article = app_state
        .article_service
        .cancel_schedule(&article_id, &user)
        .await?;
    Ok(ok(article))
}

async fn publish_article(
    State(app_state): State<Arc<AppState>>,
    Path(article_id): Path<String>,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    let article = app_state
        .article_service
        .publish_now(&article_id, &user)
        .await?;
    Ok(ok(article))
}

async fn archive_article(
    State(app_state): State<Arc<AppState>>,
    Path(article_id): Path<String>,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    let article = app_state.article_service.archive(&article_id, &user).await?;
    Ok(ok(article))
}
