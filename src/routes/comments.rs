use crate::{
    error::{AppError, Result},
    models::comment::*,
    state::AppState,
    utils::{
        extract::{AppJson, AppQuery},
        middleware::OptionalAuth,
    },
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct RepliesQuery {
    pub sort: Option<CommentSort>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_comment))
        .route("/article/:article_id", get(get_article_comments))
        .route("/:id", put(update_comment).delete(delete_comment))
        .route("/:id/replies", get(get_replies))
        .route("/:id/status", put(moderate_comment))
}

async fn get_article_comments(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<String>,
    AppQuery(query): AppQuery<CommentQuery>,
) -> Result<Json<Value>> {
    let result = state
        .comment_service
        .list_article_comments(&article_id, query)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "comments": result.data,
            "pagination": {
                "current_page": result.page,
                "total_pages": result.total_pages,
                "total_items": result.total,
                "items_per_page": result.per_page,
                "has_next": result.page < result.total_pages,
                "has_prev": result.page > 1,
            }
        }
    })))
}

async fn get_replies(
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<String>,
    AppQuery(query): AppQuery<RepliesQuery>,
) -> Result<Json<Value>> {
    let subtree = state
        .comment_service
        .list_replies(&comment_id, query.sort.unwrap_or(CommentSort::Oldest))
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": subtree
    })))
}

async fn create_comment(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    AppJson(request): AppJson<CreateCommentRequest>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    let comment = state.comment_service.create_comment(&user, request).await?;

    Ok(Json(json!({
        "success": true,
        "data": comment
    })))
}

async fn update_comment(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Path(comment_id): Path<String>,
    AppJson(request): AppJson<UpdateCommentRequest>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    let comment = state
        .comment_service
        .update_comment(&comment_id, &user, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": comment
    })))
}

async fn delete_comment(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Path(comment_id): Path<String>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    state.comment_service.delete_comment(&comment_id, &user).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Comment deleted successfully"
    })))
}

/// 审核评论（管理员）
async fn moderate_comment(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Path(comment_id): Path<String>,
    AppJson(request): AppJson<ModerateCommentRequest>,
) -> Result<Json<Value>> {
    let user = user.ok_or_else(|| AppError::unauthorized("Authentication required"))?;
    let comment = state
        .comment_service
        .moderate_comment(&comment_id, &user, request.status)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": comment
    })))
}
