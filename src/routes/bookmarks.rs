use crate::{
    error::Result,
    models::engagement::BookmarkQuery,
    services::auth::User,
    state::AppState,
    utils::extract::AppQuery,
};
use axum::{
    extract::State,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_user_bookmarks))
}

/// 当前用户的收藏列表
/// GET /api/blog/bookmarks?folder=&page=&limit=
async fn get_user_bookmarks(
    State(state): State<Arc<AppState>>,
    user: User,
    AppQuery(query): AppQuery<BookmarkQuery>,
) -> Result<Json<Value>> {
    let result = state.engagement_service.list_bookmarks(&user, query).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "bookmarks": result.data,
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
