use crate::state::AppState;
use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

/// 健康检查，附带定时发布统计
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let database = match state.db.verify_connection().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!("Health check could not reach the store: {}", e);
            "unavailable"
        }
    };

    Json(json!({
        "success": true,
        "data": {
            "service": "inkpress",
            "database": database,
            "scheduler": state.scheduler.snapshot(),
        }
    }))
}
