use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::response::ErrorResponse;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("Authorization error: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Maximum comment depth exceeded: {0}")]
    DepthExceeded(String),

    #[error("Edit window expired: {0}")]
    EditWindowExpired(String),

    #[error("Article not published: {0}")]
    NotPublished(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Validation error: {0}")]
    ValidatorError(#[from] validator::ValidationErrors),
}

impl AppError {
    /// Stable machine-readable code carried in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Unauthorized(_) | AppError::Jwt(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation(_) | AppError::ValidatorError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::DepthExceeded(_) => "DEPTH_EXCEEDED",
            AppError::EditWindowExpired(_) => "EDIT_WINDOW_EXPIRED",
            AppError::NotPublished(_) => "NOT_PUBLISHED",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized(_) | AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_)
            | AppError::ValidatorError(_)
            | AppError::InvalidTransition(_)
            | AppError::DepthExceeded(_)
            | AppError::EditWindowExpired(_)
            | AppError::NotPublished(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code().to_string();

        let body = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                ErrorResponse::new(code, "Internal server error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ErrorResponse::new(code, "Internal server error".to_string())
            }
            AppError::Jwt(e) => {
                tracing::debug!("JWT error: {}", e);
                ErrorResponse::new(code, "Invalid token".to_string())
            }
            AppError::ValidatorError(e) => {
                let details = e
                    .field_errors()
                    .iter()
                    .map(|(field, errors)| {
                        let messages = errors
                            .iter()
                            .map(|e| {
                                e.message
                                    .as_ref()
                                    .map(|m| m.to_string())
                                    .unwrap_or_else(|| format!("Invalid value ({})", e.code))
                            })
                            .collect::<Vec<_>>();
                        (field.to_string(), messages)
                    })
                    .collect::<std::collections::HashMap<String, Vec<String>>>();

                ErrorResponse::with_details(
                    code,
                    "Validation failed".to_string(),
                    serde_json::json!(details),
                )
            }
            AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::InvalidTransition(msg)
            | AppError::DepthExceeded(msg)
            | AppError::EditWindowExpired(msg)
            | AppError::NotPublished(msg) => ErrorResponse::new(code, msg.clone()),
        };

        (status, Json(body)).into_response()
    }
}

// 便利函数，用于创建常见错误
impl AppError {
    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("{} not found", resource))
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self::Unauthorized(msg.to_string())
    }

    pub fn forbidden(msg: &str) -> Self {
        Self::Forbidden(msg.to_string())
    }

    pub fn internal(msg: &str) -> Self {
        Self::Internal(msg.to_string())
    }

    pub fn conflict(msg: &str) -> Self {
        Self::Conflict(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        Self::Validation(msg.to_string())
    }

    pub fn invalid_transition(msg: &str) -> Self {
        Self::InvalidTransition(msg.to_string())
    }
}

// 从其他错误类型转换
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration failed: {}", err))
    }
}
