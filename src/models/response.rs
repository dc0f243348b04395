use serde::{Deserialize, Serialize};

/// 错误响应格式
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: String, message: String) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code,
                message,
                details: None,
            },
        }
    }

    pub fn with_details(code: String, message: String, details: serde_json::Value) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code,
                message,
                details: Some(details),
            },
        }
    }
}

/// 分页查询参数
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl Pagination {
    /// Resolves to a 1-based page and a per-page size clamped to `max`.
    pub fn resolve(&self, default_limit: usize, max: usize) -> (usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(default_limit).clamp(1, max.max(1));
        (page, limit)
    }

    /// Rows to skip before `page`. Saturates instead of overflowing for
    /// absurd page numbers, which then simply read past the end.
    pub fn offset(page: usize, limit: usize) -> usize {
        page.saturating_sub(1).saturating_mul(limit)
    }
}

/// 分页结果结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

impl<T> PaginatedResult<T> {
    pub fn new(data: Vec<T>, total: usize, page: usize, per_page: usize) -> Self {
        let total_pages = if per_page == 0 {
            0
        } else {
            (total + per_page - 1) / per_page
        };

        Self {
            data,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
