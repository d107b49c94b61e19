//! HTTP 接口
//!
//! 历史拉取、会话管理与媒体上传走 REST；实时事件走 /ws。

pub mod routes;
pub mod uploads;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::error::ChatError;

pub use routes::build_router;

/// 错误到 HTTP 状态码的统一折算
impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::InvalidState(_) => StatusCode::CONFLICT,
            ChatError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "error": self.reason(),
            "message": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}
