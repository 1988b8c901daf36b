//! API 错误类型
//!
//! 引擎错误按大类映射 HTTP 状态码：未找到 404、冲突 409、参数非法 400，
//! 瞬时故障 503，其余失败 500。系统级错误只返回通用提示，详情仅记录日志。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::{AchievementError, ErrorKind};

const INTERNAL_MESSAGE: &str = "服务内部错误，请稍后重试";
const UNAVAILABLE_MESSAGE: &str = "服务暂时不可用，请稍后重试";

/// API 错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("缺少租户标识请求头: X-Tenant-Id")]
    MissingTenant,

    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error(transparent)]
    Engine(#[from] AchievementError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingTenant | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Engine(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Invalid => StatusCode::BAD_REQUEST,
                ErrorKind::Failure if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Failure => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingTenant => "MISSING_TENANT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Engine(e) => e.error_code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            Self::Engine(e) if e.kind() == ErrorKind::Failure => {
                tracing::error!(error = %e, error_code = e.error_code(), "请求处理失败");
                if e.is_transient() {
                    UNAVAILABLE_MESSAGE.to_string()
                } else {
                    INTERNAL_MESSAGE.to_string()
                }
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::now_v7();
        assert_eq!(
            ApiError::from(AchievementError::AchievementNotFound(id)).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AchievementError::AlreadyEarned {
                user_id: "u1".to_string(),
                achievement_id: id,
            })
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AchievementError::NegativeIncrement(-3)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AchievementError::Timeout {
                operation: "get_progress".to_string()
            })
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(AchievementError::CorruptData("context".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::MissingTenant.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::MissingTenant.error_code(), "MISSING_TENANT");
        assert_eq!(
            ApiError::from(AchievementError::DuplicateName("A".to_string())).error_code(),
            "DUPLICATE_NAME"
        );
    }
}
