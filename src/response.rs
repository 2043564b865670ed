use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// 统一错误类别，贯穿 Store → 服务层 → HTTP。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadInput,
    NotFound,
    Conflict,
    PreconditionFailed,
    Transient,
    Fatal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadInput => "bad_input",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::PreconditionFailed => "precondition_failed",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
    /// 可安全暴露的结构化上下文（字段名、行号、计数），绝不包含路径或堆栈。
    pub details: Option<serde_json::Value>,
    pub is_operational: bool,
}

impl AppError {
    pub fn bad_input(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: ErrorKind::BadInput,
            message: message.to_string(),
            details: None,
            is_operational: true,
        }
    }

    /// 语义校验失败（格式正确但内容不可接受）。
    pub fn unprocessable(message: &str) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            kind: ErrorKind::BadInput,
            message: message.to_string(),
            details: None,
            is_operational: true,
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: ErrorKind::NotFound,
            message: message.to_string(),
            details: None,
            is_operational: true,
        }
    }

    pub fn conflict(message: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            kind: ErrorKind::Conflict,
            message: message.to_string(),
            details: None,
            is_operational: true,
        }
    }

    pub fn precondition_failed(message: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            kind: ErrorKind::PreconditionFailed,
            message: message.to_string(),
            details: None,
            is_operational: true,
        }
    }

    pub fn transient(message: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            kind: ErrorKind::Transient,
            message: message.to_string(),
            details: None,
            is_operational: true,
        }
    }

    pub fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: ErrorKind::Fatal,
            message: message.to_string(),
            details: None,
            is_operational: false,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let exposed_message = if self.is_operational {
            self.message.clone()
        } else {
            "internal server error".to_string()
        };

        if self.is_operational {
            tracing::warn!(status = %self.status, kind = %self.kind.as_str(), error = %self.message, "API error");
        } else {
            tracing::error!(status = %self.status, kind = %self.kind.as_str(), error = %self.message, "Internal API error");
        }

        (
            self.status,
            Json(ErrorBody {
                error: ErrorDetail {
                    kind: self.kind,
                    message: exposed_message,
                    details: if self.is_operational {
                        self.details
                    } else {
                        None
                    },
                },
            }),
        )
            .into_response()
    }
}

// StoreError 转换映射：
// - NotFound/Conflict/Precondition/Validation 属于调用方可见的业务错误
// - Sled I/O 视为 Transient（Store 内部已重试一次，见 store::mod）
// - 序列化失败意味着数据损坏，归为 Fatal 并在响应中脱敏
impl From<crate::store::StoreError> for AppError {
    fn from(value: crate::store::StoreError) -> Self {
        use crate::store::StoreError;
        match &value {
            StoreError::NotFound { entity, key } => {
                AppError::not_found(&format!("{entity} {key} not found"))
            }
            StoreError::Conflict { entity, key } => {
                AppError::conflict(&format!("{entity} {key} already exists"))
            }
            StoreError::Precondition(msg) => AppError::precondition_failed(msg),
            StoreError::Validation(msg) => AppError::bad_input(msg),
            StoreError::Sled(_) => AppError::transient("storage temporarily unavailable"),
            _ => AppError::internal(&value.to_string()),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, Json(data))
}

pub fn accepted<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(data))
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::response::IntoResponse;

    use super::*;

    #[tokio::test]
    async fn internal_error_is_redacted() {
        let resp = AppError::internal("db crash").into_response();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("db crash"));
        assert!(text.contains("internal server error"));
    }

    #[tokio::test]
    async fn bad_input_keeps_message_and_kind() {
        let resp = AppError::bad_input("grade must be 0-3").into_response();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["kind"], "bad_input");
        assert_eq!(json["error"]["message"], "grade must be 0-3");
    }

    #[tokio::test]
    async fn details_survive_for_operational_errors() {
        let resp = AppError::conflict("import already running")
            .with_details(serde_json::json!({"import_id": 7}))
            .into_response();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["details"]["import_id"], 7);
    }

    #[tokio::test]
    async fn details_are_dropped_for_internal_errors() {
        let resp = AppError::internal("boom")
            .with_details(serde_json::json!({"secret": "x"}))
            .into_response();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].get("details").is_none());
    }
}
