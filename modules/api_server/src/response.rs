use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

/// Standard response envelope: exactly one of `data` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// UPPER_SNAKE machine-readable code.
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<serde_json::Value> {
    pub fn err(code: impl Into<String>, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            data: None,
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
                details,
            }),
        }
    }
}

/// 200 with the enveloped payload.
pub fn json_ok<T: Serialize>(data: T) -> axum::response::Response {
    (StatusCode::OK, Json(ApiResponse::ok(data))).into_response()
}

/// Arbitrary status with an enveloped error body.
pub fn json_error(
    status: StatusCode,
    code: &str,
    message: &str,
    details: Option<String>,
) -> axum::response::Response {
    (status, Json(ApiResponse::err(code, message, details))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_has_null_error() {
        let body = serde_json::to_value(ApiResponse::ok(serde_json::json!({"x": 1}))).unwrap();
        assert_eq!(body["data"]["x"], 1);
        assert!(body["error"].is_null());
    }

    #[test]
    fn error_envelope_omits_empty_details() {
        let body =
            serde_json::to_value(ApiResponse::err("NOT_FOUND", "model not found", None)).unwrap();
        assert!(body["data"].is_null());
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert!(body["error"].get("details").is_none());
    }
}
