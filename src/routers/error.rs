//! Request-level error responses.
//!
//! Everything past request validation is reported inside the response stream
//! instead, so only the handler edge produces these.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Machine-readable error code, mirrored from the body for log scrapers.
pub const HEADER_X_TOOLGATE_ERROR_CODE: &str = "X-Toolgate-Error-Code";

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    #[serde(rename = "type")]
    error_type: &'static str,
    code: &'static str,
    message: &'a str,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("failed to build response")]
    ResponseBuild,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ResponseBuild => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::ResponseBuild => "response_build_failed",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = self.to_string();
        let body = Json(ErrorBody {
            error: ErrorDetail {
                error_type: status.canonical_reason().unwrap_or("Error"),
                code,
                message: &message,
            },
        });

        let mut response = (status, body).into_response();
        response.headers_mut().insert(
            HEADER_X_TOOLGATE_ERROR_CODE,
            HeaderValue::from_static(code),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::Value;

    use super::*;

    #[tokio::test]
    async fn test_invalid_request_body_and_header() {
        let response =
            ApiError::InvalidRequest("messages must not be empty".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[HEADER_X_TOOLGATE_ERROR_CODE],
            "invalid_request"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "Bad Request");
        assert_eq!(json["error"]["code"], "invalid_request");
        assert_eq!(json["error"]["message"], "messages must not be empty");
    }

    #[test]
    fn test_response_build_is_internal() {
        let response = ApiError::ResponseBuild.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[HEADER_X_TOOLGATE_ERROR_CODE],
            "response_build_failed"
        );
    }
}
