use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("Incomplete configuration")]
    MissingConfig {
        need: &'static [&'static str],
        optional: &'static [&'static str],
    },
    /// The backend answered with a non-success status.
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: String,
        detail: Option<Value>,
    },
    /// The backend answered 2xx but without the fields that confirm the write.
    #[error("Upload failed")]
    UploadRejected(Value),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upstream { status, .. } => *status,
            ApiError::MissingConfig { .. } | ApiError::UploadRejected(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Maps an extractor rejection: oversized bodies keep their 413, every
    /// other malformed request is a 400.
    pub fn from_rejection(status: StatusCode, message: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(message)
        } else {
            ApiError::BadRequest(message)
        }
    }

    /// Builds an upstream error from a backend status code and its body.
    pub fn upstream(status: u16, message: impl Into<String>, detail: Option<Value>) -> Self {
        ApiError::Upstream {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            message: message.into(),
            detail,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();

        let detail = match self {
            ApiError::MissingConfig { need, optional } => Some(json!({
                "need": need,
                "optional": optional,
            })),
            ApiError::Upstream { detail, .. } => detail,
            ApiError::UploadRejected(body) => Some(body),
            _ => None,
        };

        if status.is_server_error() {
            tracing::error!(%status, %error, "request failed");
        } else {
            tracing::debug!(%status, %error, "request rejected");
        }

        let body = match detail {
            Some(detail) => json!({ "error": error, "detail": detail }),
            None => json!({ "error": error }),
        };

        (status, Json(body)).into_response()
    }
}
