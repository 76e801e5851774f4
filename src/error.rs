use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::messages::{StreamError, StreamEvent};
use crate::providers::ProviderError;

/// Client-facing error, rendered in the Messages API error envelope.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("Untranslatable upstream output: {0}")]
    Translation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// `{"type":"error","error":{...}}` body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    r#type: &'static str,
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    r#type: String,
    message: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Unavailable(_) | Self::Translation(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "invalid_request_error",
            Self::Upstream { status, .. } => error_type_for_status(*status),
            Self::Unavailable(_) | Self::Translation(_) | Self::Internal(_) => "api_error",
        }
    }

    /// The terminal `error` event for a stream that cannot continue.
    pub fn to_stream_event(&self) -> StreamEvent {
        StreamEvent::Error {
            error: StreamError {
                error_type: self.error_type().to_string(),
                message: self.to_string(),
            },
        }
    }
}

fn error_type_for_status(status: u16) -> &'static str {
    match status {
        400 => "invalid_request_error",
        401 => "authentication_error",
        403 => "permission_error",
        404 => "not_found_error",
        413 => "request_too_large",
        429 => "rate_limit_error",
        503 | 529 => "overloaded_error",
        _ => "api_error",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            r#type: "error",
            error: ErrorDetail {
                r#type: self.error_type().to_string(),
                message: self.to_string(),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {err}"))
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            // Preserve the upstream status and body verbatim.
            ProviderError::Api { status, body } => Self::Upstream {
                status,
                message: body,
            },
            ProviderError::Transport(_) | ProviderError::Stream(_) => {
                tracing::error!(error = %err, "Upstream transport failure");
                Self::Unavailable(err.to_string())
            }
            ProviderError::MalformedFragment(_)
            | ProviderError::MalformedResponse(_)
            | ProviderError::InvalidToolArguments { .. }
            | ProviderError::Json(_) => Self::Translation(err.to_string()),
        }
    }
}
