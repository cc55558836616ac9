/// Server error types
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use resound_core::{ErrorKind, ResoundError};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Seconds a client should wait before resubmitting after backpressure
const RETRY_AFTER_SECS: &str = "1";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Resound(#[from] ResoundError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::Resound(e) => e.kind(),
            ServerError::BadRequest(_) => ErrorKind::InvalidInput,
            ServerError::Config(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::UnsupportedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Backpressure => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::NotReady => StatusCode::CONFLICT,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::DecodeError
            | ErrorKind::EncodeError
            | ErrorKind::Cancelled
            | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();

        let error_message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
            match kind {
                ErrorKind::Internal => "Internal server error".to_string(),
                _ => self.to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        if kind == ErrorKind::Backpressure {
            return (status, [(header::RETRY_AFTER, RETRY_AFTER_SECS)], body).into_response();
        }

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resound_core::JobId;

    #[test]
    fn kinds_map_to_status_codes() {
        let cases = [
            (ResoundError::unsupported("wma"), StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (ResoundError::invalid_input("bad"), StatusCode::BAD_REQUEST),
            (ResoundError::Backpressure { depth: 4 }, StatusCode::SERVICE_UNAVAILABLE),
            (ResoundError::not_found("job", "x"), StatusCode::NOT_FOUND),
            (ResoundError::NotReady(JobId::new("x")), StatusCode::CONFLICT),
            (ResoundError::timeout("probe"), StatusCode::GATEWAY_TIMEOUT),
            (ResoundError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status_code(), status);
        }
    }

    #[test]
    fn backpressure_sets_retry_after() {
        let response = ServerError::from(ResoundError::Backpressure { depth: 2 }).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }
}
