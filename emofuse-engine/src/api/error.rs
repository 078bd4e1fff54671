//! HTTP error mapping
//!
//! Every failed request answers with a JSON `StatusResponse` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use emofuse_common::Error;
use serde::Serialize;
use thiserror::Error as ThisError;
use tracing::error;

/// Plain `{ "status": ... }` body used for acknowledgements and errors
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Failure of a request handler
#[derive(Debug, ThisError)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Engine(#[from] Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Engine(Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        if code.is_server_error() {
            error!("Request failed: {}", self);
        }
        (
            code,
            Json(StatusResponse {
                status: format!("error: {}", self),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Engine(Error::InvalidInput("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Engine(Error::Internal("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_message_passthrough() {
        let err = ApiError::Engine(Error::InvalidInput("min_weight out of range".into()));
        assert_eq!(err.to_string(), "Invalid input: min_weight out of range");
    }
}
