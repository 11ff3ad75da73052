//! HTTP error mapping for the core error taxonomy.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use tribute_core::Error as CoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Core(CoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(CoreError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ApiError::Core(CoreError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Core(CoreError::BadRequest(_)) => StatusCode::BAD_REQUEST,
            ApiError::Core(CoreError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Core(CoreError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::Core(CoreError::not_found(msg))
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Core(CoreError::forbidden(msg))
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError::Core(CoreError::unauthorized(msg))
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::Core(CoreError::bad_request(msg))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError::Core(CoreError::conflict(msg))
    }
}

/// JSON error body
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {:#}", self);
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
                status: status.as_u16(),
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
