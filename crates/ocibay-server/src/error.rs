//! Error types for the HTTP surface.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ocibay_image::ImageError;
use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error, Clone)]
pub enum ApiError {
    /// A required query parameter was not supplied.
    #[error("missing required '{0}' query parameter")]
    MissingParameter(&'static str),

    /// A query parameter failed validation.
    #[error("{0}")]
    InvalidParameter(String),

    /// The computed cache path escaped the cache directory.
    #[error("invalid request")]
    PathTraversal,

    /// The build pipeline failed.
    #[error("failed to download image: {0}")]
    Build(#[from] Arc<ImageError>),

    /// Server-side failure unrelated to the build.
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_) | Self::InvalidParameter(_) | Self::PathTraversal => {
                StatusCode::BAD_REQUEST
            }
            Self::Build(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
