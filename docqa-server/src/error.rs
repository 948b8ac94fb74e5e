//! HTTP error responses.

use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docqa_rag::RagError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// An error returned from a handler, rendered as `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Rag(#[from] RagError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),

    /// A request body or query string axum could not parse.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected { status: rejection.status(), message: rejection.body_text() }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Rejected { status: rejection.status(), message: rejection.body_text() }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Rejected { status: rejection.status(), message: rejection.body_text() }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::Rejected { status: e.status(), message: e.body_text() }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Rejected { status, .. } => *status,
            Self::Rag(e) if !e.is_client_error() => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Rag(RagError::CollectionNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Rag(RagError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            // The remaining caller faults are uploads that could not be read.
            Self::Rag(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}
