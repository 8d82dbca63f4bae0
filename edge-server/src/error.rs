//! HTTP-facing error taxonomy.
//!
//! Every handler returns `Result<_, ApiError>`; the error renders as a JSON
//! body with a human-readable `error` string and never carries the secret.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::inbox::InboxError;
use crate::relay::RelayError;
use crate::store::{RecordError, StoreError};
use crate::web::signature::SignatureError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Structurally valid JSON missing or mistyping a required field.
    #[error("{0}")]
    Malformed(String),

    /// Body is not JSON at all.
    #[error("{0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// The signature engine cannot run (no secret configured).
    #[error(transparent)]
    Capability(#[from] SignatureError),

    #[error(transparent)]
    Upstream(#[from] RelayError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Malformed(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(RelayError::MissingApiKey) => StatusCode::BAD_REQUEST,
            ApiError::Parse(_)
            | ApiError::Capability(_)
            | ApiError::Upstream(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<InboxError> for ApiError {
    fn from(e: InboxError) -> Self {
        match e {
            InboxError::DuplicateId(_) => ApiError::Conflict(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate { .. } | StoreError::Conflict { .. } => {
                ApiError::Conflict(e.to_string())
            }
            StoreError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            StoreError::Invalid(inner) => inner.into(),
        }
    }
}

impl From<RecordError> for ApiError {
    fn from(e: RecordError) -> Self {
        ApiError::Malformed(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "request_failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "request_rejected");
        }

        let body = match self {
            ApiError::NotFound(_) => json!({ "code": 404, "error": message }),
            _ => json!({ "error": message }),
        };

        (status, Json(body)).into_response()
    }
}
