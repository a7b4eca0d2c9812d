//! Error responses
//!
//! Every rejected request gets `{ "error": <code>, "message": <text> }` with
//! the specific reason, so the portal can show it inline.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use crate::PoError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

impl PoError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidSelection(_) | Self::QuantityOutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PoAlreadySent(_) | Self::InvalidState(_) | Self::InvalidTransition { .. } | Self::EmptyPo => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for PoError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Upstream(detail) => {
                tracing::error!(%detail, "upstream failure");
                "The service is temporarily unavailable, please retry".to_string()
            }
            other => {
                tracing::debug!(code = other.code(), error = %other, "request rejected");
                other.to_string()
            }
        };
        (status, Json(ErrorResponse { error: self.code(), message })).into_response()
    }
}
