//! REST error replies
//!
//! Every failure leaves as `{request_id, error: {code, message}}`. Engine
//! failures keep the same machine-readable code the WebSocket transport
//! sends, so clients only need one table.

use crate::errors::GameError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiErrorKind {
    #[error("invalid round id '{0}'")]
    InvalidRoundId(String),

    #[error("round {0} not found")]
    RoundNotFound(uuid::Uuid),

    #[error(transparent)]
    Game(#[from] GameError),
}

impl ApiErrorKind {
    fn status(&self) -> StatusCode {
        match self {
            ApiErrorKind::InvalidRoundId(_) => StatusCode::BAD_REQUEST,
            ApiErrorKind::RoundNotFound(_) => StatusCode::NOT_FOUND,
            ApiErrorKind::Game(GameError::Store(_) | GameError::Ledger(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiErrorKind::Game(GameError::NotFound) => StatusCode::NOT_FOUND,
            ApiErrorKind::Game(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiErrorKind::InvalidRoundId(_) => "INVALID_ROUND_ID",
            ApiErrorKind::RoundNotFound(_) => "ROUND_NOT_FOUND",
            ApiErrorKind::Game(e) => e.code(),
        }
    }
}

/// An error tied to the request that produced it
#[derive(Debug, thiserror::Error)]
#[error("[{request_id}] {kind}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

impl ApiError {
    pub fn new(request_id: &str, kind: impl Into<ApiErrorKind>) -> Self {
        Self {
            kind: kind.into(),
            request_id: request_id.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        if status.is_server_error() {
            tracing::warn!(request_id = %self.request_id, error = %self.kind, "request failed");
        }

        let body = Json(ErrorResponse {
            error: ErrorBody {
                code: self.kind.code().to_string(),
                message: self.kind.to_string(),
            },
            request_id: self.request_id,
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;

    #[test]
    fn test_store_failure_is_unavailable() {
        let err = ApiError::new("req-1", GameError::Store(StoreError::ReadFailed("io".into())));
        assert_eq!(err.kind.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.kind.code(), "STORE_FAILURE");
    }

    #[test]
    fn test_response_carries_code_and_request_id() {
        let response = ApiError::new("req-2", ApiErrorKind::InvalidRoundId("xyz".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["content-type"], "application/json");
    }
}
