//! HTTP mapping for rejected control operations.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use synthflow_utils::error::{ControlError, StoreError};

/// Errors a control API handler can return.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Control(#[from] ControlError),

    /// The request body or path could not be interpreted.
    #[error("{0}")]
    BadRequest(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Control(err.into())
    }
}

impl ApiError {
    /// - Unknown session: 404 Not Found
    /// - Word limits, stage preconditions, malformed input: 400 Bad Request
    /// - Store failures: 500 Internal Server Error
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Control(ControlError::SessionNotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Control(ControlError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Control(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // store paths and IO details stay in the log
            error!(error = %self, "Control request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synthflow_utils::types::{StageId, StageStatus};

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ApiError::from(StoreError::NotFound { id: "x".into() }).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ControlError::InputTooShort { count: 29, min: 30 }).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ControlError::NotProcessing {
                stage: StageId::Refine,
                status: StageStatus::Completed,
            })
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ControlError::AlreadyProcessing {
                stage: StageId::Solution,
            })
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ControlError::ReportUnavailable).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StoreError::Io {
                id: "x".into(),
                reason: "disk full".into(),
            })
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_errors_do_not_leak_details() {
        let response = ApiError::from(StoreError::Corrupt {
            path: "/srv/data/abc.json".into(),
            reason: "eof".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
