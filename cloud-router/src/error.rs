use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde_json::json;
use thiserror::Error;

/// Cloud-tier HTTP error. Bodies keep the stable
/// `{message, type: "error", detail}` shape the edge client expects.
#[derive(Error, Debug)]
pub enum CloudApiError {
    #[error("RAG pipeline error")]
    Pipeline(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal(String),
}

impl From<AppError> for CloudApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => Self::Validation(msg),
            AppError::Timeout(msg) | AppError::LLMParsing(msg) => Self::Pipeline(msg),
            other => {
                tracing::error!(error = %other, "Internal cloud error");
                Self::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for CloudApiError {
    fn into_response(self) -> Response {
        let (status, message, detail) = match self {
            Self::Validation(detail) => (StatusCode::BAD_REQUEST, "Validation error", detail),
            Self::Pipeline(detail) => (StatusCode::INTERNAL_SERVER_ERROR, "RAG pipeline error", detail),
            Self::Internal(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                detail,
            ),
        };
        let body = json!({
            "message": message,
            "type": "error",
            "detail": detail,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_errors_map_to_500_with_stable_body() {
        let response = CloudApiError::Pipeline("model timed out".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validation_errors_map_to_400() {
        let response = CloudApiError::Validation("bad input".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn app_errors_convert_by_taxonomy() {
        let err = CloudApiError::from(AppError::Timeout("30s elapsed".into()));
        assert!(matches!(err, CloudApiError::Pipeline(_)));
        let err = CloudApiError::from(AppError::Validation("shape".into()));
        assert!(matches!(err, CloudApiError::Validation(_)));
    }
}
