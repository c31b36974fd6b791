//! HTTP error mapping
//!
//! Every failure leaves the service as a JSON body carrying a human-readable
//! `detail`. Validation failures additionally carry `type` and `status_code`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use json_agent_core::MutationError;
use serde::Serialize;
use thiserror::Error;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    ValidationFailed(String),

    #[error("{0}")]
    InternalError(String),
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::ValidationFailed(_) => "VALIDATION_FAILED",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used for the request outcome metric
    pub fn outcome(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::ValidationFailed(_) => "validation_error",
            ApiError::InternalError(_) => "error",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::ValidationFailed(msg)
            | ApiError::InternalError(msg) => msg,
        }
    }
}

impl From<MutationError> for ApiError {
    fn from(err: MutationError) -> Self {
        match err {
            MutationError::MalformedInput(_)
            | MutationError::AmbiguousInput(_)
            | MutationError::MalformedSchema { .. } => ApiError::BadRequest(err.to_string()),
            MutationError::SchemaNotFound(_) => ApiError::NotFound(err.to_string()),
            MutationError::InputValidationFailed(_) | MutationError::OutputValidationFailed(_) => {
                ApiError::ValidationFailed(err.to_string())
            }
            MutationError::InvalidSchema(_)
            | MutationError::AgentFailure(_)
            | MutationError::InternalError(_) => ApiError::InternalError(format!(
                "An error occurred while processing your request: {}",
                err
            )),
        }
    }
}

/// Body for every non-422 error response
#[derive(Debug, Serialize)]
struct DetailBody<'a> {
    detail: &'a str,
}

/// Body for 422 responses
#[derive(Debug, Serialize)]
struct ValidationErrorBody<'a> {
    detail: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    status_code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(code = self.error_code(), detail = %self.detail(), "Request failed");
        } else {
            tracing::debug!(code = self.error_code(), detail = %self.detail(), "Request rejected");
        }

        match &self {
            ApiError::ValidationFailed(msg) => (
                status,
                Json(ValidationErrorBody {
                    detail: msg,
                    kind: "validation_error",
                    status_code: status.as_u16(),
                }),
            )
                .into_response(),
            _ => (status, Json(DetailBody { detail: self.detail() })).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use json_agent_core::AgentError;
    use std::path::PathBuf;

    #[test]
    fn test_mutation_error_mapping() {
        let cases = [
            (MutationError::malformed_input("eof"), StatusCode::BAD_REQUEST),
            (MutationError::ambiguous_input("both"), StatusCode::BAD_REQUEST),
            (
                MutationError::SchemaNotFound(PathBuf::from("missing.json")),
                StatusCode::NOT_FOUND,
            ),
            (
                MutationError::MalformedSchema {
                    path: PathBuf::from("bad.json"),
                    message: "eof".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                MutationError::InputValidationFailed("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                MutationError::OutputValidationFailed("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                MutationError::InvalidSchema("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                MutationError::AgentFailure(AgentError::TurnLimit(8)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (MutationError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_internal_detail_carries_cause() {
        let err = ApiError::from(MutationError::AgentFailure(AgentError::TurnLimit(8)));
        assert_eq!(
            err.detail(),
            "An error occurred while processing your request: Agent error: Agent did not finish within 8 turns"
        );
    }

    #[test]
    fn test_malformed_input_detail() {
        let err = ApiError::from(MutationError::malformed_input("expected value"));
        assert_eq!(err.detail(), "Invalid JSON format: expected value");
    }
}
