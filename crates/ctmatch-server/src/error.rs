use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use ctmatch_core::{ErrorCategory, MatchError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content type of every FHIR response.
pub const FHIR_JSON: &str = "application/fhir+json";

/// Minimal FHIR OperationOutcome used for error responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutcome {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutcomeIssue {
    /// fatal | error | warning | information
    pub severity: String,
    /// invalid | exception | transient
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl OperationOutcome {
    pub fn single(severity: &str, code: &str, diagnostics: impl Into<String>) -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            issue: vec![OperationOutcomeIssue {
                severity: severity.to_string(),
                code: code.to_string(),
                diagnostics: Some(diagnostics.into()),
            }],
        }
    }
}

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Match(#[from] MatchError),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Match(err) => match err.category() {
                ErrorCategory::Upstream | ErrorCategory::Protocol => StatusCode::BAD_GATEWAY,
                ErrorCategory::Configuration | ErrorCategory::CodeTables => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    pub fn to_operation_outcome(&self) -> OperationOutcome {
        match self {
            Self::BadRequest(msg) => OperationOutcome::single("error", "invalid", msg),
            Self::Match(MatchError::Api(err)) => {
                OperationOutcome::single("error", "transient", err.to_string())
            }
            Self::Match(err) => OperationOutcome::single("fatal", "exception", err.to_string()),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Match(err) = &self {
            tracing::warn!(category = %err.category(), error = %err, "Trial lookup failed");
        }
        fhir_response(status, &self.to_operation_outcome())
    }
}

/// Serialize `body` as an `application/fhir+json` response.
pub fn fhir_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = (status, bytes).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(FHIR_JSON));
            response
        }
        Err(e) => {
            let fallback = OperationOutcome::single("fatal", "exception", e.to_string());
            let bytes = serde_json::to_vec(&fallback).unwrap_or_else(|_| b"{}".to_vec());
            let mut response = (StatusCode::INTERNAL_SERVER_ERROR, bytes).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(FHIR_JSON));
            response
        }
    }
}
