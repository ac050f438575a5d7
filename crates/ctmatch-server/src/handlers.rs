use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ctmatch_core::Bundle;
use ctmatch_query::QueryOptions;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{ServiceError, fhir_response};
use crate::server::AppState;

/// Wrapped body of `POST /getClinicalTrial`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    pub patient_data: Bundle,
    #[serde(default)]
    pub options: QueryOptions,
}

impl MatchRequest {
    /// Parse a bare patient bundle, or a bundle wrapped with search options.
    pub fn parse(body: &[u8]) -> Result<(Bundle, QueryOptions), ServiceError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("invalid JSON body: {e}")))?;

        let (bundle, options) = if value.get("patientData").is_some() {
            let request: Self = serde_json::from_value(value)
                .map_err(|e| ServiceError::BadRequest(format!("invalid request: {e}")))?;
            (request.patient_data, request.options)
        } else {
            match value.get("resourceType").and_then(Value::as_str) {
                Some("Bundle") => {}
                Some(other) => {
                    return Err(ServiceError::BadRequest(format!(
                        "expected resourceType Bundle, got {other}"
                    )));
                }
                None => {
                    return Err(ServiceError::BadRequest(
                        "expected a patient Bundle or {\"patientData\": Bundle}".into(),
                    ));
                }
            }
            let bundle: Bundle = serde_json::from_value(value)
                .map_err(|e| ServiceError::BadRequest(format!("invalid Bundle: {e}")))?;
            (bundle, QueryOptions::default())
        };

        if bundle.resource_type != "Bundle" {
            return Err(ServiceError::BadRequest(format!(
                "expected resourceType Bundle, got {}",
                bundle.resource_type
            )));
        }
        Ok((bundle, options))
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

pub async fn get_clinical_trial(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ServiceError> {
    let (bundle, options) = MatchRequest::parse(&body)?;
    tracing::debug!(
        entries = bundle.entry.len(),
        options = !options.is_empty(),
        "Matching patient record"
    );
    let results = state.lookup.match_trials(&bundle, &options).await?;
    Ok(fhir_response(StatusCode::OK, &results))
}
