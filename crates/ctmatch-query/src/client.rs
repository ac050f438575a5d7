//! HTTP client for the trial-search endpoint.
//!
//! The endpoint takes the patient record as a FHIR JSON body and answers with
//! a JSON array of trial summaries. Responses are cached by the exact request
//! body through a [`QueryCache`].

use std::sync::Arc;
use std::time::Duration;

use ctmatch_core::{ApiError, TrialResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{NoopQueryCache, QueryCache};

/// Content type of the query body.
pub const FHIR_JSON: &str = "application/fhir+json";

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one trial-search endpoint.
#[derive(Clone)]
pub struct QueryClient {
    http: reqwest::Client,
    endpoint: String,
    cache: Arc<dyn QueryCache>,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    /// Create a client with the default timeout and no caching.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_options(endpoint, DEFAULT_REQUEST_TIMEOUT, Arc::new(NoopQueryCache))
    }

    pub fn with_options(
        endpoint: impl Into<String>,
        timeout: Duration,
        cache: Arc<dyn QueryCache>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::transport(transport_message(&e)))?;
        Ok(Self::from_parts(http, endpoint, cache))
    }

    /// Create a client around an existing HTTP client.
    pub fn from_parts(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        cache: Arc<dyn QueryCache>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            cache,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn cache(&self) -> &Arc<dyn QueryCache> {
        &self.cache
    }

    /// POST `body` to the endpoint and return the trial summaries.
    pub async fn send_query(&self, body: String) -> Result<Vec<TrialResponse>, ApiError> {
        send_query(&self.http, &self.endpoint, body, self.cache.as_ref()).await
    }
}

/// POST `body` to `endpoint`, consulting `cache` first.
///
/// Only successful responses are stored in the cache.
pub async fn send_query(
    http: &reqwest::Client,
    endpoint: &str,
    body: String,
    cache: &dyn QueryCache,
) -> Result<Vec<TrialResponse>, ApiError> {
    if let Some(trials) = cache.get(&body).await {
        debug!(endpoint, trials = trials.len(), cache = "hit", "Trial search served from cache");
        return Ok(trials);
    }

    debug!(endpoint, bytes = body.len(), "Sending trial search query");
    let response = http
        .post(endpoint)
        .header(CONTENT_TYPE, FHIR_JSON)
        .body(body.clone())
        .send()
        .await
        .map_err(|e| {
            let message = transport_message(&e);
            warn!(endpoint, error = %message, "Trial search request failed");
            ApiError::transport(message)
        })?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ApiError::transport(transport_message(&e)))?;

    if !status.is_success() {
        warn!(endpoint, status = status.as_u16(), "Trial search endpoint returned an error");
        return Err(ApiError::status(status.as_u16(), text));
    }

    let trials = parse_trials(&text)?;
    debug!(endpoint, trials = trials.len(), "Trial search completed");

    cache.set(body, trials.clone()).await;
    Ok(trials)
}

/// Parse a response body into trial summaries.
pub fn parse_trials(text: &str) -> Result<Vec<TrialResponse>, ApiError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ApiError::invalid_json(e.to_string()))?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ApiError::unexpected_shape(format!(
                "expected an array of trials, got {}",
                json_kind(&other)
            )));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).map_err(|e| {
                ApiError::unexpected_shape(format!("trial at index {index}: {e}"))
            })
        })
        .collect()
}

/// Top-level error text followed by its root cause, e.g.
/// `error sending request for url (...): Connection refused (os error 111)`.
fn transport_message(err: &reqwest::Error) -> String {
    let top = err.to_string();
    let mut root: Option<&dyn std::error::Error> = None;
    let mut next = std::error::Error::source(err);
    while let Some(cause) = next {
        root = Some(cause);
        next = cause.source();
    }
    match root {
        Some(cause) => {
            let cause = cause.to_string();
            if top.contains(&cause) {
                top
            } else {
                format!("{top}: {cause}")
            }
        }
        None => top,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
