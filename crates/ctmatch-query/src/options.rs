//! Search options forwarded to the trial-search endpoint.

use ctmatch_core::{Bundle, Resource};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

/// Optional search filters.
///
/// Sent as a `Parameters` resource appended to the patient bundle, so an empty
/// set of options leaves the request body untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    /// Travel radius in miles.
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub travel_radius: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recruitment_status: Option<String>,
}

impl QueryOptions {
    pub fn is_empty(&self) -> bool {
        self.parameters().next().is_none()
    }

    fn parameters(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("zipCode", &self.zip_code),
            ("travelRadius", &self.travel_radius),
            ("phase", &self.phase),
            ("recruitmentStatus", &self.recruitment_status),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (name, v))
        })
    }

    /// The options as a FHIR `Parameters` resource, or `None` when empty.
    pub fn to_parameters(&self) -> Option<Value> {
        let parameter: Vec<Value> = self
            .parameters()
            .map(|(name, value)| json!({"name": name, "valueString": value}))
            .collect();
        if parameter.is_empty() {
            return None;
        }
        Some(json!({
            "resourceType": "Parameters",
            "parameter": parameter
        }))
    }

    /// Append the options to `bundle` as one `Parameters` entry.
    pub fn apply(&self, bundle: &mut Bundle) {
        if let Some(parameters) = self.to_parameters() {
            bundle.push(Resource::Other(parameters));
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}
