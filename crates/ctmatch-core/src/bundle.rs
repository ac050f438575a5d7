//! Patient record model.
//!
//! A patient record is a FHIR `Bundle` whose entries wrap resources. Only the
//! two resource kinds that carry codes the search endpoint needs translated
//! are typed: `MedicationStatement` and `Condition`. Everything else, and any
//! resource of a typed kind whose shape does not parse, is carried as raw JSON
//! in [`Resource::Other`] and written back out unchanged.
//!
//! Every typed structure keeps the JSON members it does not model in an
//! `extra` map so that a round trip never drops data.

use serde::de::{DeserializeOwned, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// SNOMED CT system URI, the target vocabulary of every code mapping.
pub const SNOMED_SYSTEM: &str = "http://snomed.info/sct";

/// A single `(system, code)` pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Coding {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            code: Some(code.into()),
            extra: Map::new(),
        }
    }

    /// A coding without a system.
    pub fn code_only(code: impl Into<String>) -> Self {
        Self {
            system: None,
            code: Some(code.into()),
            extra: Map::new(),
        }
    }

    /// A SNOMED CT coding.
    pub fn snomed(code: impl Into<String>) -> Self {
        Self::new(SNOMED_SYSTEM, code)
    }
}

/// Free text plus zero or more codings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coding: Option<Vec<Coding>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CodeableConcept {
    /// A concept carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            coding: None,
            text: Some(text.into()),
            extra: Map::new(),
        }
    }

    /// A concept carrying the given codings and no text.
    pub fn from_codings(coding: Vec<Coding>) -> Self {
        Self {
            coding: Some(coding),
            text: None,
            extra: Map::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_codeable_concept: Option<CodeableConcept>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MedicationStatement {
    pub fn new(concept: CodeableConcept) -> Self {
        Self {
            medication_codeable_concept: Some(concept),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionStage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CodeableConcept>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub stage_type: Option<CodeableConcept>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Vec<ConditionStage>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Condition {
    pub fn with_stages(stage: Vec<ConditionStage>) -> Self {
        Self {
            stage: Some(stage),
            extra: Map::new(),
        }
    }
}

/// Resource kinds whose codes are translated before querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    MedicationStatement,
    Condition,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MedicationStatement => "MedicationStatement",
            Self::Condition => "Condition",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource inside a bundle entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    MedicationStatement(MedicationStatement),
    Condition(Condition),
    /// Any other resource, kept verbatim.
    Other(Value),
}

impl Resource {
    /// Classify raw JSON. Never fails: unknown kinds and malformed typed
    /// resources fall back to [`Resource::Other`].
    pub fn from_value(value: Value) -> Self {
        match value.get("resourceType").and_then(Value::as_str) {
            Some("MedicationStatement") => match parse_typed(&value) {
                Some(resource) => Self::MedicationStatement(resource),
                None => Self::Other(value),
            },
            Some("Condition") => match parse_typed(&value) {
                Some(resource) => Self::Condition(resource),
                None => Self::Other(value),
            },
            _ => Self::Other(value),
        }
    }

    /// The `resourceType` of this resource, if it has one.
    pub fn resource_type(&self) -> Option<&str> {
        match self {
            Self::MedicationStatement(_) => Some(ResourceKind::MedicationStatement.as_str()),
            Self::Condition(_) => Some(ResourceKind::Condition.as_str()),
            Self::Other(value) => value.get("resourceType").and_then(Value::as_str),
        }
    }

    pub fn kind(&self) -> Option<ResourceKind> {
        match self {
            Self::MedicationStatement(_) => Some(ResourceKind::MedicationStatement),
            Self::Condition(_) => Some(ResourceKind::Condition),
            Self::Other(_) => None,
        }
    }
}

fn parse_typed<T: DeserializeOwned>(value: &Value) -> Option<T> {
    let mut object = value.as_object()?.clone();
    object.remove("resourceType");
    serde_json::from_value(Value::Object(object)).ok()
}

fn serialize_typed<T, S>(resource_type: &str, resource: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    let mut value =
        serde_json::to_value(resource).map_err(<S::Error as serde::ser::Error>::custom)?;
    if let Value::Object(object) = &mut value {
        object.insert(
            "resourceType".to_string(),
            Value::String(resource_type.to_string()),
        );
    }
    value.serialize(serializer)
}

impl Serialize for Resource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::MedicationStatement(resource) => {
                serialize_typed("MedicationStatement", resource, serializer)
            }
            Self::Condition(resource) => serialize_typed("Condition", resource, serializer),
            Self::Other(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

impl From<MedicationStatement> for Resource {
    fn from(resource: MedicationStatement) -> Self {
        Self::MedicationStatement(resource)
    }
}

impl From<Condition> for Resource {
    fn from(resource: Condition) -> Self {
        Self::Condition(resource)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BundleEntry {
    pub fn new(resource: impl Into<Resource>) -> Self {
        Self {
            resource: Some(resource.into()),
            extra: Map::new(),
        }
    }
}

/// A patient record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(rename = "resourceType", default = "bundle_resource_type")]
    pub resource_type: String,
    #[serde(rename = "type", default = "collection_type")]
    pub bundle_type: String,
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn bundle_resource_type() -> String {
    "Bundle".to_string()
}

fn collection_type() -> String {
    "collection".to_string()
}

impl Default for Bundle {
    fn default() -> Self {
        Self {
            resource_type: bundle_resource_type(),
            bundle_type: collection_type(),
            entry: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl Bundle {
    /// An empty `collection` bundle.
    pub fn collection() -> Self {
        Self::default()
    }

    /// Append an entry wrapping `resource`.
    pub fn push(&mut self, resource: impl Into<Resource>) {
        self.entry.push(BundleEntry::new(resource));
    }

    pub fn with_entry(mut self, resource: impl Into<Resource>) -> Self {
        self.push(resource);
        self
    }

    /// Iterate over the resources of all entries that have one.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.entry.iter().filter_map(|entry| entry.resource.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_resource_round_trips() {
        let raw = json!({"resourceType": "Patient", "id": "p1", "gender": "female"});
        let resource: Resource = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(resource, Resource::Other(_)));
        assert_eq!(resource.resource_type(), Some("Patient"));
        assert_eq!(serde_json::to_value(&resource).unwrap(), raw);
    }

    #[test]
    fn test_medication_statement_is_typed() {
        let raw = json!({
            "resourceType": "MedicationStatement",
            "status": "active",
            "medicationCodeableConcept": {
                "text": "Example",
                "coding": [{"system": "http://www.nlm.nih.gov/research/umls/rxnorm", "code": "AAA", "display": "A"}]
            }
        });
        let resource = Resource::from_value(raw.clone());
        let Resource::MedicationStatement(statement) = &resource else {
            panic!("expected MedicationStatement");
        };
        let concept = statement.medication_codeable_concept.as_ref().unwrap();
        assert_eq!(concept.text.as_deref(), Some("Example"));
        let coding = &concept.coding.as_ref().unwrap()[0];
        assert_eq!(coding.code.as_deref(), Some("AAA"));
        assert_eq!(coding.extra.get("display"), Some(&json!("A")));
        assert_eq!(statement.extra.get("status"), Some(&json!("active")));
        assert!(!statement.extra.contains_key("resourceType"));

        assert_eq!(serde_json::to_value(&resource).unwrap(), raw);
    }

    #[test]
    fn test_malformed_typed_resource_falls_back() {
        let raw = json!({
            "resourceType": "MedicationStatement",
            "medicationCodeableConcept": "not a concept"
        });
        let resource = Resource::from_value(raw.clone());
        assert_eq!(resource, Resource::Other(raw));
        assert_eq!(resource.kind(), None);
    }

    #[test]
    fn test_condition_stage_type_field() {
        let raw = json!({
            "resourceType": "Condition",
            "stage": [{
                "summary": {"coding": [{"system": "unused", "code": "BBB"}]},
                "type": {"coding": [{"system": "unused", "code": "XXX"}]}
            }]
        });
        let Resource::Condition(condition) = Resource::from_value(raw) else {
            panic!("expected Condition");
        };
        let stage = &condition.stage.unwrap()[0];
        let stage_type = stage.stage_type.as_ref().unwrap();
        assert_eq!(
            stage_type.coding.as_ref().unwrap()[0].code.as_deref(),
            Some("XXX")
        );
    }

    #[test]
    fn test_bundle_with_invalid_entry() {
        let raw = json!({
            "resourceType": "Bundle",
            "type": "collection",
            "entry": [{"foo": "bar"}]
        });
        let bundle: Bundle = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(bundle.entry.len(), 1);
        assert!(bundle.entry[0].resource.is_none());
        assert_eq!(bundle.resources().count(), 0);
        assert_eq!(serde_json::to_value(&bundle).unwrap(), raw);
    }

    #[test]
    fn test_empty_bundle_serialization() {
        let bundle = Bundle::collection();
        assert_eq!(
            serde_json::to_value(&bundle).unwrap(),
            json!({"resourceType": "Bundle", "type": "collection", "entry": []})
        );
    }
}
