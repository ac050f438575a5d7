//! Normalized trial output: `ResearchStudy` resources and the searchset that
//! carries them.
//!
//! A study built with [`ResearchStudy::new`] starts with deterministic
//! placeholder values for every required field. The study remembers which
//! fields still hold a placeholder, so registry data can replace placeholders
//! without clobbering values that came from the search endpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::bundle::{CodeableConcept, Coding};

/// Identifier system for ClinicalTrials.gov (NCT) identifiers.
pub const CLINICAL_TRIALS_GOV_SYSTEM: &str = "http://clinicaltrials.gov";

/// Code system for `ResearchStudy.phase`.
pub const STUDY_PHASE_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/research-study-phase";

/// Title used when neither source supplies one.
pub const DEFAULT_TITLE: &str = "Title";

/// Sponsor display used when neither source supplies one.
pub const DEFAULT_SPONSOR: &str = "Unknown";

/// Condition every study served by this service targets.
pub const DEFAULT_CONDITION: &str = "Breast Cancer";

/// `ResearchStudy.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StudyStatus {
    Active,
    AdministrativelyCompleted,
    Approved,
    ClosedToAccrual,
    ClosedToAccrualAndIntervention,
    Completed,
    Disapproved,
    InReview,
    TemporarilyClosedToAccrual,
    TemporarilyClosedToAccrualAndIntervention,
    Withdrawn,
    /// Status not known from any source.
    Unknown,
}

impl StudyStatus {
    /// Map a registry recruitment status onto a study status.
    ///
    /// Accepts both the API form (`ACTIVE_NOT_RECRUITING`) and the human form
    /// (`Active, not recruiting`). Unrecognized values map to `None`.
    pub fn from_registry(status: &str) -> Option<Self> {
        match normalize_token(status).as_str() {
            "RECRUITING" | "ENROLLING_BY_INVITATION" => Some(Self::Active),
            "NOT_YET_RECRUITING" => Some(Self::Approved),
            "ACTIVE_NOT_RECRUITING" => Some(Self::ClosedToAccrual),
            "SUSPENDED" => Some(Self::TemporarilyClosedToAccrual),
            "TERMINATED" => Some(Self::AdministrativelyCompleted),
            "COMPLETED" => Some(Self::Completed),
            "WITHDRAWN" => Some(Self::Withdrawn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::AdministrativelyCompleted => "administratively-completed",
            Self::Approved => "approved",
            Self::ClosedToAccrual => "closed-to-accrual",
            Self::ClosedToAccrualAndIntervention => "closed-to-accrual-and-intervention",
            Self::Completed => "completed",
            Self::Disapproved => "disapproved",
            Self::InReview => "in-review",
            Self::TemporarilyClosedToAccrual => "temporarily-closed-to-accrual",
            Self::TemporarilyClosedToAccrualAndIntervention => {
                "temporarily-closed-to-accrual-and-intervention"
            }
            Self::Withdrawn => "withdrawn",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StudyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `ResearchStudy.phase`, coded in the research-study-phase system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StudyPhase {
    NotApplicable,
    EarlyPhase1,
    Phase1,
    Phase1Phase2,
    Phase2,
    Phase2Phase3,
    Phase3,
    Phase4,
}

impl StudyPhase {
    /// Parse the search endpoint's roman-numeral phase (`"I-II"`, `"III"`).
    /// Anything unrecognized is `NotApplicable`.
    pub fn from_phase_number(phase: &str) -> Self {
        let upper = phase.trim().to_ascii_uppercase();
        let compact: String = upper
            .trim_start_matches("PHASE")
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| if c == '/' { '-' } else { c })
            .collect();
        match compact.as_str() {
            "0" | "EARLYI" | "EARLY1" => Self::EarlyPhase1,
            "I" | "1" => Self::Phase1,
            "I-II" | "1-2" => Self::Phase1Phase2,
            "II" | "2" => Self::Phase2,
            "II-III" | "2-3" => Self::Phase2Phase3,
            "III" | "3" => Self::Phase3,
            "IV" | "4" => Self::Phase4,
            _ => Self::NotApplicable,
        }
    }

    /// Combine registry phase tokens (`["PHASE1", "PHASE2"]`) into one phase.
    pub fn from_registry(phases: &[String]) -> Option<Self> {
        let tokens: BTreeSet<String> = phases.iter().map(|p| normalize_token(p)).collect();
        let has = |token: &str| tokens.contains(token);
        if tokens.is_empty() {
            None
        } else if has("EARLY_PHASE1") || has("PHASE0") {
            Some(Self::EarlyPhase1)
        } else if has("PHASE1") && has("PHASE2") {
            Some(Self::Phase1Phase2)
        } else if has("PHASE2") && has("PHASE3") {
            Some(Self::Phase2Phase3)
        } else if has("PHASE1") {
            Some(Self::Phase1)
        } else if has("PHASE2") {
            Some(Self::Phase2)
        } else if has("PHASE3") {
            Some(Self::Phase3)
        } else if has("PHASE4") {
            Some(Self::Phase4)
        } else {
            Some(Self::NotApplicable)
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotApplicable => "n-a",
            Self::EarlyPhase1 => "early-phase-1",
            Self::Phase1 => "phase-1",
            Self::Phase1Phase2 => "phase-1-phase-2",
            Self::Phase2 => "phase-2",
            Self::Phase2Phase3 => "phase-2-phase-3",
            Self::Phase3 => "phase-3",
            Self::Phase4 => "phase-4",
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Self::NotApplicable => "N/A",
            Self::EarlyPhase1 => "Early Phase 1",
            Self::Phase1 => "Phase 1",
            Self::Phase1Phase2 => "Phase 1/Phase 2",
            Self::Phase2 => "Phase 2",
            Self::Phase2Phase3 => "Phase 2/Phase 3",
            Self::Phase3 => "Phase 3",
            Self::Phase4 => "Phase 4",
        }
    }

    pub fn to_concept(&self) -> CodeableConcept {
        let mut coding = Coding::new(STUDY_PHASE_SYSTEM, self.code());
        coding
            .extra
            .insert("display".to_string(), self.display().into());
        CodeableConcept::from_codings(vec![coding]).with_text(self.display())
    }
}

/// Upper-case and collapse every run of non-alphanumerics to one `_`.
fn normalize_token(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_uppercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Reference {
    /// Reference to an organization known only by name.
    pub fn organization(display: impl Into<String>) -> Self {
        Self {
            reference: None,
            reference_type: Some("Organization".to_string()),
            display: Some(display.into()),
        }
    }

    /// Reference to a contained resource.
    pub fn contained(id: &str, reference_type: &str) -> Self {
        Self {
            reference: Some(format!("#{id}")),
            reference_type: Some(reference_type.to_string()),
            display: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPoint {
    pub system: String,
    pub value: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub telecom: Vec<ContactPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Contained `Location` resource describing a trial site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default = "location_resource_type")]
    pub resource_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

fn location_resource_type() -> String {
    "Location".to_string()
}

impl Location {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            resource_type: location_resource_type(),
            id: id.into(),
            name: None,
            address: None,
            position: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedArtifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Required fields that can hold a placeholder value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StudyField {
    Title,
    Status,
    Sponsor,
    Condition,
    Phase,
}

/// A normalized trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchStudy {
    #[serde(default = "research_study_resource_type")]
    pub resource_type: String,
    pub id: String,
    pub identifier: Vec<Identifier>,
    pub title: String,
    pub status: StudyStatus,
    pub sponsor: Reference,
    pub condition: Vec<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyword: Vec<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<ContactDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub site: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contained: Vec<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_artifact: Vec<RelatedArtifact>,
    #[serde(skip)]
    placeholders: BTreeSet<StudyField>,
}

fn research_study_resource_type() -> String {
    "ResearchStudy".to_string()
}

impl ResearchStudy {
    /// A study for `nct_id` with every required field set to its placeholder.
    pub fn new(nct_id: impl Into<String>) -> Self {
        let nct_id = nct_id.into();
        Self {
            resource_type: research_study_resource_type(),
            identifier: vec![Identifier {
                use_: Some("official".to_string()),
                system: Some(CLINICAL_TRIALS_GOV_SYSTEM.to_string()),
                value: nct_id.clone(),
            }],
            id: nct_id,
            title: DEFAULT_TITLE.to_string(),
            status: StudyStatus::Unknown,
            sponsor: Reference::organization(DEFAULT_SPONSOR),
            condition: vec![CodeableConcept::text(DEFAULT_CONDITION)],
            phase: Some(StudyPhase::NotApplicable.to_concept()),
            category: Vec::new(),
            keyword: Vec::new(),
            contact: Vec::new(),
            description: None,
            site: Vec::new(),
            contained: Vec::new(),
            related_artifact: Vec::new(),
            placeholders: [
                StudyField::Title,
                StudyField::Status,
                StudyField::Sponsor,
                StudyField::Condition,
                StudyField::Phase,
            ]
            .into_iter()
            .collect(),
        }
    }

    /// The ClinicalTrials.gov identifier, falling back to the resource id.
    pub fn nct_id(&self) -> &str {
        self.identifier
            .iter()
            .find(|identifier| identifier.system.as_deref() == Some(CLINICAL_TRIALS_GOV_SYSTEM))
            .map(|identifier| identifier.value.as_str())
            .unwrap_or(&self.id)
    }

    /// Whether `field` still holds its placeholder value.
    pub fn is_placeholder(&self, field: StudyField) -> bool {
        self.placeholders.contains(&field)
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.placeholders.remove(&StudyField::Title);
    }

    pub fn set_status(&mut self, status: StudyStatus) {
        self.status = status;
        self.placeholders.remove(&StudyField::Status);
    }

    pub fn set_sponsor(&mut self, sponsor: Reference) {
        self.sponsor = sponsor;
        self.placeholders.remove(&StudyField::Sponsor);
    }

    pub fn set_conditions(&mut self, condition: Vec<CodeableConcept>) {
        self.condition = condition;
        self.placeholders.remove(&StudyField::Condition);
    }

    pub fn set_phase(&mut self, phase: StudyPhase) {
        self.phase = Some(phase.to_concept());
        self.placeholders.remove(&StudyField::Phase);
    }

    /// Fill placeholders and absent optional fields from a registry record.
    ///
    /// Values that did not come from a placeholder are never replaced, which
    /// makes the merge idempotent.
    pub fn merge_registry(&mut self, registry: &RegistryStudy) {
        if self.is_placeholder(StudyField::Title)
            && let Some(title) = registry
                .brief_title
                .as_ref()
                .or(registry.official_title.as_ref())
        {
            self.set_title(title.clone());
        }
        if self.is_placeholder(StudyField::Sponsor)
            && let Some(agency) = &registry.sponsor_agency
        {
            self.set_sponsor(Reference::organization(agency.clone()));
        }
        if self.is_placeholder(StudyField::Status)
            && let Some(status) = registry
                .overall_status
                .as_deref()
                .and_then(StudyStatus::from_registry)
        {
            self.set_status(status);
        }
        if self.is_placeholder(StudyField::Condition) && !registry.conditions.is_empty() {
            self.set_conditions(
                registry
                    .conditions
                    .iter()
                    .map(|condition| CodeableConcept::text(condition.clone()))
                    .collect(),
            );
        }
        if self.is_placeholder(StudyField::Phase)
            && let Some(phase) = StudyPhase::from_registry(&registry.phases)
        {
            self.set_phase(phase);
        }
        if self.description.is_none() {
            self.description = registry.brief_summary.clone();
        }
        if self.keyword.is_empty() {
            self.keyword = registry
                .keywords
                .iter()
                .map(|keyword| CodeableConcept::text(keyword.clone()))
                .collect();
        }
    }
}

/// The subset of a registry record merged into a [`ResearchStudy`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryStudy {
    pub nct_id: String,
    pub brief_title: Option<String>,
    pub official_title: Option<String>,
    pub sponsor_agency: Option<String>,
    pub overall_status: Option<String>,
    pub brief_summary: Option<String>,
    pub conditions: Vec<String>,
    pub keywords: Vec<String>,
    pub phases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSetEntry {
    pub resource: ResearchStudy,
}

/// Searchset bundle returned to callers of the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSet {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(rename = "type")]
    pub bundle_type: String,
    pub total: usize,
    pub entry: Vec<SearchSetEntry>,
}

impl SearchSet {
    pub fn new(studies: Vec<ResearchStudy>) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            bundle_type: "searchset".to_string(),
            total: studies.len(),
            entry: studies
                .into_iter()
                .map(|resource| SearchSetEntry { resource })
                .collect(),
        }
    }

    pub fn studies(&self) -> impl Iterator<Item = &ResearchStudy> {
        self.entry.iter().map(|entry| &entry.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry_record() -> RegistryStudy {
        RegistryStudy {
            nct_id: "NCT12345678".into(),
            brief_title: Some("title".into()),
            sponsor_agency: Some("Example Agency".into()),
            overall_status: Some("Recruiting".into()),
            brief_summary: Some("Summary".into()),
            conditions: vec!["Metastatic Breast Cancer".into()],
            phases: vec!["PHASE1".into(), "PHASE2".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_new_study_defaults() {
        let study = ResearchStudy::new("NCT00000001");
        assert_eq!(study.title, DEFAULT_TITLE);
        assert_eq!(study.status, StudyStatus::Unknown);
        assert_eq!(study.sponsor.display.as_deref(), Some(DEFAULT_SPONSOR));
        assert_eq!(study.nct_id(), "NCT00000001");
        assert!(study.is_placeholder(StudyField::Title));

        let value = serde_json::to_value(&study).unwrap();
        assert_eq!(value["resourceType"], "ResearchStudy");
        assert_eq!(value["status"], "unknown");
        assert_eq!(value["condition"], json!([{"text": "Breast Cancer"}]));
        assert_eq!(
            value["identifier"],
            json!([{"use": "official", "system": "http://clinicaltrials.gov", "value": "NCT00000001"}])
        );
        assert!(value.get("placeholders").is_none());
    }

    #[test]
    fn test_merge_fills_placeholders() {
        let mut study = ResearchStudy::new("NCT12345678");
        study.merge_registry(&registry_record());
        assert_eq!(study.title, "title");
        assert_eq!(study.status, StudyStatus::Active);
        assert_eq!(study.sponsor, Reference::organization("Example Agency"));
        assert_eq!(study.description.as_deref(), Some("Summary"));
        assert_eq!(
            study.condition,
            vec![CodeableConcept::text("Metastatic Breast Cancer")]
        );
        assert_eq!(study.phase, Some(StudyPhase::Phase1Phase2.to_concept()));
    }

    #[test]
    fn test_merge_keeps_endpoint_values() {
        let mut study = ResearchStudy::new("NCT12345678");
        study.set_title("Title");
        study.set_phase(StudyPhase::Phase3);
        study.description = Some("Purpose.".into());
        study.merge_registry(&registry_record());
        assert_eq!(study.title, "Title");
        assert_eq!(study.phase, Some(StudyPhase::Phase3.to_concept()));
        assert_eq!(study.description.as_deref(), Some("Purpose."));
        assert_eq!(study.sponsor.display.as_deref(), Some("Example Agency"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let registry = registry_record();
        let mut once = ResearchStudy::new("NCT12345678");
        once.merge_registry(&registry);
        let mut twice = once.clone();
        twice.merge_registry(&registry);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unrecognized_registry_status_keeps_placeholder() {
        let mut study = ResearchStudy::new("NCT12345678");
        study.merge_registry(&RegistryStudy {
            overall_status: Some("UNKNOWN".into()),
            ..Default::default()
        });
        assert_eq!(study.status, StudyStatus::Unknown);
        assert!(study.is_placeholder(StudyField::Status));
    }

    #[test]
    fn test_status_from_registry_forms() {
        assert_eq!(
            StudyStatus::from_registry("Active, not recruiting"),
            Some(StudyStatus::ClosedToAccrual)
        );
        assert_eq!(
            StudyStatus::from_registry("ACTIVE_NOT_RECRUITING"),
            Some(StudyStatus::ClosedToAccrual)
        );
        assert_eq!(
            StudyStatus::from_registry("Not yet recruiting"),
            Some(StudyStatus::Approved)
        );
        assert_eq!(
            StudyStatus::from_registry("TERMINATED"),
            Some(StudyStatus::AdministrativelyCompleted)
        );
        assert_eq!(StudyStatus::from_registry("Unknown status"), None);
    }

    #[test]
    fn test_phase_from_phase_number() {
        assert_eq!(StudyPhase::from_phase_number("I-II"), StudyPhase::Phase1Phase2);
        assert_eq!(StudyPhase::from_phase_number("III"), StudyPhase::Phase3);
        assert_eq!(StudyPhase::from_phase_number("Phase II/III"), StudyPhase::Phase2Phase3);
        assert_eq!(StudyPhase::from_phase_number("iv"), StudyPhase::Phase4);
        assert_eq!(StudyPhase::from_phase_number(""), StudyPhase::NotApplicable);
        assert_eq!(StudyPhase::from_phase_number("Pilot"), StudyPhase::NotApplicable);
    }

    #[test]
    fn test_phase_from_registry() {
        assert_eq!(StudyPhase::from_registry(&[]), None);
        assert_eq!(
            StudyPhase::from_registry(&["PHASE2".into(), "PHASE3".into()]),
            Some(StudyPhase::Phase2Phase3)
        );
        assert_eq!(
            StudyPhase::from_registry(&["EARLY_PHASE1".into()]),
            Some(StudyPhase::EarlyPhase1)
        );
        assert_eq!(
            StudyPhase::from_registry(&["NA".into()]),
            Some(StudyPhase::NotApplicable)
        );
    }

    #[test]
    fn test_searchset_shape() {
        let set = SearchSet::new(vec![ResearchStudy::new("NCT1"), ResearchStudy::new("NCT2")]);
        assert_eq!(set.total, 2);
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(value["type"], "searchset");
        assert_eq!(value["total"], 2);
        assert_eq!(value["entry"][1]["resource"]["id"], "NCT2");

        let empty = SearchSet::new(Vec::new());
        assert_eq!(empty.total, 0);
        assert!(empty.entry.is_empty());
    }
}
