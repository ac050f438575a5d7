//! Trial registry clients used to fill in study details the search endpoint
//! does not provide.
//!
//! - [`NoRegistry`]: returns every batch unchanged
//! - [`ClinicalTrialsGovRegistry`]: ClinicalTrials.gov API v2
//!
//! Registry data is merged with [`ResearchStudy::merge_registry`], which only
//! replaces placeholder or absent values.

use std::time::Duration;

use async_trait::async_trait;
use ctmatch_core::{RegistryStudy, ResearchStudy};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Default ClinicalTrials.gov API base URL.
pub const DEFAULT_REGISTRY_URL: &str = "https://clinicaltrials.gov/api/v2";

/// Errors that can occur while talking to a trial registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid registry URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Registry request for {nct_id} failed: {message}")]
    Request { nct_id: String, message: String },

    #[error("Registry returned status {status} for {nct_id}")]
    Status { nct_id: String, status: u16 },

    #[error("Invalid registry record for {nct_id}: {message}")]
    Parse { nct_id: String, message: String },
}

/// Source of registry details for a batch of studies.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Return the batch with registry details merged in.
    ///
    /// Must accept an empty batch.
    async fn update_research_studies(
        &self,
        studies: &[ResearchStudy],
    ) -> Result<Vec<ResearchStudy>, RegistryError>;
}

/// Registry used when enrichment is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegistry;

#[async_trait]
impl RegistryClient for NoRegistry {
    async fn update_research_studies(
        &self,
        studies: &[ResearchStudy],
    ) -> Result<Vec<ResearchStudy>, RegistryError> {
        Ok(studies.to_vec())
    }
}

/// ClinicalTrials.gov API v2 client.
///
/// Each study is fetched with `GET {base_url}/studies/{nctId}`. Studies the
/// registry does not know, or that fail to load, are returned unchanged.
#[derive(Debug, Clone)]
pub struct ClinicalTrialsGovRegistry {
    http: reqwest::Client,
    base_url: Url,
}

impl ClinicalTrialsGovRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RegistryError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::Client(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn study_url(&self, nct_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("studies").push(nct_id);
        }
        url
    }

    /// Fetch one registry record. `Ok(None)` when the registry has no such study.
    pub async fn fetch_study(&self, nct_id: &str) -> Result<Option<RegistryStudy>, RegistryError> {
        let url = self.study_url(nct_id);
        debug!(nct_id, url = %url, "Fetching registry record");

        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| RegistryError::Request {
                nct_id: nct_id.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RegistryError::Status {
                nct_id: nct_id.to_string(),
                status: status.as_u16(),
            });
        }

        let record: StudyRecord = response.json().await.map_err(|e| RegistryError::Parse {
            nct_id: nct_id.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(record.into_registry_study(nct_id)))
    }
}

#[async_trait]
impl RegistryClient for ClinicalTrialsGovRegistry {
    async fn update_research_studies(
        &self,
        studies: &[ResearchStudy],
    ) -> Result<Vec<ResearchStudy>, RegistryError> {
        let mut updated = Vec::with_capacity(studies.len());
        for study in studies {
            let mut study = study.clone();
            let nct_id = study.nct_id().to_string();
            match self.fetch_study(&nct_id).await {
                Ok(Some(record)) => study.merge_registry(&record),
                Ok(None) => debug!(nct_id = %nct_id, "Study not found in registry"),
                Err(e) => warn!(nct_id = %nct_id, error = %e, "Registry lookup failed"),
            }
            updated.push(study);
        }
        Ok(updated)
    }
}

// ClinicalTrials.gov API v2 study record, reduced to the merged fields.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StudyRecord {
    protocol_section: ProtocolSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProtocolSection {
    identification_module: IdentificationModule,
    status_module: StatusModule,
    sponsor_collaborators_module: SponsorCollaboratorsModule,
    description_module: DescriptionModule,
    conditions_module: ConditionsModule,
    design_module: DesignModule,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IdentificationModule {
    nct_id: Option<String>,
    brief_title: Option<String>,
    official_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StatusModule {
    overall_status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SponsorCollaboratorsModule {
    lead_sponsor: Option<LeadSponsor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LeadSponsor {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DescriptionModule {
    brief_summary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConditionsModule {
    conditions: Vec<String>,
    keywords: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DesignModule {
    phases: Vec<String>,
}

impl StudyRecord {
    fn into_registry_study(self, requested_id: &str) -> RegistryStudy {
        let section = self.protocol_section;
        let identification = section.identification_module;
        RegistryStudy {
            nct_id: identification
                .nct_id
                .unwrap_or_else(|| requested_id.to_string()),
            brief_title: identification.brief_title,
            official_title: identification.official_title,
            sponsor_agency: section
                .sponsor_collaborators_module
                .lead_sponsor
                .and_then(|sponsor| sponsor.name),
            overall_status: section.status_module.overall_status,
            brief_summary: section.description_module.brief_summary,
            conditions: section.conditions_module.conditions,
            keywords: section.conditions_module.keywords,
            phases: section.design_module.phases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_no_registry_returns_batch() {
        let studies = vec![ResearchStudy::new("NCT1"), ResearchStudy::new("NCT2")];
        let updated = NoRegistry.update_research_studies(&studies).await.unwrap();
        assert_eq!(updated, studies);
        assert!(NoRegistry.update_research_studies(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_study_url() {
        let registry =
            ClinicalTrialsGovRegistry::new(DEFAULT_REGISTRY_URL, Duration::from_secs(5)).unwrap();
        assert_eq!(
            registry.study_url("NCT12345678").as_str(),
            "https://clinicaltrials.gov/api/v2/studies/NCT12345678"
        );

        let registry =
            ClinicalTrialsGovRegistry::new("http://localhost:8080/", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            registry.study_url("NCT1").as_str(),
            "http://localhost:8080/studies/NCT1"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ClinicalTrialsGovRegistry::new("not a url", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidUrl(_)));
    }

    #[test]
    fn test_record_conversion() {
        let record: StudyRecord = serde_json::from_value(json!({
            "protocolSection": {
                "identificationModule": {
                    "nctId": "NCT12345678",
                    "briefTitle": "Brief",
                    "officialTitle": "Official"
                },
                "statusModule": {"overallStatus": "RECRUITING"},
                "sponsorCollaboratorsModule": {"leadSponsor": {"name": "Agency", "class": "NIH"}},
                "descriptionModule": {"briefSummary": "Summary"},
                "conditionsModule": {"conditions": ["Breast Cancer"], "keywords": ["HER2"]},
                "designModule": {"phases": ["PHASE2"], "studyType": "INTERVENTIONAL"}
            },
            "hasResults": false
        }))
        .unwrap();
        let study = record.into_registry_study("NCT12345678");
        assert_eq!(study.brief_title.as_deref(), Some("Brief"));
        assert_eq!(study.sponsor_agency.as_deref(), Some("Agency"));
        assert_eq!(study.overall_status.as_deref(), Some("RECRUITING"));
        assert_eq!(study.conditions, vec!["Breast Cancer"]);
        assert_eq!(study.phases, vec!["PHASE2"]);
    }

    #[test]
    fn test_sparse_record_conversion() {
        let record: StudyRecord = serde_json::from_value(json!({})).unwrap();
        let study = record.into_registry_study("NCT9");
        assert_eq!(study.nct_id, "NCT9");
        assert!(study.brief_title.is_none());
        assert!(study.phases.is_empty());
    }
}
