#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ctmatch_core::{Bundle, RegistryStudy, ResearchStudy};
use ctmatch_query::{RegistryClient, RegistryError};
use serde_json::{Value, json};

pub fn example_trial() -> Value {
    json!({
        "resultNumber": "1",
        "trialId": "NCT12345678",
        "trialTitle": "Title",
        "scientificTitle": "Scientific Title",
        "phaseNumber": "I-II",
        "purpose": "Purpose.",
        "whoIsThisFor": "Who is this for?",
        "whatIsInvolved": "What is involved?",
        "whatIsBeingStudied": "What is being studied?",
        "learnMore": "Learn more",
        "ctGovLink": "https://clinicaltrials.gov/ct2/show/NCT03377387",
        "eligibilityCriteriaLink": "https://clinicaltrials.gov/ct2/show/NCT03377387#eligibility",
        "trialCategories": ["METASTATIC", "TREATMENT_BIOLOGICAL"],
        "trialMutations": [],
        "newTrialFlag": false,
        "zip": "01780",
        "distance": "3",
        "siteName": "Example",
        "city": "Bedford",
        "state": "MA",
        "visits": "Monthly visits, ongoing",
        "latitude": 42,
        "longitude": -75,
        "contactName": "Contact",
        "contactPhone": "781-555-0100",
        "contactEmail": null,
        "noVisitsRequiredFlag": false,
        "numberOfSites": "1"
    })
}

pub fn empty_bundle() -> Bundle {
    Bundle::collection()
}

/// Registry that merges fixed records and counts its calls.
#[derive(Default)]
pub struct StaticRegistry {
    pub records: Vec<RegistryStudy>,
    pub calls: AtomicUsize,
}

impl StaticRegistry {
    pub fn with_records(records: Vec<RegistryStudy>) -> Self {
        Self {
            records,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryClient for StaticRegistry {
    async fn update_research_studies(
        &self,
        studies: &[ResearchStudy],
    ) -> Result<Vec<ResearchStudy>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(studies
            .iter()
            .cloned()
            .map(|mut study| {
                if let Some(record) = self.records.iter().find(|r| r.nct_id == study.id) {
                    study.merge_registry(record);
                }
                study
            })
            .collect())
    }
}

/// Registry that always fails.
pub struct FailingRegistry;

#[async_trait]
impl RegistryClient for FailingRegistry {
    async fn update_research_studies(
        &self,
        _studies: &[ResearchStudy],
    ) -> Result<Vec<ResearchStudy>, RegistryError> {
        Err(RegistryError::Client("Oops".into()))
    }
}
