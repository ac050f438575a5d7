//! Translation of trial summaries into `ResearchStudy` resources.

use ctmatch_core::research_study::{
    Address, ContactDetail, ContactPoint, Location, Position, Reference, RelatedArtifact,
};
use ctmatch_core::{ApiError, CodeableConcept, ResearchStudy, StudyPhase, TrialResponse};

/// Id of the contained `Location` describing the trial site.
const SITE_LOCATION_ID: &str = "location-0";

/// Translate summaries one-to-one into studies, keeping their order.
///
/// Fails with [`ApiError::MissingTrialId`] on the first summary without a
/// `trialId`, since a study cannot be identified without it.
pub fn to_research_studies(trials: &[TrialResponse]) -> Result<Vec<ResearchStudy>, ApiError> {
    trials
        .iter()
        .enumerate()
        .map(|(index, trial)| to_research_study(index, trial))
        .collect()
}

fn to_research_study(index: usize, trial: &TrialResponse) -> Result<ResearchStudy, ApiError> {
    let nct_id = present(&trial.trial_id).ok_or(ApiError::MissingTrialId { index })?;
    let mut study = ResearchStudy::new(nct_id);

    if let Some(title) = present(&trial.trial_title).or_else(|| present(&trial.scientific_title)) {
        study.set_title(title);
    }
    if let Some(phase) = present(&trial.phase_number) {
        study.set_phase(StudyPhase::from_phase_number(phase));
    }

    study.category = text_concepts(trial.trial_categories.as_deref());
    study.keyword = text_concepts(trial.trial_mutations.as_deref());
    study.description = description(trial);
    study.contact = contact(trial).into_iter().collect();

    if let Some(location) = site_location(trial) {
        study.site = vec![Reference::contained(&location.id, "Location")];
        study.contained = vec![location];
    }

    study.related_artifact = [
        (present(&trial.ct_gov_link), "ClinicalTrials.gov"),
        (present(&trial.eligibility_criteria_link), "Eligibility criteria"),
    ]
    .into_iter()
    .filter_map(|(url, label)| {
        url.map(|url| RelatedArtifact {
            artifact_type: "documentation".to_string(),
            label: Some(label.to_string()),
            url: Some(url.to_string()),
        })
    })
    .collect();

    Ok(study)
}

/// Blank strings count as absent.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn text_concepts(values: Option<&[String]>) -> Vec<CodeableConcept> {
    values
        .unwrap_or_default()
        .iter()
        .filter(|value| !value.trim().is_empty())
        .map(|value| CodeableConcept::text(value.clone()))
        .collect()
}

fn description(trial: &TrialResponse) -> Option<String> {
    let sections: Vec<&str> = [
        &trial.purpose,
        &trial.who_is_this_for,
        &trial.what_is_involved,
        &trial.what_is_being_studied,
        &trial.learn_more,
        &trial.visits,
    ]
    .into_iter()
    .filter_map(present)
    .collect();

    (!sections.is_empty()).then(|| sections.join("\n\n"))
}

fn contact(trial: &TrialResponse) -> Option<ContactDetail> {
    let name = present(&trial.contact_name).map(str::to_string);
    let telecom: Vec<ContactPoint> = [
        (present(&trial.contact_phone), "phone"),
        (present(&trial.contact_email), "email"),
    ]
    .into_iter()
    .filter_map(|(value, system)| {
        value.map(|value| ContactPoint {
            system: system.to_string(),
            value: value.to_string(),
            use_: Some("work".to_string()),
        })
    })
    .collect();

    if name.is_none() && telecom.is_empty() {
        return None;
    }
    Some(ContactDetail { name, telecom })
}

fn site_location(trial: &TrialResponse) -> Option<Location> {
    let address = Address {
        city: present(&trial.city).map(str::to_string),
        state: present(&trial.state).map(str::to_string),
        postal_code: present(&trial.zip).map(str::to_string),
    };
    let has_address = address != Address::default();
    let position = match (trial.latitude, trial.longitude) {
        (Some(latitude), Some(longitude)) => Some(Position {
            latitude,
            longitude,
        }),
        _ => None,
    };
    let name = present(&trial.site_name).map(str::to_string);

    if name.is_none() && !has_address && position.is_none() {
        return None;
    }

    let mut location = Location::new(SITE_LOCATION_ID);
    location.name = name;
    location.address = has_address.then_some(address);
    location.position = position;
    Some(location)
}
