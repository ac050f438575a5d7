pub mod bundle;
pub mod error;
pub mod research_study;
pub mod trial;

pub use bundle::{
    Bundle, BundleEntry, CodeableConcept, Coding, Condition, ConditionStage, MedicationStatement,
    Resource, ResourceKind, SNOMED_SYSTEM,
};
pub use error::{ApiError, CodeTableError, ErrorCategory, MatchError, Result};
pub use research_study::{
    RegistryStudy, ResearchStudy, SearchSet, StudyField, StudyPhase, StudyStatus,
};
pub use trial::TrialResponse;
