//! Trial-search query pipeline.
//!
//! [`create_lookup`] builds a [`ClinicalTrialLookup`] from a [`LookupConfig`];
//! [`ClinicalTrialLookup::match_trials`] runs one patient record through the
//! code mapping, remote query, translation and registry enrichment stages.

pub mod cache;
pub mod client;
pub mod config;
pub mod enrich;
pub mod lookup;
pub mod options;
pub mod registry;
pub mod translate;

pub use cache::{CacheStats, MemoryQueryCache, NoopQueryCache, QueryCache};
pub use client::{FHIR_JSON, QueryClient, send_query};
pub use config::{CacheSettings, LookupConfig, RegistrySettings};
pub use enrich::FallbackEnricher;
pub use lookup::{ClinicalTrialLookup, LookupBuilder, configured_registry, create_lookup};
pub use options::QueryOptions;
pub use registry::{ClinicalTrialsGovRegistry, NoRegistry, RegistryClient, RegistryError};
pub use translate::to_research_studies;
