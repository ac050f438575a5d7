//! The trial lookup pipeline.
//!
//! A lookup maps the patient record's codes to SNOMED, appends the search
//! options, queries the trial-search endpoint, translates the summaries into
//! `ResearchStudy` resources and enriches them from the registry.
//!
//! ```ignore
//! let lookup = create_lookup(&LookupConfig::with_endpoint(url), None)?;
//! let results = lookup.match_trials(&patient_bundle, &QueryOptions::default()).await?;
//! ```

use std::sync::Arc;
use std::time::Instant;

use ctmatch_codes::{SharedCodeTables, map_patient_record};
use ctmatch_core::{ApiError, Bundle, MatchError, SearchSet};
use tracing::{debug, info};

use crate::cache::{CacheStats, MemoryQueryCache, NoopQueryCache, QueryCache};
use crate::client::QueryClient;
use crate::config::{CacheSettings, LookupConfig};
use crate::enrich::FallbackEnricher;
use crate::options::QueryOptions;
use crate::registry::{ClinicalTrialsGovRegistry, NoRegistry, RegistryClient};
use crate::translate::to_research_studies;

/// Build a lookup from `config`.
///
/// Fails before any network activity when the endpoint is missing or invalid.
/// Without a `registry`, studies are returned as the search endpoint
/// described them.
pub fn create_lookup(
    config: &LookupConfig,
    registry: Option<Arc<dyn RegistryClient>>,
) -> Result<ClinicalTrialLookup, MatchError> {
    let mut builder = ClinicalTrialLookup::builder(config.clone());
    if let Some(registry) = registry {
        builder = builder.registry(registry);
    }
    builder.build()
}

/// The registry described by `config`, or `None` when enrichment is disabled.
pub fn configured_registry(
    config: &LookupConfig,
) -> Result<Option<Arc<dyn RegistryClient>>, MatchError> {
    if !config.registry.enabled {
        return Ok(None);
    }
    let registry =
        ClinicalTrialsGovRegistry::new(&config.registry.base_url, config.request_timeout())
            .map_err(|e| MatchError::configuration(e.to_string()))?;
    Ok(Some(Arc::new(registry)))
}

/// A configured trial lookup. Cheap to clone and safe to share.
#[derive(Clone)]
pub struct ClinicalTrialLookup {
    client: QueryClient,
    enricher: FallbackEnricher,
    code_tables: Arc<SharedCodeTables>,
}

impl ClinicalTrialLookup {
    pub fn builder(config: LookupConfig) -> LookupBuilder {
        LookupBuilder::new(config)
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }

    pub fn code_tables(&self) -> &Arc<SharedCodeTables> {
        &self.code_tables
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.client.cache().stats()
    }

    /// Load the code tables now instead of on the first request.
    pub async fn warm_up(&self) -> Result<(), MatchError> {
        self.code_tables.get().await?;
        Ok(())
    }

    /// Find trials matching `record`.
    pub async fn match_trials(
        &self,
        record: &Bundle,
        options: &QueryOptions,
    ) -> Result<SearchSet, MatchError> {
        let started = Instant::now();
        let tables = self.code_tables.get().await?;

        let mut query = map_patient_record(record, &tables);
        options.apply(&mut query);
        let body = serde_json::to_string(&query).map_err(|e| ApiError::Encode(e.to_string()))?;

        let trials = self.client.send_query(body).await?;
        debug!(trials = trials.len(), "Translating trial summaries");
        let studies = to_research_studies(&trials)?;
        let studies = self.enricher.enrich(studies).await;

        let results = SearchSet::new(studies);
        info!(
            endpoint = self.client.endpoint(),
            total = results.total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Trial lookup completed"
        );
        Ok(results)
    }
}

/// Builder for [`ClinicalTrialLookup`].
///
/// Components not set explicitly come from the config: a memory or no-op
/// cache per `cache.enabled`, code tables loaded lazily from
/// `code_mappings`, and no registry.
pub struct LookupBuilder {
    config: LookupConfig,
    registry: Option<Arc<dyn RegistryClient>>,
    cache: Option<Arc<dyn QueryCache>>,
    code_tables: Option<Arc<SharedCodeTables>>,
}

impl LookupBuilder {
    pub fn new(config: LookupConfig) -> Self {
        Self {
            config,
            registry: None,
            cache: None,
            code_tables: None,
        }
    }

    pub fn registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn code_tables(mut self, code_tables: Arc<SharedCodeTables>) -> Self {
        self.code_tables = Some(code_tables);
        self
    }

    pub fn build(self) -> Result<ClinicalTrialLookup, MatchError> {
        let endpoint = self.config.validated_endpoint()?;

        let cache = match self.cache {
            Some(cache) => cache,
            None if self.config.cache.enabled => memory_cache(&self.config.cache),
            None => Arc::new(NoopQueryCache),
        };
        let client = QueryClient::with_options(
            endpoint.as_str(),
            self.config.request_timeout(),
            cache,
        )
        .map_err(|e| MatchError::configuration(e.to_string()))?;

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(NoRegistry) as Arc<dyn RegistryClient>);
        let code_tables = self.code_tables.unwrap_or_else(|| {
            Arc::new(SharedCodeTables::new(self.config.code_mappings.clone()))
        });

        debug!(endpoint = %endpoint, cache = self.config.cache.enabled, "Trial lookup created");
        Ok(ClinicalTrialLookup {
            client,
            enricher: FallbackEnricher::new(registry),
            code_tables,
        })
    }
}

/// Build the memory cache and, inside a runtime, its periodic sweep.
fn memory_cache(settings: &CacheSettings) -> Arc<dyn QueryCache> {
    let cache = Arc::new(MemoryQueryCache::with_max_entries(
        settings.ttl(),
        settings.max_entries,
    ));
    if let Some(period) = settings.cleanup_interval()
        && tokio::runtime::Handle::try_current().is_ok()
    {
        MemoryQueryCache::spawn_cleanup(&cache, period);
    }
    cache
}
