use std::sync::Arc;

use ctmatch_core::ResearchStudy;
use tracing::{debug, warn};

use crate::registry::{NoRegistry, RegistryClient};

/// Best-effort registry enrichment.
///
/// A registry failure never fails the lookup: the studies are returned as the
/// search endpoint described them.
#[derive(Clone)]
pub struct FallbackEnricher {
    registry: Arc<dyn RegistryClient>,
}

impl FallbackEnricher {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }

    pub async fn enrich(&self, studies: Vec<ResearchStudy>) -> Vec<ResearchStudy> {
        if studies.is_empty() {
            return studies;
        }
        match self.registry.update_research_studies(&studies).await {
            Ok(updated) => {
                debug!(studies = updated.len(), "Registry enrichment applied");
                updated
            }
            Err(e) => {
                warn!(error = %e, studies = studies.len(), "Registry enrichment failed, returning studies as-is");
                studies
            }
        }
    }
}

impl Default for FallbackEnricher {
    fn default() -> Self {
        Self::new(Arc::new(NoRegistry))
    }
}
