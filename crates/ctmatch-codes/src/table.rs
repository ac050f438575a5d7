//! Code mapping tables.
//!
//! Each [`CodeMappingTable`] maps codes from one source vocabulary onto SNOMED
//! CT. The three tables the matcher needs are bundled in [`CodeTables`],
//! built once and shared read-only by every request.
//!
//! [`SharedCodeTables`] owns the load: the first caller starts it, concurrent
//! callers await the same in-flight load, and a failed load is retried by the
//! next caller rather than cached.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ctmatch_core::{CodeTableError, Coding};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// RxNorm system URI.
pub const RXNORM_SYSTEM: &str = "http://www.nlm.nih.gov/research/umls/rxnorm";

/// AJCC cancer staging system URI.
pub const AJCC_SYSTEM: &str = "http://cancerstaging.org";

/// Read-only mapping from source codes to SNOMED CT codes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeMappingTable {
    source_system: Option<String>,
    mappings: HashMap<String, String>,
}

impl CodeMappingTable {
    /// Build a table scoped to `source_system`.
    ///
    /// A scoped table only maps codings whose system is absent, empty, or equal
    /// to the source system.
    pub fn scoped<I, K, V>(source_system: impl Into<String>, mappings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut table: Self = mappings.into_iter().collect();
        table.source_system = Some(source_system.into());
        table
    }

    pub fn source_system(&self) -> Option<&str> {
        self.source_system.as_deref()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Target SNOMED code for `coding`, if the table has one.
    pub fn lookup(&self, coding: &Coding) -> Option<&str> {
        let code = coding.code.as_deref()?;
        if let Some(source) = &self.source_system
            && let Some(system) = coding.system.as_deref()
            && !system.is_empty()
            && system != source
        {
            return None;
        }
        self.mappings.get(code).map(String::as_str)
    }

    /// Load a JSON object of `"sourceCode": "snomedCode"` pairs.
    pub async fn load_json(
        path: &Path,
        source_system: Option<&str>,
    ) -> Result<Self, CodeTableError> {
        let shown = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CodeTableError::Io {
                path: shown.clone(),
                source,
            })?;
        let mappings: HashMap<String, String> =
            serde_json::from_str(&content).map_err(|e| CodeTableError::Parse {
                path: shown.clone(),
                message: e.to_string(),
            })?;
        debug!(path = %shown, entries = mappings.len(), "Loaded code mapping table");
        Ok(Self {
            source_system: source_system.map(str::to_string),
            mappings,
        })
    }
}

impl<K, V> FromIterator<(K, V)> for CodeMappingTable
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            source_system: None,
            mappings: iter
                .into_iter()
                .map(|(source, target)| (source.into(), target.into()))
                .collect(),
        }
    }
}

/// Locations of the mapping files. Missing entries yield empty tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMappingPaths {
    #[serde(default)]
    pub rxnorm: Option<PathBuf>,
    #[serde(default)]
    pub stage_snomed: Option<PathBuf>,
    #[serde(default)]
    pub stage_ajcc: Option<PathBuf>,
}

impl CodeMappingPaths {
    pub fn is_empty(&self) -> bool {
        self.rxnorm.is_none() && self.stage_snomed.is_none() && self.stage_ajcc.is_none()
    }
}

/// The three mapping tables used when preparing a patient record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeTables {
    /// RxNorm medications to SNOMED.
    pub rxnorm: CodeMappingTable,
    /// SNOMED staging codes to the SNOMED codes the endpoint understands.
    pub stage_snomed: CodeMappingTable,
    /// AJCC staging codes to SNOMED.
    pub stage_ajcc: CodeMappingTable,
}

impl CodeTables {
    /// Tables that map nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub async fn load(paths: &CodeMappingPaths) -> Result<Self, CodeTableError> {
        let tables = Self {
            rxnorm: load_optional(paths.rxnorm.as_deref(), RXNORM_SYSTEM).await?,
            stage_snomed: load_optional(
                paths.stage_snomed.as_deref(),
                ctmatch_core::SNOMED_SYSTEM,
            )
            .await?,
            stage_ajcc: load_optional(paths.stage_ajcc.as_deref(), AJCC_SYSTEM).await?,
        };
        info!(
            rxnorm = tables.rxnorm.len(),
            stage_snomed = tables.stage_snomed.len(),
            stage_ajcc = tables.stage_ajcc.len(),
            "Code mapping tables loaded"
        );
        Ok(tables)
    }
}

async fn load_optional(
    path: Option<&Path>,
    source_system: &str,
) -> Result<CodeMappingTable, CodeTableError> {
    match path {
        Some(path) => CodeMappingTable::load_json(path, Some(source_system)).await,
        None => Ok(CodeMappingTable {
            source_system: Some(source_system.to_string()),
            mappings: HashMap::new(),
        }),
    }
}

/// Lazily loaded, process-lifetime [`CodeTables`].
#[derive(Debug)]
pub struct SharedCodeTables {
    cell: OnceCell<Arc<CodeTables>>,
    paths: CodeMappingPaths,
    loads: AtomicUsize,
}

impl SharedCodeTables {
    /// Tables that will be loaded from `paths` on first use.
    pub fn new(paths: CodeMappingPaths) -> Self {
        Self {
            cell: OnceCell::new(),
            paths,
            loads: AtomicUsize::new(0),
        }
    }

    /// Tables that are already built.
    pub fn preloaded(tables: CodeTables) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Arc::new(tables))),
            paths: CodeMappingPaths::default(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Get the tables, loading them if this is the first call.
    pub async fn get(&self) -> Result<Arc<CodeTables>, CodeTableError> {
        self.cell
            .get_or_try_init(|| async {
                self.loads.fetch_add(1, Ordering::SeqCst);
                CodeTables::load(&self.paths).await.map(Arc::new)
            })
            .await
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Number of load attempts started so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}
