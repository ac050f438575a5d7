//! Clinical code translation for patient records.
//!
//! The trial-search endpoint only understands SNOMED CT. Before a patient
//! record is sent, medication codes (RxNorm) and cancer stage codes (SNOMED
//! staging, AJCC) are rewritten with [`map_patient_record`] using the tables in
//! [`CodeTables`].

pub mod mapper;
pub mod table;

pub use mapper::{map_codes, map_patient_record};
pub use table::{
    AJCC_SYSTEM, CodeMappingPaths, CodeMappingTable, CodeTables, RXNORM_SYSTEM, SharedCodeTables,
};
