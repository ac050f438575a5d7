//! Patient record code translation.
//!
//! Rewrites codings inside a [`Bundle`] from their source vocabulary to SNOMED
//! CT. Mapping never mutates its input and never raises: entries of another
//! kind, entries without a resource, and resources missing the concept or
//! coding path are left exactly as they were.

use ctmatch_core::{Bundle, Coding, Resource, ResourceKind};
use tracing::debug;

use crate::table::{CodeMappingTable, CodeTables};

/// Return a copy of `bundle` with the codings of every `kind` resource mapped
/// through `table`.
///
/// - `MedicationStatement`: `medicationCodeableConcept.coding`
/// - `Condition`: `stage[].summary.coding` (`stage[].type` is never touched)
pub fn map_codes(bundle: &Bundle, kind: ResourceKind, table: &CodeMappingTable) -> Bundle {
    let mut mapped = bundle.clone();
    let mut replaced = 0;

    for entry in &mut mapped.entry {
        match (kind, entry.resource.as_mut()) {
            (ResourceKind::MedicationStatement, Some(Resource::MedicationStatement(statement))) => {
                if let Some(codings) = statement
                    .medication_codeable_concept
                    .as_mut()
                    .and_then(|concept| concept.coding.as_mut())
                {
                    replaced += map_codings(codings, table);
                }
            }
            (ResourceKind::Condition, Some(Resource::Condition(condition))) => {
                for stage in condition.stage.iter_mut().flatten() {
                    if let Some(codings) = stage
                        .summary
                        .as_mut()
                        .and_then(|summary| summary.coding.as_mut())
                    {
                        replaced += map_codings(codings, table);
                    }
                }
            }
            _ => {}
        }
    }

    if replaced > 0 {
        debug!(kind = %kind, replaced, "Mapped codings to SNOMED");
    }
    mapped
}

/// Map every translatable resource kind of `bundle` through `tables`.
///
/// Condition stages go through the SNOMED staging table first and the AJCC
/// table second; codes produced by the first pass carry the SNOMED system and
/// are out of scope for the AJCC table.
pub fn map_patient_record(bundle: &Bundle, tables: &CodeTables) -> Bundle {
    let mapped = map_codes(bundle, ResourceKind::MedicationStatement, &tables.rxnorm);
    let mapped = map_codes(&mapped, ResourceKind::Condition, &tables.stage_snomed);
    map_codes(&mapped, ResourceKind::Condition, &tables.stage_ajcc)
}

fn map_codings(codings: &mut [Coding], table: &CodeMappingTable) -> usize {
    let mut replaced = 0;
    for coding in codings.iter_mut() {
        if let Some(target) = table.lookup(coding) {
            *coding = Coding::snomed(target);
            replaced += 1;
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{AJCC_SYSTEM, RXNORM_SYSTEM};
    use ctmatch_core::{CodeableConcept, Condition, ConditionStage, MedicationStatement, SNOMED_SYSTEM};
    use serde_json::json;

    fn table() -> CodeMappingTable {
        [("AAA", "111"), ("BBB", "222")].into_iter().collect()
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = Bundle::collection();
        let mapped = map_codes(&bundle, ResourceKind::MedicationStatement, &table());
        assert_eq!(mapped, bundle);
    }

    #[test]
    fn test_preserves_concept_text() {
        let bundle = Bundle::collection().with_entry(MedicationStatement::new(
            CodeableConcept::from_codings(vec![Coding::code_only("AAA")]).with_text("Example"),
        ));
        let mapped = map_codes(&bundle, ResourceKind::MedicationStatement, &table());
        let Some(Resource::MedicationStatement(statement)) = &mapped.entry[0].resource else {
            panic!("expected MedicationStatement");
        };
        let concept = statement.medication_codeable_concept.as_ref().unwrap();
        assert_eq!(concept.text.as_deref(), Some("Example"));
        assert_eq!(concept.coding, Some(vec![Coding::snomed("111")]));
    }

    #[test]
    fn test_input_is_not_mutated() {
        let bundle = Bundle::collection().with_entry(MedicationStatement::new(
            CodeableConcept::from_codings(vec![Coding::code_only("AAA")]),
        ));
        let before = bundle.clone();
        let _ = map_codes(&bundle, ResourceKind::MedicationStatement, &table());
        assert_eq!(bundle, before);
    }

    #[test]
    fn test_replacement_drops_display() {
        let mut coding = Coding::new(RXNORM_SYSTEM, "AAA");
        coding.extra.insert("display".into(), json!("Drug A"));
        let bundle = Bundle::collection().with_entry(MedicationStatement::new(
            CodeableConcept::from_codings(vec![coding]),
        ));
        let mapped = map_codes(&bundle, ResourceKind::MedicationStatement, &table());
        let value = serde_json::to_value(&mapped).unwrap();
        assert_eq!(
            value["entry"][0]["resource"]["medicationCodeableConcept"]["coding"],
            json!([{"system": SNOMED_SYSTEM, "code": "111"}])
        );
    }

    #[test]
    fn test_statement_without_concept_is_untouched() {
        let bundle = Bundle::collection().with_entry(MedicationStatement::default());
        let mapped = map_codes(&bundle, ResourceKind::MedicationStatement, &table());
        assert_eq!(mapped, bundle);
    }

    #[test]
    fn test_condition_without_stage_summary() {
        let bundle = Bundle::collection().with_entry(Condition::with_stages(vec![
            ConditionStage {
                stage_type: Some(CodeableConcept::from_codings(vec![Coding::code_only("BBB")])),
                ..Default::default()
            },
        ]));
        let mapped = map_codes(&bundle, ResourceKind::Condition, &table());
        assert_eq!(mapped, bundle);
    }

    #[test]
    fn test_patient_record_staging_order() {
        let tables = CodeTables {
            rxnorm: CodeMappingTable::scoped(RXNORM_SYSTEM, [("AAA", "111")]),
            stage_snomed: CodeMappingTable::scoped(SNOMED_SYSTEM, [("S1", "900")]),
            // A SNOMED result must not be picked up again by the AJCC pass.
            stage_ajcc: CodeMappingTable::scoped(AJCC_SYSTEM, [("900", "bad"), ("IIA", "901")]),
        };
        let bundle = Bundle::collection()
            .with_entry(MedicationStatement::new(CodeableConcept::from_codings(vec![
                Coding::new(RXNORM_SYSTEM, "AAA"),
            ])))
            .with_entry(Condition::with_stages(vec![ConditionStage {
                summary: Some(CodeableConcept::from_codings(vec![
                    Coding::new(SNOMED_SYSTEM, "S1"),
                    Coding::new(AJCC_SYSTEM, "IIA"),
                ])),
                ..Default::default()
            }]));

        let mapped = map_patient_record(&bundle, &tables);
        let value = serde_json::to_value(&mapped).unwrap();
        assert_eq!(
            value["entry"][0]["resource"]["medicationCodeableConcept"]["coding"],
            json!([{"system": SNOMED_SYSTEM, "code": "111"}])
        );
        assert_eq!(
            value["entry"][1]["resource"]["stage"][0]["summary"]["coding"],
            json!([
                {"system": SNOMED_SYSTEM, "code": "900"},
                {"system": SNOMED_SYSTEM, "code": "901"}
            ])
        );
    }
}
